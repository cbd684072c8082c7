/// Analysis Configuration
///
/// Loaded from swingcheck.toml (working directory) with env-var overrides.
/// Env format: SWINGCHECK__SECTION__KEY (double underscore separators).
///
/// The angle ranges and the hip-drift early-stop threshold are heuristics,
/// not validated biomechanics; they live here so they can be retuned.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::landmarks::Handedness;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub thresholds: MechanicsThresholds,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

// ─── Sampling ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Frames analysed per second of video.
    #[serde(default = "default_sample_fps")]
    pub sample_fps: f64,
    /// Stop once the hip midpoint drifts this far (normalised width) from
    /// the first valid frame.
    #[serde(default = "default_hip_translate_threshold")]
    pub hip_translate_threshold: f64,
    /// Publish the accumulated sample list every N samples.
    #[serde(default = "default_progress_batch_every")]
    pub progress_batch_every: usize,
    #[serde(default = "default_fallback_width")]
    pub fallback_raster_width: u32,
    #[serde(default = "default_fallback_height")]
    pub fallback_raster_height: u32,
    #[serde(default)]
    pub handedness: Handedness,
}

fn default_sample_fps() -> f64 {
    5.0
}
fn default_hip_translate_threshold() -> f64 {
    0.15
}
fn default_progress_batch_every() -> usize {
    10
}
fn default_fallback_width() -> u32 {
    1280
}
fn default_fallback_height() -> u32 {
    720
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_fps: default_sample_fps(),
            hip_translate_threshold: default_hip_translate_threshold(),
            progress_batch_every: default_progress_batch_every(),
            fallback_raster_width: default_fallback_width(),
            fallback_raster_height: default_fallback_height(),
            handedness: Handedness::default(),
        }
    }
}

// ─── Mechanics thresholds ────────────────────────────────────────────────────

/// Inclusive ideal range for one angle, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleRange {
    pub min: f64,
    pub max: f64,
}

impl AngleRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, deg: f64) -> bool {
        deg >= self.min && deg <= self.max
    }
}

pub const VISIBILITY_THRESHOLD: f64 = 0.65;
pub const FLAG_CONFIDENCE_THRESHOLD: f64 = 0.70;
pub const MIN_SIDE_VIEW_HIP_SEPARATION: f64 = 0.15;
pub const ELBOW_SLOT_RANGE: AngleRange = AngleRange::new(70.0, 110.0);
pub const SHOULDER_TILT_RANGE: AngleRange = AngleRange::new(-20.0, 20.0);
pub const HIP_ROTATION_RANGE: AngleRange = AngleRange::new(75.0, 105.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanicsThresholds {
    /// Minimum landmark visibility to use it in any computation.
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f64,
    /// Minimum rule confidence for a flag to be raised.
    #[serde(default = "default_flag_confidence_threshold")]
    pub flag_confidence_threshold: f64,
    #[serde(default = "default_elbow_slot")]
    pub elbow_slot: AngleRange,
    #[serde(default = "default_shoulder_tilt")]
    pub shoulder_tilt: AngleRange,
    #[serde(default = "default_hip_rotation")]
    pub hip_rotation: AngleRange,
    /// Below this normalised hip separation the athlete faces the camera.
    #[serde(default = "default_min_hip_separation")]
    pub min_side_view_hip_separation: f64,
}

fn default_visibility_threshold() -> f64 {
    VISIBILITY_THRESHOLD
}
fn default_flag_confidence_threshold() -> f64 {
    FLAG_CONFIDENCE_THRESHOLD
}
fn default_elbow_slot() -> AngleRange {
    ELBOW_SLOT_RANGE
}
fn default_shoulder_tilt() -> AngleRange {
    SHOULDER_TILT_RANGE
}
fn default_hip_rotation() -> AngleRange {
    HIP_ROTATION_RANGE
}
fn default_min_hip_separation() -> f64 {
    MIN_SIDE_VIEW_HIP_SEPARATION
}

impl Default for MechanicsThresholds {
    fn default() -> Self {
        Self {
            visibility_threshold: VISIBILITY_THRESHOLD,
            flag_confidence_threshold: FLAG_CONFIDENCE_THRESHOLD,
            elbow_slot: ELBOW_SLOT_RANGE,
            shoulder_tilt: SHOULDER_TILT_RANGE,
            hip_rotation: HIP_ROTATION_RANGE,
            min_side_view_hip_separation: MIN_SIDE_VIEW_HIP_SEPARATION,
        }
    }
}

impl MechanicsThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, v) in [
            ("visibility_threshold", self.visibility_threshold),
            ("flag_confidence_threshold", self.flag_confidence_threshold),
            ("min_side_view_hip_separation", self.min_side_view_hip_separation),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::Invalid(format!("{} must be within [0, 1], got {}", name, v)));
            }
        }
        for (name, r) in [
            ("elbow_slot", self.elbow_slot),
            ("shoulder_tilt", self.shoulder_tilt),
            ("hip_rotation", self.hip_rotation),
        ] {
            if r.min > r.max {
                return Err(ConfigError::Invalid(format!(
                    "{} range is inverted ({} > {})",
                    name, r.min, r.max
                )));
            }
        }
        Ok(())
    }
}

// ─── Overlay ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Max distance between playback time and a sample for it to be drawn.
    #[serde(default = "default_snap_window_ms")]
    pub snap_window_ms: u64,
    #[serde(default = "default_joint_radius")]
    pub joint_radius_px: f64,
    #[serde(default = "default_line_width")]
    pub line_width_px: f64,
    #[serde(default = "default_upper_color")]
    pub upper_color: String,
    #[serde(default = "default_lower_color")]
    pub lower_color: String,
    #[serde(default = "default_flagged_color")]
    pub flagged_color: String,
    #[serde(default = "default_joint_color")]
    pub joint_color: String,
}

fn default_snap_window_ms() -> u64 {
    300
}
fn default_joint_radius() -> f64 {
    5.0
}
fn default_line_width() -> f64 {
    3.0
}
fn default_upper_color() -> String {
    "#10B981".to_string()
}
fn default_lower_color() -> String {
    "#3B82F6".to_string()
}
fn default_flagged_color() -> String {
    "#EF4444".to_string()
}
fn default_joint_color() -> String {
    "#FFFFFF".to_string()
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            snap_window_ms: default_snap_window_ms(),
            joint_radius_px: default_joint_radius(),
            line_width_px: default_line_width(),
            upper_color: default_upper_color(),
            lower_color: default_lower_color(),
            flagged_color: default_flagged_color(),
            joint_color: default_joint_color(),
        }
    }
}

// ─── Detector ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_model_path")]
    pub model_path: String,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
    /// Pose presence score below which a frame counts as "no pose".
    #[serde(default = "default_min_pose_presence")]
    pub min_pose_presence: f32,
    /// Pending requests buffered by the detector worker.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_model_path() -> String {
    "models/pose_landmark_full.onnx".to_string()
}
fn default_input_size() -> u32 {
    256
}
fn default_intra_threads() -> usize {
    2
}
fn default_min_pose_presence() -> f32 {
    0.5
}
fn default_queue_capacity() -> usize {
    4
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            input_size: default_input_size(),
            intra_threads: default_intra_threads(),
            min_pose_presence: default_min_pose_presence(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

// ─── Database ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "swingcheck.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Load configuration from swingcheck.toml + environment variable overrides.
///
/// Search order:
///   1. ./swingcheck.{toml,yaml,json} (working directory)
///   2. Environment variables: SWINGCHECK__SAMPLING__SAMPLE_FPS, etc.
pub fn load_config() -> Result<AnalysisConfig, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name("swingcheck").required(false))
        .add_source(
            config::Environment::with_prefix("SWINGCHECK")
                .separator("__")
                .try_parsing(true),
        );

    let settings = builder.build()?;
    let cfg = settings.try_deserialize::<AnalysisConfig>()?;
    cfg.thresholds.validate()?;
    Ok(cfg)
}
