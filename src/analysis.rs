//! Analysis data model shared by the orchestrator, the store and the
//! review surfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::landmarks::Landmark;

/// Session status. `Complete`, `LowConfidence` and `Error` are terminal
/// until a manual re-analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Analyzing,
    Complete,
    Error,
    LowConfidence,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Analyzing => "analyzing",
            AnalysisStatus::Complete => "complete",
            AnalysisStatus::Error => "error",
            AnalysisStatus::LowConfidence => "low_confidence",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisStatus::Complete | AnalysisStatus::Error | AnalysisStatus::LowConfidence
        )
    }

    /// Allowed lifecycle edges.
    ///
    /// `pending → analyzing → {complete | low_confidence | error}`, and every
    /// terminal state back to `pending` for re-analysis. `analyzing → pending`
    /// covers a cancelled run handing the session back.
    pub fn can_transition_to(&self, next: AnalysisStatus) -> bool {
        use AnalysisStatus::*;
        match (self, next) {
            (Pending, Analyzing) => true,
            (Analyzing, Complete | LowConfidence | Error | Pending) => true,
            (Complete | LowConfidence | Error, Pending) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AnalysisStatus::Pending),
            "analyzing" => Ok(AnalysisStatus::Analyzing),
            "complete" => Ok(AnalysisStatus::Complete),
            "error" => Ok(AnalysisStatus::Error),
            "low_confidence" => Ok(AnalysisStatus::LowConfidence),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// One mechanics issue raised on one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MechanicsFlag {
    pub issue: String,
    /// Mean visibility of the landmarks that evaluated the rule.
    pub confidence: f64,
    pub severity: Severity,
    pub joint_indices: Vec<usize>,
}

/// Mechanics angles for one frame; `None` when the contributing landmarks
/// were not visible enough.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameAngles {
    pub elbow_slot_deg: Option<f64>,
    pub shoulder_tilt_deg: Option<f64>,
    pub hip_rotation_deg: Option<f64>,
}

/// One analysed sample of the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSample {
    pub frame_index: u32,
    pub timestamp_ms: u64,
    pub landmarks: Vec<Landmark>,
    pub angles: FrameAngles,
    pub flags: Vec<MechanicsFlag>,
    /// Estimated ball-contact sample (peak hip rotation).
    #[serde(default)]
    pub is_contact: bool,
}

impl FrameSample {
    pub fn is_flagged(&self) -> bool {
        !self.flags.is_empty()
    }

    pub fn has_error(&self) -> bool {
        self.flags.iter().any(|f| f.severity == Severity::Error)
    }

    /// Joint indices referenced by any flag on this sample.
    pub fn flagged_joints(&self) -> std::collections::HashSet<usize> {
        self.flags
            .iter()
            .flat_map(|f| f.joint_indices.iter().copied())
            .collect()
    }
}

/// Timestamp of sample `frame_index` at `sample_fps`.
pub fn sample_timestamp_ms(frame_index: u32, sample_fps: f64) -> u64 {
    (frame_index as f64 * (1000.0 / sample_fps)).round() as u64
}

/// Durable per-video session row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub video_id: String,
    pub status: AnalysisStatus,
    pub progress_pct: u8,
    pub frame_count: Option<u32>,
    pub error_message: Option<String>,
    pub framing_warning: Option<String>,
    pub analyzed_at: Option<DateTime<Utc>>,
    /// Run currently owning the row, if any.
    pub active_run: Option<uuid::Uuid>,
    pub updated_at: DateTime<Utc>,
}
