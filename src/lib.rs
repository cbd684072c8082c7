//! Swingcheck: pose-based swing mechanics analysis.
//!
//! Samples a video at a fixed rate, runs a pose detector on each sample,
//! derives joint angles, flags mechanics issues against configurable
//! thresholds, persists the result per video and projects the skeleton back
//! onto the video for review.

pub mod analysis;
pub mod angles;
pub mod config;
pub mod detector;
pub mod error;
pub mod flags;
pub mod landmarks;
pub mod logging;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod orchestrator;
pub mod overlay;
pub mod replay;
pub mod session;
pub mod store;
pub mod summary;
pub mod timeline;
pub mod video;

pub use analysis::{AnalysisStatus, FrameAngles, FrameSample, MechanicsFlag, Severity};
pub use config::AnalysisConfig;
pub use detector::{DetectorWorker, PoseBackend, PoseDetector};
pub use landmarks::{Handedness, Landmark};
pub use orchestrator::{Analyzer, LiveProgress, RunEnd, RunOutcome};
pub use session::{decide_resume, AnalysisSession, ResumeAction};
pub use store::{SessionStore, SqliteStore};
pub use video::{RasterFrame, VideoSource};
