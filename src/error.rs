//! Error taxonomy.
//!
//! Per-frame faults (`DetectorError::Detection`, `VideoError`) are skipped by
//! the orchestrator; run-level faults end up as a session status plus message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    /// Model assets missing, unsupported acceleration, bad model file.
    #[error("pose detector initialization failed: {0}")]
    Initialization(String),

    /// Inference failed for a single frame.
    #[error("pose detection failed: {0}")]
    Detection(String),

    #[error("pose detector used before initialize()")]
    NotInitialized,

    /// The worker thread exited or dropped the reply.
    #[error("pose detector worker is no longer running")]
    WorkerGone,
}

impl DetectorError {
    /// The detector cannot serve any further frame in this run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotInitialized | Self::WorkerGone)
    }
}

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("seek to {at_secs:.3}s failed: {reason}")]
    Seek { at_secs: f64, reason: String },

    #[error("frame rasterization failed: {0}")]
    Rasterize(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Another run claimed the session after this one started.
    #[error("analysis run for video {video_id} was superseded by a newer run")]
    StaleRun { video_id: String },

    #[error("unknown analysis status '{0}' in store")]
    UnknownStatus(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("an analysis is already running for this video")]
    AlreadyAnalyzing,

    #[error("invalid status transition {from} → {to}")]
    InvalidTransition {
        from: crate::analysis::AnalysisStatus,
        to: crate::analysis::AnalysisStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
