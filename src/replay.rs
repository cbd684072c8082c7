//! Replay backend: serves landmarks recorded earlier (by another detector or
//! by hand) instead of running a model. Poses are matched to raster frames
//! by timestamp.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use crate::detector::PoseBackend;
use crate::error::DetectorError;
use crate::landmarks::Landmark;
use crate::video::RasterFrame;

/// Default tolerance when matching a frame time to a recorded pose.
pub const DEFAULT_MATCH_TOLERANCE_MS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedPose {
    pub timestamp_ms: u64,
    pub landmarks: Vec<Landmark>,
}

enum Source {
    File(PathBuf),
    Poses(Vec<RecordedPose>),
}

pub struct ReplayBackend {
    source: Source,
    poses: Vec<RecordedPose>,
    tolerance_ms: u64,
}

impl ReplayBackend {
    /// Read a JSON array of [`RecordedPose`] when the worker initializes.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::File(path.into()),
            poses: Vec::new(),
            tolerance_ms: DEFAULT_MATCH_TOLERANCE_MS,
        }
    }

    pub fn from_poses(poses: Vec<RecordedPose>) -> Self {
        Self {
            source: Source::Poses(poses),
            poses: Vec::new(),
            tolerance_ms: DEFAULT_MATCH_TOLERANCE_MS,
        }
    }

    pub fn with_tolerance_ms(mut self, tolerance_ms: u64) -> Self {
        self.tolerance_ms = tolerance_ms;
        self
    }

    fn lookup(&self, timestamp_ms: u64) -> Option<&RecordedPose> {
        self.poses
            .iter()
            .map(|p| (p, p.timestamp_ms.abs_diff(timestamp_ms)))
            .filter(|(_, d)| *d <= self.tolerance_ms)
            .min_by_key(|(_, d)| *d)
            .map(|(p, _)| p)
    }
}

impl PoseBackend for ReplayBackend {
    fn load(&mut self) -> Result<(), DetectorError> {
        let mut poses = match &mut self.source {
            Source::File(path) => {
                let raw = std::fs::read_to_string(&*path).map_err(|e| {
                    DetectorError::Initialization(format!("{}: {}", path.display(), e))
                })?;
                serde_json::from_str::<Vec<RecordedPose>>(&raw).map_err(|e| {
                    DetectorError::Initialization(format!("{}: {}", path.display(), e))
                })?
            }
            Source::Poses(poses) => std::mem::take(poses),
        };
        poses.sort_by_key(|p| p.timestamp_ms);
        debug!("Replay backend loaded {} recorded poses", poses.len());
        self.poses = poses;
        Ok(())
    }

    fn estimate(&mut self, frame: &RasterFrame) -> Result<Option<Vec<Landmark>>, DetectorError> {
        Ok(self
            .lookup(frame.timestamp_ms)
            .filter(|p| !p.landmarks.is_empty())
            .map(|p| p.landmarks.clone()))
    }

    fn close(&mut self) {
        self.poses.clear();
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}
