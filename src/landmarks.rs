//! Body landmarks: the 33-point pose topology produced by the detector.
//!
//! Coordinates are normalised to the analysed frame (0..1 on both axes,
//! origin top-left). Indices are fixed anatomical identities.

use serde::{Deserialize, Serialize};

/// Number of landmarks in one detected pose.
pub const POSE_LANDMARK_COUNT: usize = 33;

/// One normalised 2.5-D body keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    pub visibility: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64, visibility: f64) -> Self {
        Self { x, y, z, visibility }
    }

    pub fn is_visible(&self, threshold: f64) -> bool {
        self.visibility >= threshold
    }
}

// ─── Anatomical indices ──────────────────────────────────────────────────────

pub const NOSE: usize = 0;
pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;
pub const LEFT_ELBOW: usize = 13;
pub const RIGHT_ELBOW: usize = 14;
pub const LEFT_WRIST: usize = 15;
pub const RIGHT_WRIST: usize = 16;
pub const LEFT_HIP: usize = 23;
pub const RIGHT_HIP: usize = 24;
pub const LEFT_KNEE: usize = 25;
pub const RIGHT_KNEE: usize = 26;
pub const LEFT_ANKLE: usize = 27;
pub const RIGHT_ANKLE: usize = 28;

/// Which arm drives the elbow-slot measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    #[default]
    Right,
    Left,
}

impl Handedness {
    /// (shoulder, elbow, wrist) indices for this side.
    pub fn arm_indices(self) -> [usize; 3] {
        match self {
            Handedness::Right => [RIGHT_SHOULDER, RIGHT_ELBOW, RIGHT_WRIST],
            Handedness::Left => [LEFT_SHOULDER, LEFT_ELBOW, LEFT_WRIST],
        }
    }

    pub fn elbow_index(self) -> usize {
        self.arm_indices()[1]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Handedness::Right => "right",
            Handedness::Left => "left",
        }
    }
}

// ─── Skeleton topology ───────────────────────────────────────────────────────

/// The 35 standard bone connections of the 33-point pose.
pub const POSE_CONNECTIONS: [(usize, usize); 35] = [
    (0, 1), (1, 2), (2, 3), (3, 7), (0, 4), (4, 5), (5, 6), (6, 8),
    (9, 10), (11, 12), (11, 13), (13, 15), (15, 17), (15, 19), (15, 21),
    (17, 19), (12, 14), (14, 16), (16, 18), (16, 20), (16, 22), (18, 20),
    (11, 23), (12, 24), (23, 24), (23, 25), (25, 27), (27, 29), (29, 31),
    (27, 31), (24, 26), (26, 28), (28, 30), (30, 32), (28, 32),
];

/// Body zone used to colour bones on the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyZone {
    Upper,
    Lower,
}

/// Indices 23 and up are hips, knees, ankles and feet.
pub fn is_lower_body(index: usize) -> bool {
    (LEFT_HIP..POSE_LANDMARK_COUNT).contains(&index)
}

pub fn zone_of_bone(a: usize, b: usize) -> BodyZone {
    if is_lower_body(a) || is_lower_body(b) {
        BodyZone::Lower
    } else {
        BodyZone::Upper
    }
}

/// Horizontal midpoint of the two hips, when both are present.
///
/// Visibility is not consulted: the early-stop tracker only needs a rough
/// position, even from a partially occluded pose.
pub fn hip_midpoint_x(landmarks: &[Landmark]) -> Option<f64> {
    let left = landmarks.get(LEFT_HIP)?;
    let right = landmarks.get(RIGHT_HIP)?;
    Some((left.x + right.x) / 2.0)
}

/// Mean visibility of the given landmarks; absent landmarks count as 0.
pub fn mean_visibility(landmarks: &[Landmark], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    let total: f64 = indices
        .iter()
        .map(|&i| landmarks.get(i).map(|l| l.visibility).unwrap_or(0.0))
        .sum();
    total / indices.len() as f64
}
