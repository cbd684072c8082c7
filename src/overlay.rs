//! Skeleton overlay: where the video actually renders inside a display
//! surface, and what to draw there for one analysed sample.
//!
//! The video is assumed to be fitted with aspect-preserving containment, so
//! normalised landmarks are projected through the content rectangle rather
//! than the whole surface.

use serde::Serialize;
use std::collections::HashSet;

use crate::analysis::FrameSample;
use crate::config::{AnalysisConfig, OverlayConfig};
use crate::landmarks::{zone_of_bone, BodyZone, Landmark, POSE_CONNECTIONS};
use crate::timeline::find_nearest_frame;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl RenderRect {
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.w / 2.0,
            y: self.y + self.h / 2.0,
        }
    }

    /// Map a normalised landmark to surface pixels.
    pub fn project(&self, lm: &Landmark) -> Point {
        Point {
            x: self.x + lm.x * self.w,
            y: self.y + lm.y * self.h,
        }
    }
}

/// Content rectangle of a `video` fitted into `surface`.
///
/// A video relatively wider than the surface spans its full width with bars
/// above and below; otherwise it spans the full height with bars left and
/// right. Unknown video dimensions (0) give the whole surface.
pub fn compute_video_render_rect(video: (u32, u32), surface: (u32, u32)) -> RenderRect {
    let (sw, sh) = (surface.0 as f64, surface.1 as f64);
    let full = RenderRect {
        x: 0.0,
        y: 0.0,
        w: sw,
        h: sh,
    };
    if video.0 == 0 || video.1 == 0 || surface.0 == 0 || surface.1 == 0 {
        return full;
    }

    let video_aspect = video.0 as f64 / video.1 as f64;
    let surface_aspect = sw / sh;
    if video_aspect > surface_aspect {
        let h = sw / video_aspect;
        RenderRect {
            x: 0.0,
            y: (sh - h) / 2.0,
            w: sw,
            h,
        }
    } else {
        let w = sh * video_aspect;
        RenderRect {
            x: (sw - w) / 2.0,
            y: 0.0,
            w,
            h: sh,
        }
    }
}

// ─── Drawing instructions ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bone {
    pub from: Point,
    pub to: Point,
    pub joints: (usize, usize),
    pub flagged: bool,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointMarker {
    pub index: usize,
    pub center: Point,
    pub radius: f64,
    pub flagged: bool,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkeletonDrawing {
    pub frame_index: Option<u32>,
    pub rect: RenderRect,
    pub line_width: f64,
    pub bones: Vec<Bone>,
    pub joints: Vec<JointMarker>,
}

fn bone_color(flagged: bool, zone: BodyZone, cfg: &OverlayConfig) -> &str {
    match (flagged, zone) {
        (true, _) => &cfg.flagged_color,
        (false, BodyZone::Lower) => &cfg.lower_color,
        (false, BodyZone::Upper) => &cfg.upper_color,
    }
}

/// Bones and joint markers for one pose. Landmarks below
/// `visibility_threshold` are dropped along with every bone touching them.
pub fn build_skeleton(
    landmarks: &[Landmark],
    flagged: &HashSet<usize>,
    rect: RenderRect,
    cfg: &OverlayConfig,
    visibility_threshold: f64,
) -> SkeletonDrawing {
    let visible = |i: usize| {
        landmarks
            .get(i)
            .filter(|lm| lm.is_visible(visibility_threshold))
    };

    let bones = POSE_CONNECTIONS
        .iter()
        .filter_map(|&(a, b)| {
            let (la, lb) = (visible(a)?, visible(b)?);
            let is_flagged = flagged.contains(&a) || flagged.contains(&b);
            Some(Bone {
                from: rect.project(la),
                to: rect.project(lb),
                joints: (a, b),
                flagged: is_flagged,
                color: bone_color(is_flagged, zone_of_bone(a, b), cfg).to_string(),
            })
        })
        .collect();

    let joints = landmarks
        .iter()
        .enumerate()
        .filter(|(_, lm)| lm.is_visible(visibility_threshold))
        .map(|(i, lm)| {
            let is_flagged = flagged.contains(&i);
            JointMarker {
                index: i,
                center: rect.project(lm),
                radius: cfg.joint_radius_px,
                flagged: is_flagged,
                color: if is_flagged {
                    cfg.flagged_color.clone()
                } else {
                    cfg.joint_color.clone()
                },
            }
        })
        .collect();

    SkeletonDrawing {
        frame_index: None,
        rect,
        line_width: cfg.line_width_px,
        bones,
        joints,
    }
}

/// Overlay for playback time `time_ms`, snapped to the nearest sample.
pub fn overlay_at(
    samples: &[FrameSample],
    time_ms: u64,
    video: (u32, u32),
    surface: (u32, u32),
    cfg: &AnalysisConfig,
) -> Option<SkeletonDrawing> {
    let sample = find_nearest_frame(samples, time_ms, cfg.overlay.snap_window_ms)?;
    if sample.landmarks.is_empty() {
        return None;
    }
    let rect = compute_video_render_rect(video, surface);
    let mut drawing = build_skeleton(
        &sample.landmarks,
        &sample.flagged_joints(),
        rect,
        &cfg.overlay,
        cfg.thresholds.visibility_threshold,
    );
    drawing.frame_index = Some(sample.frame_index);
    Some(drawing)
}
