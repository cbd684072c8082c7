//! Timeline helpers over an analysed session: contact-frame estimation,
//! playback-time snapping, flagged-frame navigation and timeline markers.

use serde::Serialize;

use crate::analysis::FrameSample;

/// Mark the sample with the largest |hip rotation| as the contact frame.
///
/// Any previous marking is cleared. Returns the index of the marked sample
/// within `samples`, or `None` when no sample has a hip rotation.
pub fn mark_contact_frame(samples: &mut [FrameSample]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, s) in samples.iter().enumerate() {
        if let Some(hip) = s.angles.hip_rotation_deg {
            let mag = hip.abs();
            if best.map_or(true, |(_, m)| mag > m) {
                best = Some((i, mag));
            }
        }
    }

    for s in samples.iter_mut() {
        s.is_contact = false;
    }
    let (idx, _) = best?;
    samples[idx].is_contact = true;
    Some(idx)
}

/// Nearest sample to `time_ms`, if it lies within `window_ms`.
pub fn find_nearest_frame(
    samples: &[FrameSample],
    time_ms: u64,
    window_ms: u64,
) -> Option<&FrameSample> {
    let mut nearest: Option<(&FrameSample, u64)> = None;
    for s in samples {
        let diff = s.timestamp_ms.abs_diff(time_ms);
        if nearest.map_or(true, |(_, d)| diff < d) {
            nearest = Some((s, diff));
        }
    }
    nearest.filter(|(_, d)| *d <= window_ms).map(|(s, _)| s)
}

// ─── Flag navigation ─────────────────────────────────────────────────────────

/// Steps through flagged samples in timestamp order.
#[derive(Debug, Clone)]
pub struct FlagNavigator {
    flagged: Vec<(u32, u64)>,
    cursor: usize,
}

impl FlagNavigator {
    pub fn new(samples: &[FrameSample]) -> Self {
        let mut flagged: Vec<(u32, u64)> = samples
            .iter()
            .filter(|s| s.is_flagged())
            .map(|s| (s.frame_index, s.timestamp_ms))
            .collect();
        flagged.sort_by_key(|&(_, ts)| ts);
        Self { flagged, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.flagged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flagged.is_empty()
    }

    pub fn has_prev(&self) -> bool {
        self.cursor > 0
    }

    pub fn has_next(&self) -> bool {
        self.cursor + 1 < self.flagged.len()
    }

    /// Move forward, clamped to the last flagged sample. Returns the seek time in ms.
    pub fn next(&mut self) -> Option<u64> {
        if self.flagged.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1).min(self.flagged.len() - 1);
        Some(self.flagged[self.cursor].1)
    }

    /// Move back, clamped to the first flagged sample.
    pub fn prev(&mut self) -> Option<u64> {
        if self.flagged.is_empty() {
            return None;
        }
        self.cursor = self.cursor.saturating_sub(1);
        Some(self.flagged[self.cursor].1)
    }

    /// Position of the flagged sample within `window_ms` of `time_ms`.
    pub fn current_flag_index(&self, time_ms: u64, window_ms: u64) -> Option<usize> {
        self.flagged
            .iter()
            .position(|&(_, ts)| ts.abs_diff(time_ms) <= window_ms)
    }
}

// ─── Timeline markers ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineMarker {
    pub frame_index: u32,
    /// Horizontal position along the timeline, 0..100.
    pub position_pct: f64,
    pub has_error: bool,
    pub seek_secs: f64,
    pub title: String,
}

/// One marker per flagged sample. Empty when the duration is unknown.
pub fn timeline_markers(samples: &[FrameSample], duration_secs: f64) -> Vec<TimelineMarker> {
    if samples.is_empty() || duration_secs <= 0.0 {
        return Vec::new();
    }
    samples
        .iter()
        .filter(|s| s.is_flagged())
        .map(|s| {
            let seek_secs = s.timestamp_ms as f64 / 1000.0;
            TimelineMarker {
                frame_index: s.frame_index,
                position_pct: seek_secs / duration_secs * 100.0,
                has_error: s.has_error(),
                seek_secs,
                title: s
                    .flags
                    .iter()
                    .map(|f| format!("{} ({:.0}%)", f.issue, f.confidence * 100.0))
                    .collect::<Vec<_>>()
                    .join(", "),
            }
        })
        .collect()
}

pub fn playhead_pct(current_secs: f64, duration_secs: f64) -> f64 {
    if duration_secs <= 0.0 {
        return 0.0;
    }
    (current_secs / duration_secs * 100.0).clamp(0.0, 100.0)
}
