//! Session summary: issue tallies and per-angle in-range statistics.

use serde::Serialize;
use std::collections::HashMap;

use crate::analysis::{FrameSample, Severity};
use crate::config::{AngleRange, MechanicsThresholds};

/// In-range share at or above which an angle is reported as "looking good".
pub const LOOKING_GOOD_PCT: u8 = 60;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueTally {
    pub issue: String,
    pub count: usize,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AngleStat {
    pub label: &'static str,
    /// Share of measured samples whose |angle| lies in the ideal range, 0..100.
    pub in_range_pct: u8,
    pub measured: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub total_frames: usize,
    pub flagged_frames: usize,
    pub issues: Vec<IssueTally>,
    pub angle_stats: Vec<AngleStat>,
    pub looking_good: Vec<&'static str>,
}

impl SessionSummary {
    /// Nothing to praise or criticise: angles were mostly unmeasurable.
    pub fn is_inconclusive(&self) -> bool {
        self.total_frames > 0 && self.issues.is_empty() && self.looking_good.is_empty()
    }
}

fn issue_tallies(samples: &[FrameSample]) -> Vec<IssueTally> {
    let mut order: Vec<String> = Vec::new();
    let mut map: HashMap<String, IssueTally> = HashMap::new();
    for flag in samples.iter().flat_map(|s| &s.flags) {
        match map.get_mut(&flag.issue) {
            Some(t) => t.count += 1,
            None => {
                order.push(flag.issue.clone());
                map.insert(
                    flag.issue.clone(),
                    IssueTally {
                        issue: flag.issue.clone(),
                        count: 1,
                        severity: flag.severity,
                    },
                );
            }
        }
    }
    let mut out: Vec<IssueTally> = order.into_iter().filter_map(|k| map.remove(&k)).collect();
    // stable: equal counts keep first-seen order
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}

fn angle_stat(
    samples: &[FrameSample],
    label: &'static str,
    range: AngleRange,
    get: impl Fn(&FrameSample) -> Option<f64>,
) -> Option<AngleStat> {
    let measured: Vec<f64> = samples.iter().filter_map(get).collect();
    if measured.is_empty() {
        return None;
    }
    let in_range = measured.iter().filter(|v| range.contains(v.abs())).count();
    Some(AngleStat {
        label,
        in_range_pct: ((in_range as f64 / measured.len() as f64) * 100.0).round() as u8,
        measured: measured.len(),
    })
}

pub fn summarize(samples: &[FrameSample], t: &MechanicsThresholds) -> SessionSummary {
    let angle_stats: Vec<AngleStat> = [
        angle_stat(samples, "Hip Rotation", t.hip_rotation, |f| f.angles.hip_rotation_deg),
        angle_stat(samples, "Elbow Slot", t.elbow_slot, |f| f.angles.elbow_slot_deg),
        angle_stat(samples, "Shoulder Tilt", t.shoulder_tilt, |f| f.angles.shoulder_tilt_deg),
    ]
    .into_iter()
    .flatten()
    .collect();

    let looking_good = angle_stats
        .iter()
        .filter(|s| s.in_range_pct >= LOOKING_GOOD_PCT)
        .map(|s| s.label)
        .collect();

    SessionSummary {
        total_frames: samples.len(),
        flagged_frames: samples.iter().filter(|s| s.is_flagged()).count(),
        issues: issue_tallies(samples),
        angle_stats,
        looking_good,
    }
}
