//! Rule-based mechanics flagging.
//!
//! Each rule compares one angle against its ideal range and is gated on the
//! mean visibility of the body region it depends on: arm rules on
//! shoulder/elbow/wrist, the hip rule on both hips. A flag is only ever
//! created at or above the confidence threshold.

use crate::analysis::{FrameAngles, MechanicsFlag, Severity};
use crate::config::MechanicsThresholds;
use crate::landmarks::{
    mean_visibility, Handedness, Landmark, LEFT_HIP, LEFT_SHOULDER, RIGHT_HIP, RIGHT_SHOULDER,
};

pub const ELBOW_DROP: &str = "Elbow Drop";
pub const ELBOW_TOO_HIGH: &str = "Elbow Too High";
pub const EXCESSIVE_SHOULDER_TILT: &str = "Excessive Shoulder Tilt";
pub const EARLY_HIP_ROTATION: &str = "Early Hip Rotation";

pub const FRAMING_WARNING: &str = "Suboptimal framing: athlete appears to be facing the camera \
rather than side-on. Side view is required for accurate elbow slot and hip rotation analysis.";

fn flag(issue: &str, confidence: f64, severity: Severity, joints: Vec<usize>) -> MechanicsFlag {
    MechanicsFlag {
        issue: issue.to_string(),
        confidence,
        severity,
        joint_indices: joints,
    }
}

/// Evaluate all rules for one frame. A frame may carry zero to many flags.
pub fn flag_mechanics(
    angles: &FrameAngles,
    landmarks: &[Landmark],
    handedness: Handedness,
    t: &MechanicsThresholds,
) -> Vec<MechanicsFlag> {
    let mut flags = Vec::new();

    let arm_conf = mean_visibility(landmarks, &handedness.arm_indices());
    let hip_conf = mean_visibility(landmarks, &[LEFT_HIP, RIGHT_HIP]);
    let arm_ok = arm_conf >= t.flag_confidence_threshold;
    let hip_ok = hip_conf >= t.flag_confidence_threshold;

    if let (Some(elbow), true) = (angles.elbow_slot_deg, arm_ok) {
        let joints = vec![handedness.elbow_index()];
        if elbow < t.elbow_slot.min {
            flags.push(flag(ELBOW_DROP, arm_conf, Severity::Warning, joints.clone()));
        }
        if elbow > t.elbow_slot.max {
            flags.push(flag(ELBOW_TOO_HIGH, arm_conf, Severity::Warning, joints));
        }
    }

    if let (Some(tilt), true) = (angles.shoulder_tilt_deg, arm_ok) {
        if tilt.abs() > t.shoulder_tilt.max {
            flags.push(flag(
                EXCESSIVE_SHOULDER_TILT,
                arm_conf,
                Severity::Warning,
                vec![LEFT_SHOULDER, RIGHT_SHOULDER],
            ));
        }
    }

    if let (Some(hip), true) = (angles.hip_rotation_deg, hip_ok) {
        if hip < t.hip_rotation.min {
            flags.push(flag(
                EARLY_HIP_ROTATION,
                hip_conf,
                Severity::Error,
                vec![LEFT_HIP, RIGHT_HIP],
            ));
        }
    }

    flags
}

/// Side-view heuristic, run once per session on the first valid frame.
///
/// Returns a warning when both hips are visible and closer together
/// horizontally than the configured separation.
pub fn check_framing_quality(landmarks: &[Landmark], t: &MechanicsThresholds) -> Option<String> {
    let l = landmarks.get(LEFT_HIP)?;
    let r = landmarks.get(RIGHT_HIP)?;
    if !l.is_visible(t.visibility_threshold) || !r.is_visible(t.visibility_threshold) {
        return None;
    }

    if (r.x - l.x).abs() < t.min_side_view_hip_separation {
        Some(FRAMING_WARNING.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{POSE_LANDMARK_COUNT, RIGHT_ELBOW};

    fn pose(vis: f64) -> Vec<Landmark> {
        vec![Landmark::new(0.5, 0.5, 0.0, vis); POSE_LANDMARK_COUNT]
    }

    fn angles(elbow: Option<f64>, tilt: Option<f64>, hip: Option<f64>) -> FrameAngles {
        FrameAngles {
            elbow_slot_deg: elbow,
            shoulder_tilt_deg: tilt,
            hip_rotation_deg: hip,
        }
    }

    fn run(a: FrameAngles, lms: &[Landmark]) -> Vec<MechanicsFlag> {
        flag_mechanics(&a, lms, Handedness::Right, &MechanicsThresholds::default())
    }

    #[test]
    fn test_elbow_drop_exactly_one_flag() {
        let flags = run(angles(Some(60.0), None, None), &pose(0.9));
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].issue, ELBOW_DROP);
        assert!((flags[0].confidence - 0.9).abs() < 1e-9);
        assert_eq!(flags[0].severity, Severity::Warning);
        assert_eq!(flags[0].joint_indices, vec![RIGHT_ELBOW]);
    }

    #[test]
    fn test_in_range_angles_produce_no_flags() {
        let flags = run(angles(Some(90.0), Some(-10.0), Some(90.0)), &pose(0.95));
        assert!(flags.is_empty());
    }

    #[test]
    fn test_low_confidence_suppresses_flags() {
        // 0.69 < 0.70 on every region
        let flags = run(angles(Some(30.0), Some(45.0), Some(10.0)), &pose(0.69));
        assert!(flags.is_empty());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut t = MechanicsThresholds::default();
        t.flag_confidence_threshold = 0.75;
        let flags = flag_mechanics(&angles(Some(150.0), None, None), &pose(0.75), Handedness::Right, &t);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].issue, ELBOW_TOO_HIGH);
    }

    #[test]
    fn test_independent_confidence_pools() {
        let mut lms = pose(0.9);
        lms[LEFT_HIP].visibility = 0.3;
        lms[RIGHT_HIP].visibility = 0.3;
        let flags = run(angles(None, Some(-30.0), Some(40.0)), &lms);
        // hip pool too weak, arm pool fine
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].issue, EXCESSIVE_SHOULDER_TILT);
        assert_eq!(flags[0].joint_indices, vec![LEFT_SHOULDER, RIGHT_SHOULDER]);
    }

    #[test]
    fn test_early_hip_rotation_is_error() {
        let mut lms = pose(0.5);
        lms[LEFT_HIP].visibility = 0.8;
        lms[RIGHT_HIP].visibility = 1.0;
        let flags = run(angles(Some(20.0), None, Some(10.0)), &lms);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].issue, EARLY_HIP_ROTATION);
        assert_eq!(flags[0].severity, Severity::Error);
        assert!((flags[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_multiple_flags_on_one_frame() {
        let flags = run(angles(Some(50.0), Some(25.0), Some(60.0)), &pose(0.99));
        let issues: Vec<_> = flags.iter().map(|f| f.issue.as_str()).collect();
        assert_eq!(issues, vec![ELBOW_DROP, EXCESSIVE_SHOULDER_TILT, EARLY_HIP_ROTATION]);
    }

    #[test]
    fn test_custom_thresholds_are_honoured() {
        let mut t = MechanicsThresholds::default();
        t.elbow_slot.min = 50.0;
        let flags = flag_mechanics(&angles(Some(60.0), None, None), &pose(0.9), Handedness::Right, &t);
        assert!(flags.is_empty());
    }

    #[test]
    fn test_framing_facing_camera() {
        let t = MechanicsThresholds::default();
        let mut lms = pose(0.9);
        lms[LEFT_HIP].x = 0.45;
        lms[RIGHT_HIP].x = 0.55;
        assert_eq!(check_framing_quality(&lms, &t).as_deref(), Some(FRAMING_WARNING));

        lms[RIGHT_HIP].x = 0.62;
        assert_eq!(check_framing_quality(&lms, &t), None);
    }

    #[test]
    fn test_framing_needs_visible_hips() {
        let t = MechanicsThresholds::default();
        let mut lms = pose(0.9);
        lms[LEFT_HIP].visibility = 0.5;
        assert_eq!(check_framing_quality(&lms, &t), None);
        assert_eq!(check_framing_quality(&lms[..10], &t), None);
    }
}
