//! Joint angle geometry.
//!
//! Pure functions over one frame's landmarks. Every function either returns
//! a finite angle in degrees or `None` when a contributing landmark is absent
//! or below the visibility threshold.

use crate::analysis::FrameAngles;
use crate::landmarks::{Handedness, Landmark, LEFT_HIP, LEFT_SHOULDER, RIGHT_HIP, RIGHT_SHOULDER};

/// Angle (degrees, 0..=180) at vertex `b` of the triplet `a-b-c`.
///
/// Returns 0 when either arm has zero length.
pub fn angle_between_three_points(a: &Landmark, b: &Landmark, c: &Landmark) -> f64 {
    let (bax, bay) = (a.x - b.x, a.y - b.y);
    let (bcx, bcy) = (c.x - b.x, c.y - b.y);

    let dot = bax * bcx + bay * bcy;
    let mag_ba = bax.hypot(bay);
    let mag_bc = bcx.hypot(bcy);

    if mag_ba == 0.0 || mag_bc == 0.0 {
        return 0.0;
    }

    // acos domain guard: rounding can push the ratio just past ±1
    let cos_theta = (dot / (mag_ba * mag_bc)).clamp(-1.0, 1.0);
    let deg = cos_theta.acos().to_degrees();
    if deg.is_finite() {
        deg
    } else {
        0.0
    }
}

fn visible<'a>(landmarks: &'a [Landmark], index: usize, threshold: f64) -> Option<&'a Landmark> {
    landmarks.get(index).filter(|l| l.is_visible(threshold))
}

/// Signed tilt of the `left → right` line from horizontal, in degrees.
fn line_tilt(
    landmarks: &[Landmark],
    left: usize,
    right: usize,
    threshold: f64,
) -> Option<f64> {
    let l = visible(landmarks, left, threshold)?;
    let r = visible(landmarks, right, threshold)?;
    let deg = (r.y - l.y).atan2(r.x - l.x).to_degrees();
    deg.is_finite().then_some(deg)
}

/// Elbow slot: angle at the elbow of the hitting arm (shoulder → elbow → wrist).
pub fn compute_elbow_slot(
    landmarks: &[Landmark],
    handedness: Handedness,
    threshold: f64,
) -> Option<f64> {
    let [s, e, w] = handedness.arm_indices();
    let shoulder = visible(landmarks, s, threshold)?;
    let elbow = visible(landmarks, e, threshold)?;
    let wrist = visible(landmarks, w, threshold)?;
    Some(angle_between_three_points(shoulder, elbow, wrist))
}

/// Shoulder line from horizontal. Positive = right side leading.
pub fn compute_shoulder_tilt(landmarks: &[Landmark], threshold: f64) -> Option<f64> {
    line_tilt(landmarks, LEFT_SHOULDER, RIGHT_SHOULDER, threshold)
}

/// Hip line from horizontal, same convention as shoulder tilt.
pub fn compute_hip_rotation(landmarks: &[Landmark], threshold: f64) -> Option<f64> {
    line_tilt(landmarks, LEFT_HIP, RIGHT_HIP, threshold)
}

/// All three mechanics angles for one frame.
pub fn compute_frame_angles(
    landmarks: &[Landmark],
    handedness: Handedness,
    threshold: f64,
) -> FrameAngles {
    FrameAngles {
        elbow_slot_deg: compute_elbow_slot(landmarks, handedness, threshold),
        shoulder_tilt_deg: compute_shoulder_tilt(landmarks, threshold),
        hip_rotation_deg: compute_hip_rotation(landmarks, threshold),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{POSE_LANDMARK_COUNT, RIGHT_ELBOW, RIGHT_WRIST};

    const VIS: f64 = 0.65;

    fn lm(x: f64, y: f64) -> Landmark {
        Landmark::new(x, y, 0.0, 1.0)
    }

    fn pose() -> Vec<Landmark> {
        vec![lm(0.5, 0.5); POSE_LANDMARK_COUNT]
    }

    #[test]
    fn test_right_angle() {
        let deg = angle_between_three_points(&lm(0.0, 1.0), &lm(0.0, 0.0), &lm(1.0, 0.0));
        assert!((deg - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_straight_and_folded() {
        let straight = angle_between_three_points(&lm(0.0, 0.0), &lm(0.5, 0.0), &lm(1.0, 0.0));
        assert!((straight - 180.0).abs() < 1e-9);
        let folded = angle_between_three_points(&lm(1.0, 0.0), &lm(0.0, 0.0), &lm(2.0, 0.0));
        assert!(folded.abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_points_return_zero() {
        let p = lm(0.3, 0.3);
        assert_eq!(angle_between_three_points(&p, &p, &lm(0.9, 0.1)), 0.0);
        assert_eq!(angle_between_three_points(&lm(0.9, 0.1), &p, &p), 0.0);
        assert_eq!(angle_between_three_points(&p, &p, &p), 0.0);
    }

    #[test]
    fn test_range_over_grid() {
        let b = lm(0.5, 0.5);
        for i in 0..20 {
            for j in 0..20 {
                let a = lm(i as f64 / 19.0, (j * 7 % 20) as f64 / 19.0);
                let c = lm((j * 3 % 20) as f64 / 19.0, i as f64 / 19.0);
                let deg = angle_between_three_points(&a, &b, &c);
                assert!(deg.is_finite());
                assert!((0.0..=180.0).contains(&deg), "{} out of range", deg);
            }
        }
    }

    #[test]
    fn test_elbow_slot_null_below_visibility() {
        let mut lms = pose();
        lms[RIGHT_SHOULDER] = lm(0.4, 0.4);
        lms[RIGHT_ELBOW] = lm(0.5, 0.5);
        lms[RIGHT_WRIST] = lm(0.6, 0.4);
        assert!(compute_elbow_slot(&lms, Handedness::Right, VIS).is_some());

        lms[RIGHT_WRIST].visibility = 0.64;
        assert_eq!(compute_elbow_slot(&lms, Handedness::Right, VIS), None);
    }

    #[test]
    fn test_elbow_slot_missing_landmark() {
        let lms = pose();
        assert_eq!(compute_elbow_slot(&lms[..15], Handedness::Right, VIS), None);
        assert_eq!(compute_elbow_slot(&[], Handedness::Left, VIS), None);
    }

    #[test]
    fn test_tilt_sign_convention() {
        let mut lms = pose();
        lms[LEFT_SHOULDER] = lm(0.4, 0.5);
        lms[RIGHT_SHOULDER] = lm(0.6, 0.5);
        assert!(compute_shoulder_tilt(&lms, VIS).unwrap().abs() < 1e-9);

        lms[RIGHT_SHOULDER] = lm(0.6, 0.7);
        let tilt = compute_shoulder_tilt(&lms, VIS).unwrap();
        assert!((tilt - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_hip_rotation_gated() {
        let mut lms = pose();
        lms[LEFT_HIP] = lm(0.5, 0.4);
        lms[RIGHT_HIP] = lm(0.5, 0.6);
        assert!((compute_hip_rotation(&lms, VIS).unwrap() - 90.0).abs() < 1e-9);

        lms[LEFT_HIP].visibility = 0.2;
        assert_eq!(compute_hip_rotation(&lms, VIS), None);
    }

    #[test]
    fn test_frame_angles_all_null_when_invisible() {
        let lms: Vec<Landmark> = pose()
            .into_iter()
            .map(|mut l| {
                l.visibility = 0.1;
                l
            })
            .collect();
        let angles = compute_frame_angles(&lms, Handedness::Right, VIS);
        assert_eq!(angles, FrameAngles::default());
    }
}
