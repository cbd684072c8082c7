/// Frame Sampling Orchestrator
///
/// One cooperative loop per run:
///   seek(i / fps) → rasterize → detector → early-stop check
///     → angles + flags (+ framing check on the first valid frame)
///     → append sample → live progress (sample list every Nth sample)
///
/// Cancellation is polled at the top of every iteration. Cancelling before
/// `run` is called touches nothing; once the run has claimed the session, the
/// claim is released and the prior record restored, so the net change is nil.
/// A lost detector worker fails the run without committing, which keeps the
/// previous run's samples. Any other run ends in exactly one batch write
/// through the store.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::analysis::{sample_timestamp_ms, AnalysisStatus, FrameSample};
use crate::angles::compute_frame_angles;
use crate::config::AnalysisConfig;
use crate::detector::PoseDetector;
use crate::error::StoreError;
use crate::flags::{check_framing_quality, flag_mechanics};
use crate::landmarks::hip_midpoint_x;
use crate::store::{RunTicket, SessionStore};
use crate::timeline::mark_contact_frame;
use crate::video::VideoSource;

/// What observers see while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveProgress {
    pub status: AnalysisStatus,
    pub progress_pct: u8,
    /// Accumulated samples, refreshed in batches.
    pub frames: Vec<FrameSample>,
    pub framing_warning: Option<String>,
}

impl Default for LiveProgress {
    fn default() -> Self {
        Self {
            status: AnalysisStatus::Pending,
            progress_pct: 0,
            frames: Vec::new(),
            framing_warning: None,
        }
    }
}

/// How the sampling loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    Completed,
    /// The subject left the frame at `at_frame`; that frame was not kept.
    StoppedEarly { at_frame: u32 },
    Cancelled,
    /// The run could not start, or the detector worker was lost mid-run.
    Aborted,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub end: RunEnd,
    pub status: AnalysisStatus,
    /// Samples computed by this run. Kept even when persisting them failed.
    pub frames: Vec<FrameSample>,
    pub framing_warning: Option<String>,
    pub error_message: Option<String>,
    pub contact_index: Option<usize>,
}

impl RunOutcome {
    fn failed(end: RunEnd, message: String, frames: Vec<FrameSample>, framing_warning: Option<String>) -> Self {
        Self {
            end,
            status: AnalysisStatus::Error,
            frames,
            framing_warning,
            error_message: Some(message),
            contact_index: None,
        }
    }
}

/// `round((i + 1) / total × 100)`, clamped to 100.
pub fn progress_pct(frame_index: u32, total_frames: u32) -> u8 {
    if total_frames == 0 {
        return 100;
    }
    let pct = ((frame_index as f64 + 1.0) / total_frames as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

pub fn total_frames(duration_secs: f64, sample_fps: f64) -> u32 {
    if !duration_secs.is_finite() || duration_secs <= 0.0 || sample_fps <= 0.0 {
        return 0;
    }
    (duration_secs * sample_fps).floor() as u32
}

// ─── Analyzer ────────────────────────────────────────────────────────────────

pub struct Analyzer {
    cfg: AnalysisConfig,
    store: Arc<dyn SessionStore>,
}

impl Analyzer {
    pub fn new(cfg: AnalysisConfig, store: Arc<dyn SessionStore>) -> Self {
        Self { cfg, store }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.cfg
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Analyse `video` once. Run-level faults come back inside the outcome.
    ///
    /// The detector is consumed: it is initialized here and disposed before
    /// returning, whatever the result.
    pub async fn run<V, D>(
        &self,
        video_id: &str,
        video: &mut V,
        mut detector: D,
        cancel: &watch::Receiver<bool>,
        progress: &watch::Sender<LiveProgress>,
    ) -> RunOutcome
    where
        V: VideoSource,
        D: PoseDetector,
    {
        if *cancel.borrow() {
            detector.dispose().await;
            info!(video_id, "Analysis cancelled before start");
            return self.cancelled_outcome(None, Vec::new());
        }

        let ticket = match self.store.claim_run(video_id) {
            Ok(t) => t,
            Err(e) => {
                detector.dispose().await;
                let msg = format!("Could not start analysis: {}", e);
                error!(video_id, "{}", msg);
                publish_final(progress, AnalysisStatus::Error, Vec::new(), None);
                return RunOutcome::failed(RunEnd::Aborted, msg, Vec::new(), None);
            }
        };
        info!(video_id, run_id = %ticket.run_id, "Analysis run started");
        progress.send_replace(LiveProgress {
            status: AnalysisStatus::Analyzing,
            ..LiveProgress::default()
        });

        if let Err(e) = detector.initialize().await {
            detector.dispose().await;
            let msg = e.to_string();
            warn!(video_id, run_id = %ticket.run_id, "{}", msg);
            if let Err(store_err) = self.store.fail_run(&ticket, &msg) {
                warn!(video_id, "Failed to record detector error: {}", store_err);
            }
            publish_final(progress, AnalysisStatus::Error, Vec::new(), None);
            return RunOutcome::failed(RunEnd::Aborted, msg, Vec::new(), None);
        }

        let sampled = self.sample(video_id, video, &mut detector, cancel, progress).await;
        detector.dispose().await;

        if let Some(msg) = sampled.fault {
            error!(video_id, run_id = %ticket.run_id, frames = sampled.frames.len(), "{}", msg);
            if let Err(e) = self.store.fail_run(&ticket, &msg) {
                warn!(video_id, "Failed to record detector error: {}", e);
            }
            publish_final(
                progress,
                AnalysisStatus::Error,
                sampled.frames.clone(),
                sampled.framing_warning.clone(),
            );
            return RunOutcome::failed(RunEnd::Aborted, msg, sampled.frames, sampled.framing_warning);
        }

        if sampled.end == RunEnd::Cancelled {
            if let Err(e) = self.store.release_run(&ticket) {
                warn!(video_id, "Failed to release cancelled run: {}", e);
            }
            info!(video_id, frames = sampled.frames.len(), "Analysis cancelled");
            let outcome = self.cancelled_outcome(Some(&ticket), sampled.frames);
            progress.send_modify(|p| p.status = outcome.status);
            return outcome;
        }

        self.finish(ticket, sampled, progress)
    }

    async fn sample<V, D>(
        &self,
        video_id: &str,
        video: &mut V,
        detector: &mut D,
        cancel: &watch::Receiver<bool>,
        progress: &watch::Sender<LiveProgress>,
    ) -> Sampled
    where
        V: VideoSource,
        D: PoseDetector,
    {
        let sampling = &self.cfg.sampling;
        let thresholds = &self.cfg.thresholds;
        let fps = sampling.sample_fps;
        let total = total_frames(video.duration_secs(), fps);
        let (width, height) = video
            .native_size()
            .unwrap_or((sampling.fallback_raster_width, sampling.fallback_raster_height));
        let batch = sampling.progress_batch_every.max(1);
        debug!(video_id, total, width, height, "Sampling at {} fps", fps);

        let mut frames: Vec<FrameSample> = Vec::new();
        let mut framing_warning: Option<String> = None;
        let mut framing_checked = false;
        let mut initial_hip_x: Option<f64> = None;
        let mut end = RunEnd::Completed;
        let mut fault: Option<String> = None;

        for i in 0..total {
            if *cancel.borrow() {
                end = RunEnd::Cancelled;
                break;
            }

            let t = i as f64 / fps;
            if let Err(e) = video.seek(t).await {
                debug!(video_id, frame_index = i, "Skipping frame: {}", e);
                continue;
            }
            let raster = match video.rasterize(width, height).await {
                Ok(r) => r,
                Err(e) => {
                    debug!(video_id, frame_index = i, "Skipping frame: {}", e);
                    continue;
                }
            };
            let landmarks = match detector.detect(raster).await {
                Ok(Some(lms)) if !lms.is_empty() => lms,
                Ok(_) => continue,
                Err(e) if e.is_fatal() => {
                    fault = Some(format!("Analysis stopped at frame {}: {}", i, e));
                    end = RunEnd::Aborted;
                    break;
                }
                Err(e) => {
                    debug!(video_id, frame_index = i, "Skipping frame: {}", e);
                    continue;
                }
            };

            if let Some(hip_x) = hip_midpoint_x(&landmarks) {
                match initial_hip_x {
                    None => initial_hip_x = Some(hip_x),
                    Some(base) if (hip_x - base).abs() > sampling.hip_translate_threshold => {
                        info!(
                            video_id,
                            frame_index = i,
                            "Subject left the frame (hip drift {:.3}); stopping",
                            (hip_x - base).abs()
                        );
                        end = RunEnd::StoppedEarly { at_frame: i };
                        break;
                    }
                    Some(_) => {}
                }
            }

            let angles = compute_frame_angles(
                &landmarks,
                sampling.handedness,
                thresholds.visibility_threshold,
            );
            let flags = flag_mechanics(&angles, &landmarks, sampling.handedness, thresholds);
            if !framing_checked {
                framing_checked = true;
                framing_warning = check_framing_quality(&landmarks, thresholds);
                if let Some(w) = &framing_warning {
                    warn!(video_id, "{}", w);
                }
            }

            frames.push(FrameSample {
                frame_index: i,
                timestamp_ms: sample_timestamp_ms(i, fps),
                landmarks,
                angles,
                flags,
                is_contact: false,
            });

            let pct = progress_pct(i, total);
            if frames.len() % batch == 0 {
                let snapshot = frames.clone();
                let warning = framing_warning.clone();
                progress.send_modify(|p| {
                    p.progress_pct = pct;
                    p.frames = snapshot;
                    p.framing_warning = warning;
                });
            } else {
                progress.send_modify(|p| p.progress_pct = pct);
            }
        }

        Sampled {
            end,
            frames,
            framing_warning,
            fault,
        }
    }

    fn finish(
        &self,
        ticket: RunTicket,
        sampled: Sampled,
        progress: &watch::Sender<LiveProgress>,
    ) -> RunOutcome {
        let Sampled {
            end,
            mut frames,
            framing_warning,
            ..
        } = sampled;
        let video_id = ticket.video_id.as_str();
        let contact_index = mark_contact_frame(&mut frames);

        match self
            .store
            .commit_run(&ticket, &frames, framing_warning.as_deref())
        {
            Ok(status) => {
                info!(
                    video_id,
                    run_id = %ticket.run_id,
                    frames = frames.len(),
                    status = %status,
                    "Analysis run finished"
                );
                publish_final(progress, status, frames.clone(), framing_warning.clone());
                RunOutcome {
                    end,
                    status,
                    frames,
                    framing_warning,
                    error_message: None,
                    contact_index,
                }
            }
            Err(e) => {
                let msg = format!("Failed to save analysis: {}", e);
                error!(video_id, run_id = %ticket.run_id, "{}", msg);
                if !matches!(e, StoreError::StaleRun { .. }) {
                    if let Err(e2) = self.store.fail_run(&ticket, &msg) {
                        warn!(video_id, "Failed to record save error: {}", e2);
                    }
                }
                publish_final(progress, AnalysisStatus::Error, frames.clone(), framing_warning.clone());
                let mut outcome = RunOutcome::failed(end, msg, frames, framing_warning);
                outcome.contact_index = contact_index;
                outcome
            }
        }
    }

    fn cancelled_outcome(&self, ticket: Option<&RunTicket>, frames: Vec<FrameSample>) -> RunOutcome {
        let prior = ticket.and_then(|t| t.prior.as_ref());
        RunOutcome {
            end: RunEnd::Cancelled,
            status: prior.map(|p| p.status).unwrap_or(AnalysisStatus::Pending),
            frames,
            framing_warning: prior.and_then(|p| p.framing_warning.clone()),
            error_message: prior.and_then(|p| p.error_message.clone()),
            contact_index: None,
        }
    }
}

struct Sampled {
    end: RunEnd,
    frames: Vec<FrameSample>,
    framing_warning: Option<String>,
    /// Run-level detector fault that stopped the loop.
    fault: Option<String>,
}

fn publish_final(
    progress: &watch::Sender<LiveProgress>,
    status: AnalysisStatus,
    frames: Vec<FrameSample>,
    framing_warning: Option<String>,
) {
    let pct = if status == AnalysisStatus::Error { None } else { Some(100) };
    progress.send_modify(|p| {
        p.status = status;
        if let Some(pct) = pct {
            p.progress_pct = pct;
        }
        p.frames = frames;
        p.framing_warning = framing_warning;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_formula() {
        assert_eq!(progress_pct(0, 10), 10);
        assert_eq!(progress_pct(9, 10), 100);
        assert_eq!(progress_pct(0, 3), 33);
        assert_eq!(progress_pct(1, 3), 67);
        assert_eq!(progress_pct(0, 0), 100);
    }

    #[test]
    fn test_total_frames_floors() {
        assert_eq!(total_frames(4.0, 5.0), 20);
        assert_eq!(total_frames(4.39, 5.0), 21);
        assert_eq!(total_frames(0.1, 5.0), 0);
        assert_eq!(total_frames(f64::NAN, 5.0), 0);
        assert_eq!(total_frames(3.0, 0.0), 0);
    }
}
