#![allow(dead_code)]

use image::RgbImage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use swingcheck::analysis::{AnalysisStatus, FrameSample, SessionRecord};
use swingcheck::detector::{DetectorWorker, PoseBackend};
use swingcheck::error::{DetectorError, StoreError, VideoError};
use swingcheck::landmarks::{Landmark, LEFT_HIP, POSE_LANDMARK_COUNT, RIGHT_ELBOW, RIGHT_HIP, RIGHT_SHOULDER, RIGHT_WRIST};
use swingcheck::store::{RunTicket, SessionStore, SqliteStore};
use swingcheck::video::{RasterFrame, VideoSource};

// ─── Poses ───────────────────────────────────────────────────────────────────

/// Side-on pose with the hip midpoint at `hip_mid_x` and the given hip spread.
pub fn pose(hip_mid_x: f64, hip_spread: f64) -> Vec<Landmark> {
    let mut lms = vec![Landmark::new(0.5, 0.5, 0.0, 0.95); POSE_LANDMARK_COUNT];
    lms[RIGHT_SHOULDER] = Landmark::new(0.5, 0.3, 0.0, 0.95);
    lms[RIGHT_ELBOW] = Landmark::new(0.6, 0.3, 0.0, 0.95);
    lms[RIGHT_WRIST] = Landmark::new(0.6, 0.2, 0.0, 0.95);
    lms[LEFT_HIP] = Landmark::new(hip_mid_x - hip_spread / 2.0, 0.6, 0.0, 0.95);
    lms[RIGHT_HIP] = Landmark::new(hip_mid_x + hip_spread / 2.0, 0.6, 0.0, 0.95);
    lms
}

pub fn side_on(hip_mid_x: f64) -> Vec<Landmark> {
    pose(hip_mid_x, 0.3)
}

// ─── Video ───────────────────────────────────────────────────────────────────

/// A video of `duration_secs` whose frames are blank; frame times are
/// reported as `round(t × 1000)`.
pub struct SyntheticVideo {
    pub duration_secs: f64,
    pub native: Option<(u32, u32)>,
    pub fail_seek_ms: Vec<u64>,
    pub seeks: Vec<u64>,
    pub raster_sizes: Vec<(u32, u32)>,
    current_ms: u64,
}

impl SyntheticVideo {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            native: Some((64, 36)),
            fail_seek_ms: Vec::new(),
            seeks: Vec::new(),
            raster_sizes: Vec::new(),
            current_ms: 0,
        }
    }
}

impl VideoSource for SyntheticVideo {
    fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    fn native_size(&self) -> Option<(u32, u32)> {
        self.native
    }

    async fn seek(&mut self, t_secs: f64) -> Result<(), VideoError> {
        let ms = (t_secs * 1000.0).round() as u64;
        self.seeks.push(ms);
        if self.fail_seek_ms.contains(&ms) {
            return Err(VideoError::Seek {
                at_secs: t_secs,
                reason: "decoder stalled".into(),
            });
        }
        self.current_ms = ms;
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn rasterize(&mut self, width: u32, height: u32) -> Result<RasterFrame, VideoError> {
        self.raster_sizes.push((width, height));
        Ok(RasterFrame {
            timestamp_ms: self.current_ms,
            image: RgbImage::new(2, 2),
        })
    }
}

// ─── Detector ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum Scripted {
    Pose(Vec<Landmark>),
    NoPose,
    Fail,
    /// Kills the worker thread.
    Panic,
}

/// Backend answering from a timestamp → result script. Unscripted frames
/// have no pose. Can trigger side effects on load, on a given frame, or on
/// every frame.
pub struct ScriptedBackend {
    script: HashMap<u64, Scripted>,
    pub fail_load: bool,
    pub seen: Arc<Mutex<Vec<u64>>>,
    on_load: Option<Box<dyn FnMut() + Send>>,
    on_frame: Option<(u64, Box<dyn FnMut() + Send>)>,
    on_each: Option<Box<dyn FnMut(u64) + Send>>,
}

impl ScriptedBackend {
    pub fn new(script: impl IntoIterator<Item = (u64, Scripted)>) -> Self {
        Self {
            script: script.into_iter().collect(),
            fail_load: false,
            seen: Arc::new(Mutex::new(Vec::new())),
            on_load: None,
            on_frame: None,
            on_each: None,
        }
    }

    /// `n` frames at 5/s, each produced by `f(i)`.
    pub fn frames(n: u32, f: impl Fn(u32) -> Scripted) -> Self {
        Self::new((0..n).map(|i| (i as u64 * 200, f(i))))
    }

    pub fn failing_load() -> Self {
        let mut b = Self::new(std::iter::empty::<(u64, Scripted)>());
        b.fail_load = true;
        b
    }

    pub fn on_frame(mut self, timestamp_ms: u64, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_frame = Some((timestamp_ms, Box::new(hook)));
        self
    }

    pub fn on_load(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_load = Some(Box::new(hook));
        self
    }

    /// Called with the timestamp of every frame, before it is answered.
    pub fn on_each(mut self, hook: impl FnMut(u64) + Send + 'static) -> Self {
        self.on_each = Some(Box::new(hook));
        self
    }

    pub fn spawn(self) -> (DetectorWorker, Arc<Mutex<Vec<u64>>>) {
        let seen = self.seen.clone();
        (DetectorWorker::spawn(self, 2), seen)
    }
}

impl PoseBackend for ScriptedBackend {
    fn load(&mut self) -> Result<(), DetectorError> {
        if let Some(hook) = self.on_load.as_mut() {
            hook();
        }
        if self.fail_load {
            Err(DetectorError::Initialization("model assets not found".into()))
        } else {
            Ok(())
        }
    }

    fn estimate(&mut self, frame: &RasterFrame) -> Result<Option<Vec<Landmark>>, DetectorError> {
        let ts = frame.timestamp_ms;
        self.seen.lock().unwrap().push(ts);
        if let Some(hook) = self.on_each.as_mut() {
            hook(ts);
        }
        if let Some((at, hook)) = self.on_frame.as_mut() {
            if *at == ts {
                hook();
            }
        }
        match self.script.get(&ts).cloned().unwrap_or(Scripted::NoPose) {
            Scripted::Pose(lms) => Ok(Some(lms)),
            Scripted::NoPose => Ok(None),
            Scripted::Fail => Err(DetectorError::Detection("inference failed".into())),
            Scripted::Panic => panic!("pose runtime crashed at {} ms", ts),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

// ─── Stores ──────────────────────────────────────────────────────────────────

/// Wraps a real store, counting writes and optionally failing commits.
pub struct ProbeStore {
    pub inner: SqliteStore,
    pub writes: AtomicUsize,
    pub fail_commit: bool,
}

impl ProbeStore {
    pub fn new(fail_commit: bool) -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            writes: AtomicUsize::new(0),
            fail_commit,
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl SessionStore for ProbeStore {
    fn load_session(&self, video_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        self.inner.load_session(video_id)
    }

    fn load_frames(&self, video_id: &str) -> Result<Vec<FrameSample>, StoreError> {
        self.inner.load_frames(video_id)
    }

    fn claim_run(&self, video_id: &str) -> Result<RunTicket, StoreError> {
        self.write();
        self.inner.claim_run(video_id)
    }

    fn commit_run(
        &self,
        ticket: &RunTicket,
        frames: &[FrameSample],
        framing_warning: Option<&str>,
    ) -> Result<AnalysisStatus, StoreError> {
        self.write();
        if self.fail_commit {
            return Err(StoreError::Unavailable("disk full".into()));
        }
        self.inner.commit_run(ticket, frames, framing_warning)
    }

    fn fail_run(&self, ticket: &RunTicket, message: &str) -> Result<(), StoreError> {
        self.write();
        self.inner.fail_run(ticket, message)
    }

    fn release_run(&self, ticket: &RunTicket) -> Result<(), StoreError> {
        self.write();
        self.inner.release_run(ticket)
    }

    fn reset_for_reanalysis(&self, video_id: &str) -> Result<(), StoreError> {
        self.write();
        self.inner.reset_for_reanalysis(video_id)
    }
}

pub fn channels() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}
