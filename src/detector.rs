/// Pose Detector Worker
///
/// Architecture:
///   orchestrator ──[flume request]──▶ blocking worker (owns the backend)
///                ◀──[oneshot reply]──
///
/// The backend (ONNX model, recorded replay, test double) is synchronous and
/// lives entirely on the worker; callers only ever see the async
/// [`PoseDetector`] surface. Dropping the worker closes the request channel,
/// which makes the worker release the backend and exit.

use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::DetectorError;
use crate::landmarks::Landmark;
use crate::video::RasterFrame;

/// Async pose detection as seen by the orchestrator.
///
/// `detect` yields `Ok(None)` when no person is found in the frame.
pub trait PoseDetector: Send {
    fn initialize(&mut self) -> impl Future<Output = Result<(), DetectorError>> + Send;

    fn detect(
        &mut self,
        frame: RasterFrame,
    ) -> impl Future<Output = Result<Option<Vec<Landmark>>, DetectorError>> + Send;

    /// Release the model. Safe to call after a failed `initialize`.
    fn dispose(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized;
}

/// Synchronous model backend driven by [`DetectorWorker`].
pub trait PoseBackend: Send + 'static {
    /// Load model assets. Called once, on the worker.
    fn load(&mut self) -> Result<(), DetectorError>;

    fn estimate(&mut self, frame: &RasterFrame) -> Result<Option<Vec<Landmark>>, DetectorError>;

    fn close(&mut self) {}

    fn name(&self) -> &'static str;
}

// ─── Worker protocol ─────────────────────────────────────────────────────────

type DetectReply = oneshot::Sender<Result<Option<Vec<Landmark>>, DetectorError>>;

enum Request {
    Initialize(oneshot::Sender<Result<(), DetectorError>>),
    Detect(RasterFrame, DetectReply),
    Shutdown(oneshot::Sender<()>),
}

fn run_worker<B: PoseBackend>(mut backend: B, rx: flume::Receiver<Request>) {
    let name = backend.name();
    let mut ready = false;

    while let Ok(req) = rx.recv() {
        match req {
            Request::Initialize(reply) => {
                let result = if ready { Ok(()) } else { backend.load() };
                match &result {
                    Ok(()) => {
                        ready = true;
                        info!("Pose backend '{}' ready", name);
                    }
                    Err(e) => warn!("Pose backend '{}' failed to load: {}", name, e),
                }
                let _ = reply.send(result);
            }
            Request::Detect(frame, reply) => {
                let result = if ready {
                    backend.estimate(&frame)
                } else {
                    Err(DetectorError::NotInitialized)
                };
                let _ = reply.send(result);
            }
            Request::Shutdown(reply) => {
                backend.close();
                debug!("Pose backend '{}' closed", name);
                let _ = reply.send(());
                return;
            }
        }
    }

    // every handle dropped without an explicit dispose
    backend.close();
    debug!("Pose backend '{}' closed (worker dropped)", name);
}

// ─── Worker handle ───────────────────────────────────────────────────────────

/// Owns a backend on a blocking task and serves requests one at a time.
pub struct DetectorWorker {
    tx: flume::Sender<Request>,
    handle: Option<JoinHandle<()>>,
    // a request went unanswered; later ones could sit in the queue forever
    gone: bool,
}

impl DetectorWorker {
    /// Start the worker. Must be called from within a tokio runtime.
    pub fn spawn<B: PoseBackend>(backend: B, queue_capacity: usize) -> Self {
        let (tx, rx) = flume::bounded::<Request>(queue_capacity.max(1));
        let handle = tokio::task::spawn_blocking(move || run_worker(backend, rx));
        Self {
            tx,
            handle: Some(handle),
            gone: false,
        }
    }

    async fn request<T>(
        &mut self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, DetectorError> {
        if self.gone || self.tx.is_disconnected() {
            self.gone = true;
            return Err(DetectorError::WorkerGone);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.tx.send_async(make(reply_tx)).await.is_ok();
        let reply = if sent { reply_rx.await.ok() } else { None };
        if reply.is_none() {
            self.gone = true;
        }
        reply.ok_or(DetectorError::WorkerGone)
    }
}

impl PoseDetector for DetectorWorker {
    async fn initialize(&mut self) -> Result<(), DetectorError> {
        self.request(Request::Initialize).await?
    }

    async fn detect(&mut self, frame: RasterFrame) -> Result<Option<Vec<Landmark>>, DetectorError> {
        self.request(|reply| Request::Detect(frame, reply)).await?
    }

    async fn dispose(mut self) {
        if self.request(Request::Shutdown).await.is_err() {
            debug!("Pose worker already gone at dispose");
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Pose worker task ended abnormally: {}", e);
            }
        }
    }
}
