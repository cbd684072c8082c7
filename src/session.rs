//! Analysis lifecycle for one video.
//!
//! `pending → analyzing → {complete | low_confidence | error}`, with a manual
//! re-analysis edge from every terminal state back to `pending`. On load the
//! persisted record decides between showing stored results and running.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::analysis::{AnalysisStatus, FrameSample, SessionRecord};
use crate::detector::PoseDetector;
use crate::error::SessionError;
use crate::orchestrator::{Analyzer, LiveProgress, RunEnd, RunOutcome};
use crate::summary::{summarize, SessionSummary};
use crate::timeline::{mark_contact_frame, FlagNavigator};
use crate::video::VideoSource;

const DEFAULT_ERROR_MESSAGE: &str = "Analysis failed";

/// What to do with a video when its review page is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeAction {
    /// Finished earlier: show stored samples, do not re-run.
    ShowStored,
    /// Failed earlier: show whatever was stored together with the error.
    ShowPartialWithError { message: String },
    /// Never analysed, or a run was interrupted: start one.
    Run,
}

/// Resume decision table keyed on the persisted status.
pub fn decide_resume(record: Option<&SessionRecord>) -> ResumeAction {
    match record.map(|r| r.status) {
        Some(AnalysisStatus::Complete) => ResumeAction::ShowStored,
        Some(AnalysisStatus::LowConfidence) => ResumeAction::ShowStored,
        Some(AnalysisStatus::Error) => ResumeAction::ShowPartialWithError {
            message: record
                .and_then(|r| r.error_message.clone())
                .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
        },
        Some(AnalysisStatus::Pending) => ResumeAction::Run,
        Some(AnalysisStatus::Analyzing) => ResumeAction::Run,
        None => ResumeAction::Run,
    }
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// In-memory view of one video's analysis, kept in step with the store.
pub struct AnalysisSession {
    video_id: String,
    analyzer: Arc<Analyzer>,
    status: AnalysisStatus,
    progress_pct: u8,
    frames: Vec<FrameSample>,
    framing_warning: Option<String>,
    error_message: Option<String>,
    progress_tx: watch::Sender<LiveProgress>,
}

impl AnalysisSession {
    /// Load the persisted state and decide how to resume.
    pub fn open(
        video_id: &str,
        analyzer: Arc<Analyzer>,
    ) -> Result<(Self, ResumeAction), SessionError> {
        let record = analyzer.store().load_session(video_id)?;
        let action = decide_resume(record.as_ref());
        let (progress_tx, _) = watch::channel(LiveProgress::default());

        let mut session = Self {
            video_id: video_id.to_string(),
            analyzer,
            status: AnalysisStatus::Pending,
            progress_pct: 0,
            frames: Vec::new(),
            framing_warning: None,
            error_message: None,
            progress_tx,
        };

        match (&action, record) {
            (ResumeAction::ShowStored, Some(rec)) => {
                session.load_stored(rec)?;
            }
            (ResumeAction::ShowPartialWithError { message }, Some(rec)) => {
                let message = message.clone();
                session.load_stored(rec)?;
                session.error_message = Some(message);
            }
            _ => {}
        }
        info!(video_id, status = %session.status, ?action, "Session opened");
        Ok((session, action))
    }

    fn load_stored(&mut self, rec: SessionRecord) -> Result<(), SessionError> {
        let mut frames = self.analyzer.store().load_frames(&self.video_id)?;
        mark_contact_frame(&mut frames);
        self.frames = frames;
        self.status = rec.status;
        self.progress_pct = rec.progress_pct;
        self.framing_warning = rec.framing_warning;
        self.error_message = rec.error_message;
        Ok(())
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn status(&self) -> AnalysisStatus {
        self.status
    }

    pub fn progress_pct(&self) -> u8 {
        self.progress_pct
    }

    pub fn frames(&self) -> &[FrameSample] {
        &self.frames
    }

    pub fn framing_warning(&self) -> Option<&str> {
        self.framing_warning.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Live progress of the current or next run.
    pub fn subscribe(&self) -> watch::Receiver<LiveProgress> {
        self.progress_tx.subscribe()
    }

    pub fn flag_navigator(&self) -> FlagNavigator {
        FlagNavigator::new(&self.frames)
    }

    pub fn summary(&self) -> SessionSummary {
        summarize(&self.frames, &self.analyzer.config().thresholds)
    }

    /// Run the orchestrator and adopt its outcome.
    pub async fn run<V, D>(
        &mut self,
        video: &mut V,
        detector: D,
        cancel: &watch::Receiver<bool>,
    ) -> Result<RunOutcome, SessionError>
    where
        V: VideoSource,
        D: PoseDetector,
    {
        if self.status == AnalysisStatus::Analyzing {
            return Err(SessionError::AlreadyAnalyzing);
        }
        if !self.status.can_transition_to(AnalysisStatus::Analyzing) {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to: AnalysisStatus::Analyzing,
            });
        }

        self.status = AnalysisStatus::Analyzing;
        self.progress_pct = 0;
        self.frames.clear();
        self.error_message = None;
        self.framing_warning = None;

        let analyzer = Arc::clone(&self.analyzer);
        let outcome = analyzer
            .run(&self.video_id, video, detector, cancel, &self.progress_tx)
            .await;
        self.apply(&outcome)?;
        Ok(outcome)
    }

    fn apply(&mut self, outcome: &RunOutcome) -> Result<(), SessionError> {
        if outcome.end == RunEnd::Cancelled {
            // persisted state was left as it was; show it again
            let record = self.analyzer.store().load_session(&self.video_id)?;
            self.frames.clear();
            self.status = AnalysisStatus::Pending;
            self.progress_pct = 0;
            if let Some(rec) = record {
                if decide_resume(Some(&rec)) != ResumeAction::Run {
                    self.load_stored(rec)?;
                }
            }
            return Ok(());
        }

        self.status = outcome.status;
        self.frames = outcome.frames.clone();
        self.framing_warning = outcome.framing_warning.clone();
        self.error_message = outcome.error_message.clone();
        if outcome.status != AnalysisStatus::Error {
            self.progress_pct = 100;
        } else {
            self.progress_pct = self.progress_tx.borrow().progress_pct;
        }
        Ok(())
    }

    /// Manual re-analysis from a terminal state. Clears the in-memory
    /// samples; stored samples stay until the next run commits.
    pub fn start_reanalysis(&mut self) -> Result<(), SessionError> {
        if self.status == AnalysisStatus::Analyzing {
            return Err(SessionError::AlreadyAnalyzing);
        }
        if !self.status.is_terminal() {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to: AnalysisStatus::Pending,
            });
        }
        self.analyzer.store().reset_for_reanalysis(&self.video_id)?;
        info!(video_id = %self.video_id, from = %self.status, "Re-analysis requested");
        self.status = AnalysisStatus::Pending;
        self.progress_pct = 0;
        self.frames.clear();
        self.framing_warning = None;
        self.error_message = None;
        self.progress_tx.send_replace(LiveProgress::default());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FrameAngles;
    use crate::config::AnalysisConfig;
    use crate::landmarks::Landmark;
    use crate::store::{SessionStore, SqliteStore};
    use chrono::Utc;

    fn record(status: AnalysisStatus, message: Option<&str>) -> SessionRecord {
        SessionRecord {
            video_id: "v".into(),
            status,
            progress_pct: 0,
            frame_count: None,
            error_message: message.map(str::to_string),
            framing_warning: None,
            analyzed_at: None,
            active_run: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_decision_table() {
        use AnalysisStatus::*;
        assert_eq!(decide_resume(None), ResumeAction::Run);
        assert_eq!(decide_resume(Some(&record(Pending, None))), ResumeAction::Run);
        assert_eq!(decide_resume(Some(&record(Analyzing, None))), ResumeAction::Run);
        assert_eq!(decide_resume(Some(&record(Complete, None))), ResumeAction::ShowStored);
        assert_eq!(decide_resume(Some(&record(LowConfidence, None))), ResumeAction::ShowStored);
        assert_eq!(
            decide_resume(Some(&record(Error, Some("disk full")))),
            ResumeAction::ShowPartialWithError {
                message: "disk full".into()
            }
        );
        assert_eq!(
            decide_resume(Some(&record(Error, None))),
            ResumeAction::ShowPartialWithError {
                message: DEFAULT_ERROR_MESSAGE.into()
            }
        );
    }

    fn sample(i: u32, hip: f64) -> FrameSample {
        FrameSample {
            frame_index: i,
            timestamp_ms: i as u64 * 200,
            landmarks: vec![Landmark::new(0.5, 0.5, 0.0, 0.9)],
            angles: FrameAngles {
                hip_rotation_deg: Some(hip),
                ..Default::default()
            },
            flags: vec![],
            is_contact: false,
        }
    }

    fn analyzer() -> (Arc<SqliteStore>, Arc<Analyzer>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let analyzer = Analyzer::new(AnalysisConfig::default(), store.clone());
        (store, Arc::new(analyzer))
    }

    #[test]
    fn test_open_shows_stored_with_contact() {
        let (store, analyzer) = analyzer();
        let t = store.claim_run("v").unwrap();
        store
            .commit_run(&t, &[sample(0, 10.0), sample(1, -95.0), sample(2, 40.0)], None)
            .unwrap();

        let (session, action) = AnalysisSession::open("v", analyzer).unwrap();
        assert_eq!(action, ResumeAction::ShowStored);
        assert_eq!(session.status(), AnalysisStatus::Complete);
        assert_eq!(session.frames().len(), 3);
        assert!(session.frames()[1].is_contact);
        assert_eq!(session.progress_pct(), 100);
    }

    #[test]
    fn test_open_error_shows_partial_frames() {
        let (store, analyzer) = analyzer();
        let t = store.claim_run("v").unwrap();
        store.commit_run(&t, &[sample(0, 80.0)], None).unwrap();
        let t = store.claim_run("v").unwrap();
        store.fail_run(&t, "write failed").unwrap();

        let (session, action) = AnalysisSession::open("v", analyzer).unwrap();
        assert!(matches!(action, ResumeAction::ShowPartialWithError { .. }));
        assert_eq!(session.status(), AnalysisStatus::Error);
        assert_eq!(session.frames().len(), 1);
        assert_eq!(session.error_message(), Some("write failed"));
    }

    #[test]
    fn test_interrupted_run_is_rerun() {
        let (store, analyzer) = analyzer();
        store.claim_run("v").unwrap();
        let (session, action) = AnalysisSession::open("v", analyzer).unwrap();
        assert_eq!(action, ResumeAction::Run);
        assert_eq!(session.status(), AnalysisStatus::Pending);
        assert!(session.frames().is_empty());
    }

    #[test]
    fn test_reanalysis_only_from_terminal_states() {
        let (store, analyzer) = analyzer();
        let (mut fresh, _) = AnalysisSession::open("new", analyzer.clone()).unwrap();
        assert!(matches!(
            fresh.start_reanalysis(),
            Err(SessionError::InvalidTransition { .. })
        ));

        let t = store.claim_run("v").unwrap();
        store.commit_run(&t, &[sample(0, 80.0)], None).unwrap();
        let (mut session, _) = AnalysisSession::open("v", analyzer).unwrap();
        session.start_reanalysis().unwrap();
        assert_eq!(session.status(), AnalysisStatus::Pending);
        assert!(session.frames().is_empty());
        assert_eq!(session.progress_pct(), 0);
        assert_eq!(
            store.load_session("v").unwrap().unwrap().status,
            AnalysisStatus::Pending
        );
        // stored samples survive until the next run commits
        assert_eq!(store.load_frames("v").unwrap().len(), 1);
    }
}
