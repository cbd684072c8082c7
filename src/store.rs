/// Analysis Session Store: SQLite persistence
///
/// One `sessions` row per video plus one `frames` row per analysed sample,
/// keyed by (video_id, frame_index). Every run claims the session row with a
/// fresh run id; commits, failures and releases only land while that run id
/// still owns the row, so the most recently started run wins.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::{AnalysisStatus, FrameAngles, FrameSample, MechanicsFlag, SessionRecord};
use crate::error::StoreError;
use crate::landmarks::Landmark;

/// Proof that a run owns a session row, with the record it replaced.
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub video_id: String,
    pub run_id: Uuid,
    pub prior: Option<SessionRecord>,
}

/// Persistence collaborator consumed by the orchestrator and the session.
pub trait SessionStore: Send + Sync {
    fn load_session(&self, video_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Stored samples ordered by frame index.
    fn load_frames(&self, video_id: &str) -> Result<Vec<FrameSample>, StoreError>;

    /// Mark the session `analyzing` under a new run id.
    fn claim_run(&self, video_id: &str) -> Result<RunTicket, StoreError>;

    /// Replace the video's frame set with `frames` and finish the session.
    /// Returns the terminal status written (`complete` or `low_confidence`).
    fn commit_run(
        &self,
        ticket: &RunTicket,
        frames: &[FrameSample],
        framing_warning: Option<&str>,
    ) -> Result<AnalysisStatus, StoreError>;

    fn fail_run(&self, ticket: &RunTicket, message: &str) -> Result<(), StoreError>;

    /// Hand the session back as it was before the run (cancellation).
    fn release_run(&self, ticket: &RunTicket) -> Result<(), StoreError>;

    /// Manual re-analysis: back to `pending` with progress 0.
    fn reset_for_reanalysis(&self, video_id: &str) -> Result<(), StoreError>;
}

// ─── SQLite implementation ───────────────────────────────────────────────────

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const SESSION_COLUMNS: &str = "video_id, status, progress_pct, frame_count, error_message,
     framing_warning, analyzed_at, active_run, updated_at";

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let resolved = resolve_db_path(path);
        let conn = Connection::open(&resolved)?;
        if resolved != ":memory:" {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        }
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        debug!("Session store opened at {}", resolved);
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                video_id         TEXT    PRIMARY KEY,
                status           TEXT    NOT NULL,
                progress_pct     INTEGER NOT NULL DEFAULT 0,
                frame_count      INTEGER,
                error_message    TEXT,
                framing_warning  TEXT,
                analyzed_at      TEXT,
                active_run       TEXT,
                updated_at       TEXT    NOT NULL
            );

            CREATE TABLE IF NOT EXISTS frames (
                video_id         TEXT    NOT NULL,
                frame_index      INTEGER NOT NULL,
                timestamp_ms     INTEGER NOT NULL,
                landmarks        TEXT    NOT NULL,
                angles           TEXT    NOT NULL,
                flags            TEXT    NOT NULL,
                run_id           TEXT    NOT NULL,
                PRIMARY KEY (video_id, frame_index)
            );

            CREATE INDEX IF NOT EXISTS idx_frames_run ON frames (video_id, run_id);
        ",
        )?;
        Ok(())
    }
}

fn select_session(conn: &Connection, video_id: &str) -> Result<Option<SessionRecord>, StoreError> {
    let sql = format!("SELECT {} FROM sessions WHERE video_id = ?1", SESSION_COLUMNS);
    let raw = conn
        .query_row(&sql, params![video_id], map_session_row)
        .optional()?;
    raw.map(RawSession::into_record).transpose()
}

/// Fails with `StaleRun` unless `ticket` still owns the session row.
fn ensure_owner(tx: &Transaction<'_>, ticket: &RunTicket) -> Result<(), StoreError> {
    let active: Option<Option<String>> = tx
        .query_row(
            "SELECT active_run FROM sessions WHERE video_id = ?1",
            params![ticket.video_id],
            |row| row.get(0),
        )
        .optional()?;
    let run = ticket.run_id.to_string();
    match active.flatten() {
        Some(owner) if owner == run => Ok(()),
        _ => Err(StoreError::StaleRun {
            video_id: ticket.video_id.clone(),
        }),
    }
}

impl SessionStore for SqliteStore {
    fn load_session(&self, video_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let conn = self.conn()?;
        select_session(&conn, video_id)
    }

    fn load_frames(&self, video_id: &str) -> Result<Vec<FrameSample>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT frame_index, timestamp_ms, landmarks, angles, flags
             FROM frames WHERE video_id = ?1 ORDER BY frame_index ASC",
        )?;
        let rows = stmt
            .query_map(params![video_id], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(frame_index, ts, landmarks, angles, flags)| {
                Ok(FrameSample {
                    frame_index,
                    timestamp_ms: ts.max(0) as u64,
                    landmarks: serde_json::from_str::<Vec<Landmark>>(&landmarks)?,
                    angles: serde_json::from_str::<FrameAngles>(&angles)?,
                    flags: serde_json::from_str::<Vec<MechanicsFlag>>(&flags)?,
                    is_contact: false,
                })
            })
            .collect()
    }

    fn claim_run(&self, video_id: &str) -> Result<RunTicket, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let prior = select_session(&tx, video_id)?;
        let run_id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO sessions (video_id, status, progress_pct, active_run, updated_at)
             VALUES (?1, ?2, 0, ?3, ?4)
             ON CONFLICT(video_id) DO UPDATE SET
                status = excluded.status,
                progress_pct = 0,
                error_message = NULL,
                framing_warning = NULL,
                active_run = excluded.active_run,
                updated_at = excluded.updated_at",
            params![
                video_id,
                AnalysisStatus::Analyzing.as_str(),
                run_id.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        if prior.as_ref().and_then(|p| p.active_run).is_some() {
            info!(video_id, %run_id, "Claimed session still owned by an earlier run; that run is now stale");
        }
        Ok(RunTicket {
            video_id: video_id.to_string(),
            run_id,
            prior,
        })
    }

    fn commit_run(
        &self,
        ticket: &RunTicket,
        frames: &[FrameSample],
        framing_warning: Option<&str>,
    ) -> Result<AnalysisStatus, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        ensure_owner(&tx, ticket)?;
        let run = ticket.run_id.to_string();

        {
            let mut upsert = tx.prepare(
                "INSERT INTO frames
                 (video_id, frame_index, timestamp_ms, landmarks, angles, flags, run_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(video_id, frame_index) DO UPDATE SET
                    timestamp_ms = excluded.timestamp_ms,
                    landmarks = excluded.landmarks,
                    angles = excluded.angles,
                    flags = excluded.flags,
                    run_id = excluded.run_id",
            )?;
            for f in frames {
                upsert.execute(params![
                    ticket.video_id,
                    f.frame_index,
                    f.timestamp_ms as i64,
                    serde_json::to_string(&f.landmarks)?,
                    serde_json::to_string(&f.angles)?,
                    serde_json::to_string(&f.flags)?,
                    run,
                ])?;
            }
        }

        let stale_rows = tx.execute(
            "DELETE FROM frames WHERE video_id = ?1 AND run_id != ?2",
            params![ticket.video_id, run],
        )?;

        let status = if frames.is_empty() {
            AnalysisStatus::LowConfidence
        } else {
            AnalysisStatus::Complete
        };
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE sessions SET
                status = ?2, progress_pct = 100, frame_count = ?3, error_message = NULL,
                framing_warning = ?4, analyzed_at = ?5, active_run = NULL, updated_at = ?5
             WHERE video_id = ?1",
            params![
                ticket.video_id,
                status.as_str(),
                frames.len() as u32,
                framing_warning,
                now,
            ],
        )?;
        tx.commit()?;

        debug!(
            video_id = %ticket.video_id,
            frames = frames.len(),
            replaced = stale_rows,
            "Committed analysis run"
        );
        Ok(status)
    }

    fn fail_run(&self, ticket: &RunTicket, message: &str) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        ensure_owner(&tx, ticket)?;
        tx.execute(
            "UPDATE sessions SET status = ?2, error_message = ?3, active_run = NULL, updated_at = ?4
             WHERE video_id = ?1",
            params![
                ticket.video_id,
                AnalysisStatus::Error.as_str(),
                message,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn release_run(&self, ticket: &RunTicket) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        ensure_owner(&tx, ticket)?;
        match &ticket.prior {
            Some(p) => {
                tx.execute(
                    "UPDATE sessions SET
                        status = ?2, progress_pct = ?3, frame_count = ?4, error_message = ?5,
                        framing_warning = ?6, analyzed_at = ?7, active_run = ?8, updated_at = ?9
                     WHERE video_id = ?1",
                    params![
                        p.video_id,
                        p.status.as_str(),
                        p.progress_pct,
                        p.frame_count,
                        p.error_message,
                        p.framing_warning,
                        p.analyzed_at.map(|t| t.to_rfc3339()),
                        p.active_run.map(|r| r.to_string()),
                        p.updated_at.to_rfc3339(),
                    ],
                )?;
            }
            None => {
                tx.execute(
                    "DELETE FROM sessions WHERE video_id = ?1",
                    params![ticket.video_id],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn reset_for_reanalysis(&self, video_id: &str) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO sessions (video_id, status, progress_pct, updated_at)
             VALUES (?1, ?2, 0, ?3)
             ON CONFLICT(video_id) DO UPDATE SET
                status = excluded.status,
                progress_pct = 0,
                error_message = NULL,
                active_run = NULL,
                updated_at = excluded.updated_at",
            params![video_id, AnalysisStatus::Pending.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

struct RawSession {
    video_id: String,
    status: String,
    progress_pct: u8,
    frame_count: Option<u32>,
    error_message: Option<String>,
    framing_warning: Option<String>,
    analyzed_at: Option<String>,
    active_run: Option<String>,
    updated_at: String,
}

fn map_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSession> {
    Ok(RawSession {
        video_id: row.get(0)?,
        status: row.get(1)?,
        progress_pct: row.get(2)?,
        frame_count: row.get(3)?,
        error_message: row.get(4)?,
        framing_warning: row.get(5)?,
        analyzed_at: row.get(6)?,
        active_run: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl RawSession {
    fn into_record(self) -> Result<SessionRecord, StoreError> {
        let status = self
            .status
            .parse::<AnalysisStatus>()
            .map_err(StoreError::UnknownStatus)?;
        Ok(SessionRecord {
            video_id: self.video_id,
            status,
            progress_pct: self.progress_pct.min(100),
            frame_count: self.frame_count,
            error_message: self.error_message,
            framing_warning: self.framing_warning,
            analyzed_at: self.analyzed_at.as_deref().and_then(parse_ts),
            active_run: self.active_run.as_deref().and_then(|r| Uuid::parse_str(r).ok()),
            updated_at: parse_ts(&self.updated_at).unwrap_or_else(Utc::now),
        })
    }
}

/// Resolve bare DB filenames to the local app data directory.
fn resolve_db_path(db_path: &str) -> String {
    if db_path == ":memory:" || Path::new(db_path).is_absolute() {
        return db_path.to_string();
    }
    if let Some(data_dir) = dirs::data_local_dir() {
        let full = data_dir.join("swingcheck").join(db_path);
        if let Some(parent) = full.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        return full.to_string_lossy().to_string();
    }
    db_path.to_string()
}
