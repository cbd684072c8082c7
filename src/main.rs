use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use swingcheck::config::{self, AnalysisConfig};
use swingcheck::detector::DetectorWorker;
use swingcheck::logging::init_logging;
use swingcheck::overlay::overlay_at;
use swingcheck::replay::ReplayBackend;
use swingcheck::session::{AnalysisSession, ResumeAction};
use swingcheck::store::{SessionStore, SqliteStore};
use swingcheck::summary::summarize;
use swingcheck::timeline::mark_contact_frame;
use swingcheck::video::FrameDirectorySource;
use swingcheck::FrameSample;

#[derive(Parser)]
#[command(name = "swingcheck", version)]
#[command(about = "Pose-based swing mechanics analysis for coach video review")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse a video given as a directory of extracted frames
    Analyze {
        video_id: String,
        #[arg(long)] frames_dir: PathBuf,
        /// Frame rate the frames were extracted at
        #[arg(long, default_value = "30")] fps: f64,
        /// Serve recorded landmarks (JSON) instead of running the model
        #[arg(long)] replay: Option<PathBuf>,
        /// Re-analyse even if a finished result is stored
        #[arg(long)] force: bool,
    },

    /// Show the stored session record
    Status { video_id: String },

    /// List stored samples
    Frames {
        video_id: String,
        #[arg(long)] json: bool,
    },

    /// Issue tallies and angle statistics
    Summary { video_id: String },

    /// Reset a finished session to pending for re-analysis
    Reset { video_id: String },

    /// Skeleton drawing instructions for a playback time (JSON)
    Overlay {
        video_id: String,
        #[arg(long)] time_ms: u64,
        #[arg(long, value_parser = parse_size)] video: (u32, u32),
        #[arg(long, value_parser = parse_size)] surface: (u32, u32),
    },
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let w = w.trim().parse::<u32>().map_err(|e| e.to_string())?;
    let h = h.trim().parse::<u32>().map_err(|e| e.to_string())?;
    Ok((w, h))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let cfg = config::load_config().unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        AnalysisConfig::default()
    });
    let store: Arc<dyn SessionStore> = Arc::new(SqliteStore::open(&cfg.database.path)?);

    match cli.command {
        Command::Analyze {
            video_id,
            frames_dir,
            fps,
            replay,
            force,
        } => analyze(cfg, store, video_id, frames_dir, fps, replay, force).await?,

        Command::Status { video_id } => match store.load_session(&video_id)? {
            Some(rec) => {
                println!("Video:     {}", rec.video_id);
                println!("Status:    {}", rec.status);
                println!("Progress:  {}%", rec.progress_pct);
                if let Some(n) = rec.frame_count {
                    println!("Frames:    {}", n);
                }
                if let Some(at) = rec.analyzed_at {
                    println!("Analysed:  {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
                }
                if let Some(w) = rec.framing_warning {
                    println!("Framing:   {}", w);
                }
                if let Some(e) = rec.error_message {
                    println!("Error:     {}", e);
                }
            }
            None => println!("No analysis recorded for {}", video_id),
        },

        Command::Frames { video_id, json } => {
            let mut frames = store.load_frames(&video_id)?;
            mark_contact_frame(&mut frames);
            if json {
                println!("{}", serde_json::to_string_pretty(&frames)?);
            } else {
                print_frames(&frames);
            }
        }

        Command::Summary { video_id } => {
            let frames = store.load_frames(&video_id)?;
            let summary = summarize(&frames, &cfg.thresholds);
            println!("Frames analysed: {} ({} flagged)", summary.total_frames, summary.flagged_frames);
            for issue in &summary.issues {
                println!("  {:<26} ×{:<4} {:?}", issue.issue, issue.count, issue.severity);
            }
            for stat in &summary.angle_stats {
                println!("  {:<14} {:>3}% in range ({} measured)", stat.label, stat.in_range_pct, stat.measured);
            }
            if !summary.looking_good.is_empty() {
                println!("Looking good: {}", summary.looking_good.join(", "));
            } else if summary.is_inconclusive() {
                println!("Inconclusive: most angles could not be measured.");
            }
        }

        Command::Reset { video_id } => {
            let analyzer = Arc::new(swingcheck::Analyzer::new(cfg, store));
            let (mut session, _) = AnalysisSession::open(&video_id, analyzer)?;
            session.start_reanalysis()?;
            println!("{} reset to {}", video_id, session.status());
        }

        Command::Overlay {
            video_id,
            time_ms,
            video,
            surface,
        } => {
            let frames = store.load_frames(&video_id)?;
            match overlay_at(&frames, time_ms, video, surface, &cfg) {
                Some(drawing) => println!("{}", serde_json::to_string_pretty(&drawing)?),
                None => println!("No sample within {} ms of {} ms", cfg.overlay.snap_window_ms, time_ms),
            }
        }
    }
    Ok(())
}

async fn analyze(
    cfg: AnalysisConfig,
    store: Arc<dyn SessionStore>,
    video_id: String,
    frames_dir: PathBuf,
    fps: f64,
    replay: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let analyzer = Arc::new(swingcheck::Analyzer::new(cfg.clone(), store));
    let (mut session, action) = AnalysisSession::open(&video_id, analyzer)?;

    if session.status().is_terminal() {
        if !force {
            println!("{} already analysed: {} ({} samples)", video_id, session.status(), session.frames().len());
            if let ResumeAction::ShowPartialWithError { message } = &action {
                println!("Last run failed: {}", message);
            }
            println!("Use --force to re-analyse.");
            return Ok(());
        }
        session.start_reanalysis()?;
    }

    let mut video = FrameDirectorySource::open(&frames_dir, fps)?;
    let detector = build_detector(&cfg, replay)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling analysis");
            let _ = cancel_tx.send(true);
        }
    });

    let mut progress_rx = session.subscribe();
    let reporter = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let (pct, n) = {
                let p = progress_rx.borrow_and_update();
                (p.progress_pct, p.frames.len())
            };
            eprint!("\r  analysing… {:>3}% ({} samples published)", pct, n);
        }
    });

    let outcome = session.run(&mut video, detector, &cancel_rx).await?;
    reporter.abort();
    eprintln!();

    info!(video_id = %video_id, end = ?outcome.end, "Analyze command finished");
    println!("Status:   {}", outcome.status);
    println!("Samples:  {}", outcome.frames.len());
    println!("Ended:    {:?}", outcome.end);
    if let Some(idx) = outcome.contact_index {
        println!("Contact:  frame {}", outcome.frames[idx].frame_index);
    }
    if let Some(w) = &outcome.framing_warning {
        println!("Framing:  {}", w);
    }
    if let Some(msg) = &outcome.error_message {
        bail!("analysis failed: {}", msg);
    }
    Ok(())
}

fn build_detector(cfg: &AnalysisConfig, replay: Option<PathBuf>) -> Result<DetectorWorker> {
    match replay {
        Some(path) => Ok(DetectorWorker::spawn(
            ReplayBackend::from_file(path),
            cfg.detector.queue_capacity,
        )),
        None => model_detector(cfg),
    }
}

#[cfg(feature = "onnx")]
fn model_detector(cfg: &AnalysisConfig) -> Result<DetectorWorker> {
    use swingcheck::onnx::OnnxPoseBackend;
    Ok(DetectorWorker::spawn(
        OnnxPoseBackend::new(cfg.detector.clone()),
        cfg.detector.queue_capacity,
    ))
}

#[cfg(not(feature = "onnx"))]
fn model_detector(_cfg: &AnalysisConfig) -> Result<DetectorWorker> {
    bail!("No pose model available: pass --replay FILE or build with --features onnx")
}

fn fmt_angle(v: Option<f64>) -> String {
    v.map(|d| format!("{:>7.1}", d)).unwrap_or_else(|| "      –".into())
}

fn print_frames(frames: &[FrameSample]) {
    println!("{:<6} {:>8} {:>7} {:>7} {:>7}  {}", "Frame", "Time ms", "Elbow", "Tilt", "Hip", "Flags");
    println!("{}", "─".repeat(72));
    for f in frames {
        let flags: Vec<&str> = f.flags.iter().map(|fl| fl.issue.as_str()).collect();
        println!(
            "{:<6} {:>8} {} {} {}  {}{}",
            f.frame_index,
            f.timestamp_ms,
            fmt_angle(f.angles.elbow_slot_deg),
            fmt_angle(f.angles.shoulder_tilt_deg),
            fmt_angle(f.angles.hip_rotation_deg),
            flags.join(", "),
            if f.is_contact { "  ◆ contact" } else { "" }
        );
    }
}
