use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Args, Parser, Subcommand};

use crate::error::{DsError, DsResult};
use crate::model::{ScoringConfig, Weighting};

// ---------------------------------------------------------------------------
// Graceful Ctrl+C shutdown
// ---------------------------------------------------------------------------

/// Global flag indicating that a shutdown signal has been received.
static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);

/// Coordinates graceful Ctrl+C shutdown.
///
/// When a signal is received the controller sets a global `AtomicBool`,
/// which long-running work can poll via
/// [`ShutdownController::is_shutting_down`]. Callers may also register a
/// callback that fires on signal receipt (e.g. to flip the batch scorer's
/// cancellation flag so not-yet-started recordings are skipped).
pub struct ShutdownController;

impl ShutdownController {
    /// Install the Ctrl+C signal handler.
    ///
    /// `on_signal` is an optional callback invoked from the signal-handler
    /// context. Returns `Ok(())` on success. Errors are non-fatal (signal
    /// handling is best-effort), so callers may choose to log and continue.
    pub fn install(on_signal: Option<Box<dyn Fn() + Send + Sync + 'static>>) -> DsResult<()> {
        ctrlc::set_handler(move || {
            SHUTDOWN_FLAG.store(true, Ordering::SeqCst);
            tracing::info!("shutdown signal received (Ctrl+C)");

            if let Some(ref callback) = on_signal {
                callback();
            }
        })
        .map_err(|e| DsError::Io(std::io::Error::other(format!("ctrlc handler: {e}"))))?;
        Ok(())
    }

    /// Returns `true` once a Ctrl+C (or programmatic trigger) has been
    /// received.
    #[must_use]
    pub fn is_shutting_down() -> bool {
        SHUTDOWN_FLAG.load(Ordering::SeqCst)
    }

    /// Programmatically trigger the shutdown flag (useful for testing and
    /// internal cancel paths).
    pub fn trigger_shutdown() {
        SHUTDOWN_FLAG.store(true, Ordering::SeqCst);
    }

    /// Reset the shutdown flag (for testing only).
    #[cfg(test)]
    pub fn reset() {
        SHUTDOWN_FLAG.store(false, Ordering::SeqCst);
    }

    /// The exit code the binary should use when exiting due to a signal.
    #[must_use]
    pub const fn signal_exit_code() -> i32 {
        130 // Convention: 128 + SIGINT(2)
    }
}

// ---------------------------------------------------------------------------
// Command line surface
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "diascore")]
#[command(about = "Score speaker diarization output against reference RTTM")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Score one pair of RTTM files and print the metrics.
    Score(ScoreArgs),
    /// Score every recording found in both a reference and a system RTTM
    /// directory, writing a tab-delimited dataframe.
    ScoreBatch(ScoreBatchArgs),
    /// Print the frame-level confusion matrix for one recording.
    ConfusionMatrix(ConfusionMatrixArgs),
}

/// Scoring knobs shared by the subcommands.
#[derive(Debug, Args)]
pub struct ScoringArgs {
    /// Collar size in seconds around reference boundaries excluded from
    /// scoring.
    #[arg(long, default_value_t = 0.25)]
    pub collar: f64,

    /// Exclude reference overlap regions from scoring.
    #[arg(long)]
    pub exclude_overlap: bool,

    /// Frame step size in seconds.
    #[arg(long, default_value_t = 0.01)]
    pub step: f64,
}

impl ScoringArgs {
    #[must_use]
    pub fn to_config(&self) -> ScoringConfig {
        ScoringConfig {
            collar_sec: self.collar,
            exclude_overlap: self.exclude_overlap,
            frame_width_sec: self.step,
        }
    }
}

#[derive(Debug, Args)]
pub struct ScoreArgs {
    /// Reference RTTM file.
    pub ref_rttm: PathBuf,

    /// System RTTM file.
    pub sys_rttm: PathBuf,

    #[command(flatten)]
    pub scoring: ScoringArgs,

    /// Emit the full report as pretty JSON instead of metric lines.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ScoreBatchArgs {
    /// Output dataframe path.
    pub scores_out: PathBuf,

    /// Directory of reference RTTM files.
    pub ref_rttm_dir: PathBuf,

    /// Directory of system RTTM files.
    pub sys_rttm_dir: PathBuf,

    /// Script file restricting scoring to the listed file ids (one per
    /// line). Default: every id present in both directories.
    #[arg(short = 'S', long)]
    pub script: Option<PathBuf>,

    #[command(flatten)]
    pub scoring: ScoringArgs,

    /// Worker threads.
    #[arg(short = 'j', long, default_value_t = 1)]
    pub jobs: usize,

    /// How per-recording metrics combine into the OVERALL row.
    #[arg(long, value_enum, default_value_t = Weighting::Duration)]
    pub weighting: Weighting,

    /// Abort on the first failed recording instead of excluding it.
    #[arg(long)]
    pub fail_fast: bool,

    /// Extra constant columns as semicolon-delimited CNAME=VAL pairs,
    /// e.g. `Corpus=AMI;NClusters=4`.
    #[arg(long, default_value = "")]
    pub additional_columns: String,
}

#[derive(Debug, Args)]
pub struct ConfusionMatrixArgs {
    /// Reference RTTM file.
    pub ref_rttm: PathBuf,

    /// System RTTM file.
    pub sys_rttm: PathBuf,

    /// Frame step size in seconds.
    #[arg(long, default_value_t = 0.01)]
    pub step: f64,

    /// Normalize each row to sum to 1.
    #[arg(long)]
    pub norm: bool,
}
