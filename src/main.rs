use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use diascore::cli::{Cli, Command, ConfusionMatrixArgs, ScoreArgs, ScoreBatchArgs, ShutdownController};
use diascore::model::{BatchReport, Diarization, ExcludedRecording, ScoringConfig};
use diascore::score::{confusion_matrix, score_batch, BatchOptions, RecordingPair};
use diascore::{report, rttm, DsError, DsResult};

fn main() {
    diascore::logging::init();

    if let Err(error) = run() {
        if ShutdownController::is_shutting_down() {
            eprintln!("interrupted");
            std::process::exit(ShutdownController::signal_exit_code());
        }
        eprintln!("error: {error}");
        std::process::exit(1);
    }

    if ShutdownController::is_shutting_down() {
        std::process::exit(ShutdownController::signal_exit_code());
    }
}

fn run() -> DsResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Score(args) => run_score(&args),
        Command::ScoreBatch(args) => run_score_batch(&args),
        Command::ConfusionMatrix(args) => run_confusion_matrix(&args),
    }
}

fn run_score(args: &ScoreArgs) -> DsResult<()> {
    let pairs = pairs_from_files(&args.ref_rttm, &args.sys_rttm)?;
    let options = BatchOptions {
        config: args.scoring.to_config(),
        ..BatchOptions::default()
    };
    let batch = score_batch(pairs, &options)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&batch)?);
        return Ok(());
    }

    if batch.results.len() > 1 {
        for result in &batch.results {
            println!("[{}]", result.recording_id);
            print!("{}", report::format_metric_lines(result));
            println!();
        }
    }
    match (&batch.aggregate, batch.results.as_slice()) {
        (Some(aggregate), results) if results.len() > 1 => {
            println!("[OVERALL]");
            print!("{}", report::format_metric_lines(aggregate));
        }
        (_, [only]) => print!("{}", report::format_metric_lines(only)),
        _ => {
            return Err(DsError::InvalidRequest(
                "no recording was scored".to_owned(),
            ));
        }
    }
    Ok(())
}

/// Pair up every recording id present in both RTTM files.
fn pairs_from_files(ref_rttm: &Path, sys_rttm: &Path) -> DsResult<Vec<RecordingPair>> {
    let mut reference = rttm::load_diarizations(ref_rttm)?;
    let mut system = rttm::load_diarizations(sys_rttm)?;

    let ref_ids: BTreeSet<String> = reference.keys().cloned().collect();
    let sys_ids: BTreeSet<String> = system.keys().cloned().collect();
    for only_ref in ref_ids.difference(&sys_ids) {
        tracing::warn!(recording_id = %only_ref, "recording missing from system RTTM; skipping");
    }
    for only_sys in sys_ids.difference(&ref_ids) {
        tracing::warn!(recording_id = %only_sys, "recording missing from reference RTTM; skipping");
    }

    let common: Vec<String> = ref_ids.intersection(&sys_ids).cloned().collect();
    if common.is_empty() {
        return Err(DsError::InvalidRequest(format!(
            "no recording id is present in both `{}` and `{}`",
            ref_rttm.display(),
            sys_rttm.display()
        )));
    }

    Ok(common
        .into_iter()
        .map(|recording_id| {
            let reference = reference.remove(&recording_id).expect("intersection member");
            let system = system.remove(&recording_id).expect("intersection member");
            RecordingPair {
                recording_id,
                reference,
                system,
            }
        })
        .collect())
}

fn run_score_batch(args: &ScoreBatchArgs) -> DsResult<()> {
    let additional = report::parse_additional_columns(&args.additional_columns)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    if let Err(error) = ShutdownController::install(Some(Box::new(move || {
        handler_flag.store(true, Ordering::SeqCst);
    }))) {
        tracing::warn!("failed to install Ctrl+C handler: {error}");
    }

    let file_ids = match &args.script {
        Some(script) => read_script_ids(script)?,
        None => {
            let ref_ids = rttm_ids_in_dir(&args.ref_rttm_dir)?;
            let sys_ids = rttm_ids_in_dir(&args.sys_rttm_dir)?;
            ref_ids.intersection(&sys_ids).cloned().collect()
        }
    };
    if file_ids.is_empty() {
        return Err(DsError::InvalidRequest(
            "no file ids to score; check the RTTM directories or the script file".to_owned(),
        ));
    }

    let mut pairs = Vec::with_capacity(file_ids.len());
    let mut excluded_at_load: Vec<ExcludedRecording> = Vec::new();
    for file_id in &file_ids {
        match load_pair(file_id, &args.ref_rttm_dir, &args.sys_rttm_dir) {
            Ok(pair) => pairs.push(pair),
            Err(error) => {
                if args.fail_fast {
                    return Err(error);
                }
                tracing::warn!(
                    file_id = %file_id,
                    code = error.error_code(),
                    "excluding recording from batch: {error}"
                );
                excluded_at_load.push(ExcludedRecording {
                    recording_id: file_id.clone(),
                    error_code: error.error_code().to_owned(),
                    reason: error.to_string(),
                });
            }
        }
    }

    let options = BatchOptions {
        config: args.scoring.to_config(),
        weighting: args.weighting,
        jobs: args.jobs.max(1),
        fail_fast: args.fail_fast,
        cancel: Some(cancel),
    };
    let mut batch = score_batch(pairs, &options)?;
    batch.excluded.splice(0..0, excluded_at_load);

    report::write_dataframe(&args.scores_out, &batch, &additional)?;
    log_batch_summary(&batch, &args.scores_out);
    Ok(())
}

fn log_batch_summary(batch: &BatchReport, scores_out: &Path) {
    tracing::info!(
        scored = batch.results.len(),
        excluded = batch.excluded.len(),
        scores = %scores_out.display(),
        "batch scoring finished"
    );
    if let Some(aggregate) = &batch.aggregate {
        match aggregate.der {
            Some(der) => tracing::info!("overall DER: {der:.2}"),
            None => tracing::info!("overall DER undefined"),
        }
    }
}

/// File ids (`<id>.rttm` basenames) in a directory.
fn rttm_ids_in_dir(dir: &Path) -> DsResult<BTreeSet<String>> {
    let mut ids = BTreeSet::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("rttm")
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            ids.insert(stem.to_owned());
        }
    }
    Ok(ids)
}

fn read_script_ids(script: &Path) -> DsResult<Vec<String>> {
    let text = std::fs::read_to_string(script)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Load `<dir>/<file_id>.rttm` from both directories and pair them up.
fn load_pair(file_id: &str, ref_dir: &Path, sys_dir: &Path) -> DsResult<RecordingPair> {
    let reference = load_single_recording(file_id, &ref_dir.join(format!("{file_id}.rttm")))?;
    let system = load_single_recording(file_id, &sys_dir.join(format!("{file_id}.rttm")))?;

    let recording_id = reference
        .recording_id()
        .or_else(|| system.recording_id())
        .unwrap_or(file_id)
        .to_owned();
    Ok(RecordingPair {
        recording_id,
        reference,
        system,
    })
}

/// A per-file-id RTTM must describe one recording; an empty file is an
/// empty labeling.
fn load_single_recording(file_id: &str, path: &Path) -> DsResult<Diarization> {
    let mut by_recording = rttm::load_diarizations(path)?;
    match by_recording.len() {
        0 => Ok(Diarization::default()),
        1 => {
            let (recording_id, diarization) =
                by_recording.pop_first().expect("single recording");
            if recording_id != file_id {
                tracing::debug!(
                    file_id,
                    recording_id = %recording_id,
                    path = %path.display(),
                    "file id and internal recording id differ"
                );
            }
            Ok(diarization)
        }
        n => Err(DsError::InvalidRequest(format!(
            "`{}` contains {n} recordings; batch scoring expects one per file",
            path.display()
        ))),
    }
}

fn run_confusion_matrix(args: &ConfusionMatrixArgs) -> DsResult<()> {
    let pairs = pairs_from_files(&args.ref_rttm, &args.sys_rttm)?;
    let [pair] = pairs.as_slice() else {
        return Err(DsError::InvalidRequest(format!(
            "confusion-matrix expects exactly one common recording, found {}",
            pairs.len()
        )));
    };

    // No collar: the matrix tabulates every frame of the shared timeline.
    let config = ScoringConfig {
        collar_sec: 0.0,
        exclude_overlap: false,
        frame_width_sec: args.step,
    };
    let matrix = confusion_matrix(
        &pair.reference,
        &pair.system,
        &pair.recording_id,
        &config,
        args.norm,
    )?;
    print!("{}", report::format_confusion_matrix(&matrix));
    Ok(())
}
