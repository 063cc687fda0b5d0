//! Scoring entry points: single recordings, batches, and the confusion
//! matrix surface used by reporting.
//!
//! Scoring is embarrassingly parallel at recording granularity; a batch
//! fans recordings out over plain worker threads with results collected on
//! an `mpsc` channel. One recording's failure never poisons the others
//! unless the caller asks for fail-fast.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::der;
use crate::error::{DsError, DsResult};
use crate::frames::{discretize, SpeakerTable, Timeline};
use crate::metrics;
use crate::model::{
    BatchReport, Diarization, ExcludedRecording, MetricResult, ScoringConfig, Weighting,
};
use crate::regions::eligible_mask;
use crate::table::{ConfusionMatrix, ContingencyTable};

/// One recording's pair of labelings, ready for scoring.
#[derive(Debug, Clone)]
pub struct RecordingPair {
    pub recording_id: String,
    pub reference: Diarization,
    pub system: Diarization,
}

/// Options for [`score_batch`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub config: ScoringConfig,
    pub weighting: Weighting,
    /// Worker threads. 1 scores sequentially.
    pub jobs: usize,
    /// Abort the whole batch on the first failed recording instead of
    /// excluding it.
    pub fail_fast: bool,
    /// When set to `true` (e.g. from a Ctrl+C handler), recordings that
    /// have not started yet are skipped and reported as cancelled.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            config: ScoringConfig::default(),
            weighting: Weighting::Duration,
            jobs: 1,
            fail_fast: false,
            cancel: None,
        }
    }
}

/// Score one recording: reference labeling against system labeling.
///
/// Undefined quantities degrade to `None` fields with a logged reason (DER
/// without scorable reference speech, every metric when no frame survives
/// the exclusions); hard input violations fail with an error.
pub fn score_recording(
    reference: &Diarization,
    system: &Diarization,
    recording_id: &str,
    config: &ScoringConfig,
) -> DsResult<MetricResult> {
    config.validate()?;
    for (side, labeling) in [("reference", reference), ("system", system)] {
        if let Some(actual) = labeling.recording_id()
            && actual != recording_id
        {
            return Err(DsError::InvalidRequest(format!(
                "{side} labeling belongs to recording `{actual}`, expected `{recording_id}`"
            )));
        }
    }

    let ref_speakers = SpeakerTable::from_diarization(reference)?;
    let sys_speakers = SpeakerTable::from_diarization(system)?;
    let timeline = Timeline::spanning(reference, system, config.frame_width_sec);

    let ref_labels = discretize(reference, &ref_speakers, &timeline);
    let sys_labels = discretize(system, &sys_speakers, &timeline);
    let mask = eligible_mask(reference, &ref_labels, &timeline, config);
    let eligible_frames = mask.iter().filter(|&&e| e).count();

    let table = ContingencyTable::build(&ref_labels, &sys_labels, &mask);
    let clustering = metrics::evaluate(&table);
    if clustering.is_none() {
        tracing::warn!(
            recording_id,
            "no eligible frames; clustering metrics are undefined"
        );
    }

    let mut result = MetricResult::empty(recording_id);
    result.eligible_sec = eligible_frames as f64 * config.frame_width_sec;
    if let Some(scores) = clustering {
        result.b3_precision = Some(scores.b3_precision);
        result.b3_recall = Some(scores.b3_recall);
        result.b3_f1 = Some(scores.b3_f1);
        result.gkt_ref_sys = Some(scores.gkt_ref_sys);
        result.gkt_sys_ref = Some(scores.gkt_sys_ref);
        result.h_ref_sys = Some(scores.h_ref_sys);
        result.mi = Some(scores.mi);
        result.nmi = Some(scores.nmi);
    }

    match der::evaluate(
        recording_id,
        &ref_labels,
        &sys_labels,
        &mask,
        &timeline,
        ref_speakers.len(),
        sys_speakers.len(),
    ) {
        Ok(components) => {
            result.der = Some(components.der_pct);
            result.scored_speech_sec = components.scored_speech_sec;
            result.miss_sec = components.miss_sec;
            result.falarm_sec = components.falarm_sec;
            result.speaker_error_sec = components.speaker_error_sec;
        }
        Err(error @ DsError::EmptyReference { .. }) => {
            tracing::warn!(
                recording_id,
                code = error.error_code(),
                "{error}; reporting DER as undefined"
            );
        }
        Err(error) => return Err(error),
    }

    Ok(result)
}

/// Frame-level confusion matrix between the two labelings, for external
/// reporting. Uses the same discretization and scoring-region rules as
/// [`score_recording`]; pass a zero collar to tabulate every frame.
pub fn confusion_matrix(
    reference: &Diarization,
    system: &Diarization,
    recording_id: &str,
    config: &ScoringConfig,
    normalize: bool,
) -> DsResult<ConfusionMatrix> {
    config.validate()?;
    let ref_speakers = SpeakerTable::from_diarization(reference)?;
    let sys_speakers = SpeakerTable::from_diarization(system)?;
    let timeline = Timeline::spanning(reference, system, config.frame_width_sec);

    let ref_labels = discretize(reference, &ref_speakers, &timeline);
    let sys_labels = discretize(system, &sys_speakers, &timeline);
    let mask = eligible_mask(reference, &ref_labels, &timeline, config);

    let table = ContingencyTable::build(&ref_labels, &sys_labels, &mask);
    Ok(ConfusionMatrix::from_table(
        recording_id,
        &table,
        &ref_speakers,
        &sys_speakers,
        normalize,
    ))
}

/// Score a batch of recordings and aggregate the per-recording metrics.
///
/// Speaker id sets must be disjoint across recordings on each side; reuse
/// is rejected up front as [`DsError::SpeakerIdCollision`].
pub fn score_batch(pairs: Vec<RecordingPair>, options: &BatchOptions) -> DsResult<BatchReport> {
    options.config.validate()?;
    validate_disjoint_speakers(&pairs)?;

    let started_at = Utc::now().to_rfc3339();
    let cancel = options
        .cancel
        .clone()
        .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));

    let outcomes = if options.jobs <= 1 || pairs.len() <= 1 {
        score_sequentially(pairs, options, &cancel)
    } else {
        score_on_workers(pairs, options, &cancel)
    };

    let mut results = Vec::new();
    let mut excluded = Vec::new();
    for (recording_id, outcome) in outcomes {
        match outcome {
            JobOutcome::Done(result) => results.push(result),
            JobOutcome::Failed(error) => {
                if options.fail_fast {
                    return Err(error);
                }
                tracing::warn!(
                    recording_id = %recording_id,
                    code = error.error_code(),
                    "excluding recording from batch: {error}"
                );
                excluded.push(ExcludedRecording {
                    recording_id,
                    error_code: error.error_code().to_owned(),
                    reason: error.to_string(),
                });
            }
            JobOutcome::Cancelled => {
                tracing::info!(recording_id = %recording_id, "recording skipped: batch cancelled");
                excluded.push(ExcludedRecording {
                    recording_id,
                    error_code: "DS-CANCELLED".to_owned(),
                    reason: "batch cancelled before this recording started".to_owned(),
                });
            }
        }
    }

    if !excluded.is_empty() {
        tracing::warn!(
            excluded = excluded.len(),
            scored = results.len(),
            "aggregate computed without the excluded recordings"
        );
    }

    let aggregate = aggregate(&results, options.weighting);
    Ok(BatchReport {
        started_at_rfc3339: started_at,
        finished_at_rfc3339: Utc::now().to_rfc3339(),
        weighting: options.weighting,
        results,
        aggregate,
        excluded,
    })
}

enum JobOutcome {
    Done(MetricResult),
    Failed(DsError),
    Cancelled,
}

fn score_pair(pair: &RecordingPair, config: &ScoringConfig) -> JobOutcome {
    match score_recording(&pair.reference, &pair.system, &pair.recording_id, config) {
        Ok(result) => JobOutcome::Done(result),
        Err(error) => JobOutcome::Failed(error),
    }
}

fn score_sequentially(
    pairs: Vec<RecordingPair>,
    options: &BatchOptions,
    cancel: &AtomicBool,
) -> Vec<(String, JobOutcome)> {
    pairs
        .into_iter()
        .map(|pair| {
            let outcome = if cancel.load(Ordering::SeqCst) {
                JobOutcome::Cancelled
            } else {
                score_pair(&pair, &options.config)
            };
            (pair.recording_id, outcome)
        })
        .collect()
}

fn score_on_workers(
    pairs: Vec<RecordingPair>,
    options: &BatchOptions,
    cancel: &Arc<AtomicBool>,
) -> Vec<(String, JobOutcome)> {
    let n_pairs = pairs.len();
    let n_workers = options.jobs.min(n_pairs);
    let queue: Arc<Mutex<Vec<(usize, RecordingPair)>>> =
        Arc::new(Mutex::new(pairs.into_iter().enumerate().rev().collect()));
    let (tx, rx) = mpsc::channel::<(usize, String, JobOutcome)>();

    std::thread::scope(|scope| {
        for _ in 0..n_workers {
            let queue = Arc::clone(&queue);
            let cancel = Arc::clone(cancel);
            let tx = tx.clone();
            let config = options.config;
            scope.spawn(move || {
                loop {
                    let job = queue.lock().expect("queue lock").pop();
                    let Some((index, pair)) = job else { break };
                    let outcome = if cancel.load(Ordering::SeqCst) {
                        JobOutcome::Cancelled
                    } else {
                        score_pair(&pair, &config)
                    };
                    if tx.send((index, pair.recording_id, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut outcomes: Vec<Option<(String, JobOutcome)>> =
            (0..n_pairs).map(|_| None).collect();
        while let Ok((index, recording_id, outcome)) = rx.recv() {
            outcomes[index] = Some((recording_id, outcome));
        }
        outcomes.into_iter().flatten().collect()
    })
}

/// Duplicate speaker ids across recordings break the corpus-level
/// disjointness assumption; checked per side.
fn validate_disjoint_speakers(pairs: &[RecordingPair]) -> DsResult<()> {
    let sides: [fn(&RecordingPair) -> &Diarization; 2] =
        [|pair| &pair.reference, |pair| &pair.system];
    for side in sides {
        let mut first_seen: BTreeMap<String, String> = BTreeMap::new();
        for pair in pairs {
            for speaker in side(pair).speaker_ids() {
                match first_seen.get(speaker) {
                    None => {
                        first_seen.insert(speaker.to_owned(), pair.recording_id.clone());
                    }
                    Some(first) if *first != pair.recording_id => {
                        return Err(DsError::SpeakerIdCollision {
                            speaker: speaker.to_owned(),
                            first: first.clone(),
                            second: pair.recording_id.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
    }
    Ok(())
}

/// Corpus-level summary of the successful recordings.
fn aggregate(results: &[MetricResult], weighting: Weighting) -> Option<MetricResult> {
    if results.is_empty() {
        return None;
    }

    let mut summary = MetricResult::empty("OVERALL");
    for result in results {
        summary.scored_speech_sec += result.scored_speech_sec;
        summary.miss_sec += result.miss_sec;
        summary.falarm_sec += result.falarm_sec;
        summary.speaker_error_sec += result.speaker_error_sec;
        summary.eligible_sec += result.eligible_sec;
    }

    summary.der = match weighting {
        // Total error time over total scored speech time; identical to
        // weighting each recording's DER by its scored speech duration.
        Weighting::Duration => (summary.scored_speech_sec > 0.0).then(|| {
            100.0 * (summary.miss_sec + summary.falarm_sec + summary.speaker_error_sec)
                / summary.scored_speech_sec
        }),
        Weighting::Uniform => mean(results.iter().map(|r| (r.der, 1.0))),
    };

    let weight_of = |result: &MetricResult| match weighting {
        Weighting::Duration => result.eligible_sec,
        Weighting::Uniform => 1.0,
    };
    summary.b3_precision = mean(results.iter().map(|r| (r.b3_precision, weight_of(r))));
    summary.b3_recall = mean(results.iter().map(|r| (r.b3_recall, weight_of(r))));
    summary.b3_f1 = mean(results.iter().map(|r| (r.b3_f1, weight_of(r))));
    summary.gkt_ref_sys = mean(results.iter().map(|r| (r.gkt_ref_sys, weight_of(r))));
    summary.gkt_sys_ref = mean(results.iter().map(|r| (r.gkt_sys_ref, weight_of(r))));
    summary.h_ref_sys = mean(results.iter().map(|r| (r.h_ref_sys, weight_of(r))));
    summary.mi = mean(results.iter().map(|r| (r.mi, weight_of(r))));
    summary.nmi = mean(results.iter().map(|r| (r.nmi, weight_of(r))));

    Some(summary)
}

/// Weighted mean over the defined values; `None` when nothing contributes.
fn mean(values: impl Iterator<Item = (Option<f64>, f64)>) -> Option<f64> {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (value, weight) in values {
        if let Some(value) = value
            && weight > 0.0
        {
            numerator += value * weight;
            denominator += weight;
        }
    }
    (denominator > 0.0).then(|| numerator / denominator)
}
