use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{DsError, DsResult};
use crate::interval::Interval;

/// A single speaker turn within one recording.
///
/// Times are in seconds; `offset_sec` is strictly greater than `onset_sec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub recording_id: String,
    pub speaker_id: String,
    pub onset_sec: f64,
    pub offset_sec: f64,
}

impl Segment {
    pub fn new(
        recording_id: impl Into<String>,
        speaker_id: impl Into<String>,
        onset_sec: f64,
        offset_sec: f64,
    ) -> DsResult<Self> {
        let recording_id = recording_id.into();
        let speaker_id = speaker_id.into();
        let context = format!("recording `{recording_id}`, speaker `{speaker_id}`");

        if !onset_sec.is_finite() || !offset_sec.is_finite() {
            return Err(DsError::invalid_segment(
                context,
                format!("non-finite times ({onset_sec}, {offset_sec})"),
            ));
        }
        if onset_sec < 0.0 {
            return Err(DsError::invalid_segment(
                context,
                format!("negative onset ({onset_sec})"),
            ));
        }
        if offset_sec <= onset_sec {
            return Err(DsError::invalid_segment(
                context,
                format!("offset ({offset_sec}) must be after onset ({onset_sec})"),
            ));
        }

        Ok(Self {
            recording_id,
            speaker_id,
            onset_sec,
            offset_sec,
        })
    }

    #[must_use]
    pub fn duration_sec(&self) -> f64 {
        self.offset_sec - self.onset_sec
    }

    #[must_use]
    pub fn interval(&self) -> Interval {
        Interval {
            onset_sec: self.onset_sec,
            offset_sec: self.offset_sec,
        }
    }
}

/// A validated speaker labeling for a single recording.
///
/// Construction enforces the domain invariants the scoring engine assumes:
/// every segment is well formed, all segments belong to the same recording,
/// and segments of the *same* speaker never overlap each other. Segments of
/// different speakers may overlap (simultaneous speech).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diarization {
    segments: Vec<Segment>,
}

impl Diarization {
    pub fn new(mut segments: Vec<Segment>) -> DsResult<Self> {
        for segment in &segments {
            // Re-run the Segment invariants so labelings deserialized or
            // assembled field-by-field still fail loudly at the boundary.
            Segment::new(
                segment.recording_id.clone(),
                segment.speaker_id.clone(),
                segment.onset_sec,
                segment.offset_sec,
            )?;
        }

        if let Some(first) = segments.first() {
            let recording_id = first.recording_id.clone();
            if let Some(stray) = segments.iter().find(|s| s.recording_id != recording_id) {
                return Err(DsError::InvalidRequest(format!(
                    "diarization mixes recordings `{recording_id}` and `{}`",
                    stray.recording_id
                )));
            }
        }

        segments.sort_by(|a, b| {
            a.onset_sec
                .total_cmp(&b.onset_sec)
                .then_with(|| a.speaker_id.cmp(&b.speaker_id))
        });

        // Same-speaker overlap is a hard violation of the data model, not a
        // condition to silently merge away.
        let mut last_by_speaker: BTreeMap<&str, &Segment> = BTreeMap::new();
        for segment in &segments {
            if let Some(previous) = last_by_speaker.get(segment.speaker_id.as_str())
                && previous.interval().overlap(segment.interval()).is_some()
            {
                return Err(DsError::invalid_segment(
                    format!(
                        "recording `{}`, speaker `{}`",
                        segment.recording_id, segment.speaker_id
                    ),
                    format!(
                        "segment [{}, {}) overlaps earlier segment [{}, {}) of the same speaker",
                        segment.onset_sec,
                        segment.offset_sec,
                        previous.onset_sec,
                        previous.offset_sec
                    ),
                ));
            }
            last_by_speaker.insert(segment.speaker_id.as_str(), segment);
        }

        Ok(Self { segments })
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The latest offset across all segments, or 0.0 for an empty labeling.
    #[must_use]
    pub fn max_offset_sec(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.offset_sec)
            .fold(0.0, f64::max)
    }

    /// The recording this labeling belongs to, if it has any segments.
    #[must_use]
    pub fn recording_id(&self) -> Option<&str> {
        self.segments.first().map(|s| s.recording_id.as_str())
    }

    /// Sorted, deduplicated speaker ids.
    #[must_use]
    pub fn speaker_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.segments.iter().map(|s| s.speaker_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Knobs controlling how a recording is scored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Forgiveness collar in seconds around every reference boundary.
    pub collar_sec: f64,
    /// Exclude reference overlap regions from scoring.
    pub exclude_overlap: bool,
    /// Frame step in seconds.
    pub frame_width_sec: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            collar_sec: 0.25,
            exclude_overlap: false,
            frame_width_sec: 0.01,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> DsResult<()> {
        if !self.frame_width_sec.is_finite() || self.frame_width_sec <= 0.0 {
            return Err(DsError::InvalidRequest(format!(
                "frame width must be positive, got {}",
                self.frame_width_sec
            )));
        }
        if !self.collar_sec.is_finite() || self.collar_sec < 0.0 {
            return Err(DsError::InvalidRequest(format!(
                "collar must be non-negative, got {}",
                self.collar_sec
            )));
        }
        Ok(())
    }
}

/// How per-recording metrics are combined into the corpus-level summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Weight each recording by its scored duration (DER aggregates as
    /// total error time over total scored speech time).
    Duration,
    /// Plain unweighted mean over recordings.
    Uniform,
}

impl Weighting {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Duration => "duration",
            Self::Uniform => "uniform",
        }
    }
}

/// Named scalar metrics for one recording (or the `OVERALL` aggregate).
///
/// Metric fields are `None` when the quantity is undefined for the input —
/// e.g. DER with zero scorable reference speech, or every clustering metric
/// when no frame survives the scoring-region exclusions. `None` is reported
/// as `null` in JSON and `NA` in dataframe output, never coerced to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub recording_id: String,
    /// Diarization error rate, in percent. May exceed 100.
    pub der: Option<f64>,
    pub b3_precision: Option<f64>,
    pub b3_recall: Option<f64>,
    pub b3_f1: Option<f64>,
    /// Goodman-Kruskal tau, reference predicting system.
    pub gkt_ref_sys: Option<f64>,
    /// Goodman-Kruskal tau, system predicting reference.
    pub gkt_sys_ref: Option<f64>,
    /// Conditional entropy H(ref|sys) in bits.
    pub h_ref_sys: Option<f64>,
    /// Mutual information in bits.
    pub mi: Option<f64>,
    pub nmi: Option<f64>,
    /// DER denominator: scored reference speech time in seconds.
    pub scored_speech_sec: f64,
    pub miss_sec: f64,
    pub falarm_sec: f64,
    pub speaker_error_sec: f64,
    /// Total duration of frames eligible for scoring.
    pub eligible_sec: f64,
}

impl MetricResult {
    #[must_use]
    pub fn empty(recording_id: impl Into<String>) -> Self {
        Self {
            recording_id: recording_id.into(),
            der: None,
            b3_precision: None,
            b3_recall: None,
            b3_f1: None,
            gkt_ref_sys: None,
            gkt_sys_ref: None,
            h_ref_sys: None,
            mi: None,
            nmi: None,
            scored_speech_sec: 0.0,
            miss_sec: 0.0,
            falarm_sec: 0.0,
            speaker_error_sec: 0.0,
            eligible_sec: 0.0,
        }
    }
}

/// A recording dropped from a batch, with the reason it was dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedRecording {
    pub recording_id: String,
    pub error_code: String,
    pub reason: String,
}

/// Outcome of scoring a batch of recordings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub started_at_rfc3339: String,
    pub finished_at_rfc3339: String,
    pub weighting: Weighting,
    pub results: Vec<MetricResult>,
    /// Corpus-level summary over the successful recordings, `None` when
    /// every recording failed or was cancelled.
    pub aggregate: Option<MetricResult>,
    pub excluded: Vec<ExcludedRecording>,
}
