//! Frame discretization: reduce a variable-resolution interval labeling to a
//! fixed-resolution sequence of frame labels.
//!
//! Both labelings of a recording are discretized onto one shared timeline
//! covering `[0, max_end)` where `max_end` is the latest offset across
//! reference *and* system segments; a span present on only one side scores
//! as silence on the other.
//!
//! Frame-membership rule, applied identically to reference and system: a
//! frame carries a speaker exactly when the frame's *start* offset falls
//! inside the speaker's segment `[onset, offset)`. The rule is fixed here
//! and nowhere else; a different rule on either side would bias the
//! miss/false-alarm balance at boundaries.

use crate::error::{DsError, DsResult};
use crate::model::Diarization;

/// A frame label: bitmask over a labeling's [`SpeakerTable`] indices.
/// 0 is silence, a single bit a lone speaker, multiple bits simultaneous
/// speech by that specific speaker subset.
pub type FrameLabel = u64;

/// Hard cap on distinct speakers per labeling per recording, from the
/// bitmask label representation.
pub const MAX_SPEAKERS: usize = 64;

/// Maps a labeling's speaker ids to stable bit indices (sorted order).
#[derive(Debug, Clone)]
pub struct SpeakerTable {
    ids: Vec<String>,
}

impl SpeakerTable {
    pub fn from_diarization(diarization: &Diarization) -> DsResult<Self> {
        let ids: Vec<String> = diarization
            .speaker_ids()
            .into_iter()
            .map(str::to_owned)
            .collect();
        if ids.len() > MAX_SPEAKERS {
            return Err(DsError::InvalidRequest(format!(
                "labeling has {} speakers; at most {MAX_SPEAKERS} are supported per recording",
                ids.len()
            )));
        }
        Ok(Self { ids })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, speaker_id: &str) -> Option<usize> {
        self.ids.binary_search_by(|id| id.as_str().cmp(speaker_id)).ok()
    }

    #[must_use]
    pub fn id(&self, index: usize) -> &str {
        &self.ids[index]
    }

    /// Speaker ids for the set bits of `label`, in bit order.
    #[must_use]
    pub fn ids_for_label(&self, label: FrameLabel) -> Vec<&str> {
        let mut ids = Vec::with_capacity(label.count_ones() as usize);
        let mut bits = label;
        while bits != 0 {
            let index = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            ids.push(self.id(index));
        }
        ids
    }
}

/// The shared frame grid for one recording.
#[derive(Debug, Clone, Copy)]
pub struct Timeline {
    pub frame_width_sec: f64,
    pub n_frames: usize,
}

impl Timeline {
    /// Grid spanning both labelings. `frame_width_sec` must already be
    /// validated positive.
    #[must_use]
    pub fn spanning(reference: &Diarization, system: &Diarization, frame_width_sec: f64) -> Self {
        let max_end = reference.max_offset_sec().max(system.max_offset_sec());
        let mut timeline = Self {
            frame_width_sec,
            n_frames: 0,
        };
        timeline.n_frames = timeline.frame_index_at_or_after(max_end);
        timeline
    }

    #[must_use]
    pub fn frame_start_sec(&self, index: usize) -> f64 {
        index as f64 * self.frame_width_sec
    }

    #[must_use]
    pub fn duration_sec(&self) -> f64 {
        self.n_frames as f64 * self.frame_width_sec
    }

    /// Index of the first frame whose start offset is `>= t_sec`.
    ///
    /// Computed against the actual float grid (`i * w`), not by dividing and
    /// rounding: `0.8 / 0.01` lands a hair above 80.0, and a naive `ceil`
    /// would shift every such boundary by a full frame.
    #[must_use]
    pub fn frame_index_at_or_after(&self, t_sec: f64) -> usize {
        if t_sec <= 0.0 {
            return 0;
        }
        let mut index = (t_sec / self.frame_width_sec).ceil() as usize;
        while index > 0 && self.frame_start_sec(index - 1) >= t_sec {
            index -= 1;
        }
        while self.frame_start_sec(index) < t_sec {
            index += 1;
        }
        index
    }
}

/// Frame labels for one labeling on the shared timeline.
///
/// Pure and deterministic: identical inputs always yield identical labels.
#[must_use]
pub fn discretize(
    diarization: &Diarization,
    speakers: &SpeakerTable,
    timeline: &Timeline,
) -> Vec<FrameLabel> {
    let mut labels = vec![0u64; timeline.n_frames];
    for segment in diarization.segments() {
        let Some(index) = speakers.index_of(&segment.speaker_id) else {
            // SpeakerTable was built from this diarization; missing ids
            // cannot happen for well-formed inputs.
            continue;
        };
        let bit = 1u64 << index;
        let begin = timeline.frame_index_at_or_after(segment.onset_sec);
        let end = timeline
            .frame_index_at_or_after(segment.offset_sec)
            .min(timeline.n_frames);
        for label in &mut labels[begin..end] {
            *label |= bit;
        }
    }
    labels
}
