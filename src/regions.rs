//! Scoring-region builder: which frames are eligible for scoring.
//!
//! Eligibility is derived from the reference labeling alone. A collar
//! `[b - c, b + c)` around every reference boundary (onset and offset of
//! every segment) is excluded, absorbing annotation imprecision at turn
//! boundaries. A reference segment shorter than `2c` is therefore excluded
//! in its entirety; that is an intended property of collar scoring.
//!
//! With `exclude_overlap`, frames whose reference label holds two or more
//! speakers are additionally removed.

use crate::frames::{FrameLabel, Timeline};
use crate::interval::Interval;
use crate::model::{Diarization, ScoringConfig};

/// Boolean mask aligned to the discretizer's frame sequence; `true` marks a
/// frame that counts for scoring. Frames are tested by the same
/// frame-start rule the discretizer uses.
#[must_use]
pub fn eligible_mask(
    reference: &Diarization,
    reference_labels: &[FrameLabel],
    timeline: &Timeline,
    config: &ScoringConfig,
) -> Vec<bool> {
    debug_assert_eq!(reference_labels.len(), timeline.n_frames);

    if timeline.n_frames == 0 {
        return Vec::new();
    }

    let mut mask = vec![false; timeline.n_frames];
    let span = Interval {
        onset_sec: 0.0,
        offset_sec: timeline.duration_sec(),
    };

    for region in span.subtract(&collar_windows(reference, config.collar_sec)) {
        let begin = timeline.frame_index_at_or_after(region.onset_sec);
        let end = timeline
            .frame_index_at_or_after(region.offset_sec)
            .min(timeline.n_frames);
        for eligible in &mut mask[begin..end] {
            *eligible = true;
        }
    }

    if config.exclude_overlap {
        for (eligible, label) in mask.iter_mut().zip(reference_labels) {
            if label.count_ones() >= 2 {
                *eligible = false;
            }
        }
    }

    mask
}

/// One exclusion window per reference boundary. Empty when the collar is
/// zero (a zero-width window excludes nothing).
fn collar_windows(reference: &Diarization, collar_sec: f64) -> Vec<Interval> {
    if collar_sec <= 0.0 {
        return Vec::new();
    }
    let mut windows = Vec::with_capacity(reference.segments().len() * 2);
    for segment in reference.segments() {
        for boundary in [segment.onset_sec, segment.offset_sec] {
            windows.push(Interval {
                onset_sec: boundary - collar_sec,
                offset_sec: boundary + collar_sec,
            });
        }
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::eligible_mask;
    use crate::frames::{discretize, SpeakerTable, Timeline};
    use crate::model::{Diarization, ScoringConfig, Segment};

    fn diar(segments: &[(&str, f64, f64)]) -> Diarization {
        Diarization::new(
            segments
                .iter()
                .map(|(speaker, onset, offset)| {
                    Segment::new("rec1", *speaker, *onset, *offset).expect("valid segment")
                })
                .collect(),
        )
        .expect("valid diarization")
    }

    fn config(collar_sec: f64, exclude_overlap: bool) -> ScoringConfig {
        ScoringConfig {
            collar_sec,
            exclude_overlap,
            frame_width_sec: 0.01,
        }
    }

    fn mask_for(reference: &Diarization, config: &ScoringConfig) -> Vec<bool> {
        let timeline = Timeline::spanning(reference, &Diarization::default(), 0.01);
        let speakers = SpeakerTable::from_diarization(reference).expect("table");
        let labels = discretize(reference, &speakers, &timeline);
        eligible_mask(reference, &labels, &timeline, config)
    }

    fn eligible_count(mask: &[bool]) -> usize {
        mask.iter().filter(|&&e| e).count()
    }

    #[test]
    fn zero_collar_keeps_every_frame() {
        let reference = diar(&[("A", 0.0, 2.0)]);
        let mask = mask_for(&reference, &config(0.0, false));
        assert_eq!(mask.len(), 200);
        assert_eq!(eligible_count(&mask), 200);
    }

    #[test]
    fn collar_excludes_a_window_around_each_boundary() {
        let reference = diar(&[("A", 1.0, 3.0)]);
        let mask = mask_for(&reference, &config(0.25, false));
        // Excluded: [0.75, 1.25) and [2.75, 3.25); timeline ends at 3.0.
        let timeline = Timeline {
            frame_width_sec: 0.01,
            n_frames: mask.len(),
        };
        for (index, eligible) in mask.iter().enumerate() {
            let start = timeline.frame_start_sec(index);
            let in_collar = (0.75..1.25).contains(&start) || start >= 2.75;
            assert_eq!(
                *eligible, !in_collar,
                "frame {index} (start {start}) eligibility"
            );
        }
        // 3.0s of timeline, minus 0.5s around onset and 0.25s before offset.
        assert_eq!(eligible_count(&mask), 225);
    }

    #[test]
    fn widening_the_collar_never_adds_eligible_frames() {
        let reference = diar(&[("A", 0.5, 2.0), ("B", 2.5, 4.0)]);
        let none = eligible_count(&mask_for(&reference, &config(0.0, false)));
        let narrow = eligible_count(&mask_for(&reference, &config(0.1, false)));
        let wide = eligible_count(&mask_for(&reference, &config(0.25, false)));
        assert!(none >= narrow);
        assert!(narrow >= wide);
    }

    #[test]
    fn segment_shorter_than_twice_the_collar_is_fully_excluded() {
        // [1.0, 1.4) with a 250ms collar: windows [0.75, 1.25) and
        // [1.15, 1.65) jointly cover the whole segment.
        let reference = diar(&[("A", 1.0, 1.4)]);
        let timeline = Timeline::spanning(&reference, &Diarization::default(), 0.01);
        let mask = mask_for(&reference, &config(0.25, false));
        for index in 0..mask.len() {
            let start = timeline.frame_start_sec(index);
            if (1.0..1.4).contains(&start) {
                assert!(!mask[index], "frame at {start} should be excluded");
            }
        }
    }

    #[test]
    fn overlap_exclusion_removes_multi_speaker_frames() {
        let reference = diar(&[("A", 0.0, 1.0), ("B", 0.4, 0.6)]);
        let timeline = Timeline::spanning(&reference, &Diarization::default(), 0.01);
        let mask = mask_for(&reference, &config(0.0, true));
        for index in 0..mask.len() {
            let start = timeline.frame_start_sec(index);
            assert_eq!(
                mask[index],
                !(0.4..0.6).contains(&start),
                "frame at {start}"
            );
        }
        assert_eq!(eligible_count(&mask), 80);
    }

    #[test]
    fn empty_reference_with_empty_timeline_yields_empty_mask() {
        let mask = mask_for(&Diarization::default(), &config(0.25, false));
        assert!(mask.is_empty());
    }

    #[test]
    fn collar_at_recording_start_clips_to_the_timeline() {
        let reference = diar(&[("A", 0.0, 1.0)]);
        let mask = mask_for(&reference, &config(0.25, false));
        // [−0.25, 0.25) around the onset excludes the first 25 frames only.
        assert!(!mask[0]);
        assert!(!mask[24]);
        assert!(mask[25]);
    }
}
