//! Half-open time intervals and the exact arithmetic the scoring-region
//! builder needs: pairwise overlap, n-way union, and subtraction.
//!
//! Intervals are `[onset, offset)` with `offset > onset`. Unlike segments,
//! a bare interval may start before zero; collar windows around a boundary
//! near the start of a recording extend into negative time and are clipped
//! only when intersected with the timeline.

use crate::error::{DsError, DsResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub onset_sec: f64,
    pub offset_sec: f64,
}

impl Interval {
    pub fn new(onset_sec: f64, offset_sec: f64) -> DsResult<Self> {
        if !onset_sec.is_finite() || !offset_sec.is_finite() {
            return Err(DsError::invalid_segment(
                "interval",
                format!("non-finite endpoints ({onset_sec}, {offset_sec})"),
            ));
        }
        if offset_sec <= onset_sec {
            return Err(DsError::invalid_segment(
                "interval",
                format!("zero-length or inverted interval [{onset_sec}, {offset_sec})"),
            ));
        }
        Ok(Self {
            onset_sec,
            offset_sec,
        })
    }

    #[must_use]
    pub fn duration_sec(self) -> f64 {
        self.offset_sec - self.onset_sec
    }

    #[must_use]
    pub fn contains(self, t_sec: f64) -> bool {
        self.onset_sec <= t_sec && t_sec < self.offset_sec
    }

    /// The common sub-interval of `self` and `other`, or `None` when they
    /// are disjoint or merely touching.
    #[must_use]
    pub fn overlap(self, other: Self) -> Option<Self> {
        let onset = self.onset_sec.max(other.onset_sec);
        let offset = self.offset_sec.min(other.offset_sec);
        (onset < offset).then_some(Self {
            onset_sec: onset,
            offset_sec: offset,
        })
    }

    /// Merge touching and overlapping intervals into a minimal sorted list
    /// of disjoint intervals.
    #[must_use]
    pub fn union(intervals: &[Self]) -> Vec<Self> {
        let mut sorted = intervals.to_vec();
        sorted.sort_by(|a, b| a.onset_sec.total_cmp(&b.onset_sec));

        let mut merged: Vec<Self> = Vec::with_capacity(sorted.len());
        for interval in sorted {
            match merged.last_mut() {
                Some(last) if interval.onset_sec <= last.offset_sec => {
                    last.offset_sec = last.offset_sec.max(interval.offset_sec);
                }
                _ => merged.push(interval),
            }
        }
        merged
    }

    /// The parts of `self` not covered by any exclusion interval.
    #[must_use]
    pub fn subtract(self, exclusions: &[Self]) -> Vec<Self> {
        let mut remaining = vec![self];
        for exclusion in Self::union(exclusions) {
            let mut next = Vec::with_capacity(remaining.len() + 1);
            for piece in remaining {
                if exclusion.offset_sec <= piece.onset_sec
                    || exclusion.onset_sec >= piece.offset_sec
                {
                    next.push(piece);
                    continue;
                }
                if exclusion.onset_sec > piece.onset_sec {
                    next.push(Self {
                        onset_sec: piece.onset_sec,
                        offset_sec: exclusion.onset_sec,
                    });
                }
                if exclusion.offset_sec < piece.offset_sec {
                    next.push(Self {
                        onset_sec: exclusion.offset_sec,
                        offset_sec: piece.offset_sec,
                    });
                }
            }
            remaining = next;
        }
        remaining
    }
}
