//! Diarization error rate.
//!
//! DER needs a one-to-one correspondence between reference and system
//! speaker identities. The correspondence is chosen to maximize the total
//! frame overlap between paired speakers, computed over eligible frames
//! whose *reference* label is a lone speaker (system overlap is allowed in
//! this sub-step; reference overlap is not). The maximization is a
//! rectangular assignment problem solved by a Hungarian-style shortest
//! augmenting path algorithm on a square-padded cost matrix; dummy rows and
//! columns absorb unmatched speakers when the two sides disagree on speaker
//! count.
//!
//! With the correspondence fixed, every eligible frame is scored: a frame
//! with `n_ref` active reference speakers, `n_sys` active system speakers,
//! and `n_correct` reference speakers whose mapped partner is active
//! contributes `max(0, n_ref - n_sys)` missed, `max(0, n_sys - n_ref)`
//! false-alarm, and `min(n_ref, n_sys) - n_correct` speaker-error frame
//! counts. On an overlapped frame each reference speaker is scored against
//! its own mapped partner independently. The denominator is total eligible
//! reference speech (each active reference speaker counts).

use crate::error::{DsError, DsResult};
use crate::frames::{FrameLabel, Timeline};

/// The DER decomposition for one recording, in seconds of frame time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerComponents {
    /// Diarization error rate in percent. May exceed 100.
    pub der_pct: f64,
    pub scored_speech_sec: f64,
    pub miss_sec: f64,
    pub falarm_sec: f64,
    pub speaker_error_sec: f64,
}

/// Score one recording's frame labels.
///
/// Fails with [`DsError::EmptyReference`] when no eligible reference speech
/// exists: DER is undefined there and must never be coerced to zero.
pub fn evaluate(
    recording_id: &str,
    reference_labels: &[FrameLabel],
    system_labels: &[FrameLabel],
    mask: &[bool],
    timeline: &Timeline,
    n_ref_speakers: usize,
    n_sys_speakers: usize,
) -> DsResult<DerComponents> {
    debug_assert_eq!(reference_labels.len(), system_labels.len());
    debug_assert_eq!(reference_labels.len(), mask.len());

    let overlap = overlap_matrix(
        reference_labels,
        system_labels,
        mask,
        n_ref_speakers,
        n_sys_speakers,
    );
    let correspondence = optimal_correspondence(recording_id, &overlap, n_sys_speakers)?;

    let mut speech_frames: u64 = 0;
    let mut miss_frames: u64 = 0;
    let mut falarm_frames: u64 = 0;
    let mut error_frames: u64 = 0;

    for ((&ref_label, &sys_label), &eligible) in
        reference_labels.iter().zip(system_labels).zip(mask)
    {
        if !eligible {
            continue;
        }
        let n_ref = u64::from(ref_label.count_ones());
        let n_sys = u64::from(sys_label.count_ones());

        let mut n_correct: u64 = 0;
        let mut bits = ref_label;
        while bits != 0 {
            let speaker = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            if let Some(partner) = correspondence[speaker]
                && sys_label & (1u64 << partner) != 0
            {
                n_correct += 1;
            }
        }

        speech_frames += n_ref;
        miss_frames += n_ref.saturating_sub(n_sys);
        falarm_frames += n_sys.saturating_sub(n_ref);
        error_frames += n_ref.min(n_sys) - n_correct;
    }

    if speech_frames == 0 {
        return Err(DsError::EmptyReference {
            recording: recording_id.to_owned(),
        });
    }

    let w = timeline.frame_width_sec;
    let error_total = (miss_frames + falarm_frames + error_frames) as f64;
    Ok(DerComponents {
        der_pct: 100.0 * error_total / speech_frames as f64,
        scored_speech_sec: speech_frames as f64 * w,
        miss_sec: miss_frames as f64 * w,
        falarm_sec: falarm_frames as f64 * w,
        speaker_error_sec: error_frames as f64 * w,
    })
}

/// `O[r][s]`: eligible frames where reference speaker `r` speaks alone (on
/// the reference side) and system speaker `s` is active.
fn overlap_matrix(
    reference_labels: &[FrameLabel],
    system_labels: &[FrameLabel],
    mask: &[bool],
    n_ref_speakers: usize,
    n_sys_speakers: usize,
) -> Vec<Vec<u64>> {
    let mut overlap = vec![vec![0u64; n_sys_speakers]; n_ref_speakers];
    for ((&ref_label, &sys_label), &eligible) in
        reference_labels.iter().zip(system_labels).zip(mask)
    {
        if !eligible || ref_label.count_ones() != 1 {
            continue;
        }
        let speaker = ref_label.trailing_zeros() as usize;
        let mut bits = sys_label;
        while bits != 0 {
            let partner = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            overlap[speaker][partner] += 1;
        }
    }
    overlap
}

/// Overlap-maximizing one-to-one correspondence: for each reference speaker
/// index, the paired system speaker index, or `None` when the speaker is
/// left unmatched.
fn optimal_correspondence(
    recording_id: &str,
    overlap: &[Vec<u64>],
    n_sys_speakers: usize,
) -> DsResult<Vec<Option<usize>>> {
    let n_ref_speakers = overlap.len();
    if n_ref_speakers == 0 || n_sys_speakers == 0 {
        return Ok(vec![None; n_ref_speakers]);
    }

    // Square-pad: dummy rows/columns at zero overlap, real cells at
    // negative overlap so the min-cost matching maximizes total overlap.
    let n = n_ref_speakers.max(n_sys_speakers);
    let mut cost = vec![vec![0.0f64; n]; n];
    for (r, row) in overlap.iter().enumerate() {
        for (s, &frames) in row.iter().enumerate() {
            cost[r][s] = -(frames as f64);
        }
    }

    let assignment = solve_min_cost(&cost).map_err(|reason| DsError::AssignmentInfeasible {
        recording: recording_id.to_owned(),
        reason,
    })?;

    Ok(assignment
        .into_iter()
        .take(n_ref_speakers)
        .map(|s| (s < n_sys_speakers).then_some(s))
        .collect())
}

/// Minimum-cost perfect matching on a square matrix via shortest augmenting
/// paths with potentials (the classic O(n^3) Hungarian formulation).
/// Internally 1-based; index 0 of each array is the virtual source column.
fn solve_min_cost(cost: &[Vec<f64>]) -> Result<Vec<usize>, String> {
    let n = cost.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; n + 1];
    // p[j] = row currently matched to column j (0 = unmatched).
    let mut p = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for row in 1..=n {
        p[0] = row;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let reduced = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if reduced < minv[j] {
                    minv[j] = reduced;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            if !delta.is_finite() {
                return Err("no finite augmenting path".to_owned());
            }
            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Unwind the augmenting path.
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![usize::MAX; n];
    for j in 1..=n {
        if p[j] == 0 {
            return Err("incomplete matching".to_owned());
        }
        assignment[p[j] - 1] = j - 1;
    }
    if assignment.contains(&usize::MAX) {
        return Err("row left unmatched".to_owned());
    }
    Ok(assignment)
}
