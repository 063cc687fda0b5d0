//! Clustering-agreement metrics over a contingency table.
//!
//! Every metric here is a pure function of the table; none of them involves
//! a speaker correspondence. Information-theoretic quantities are reported
//! in bits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::frames::FrameLabel;
use crate::table::ContingencyTable;

/// Guard against division by an exactly-zero variability term.
const EPS: f64 = f64::EPSILON;

/// The clustering metrics for one recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusteringScores {
    pub b3_precision: f64,
    pub b3_recall: f64,
    pub b3_f1: f64,
    pub gkt_ref_sys: f64,
    pub gkt_sys_ref: f64,
    pub h_ref_sys: f64,
    pub mi: f64,
    pub nmi: f64,
}

/// Compute every clustering metric, or `None` when no frame was eligible.
#[must_use]
pub fn evaluate(table: &ContingencyTable) -> Option<ClusteringScores> {
    if table.is_empty() {
        return None;
    }
    let (b3_precision, b3_recall, b3_f1) = bcubed(table);
    let (gkt_ref_sys, gkt_sys_ref) = goodman_kruskal_tau(table);
    let (mi, nmi) = mutual_information(table);
    Some(ClusteringScores {
        b3_precision,
        b3_recall,
        b3_f1,
        gkt_ref_sys,
        gkt_sys_ref,
        h_ref_sys: conditional_entropy(table),
        mi,
        nmi,
    })
}

/// B-cubed precision, recall, and F1.
///
/// The B-cubed precision of a frame is the proportion of frames with its
/// system label that also share its reference label; recall is the mirror.
/// The aggregates are frame-count-weighted means, and F1 their harmonic
/// mean (0 when both aggregates are 0).
#[must_use]
pub fn bcubed(table: &ContingencyTable) -> (f64, f64, f64) {
    let n = table.total() as f64;
    if n == 0.0 {
        return (0.0, 0.0, 0.0);
    }

    let mut precision = 0.0;
    let mut recall = 0.0;
    for (ref_label, sys_label, count) in table.cells() {
        let count = count as f64;
        precision += (count / n) * (count / table.sys_marginal(sys_label) as f64);
        recall += (count / n) * (count / table.ref_marginal(ref_label) as f64);
    }

    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    (precision, recall, f1)
}

/// Goodman-Kruskal tau in both directions: the fraction of the variability
/// of one labeling explained by knowing the other. Asymmetric; each
/// direction lies in [0, 1].
#[must_use]
pub fn goodman_kruskal_tau(table: &ContingencyTable) -> (f64, f64) {
    let n = table.total() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }

    // Per-row and per-column sums of squared joint proportions.
    let mut row_sq: BTreeMap<FrameLabel, f64> = BTreeMap::new();
    let mut col_sq: BTreeMap<FrameLabel, f64> = BTreeMap::new();
    for (ref_label, sys_label, count) in table.cells() {
        let p = count as f64 / n;
        *row_sq.entry(ref_label).or_insert(0.0) += p * p;
        *col_sq.entry(sys_label).or_insert(0.0) += p * p;
    }

    let sys_variability: f64 = 1.0
        - table
            .sys_marginals()
            .values()
            .map(|&c| {
                let q = c as f64 / n;
                q * q
            })
            .sum::<f64>()
        + EPS;
    let sys_variability_given_ref: f64 = 1.0
        - row_sq
            .iter()
            .map(|(&label, &sq)| sq / (table.ref_marginal(label) as f64 / n))
            .sum::<f64>();
    let tau_ref_sys = (sys_variability - sys_variability_given_ref) / sys_variability;

    let ref_variability: f64 = 1.0
        - table
            .ref_marginals()
            .values()
            .map(|&c| {
                let p = c as f64 / n;
                p * p
            })
            .sum::<f64>()
        + EPS;
    let ref_variability_given_sys: f64 = 1.0
        - col_sq
            .iter()
            .map(|(&label, &sq)| sq / (table.sys_marginal(label) as f64 / n))
            .sum::<f64>();
    let tau_sys_ref = (ref_variability - ref_variability_given_sys) / ref_variability;

    (tau_ref_sys.clamp(0.0, 1.0), tau_sys_ref.clamp(0.0, 1.0))
}

/// Conditional entropy of the reference labeling given the system labeling,
/// in bits.
#[must_use]
pub fn conditional_entropy(table: &ContingencyTable) -> f64 {
    let n = table.total() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mut sigma = 0.0;
    for (_, sys_label, count) in table.cells() {
        let joint = count as f64;
        let sys_marginal = table.sys_marginal(sys_label) as f64;
        sigma += joint / n * (sys_marginal.log2() - joint.log2());
    }
    sigma.max(0.0)
}

/// Mutual information and normalized mutual information, in bits.
///
/// NMI divides MI by the geometric mean of the marginal entropies. When a
/// marginal is constant that mean is zero, so the convention is explicit:
/// with both labelings constant, NMI is 1 when the two lone classes agree
/// (same speaker cardinality; silence agrees only with silence) and 0
/// otherwise; with exactly one labeling constant, NMI is 0.
#[must_use]
pub fn mutual_information(table: &ContingencyTable) -> (f64, f64) {
    let n = table.total() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }

    let mut mi = 0.0;
    for (ref_label, sys_label, count) in table.cells() {
        let joint = count as f64;
        let outer = table.ref_marginal(ref_label) as f64 * table.sys_marginal(sys_label) as f64;
        mi += joint / n * (joint.log2() - outer.log2() + n.log2());
    }
    let mi = mi.max(0.0);

    let ref_constant = table.ref_marginals().len() <= 1;
    let sys_constant = table.sys_marginals().len() <= 1;
    let nmi = if ref_constant && sys_constant {
        let ref_class = table.ref_marginals().keys().next().copied().unwrap_or(0);
        let sys_class = table.sys_marginals().keys().next().copied().unwrap_or(0);
        if ref_class.count_ones() == sys_class.count_ones() {
            1.0
        } else {
            0.0
        }
    } else if ref_constant || sys_constant {
        0.0
    } else {
        let h_ref = marginal_entropy(table.ref_marginals(), n);
        let h_sys = marginal_entropy(table.sys_marginals(), n);
        (mi / (h_ref * h_sys).sqrt()).clamp(0.0, 1.0)
    };

    (mi, nmi)
}

/// Entropy in bits of the distribution implied by a marginal.
#[must_use]
pub fn marginal_entropy(marginals: &BTreeMap<FrameLabel, u64>, total: f64) -> f64 {
    marginals
        .values()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::{
        bcubed, conditional_entropy, evaluate, goodman_kruskal_tau, marginal_entropy,
        mutual_information,
    };
    use crate::table::ContingencyTable;

    fn table(ref_labels: &[u64], sys_labels: &[u64]) -> ContingencyTable {
        ContingencyTable::build(ref_labels, sys_labels, &vec![true; ref_labels.len()])
    }

    /// Two balanced classes, labelings identical up to renaming.
    fn identical_two_class() -> ContingencyTable {
        table(&[1, 1, 1, 2, 2, 2], &[2, 2, 2, 1, 1, 1])
    }

    /// Labelings that share no information: every (ref, sys) combination
    /// equally often.
    fn independent_two_class() -> ContingencyTable {
        table(&[1, 1, 2, 2], &[1, 2, 1, 2])
    }

    #[test]
    fn identical_labelings_score_one_everywhere() {
        let scores = evaluate(&identical_two_class()).expect("non-empty");
        assert!((scores.b3_precision - 1.0).abs() < 1e-12);
        assert!((scores.b3_recall - 1.0).abs() < 1e-12);
        assert!((scores.b3_f1 - 1.0).abs() < 1e-12);
        assert!((scores.gkt_ref_sys - 1.0).abs() < 1e-9);
        assert!((scores.gkt_sys_ref - 1.0).abs() < 1e-9);
        assert!(scores.h_ref_sys.abs() < 1e-12);
        // Two balanced classes carry one bit.
        assert!((scores.mi - 1.0).abs() < 1e-12);
        assert!((scores.nmi - 1.0).abs() < 1e-12);
    }

    #[test]
    fn independent_labelings_share_no_information() {
        let t = independent_two_class();
        let (mi, nmi) = mutual_information(&t);
        assert!(mi.abs() < 1e-12);
        assert!(nmi.abs() < 1e-12);

        let (tau_rs, tau_sr) = goodman_kruskal_tau(&t);
        assert!(tau_rs.abs() < 1e-9);
        assert!(tau_sr.abs() < 1e-9);

        // H(ref|sys) = H(ref) = 1 bit: knowing sys tells us nothing.
        assert!((conditional_entropy(&t) - 1.0).abs() < 1e-12);

        let (precision, recall, _) = bcubed(&t);
        assert!((precision - 0.5).abs() < 1e-12);
        assert!((recall - 0.5).abs() < 1e-12);
    }

    #[test]
    fn all_metrics_stay_in_range_on_a_skewed_table() {
        let t = table(&[1, 1, 1, 1, 1, 2, 2, 0, 0, 0], &[1, 1, 2, 2, 0, 2, 2, 0, 0, 1]);
        let scores = evaluate(&t).expect("non-empty");
        for value in [
            scores.b3_precision,
            scores.b3_recall,
            scores.b3_f1,
            scores.gkt_ref_sys,
            scores.gkt_sys_ref,
            scores.nmi,
        ] {
            assert!((0.0..=1.0).contains(&value), "out of range: {value}");
        }
        assert!(scores.mi >= 0.0);
        assert!(scores.h_ref_sys >= 0.0);

        let n = t.total() as f64;
        let h_ref = marginal_entropy(t.ref_marginals(), n);
        let h_sys = marginal_entropy(t.sys_marginals(), n);
        assert!(scores.mi <= h_ref.min(h_sys) + 1e-12);
        // H(ref|sys) = H(ref) - MI.
        assert!((scores.h_ref_sys - (h_ref - scores.mi)).abs() < 1e-9);
    }

    #[test]
    fn asymmetry_of_goodman_kruskal_tau() {
        // ref refines sys: knowing ref pins sys exactly, but not vice versa.
        let t = table(&[1, 1, 2, 2, 4, 4], &[1, 1, 1, 1, 2, 2]);
        let (tau_rs, tau_sr) = goodman_kruskal_tau(&t);
        assert!((tau_rs - 1.0).abs() < 1e-9, "ref fully predicts sys");
        assert!(tau_sr < 1.0, "sys does not fully predict ref: {tau_sr}");
    }

    #[test]
    fn constant_labelings_that_agree_have_nmi_one() {
        // Single speech class on both sides (a perfect single-speaker match
        // after relabeling).
        let t = table(&[1, 1, 1], &[1, 1, 1]);
        let (mi, nmi) = mutual_information(&t);
        assert!(mi.abs() < 1e-12);
        assert!((nmi - 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_speech_against_constant_silence_has_nmi_zero() {
        let t = table(&[1, 1, 1], &[0, 0, 0]);
        let (_, nmi) = mutual_information(&t);
        assert_eq!(nmi, 0.0);
    }

    #[test]
    fn one_sided_constant_labeling_has_nmi_zero() {
        let t = table(&[1, 1, 2, 2], &[1, 1, 1, 1]);
        let (_, nmi) = mutual_information(&t);
        assert_eq!(nmi, 0.0);
    }

    #[test]
    fn degenerate_single_cell_table_has_perfect_bcubed() {
        // Constant on both sides; every frame's precision and recall is 1.
        let t = table(&[1, 1, 1], &[0, 0, 0]);
        let (precision, recall, f1) = bcubed(&t);
        assert_eq!(precision, 1.0);
        assert_eq!(recall, 1.0);
        assert_eq!(f1, 1.0);
    }

    #[test]
    fn empty_table_evaluates_to_none() {
        let t = ContingencyTable::build(&[], &[], &[]);
        assert!(evaluate(&t).is_none());
        assert_eq!(bcubed(&t), (0.0, 0.0, 0.0));
        assert_eq!(goodman_kruskal_tau(&t), (0.0, 0.0));
        assert_eq!(conditional_entropy(&t), 0.0);
        assert_eq!(mutual_information(&t), (0.0, 0.0));
    }
}
