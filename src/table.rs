//! Contingency table between reference and system frame labels.
//!
//! Labels are opaque categories at this layer: the silence label and every
//! speaker subset count like any other class. The distinction between
//! singleton and overlapped labels is applied only by the DER engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::frames::{FrameLabel, SpeakerTable};

/// Sparse cross-tabulation of (reference label, system label) frame counts
/// over eligible frames, with both marginals and the grand total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContingencyTable {
    cells: BTreeMap<(FrameLabel, FrameLabel), u64>,
    ref_marginals: BTreeMap<FrameLabel, u64>,
    sys_marginals: BTreeMap<FrameLabel, u64>,
    total: u64,
}

impl ContingencyTable {
    /// Cross-tabulate the two label sequences over the eligible frames.
    #[must_use]
    pub fn build(
        reference_labels: &[FrameLabel],
        system_labels: &[FrameLabel],
        mask: &[bool],
    ) -> Self {
        debug_assert_eq!(reference_labels.len(), system_labels.len());
        debug_assert_eq!(reference_labels.len(), mask.len());

        let mut table = Self::default();
        for ((&ref_label, &sys_label), &eligible) in reference_labels
            .iter()
            .zip(system_labels)
            .zip(mask)
        {
            if !eligible {
                continue;
            }
            *table.cells.entry((ref_label, sys_label)).or_insert(0) += 1;
            *table.ref_marginals.entry(ref_label).or_insert(0) += 1;
            *table.sys_marginals.entry(sys_label).or_insert(0) += 1;
            table.total += 1;
        }
        table
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn cells(&self) -> impl Iterator<Item = (FrameLabel, FrameLabel, u64)> + '_ {
        self.cells
            .iter()
            .map(|(&(ref_label, sys_label), &count)| (ref_label, sys_label, count))
    }

    #[must_use]
    pub fn ref_marginals(&self) -> &BTreeMap<FrameLabel, u64> {
        &self.ref_marginals
    }

    #[must_use]
    pub fn sys_marginals(&self) -> &BTreeMap<FrameLabel, u64> {
        &self.sys_marginals
    }

    #[must_use]
    pub fn ref_marginal(&self, label: FrameLabel) -> u64 {
        self.ref_marginals.get(&label).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn sys_marginal(&self, label: FrameLabel) -> u64 {
        self.sys_marginals.get(&label).copied().unwrap_or(0)
    }
}

/// Class name for a frame label, for report output: speaker ids joined with
/// `_`, silence rendered as `non-speech`.
#[must_use]
pub fn render_label(label: FrameLabel, speakers: &SpeakerTable) -> String {
    if label == 0 {
        return "non-speech".to_owned();
    }
    speakers.ids_for_label(label).join("_")
}

/// A dense, rendered view of a [`ContingencyTable`] for external reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub recording_id: String,
    /// Rendered reference class names, one per row.
    pub ref_classes: Vec<String>,
    /// Rendered system class names, one per column.
    pub sys_classes: Vec<String>,
    /// Raw frame counts, or row-normalized proportions when `normalized`.
    pub rows: Vec<Vec<f64>>,
    pub normalized: bool,
}

impl ConfusionMatrix {
    /// Densify a table, rendering class names with the two speaker tables.
    /// Rows and columns appear in label (bitmask) order, which keeps the
    /// output deterministic.
    #[must_use]
    pub fn from_table(
        recording_id: &str,
        table: &ContingencyTable,
        ref_speakers: &SpeakerTable,
        sys_speakers: &SpeakerTable,
        normalize: bool,
    ) -> Self {
        let ref_labels: Vec<FrameLabel> = table.ref_marginals().keys().copied().collect();
        let sys_labels: Vec<FrameLabel> = table.sys_marginals().keys().copied().collect();
        let column_of: BTreeMap<FrameLabel, usize> = sys_labels
            .iter()
            .enumerate()
            .map(|(column, &label)| (label, column))
            .collect();

        let mut rows = vec![vec![0.0; sys_labels.len()]; ref_labels.len()];
        let row_of: BTreeMap<FrameLabel, usize> = ref_labels
            .iter()
            .enumerate()
            .map(|(row, &label)| (label, row))
            .collect();
        for (ref_label, sys_label, count) in table.cells() {
            rows[row_of[&ref_label]][column_of[&sys_label]] = count as f64;
        }

        if normalize {
            for (row, &ref_label) in rows.iter_mut().zip(&ref_labels) {
                let marginal = table.ref_marginal(ref_label) as f64;
                if marginal > 0.0 {
                    for cell in row {
                        *cell /= marginal;
                    }
                }
            }
        }

        Self {
            recording_id: recording_id.to_owned(),
            ref_classes: ref_labels
                .iter()
                .map(|&label| render_label(label, ref_speakers))
                .collect(),
            sys_classes: sys_labels
                .iter()
                .map(|&label| render_label(label, sys_speakers))
                .collect(),
            rows,
            normalized: normalize,
        }
    }
}
