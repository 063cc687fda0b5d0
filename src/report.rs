//! Report rendering: per-recording metric lines, the tab-delimited scores
//! dataframe for batch runs, and the confusion-matrix table.

use std::fs;
use std::path::Path;

use crate::error::{DsError, DsResult};
use crate::model::{BatchReport, MetricResult};
use crate::table::ConfusionMatrix;

/// Dataframe column order, `FID` first.
pub const DATAFRAME_COLUMNS: [&str; 10] = [
    "FID",
    "DER",
    "B3Precision",
    "B3Recall",
    "B3F1",
    "GKTRefSys",
    "GKTSysRef",
    "HRefSys",
    "MI",
    "NMI",
];

/// Human-readable metric lines for one recording.
#[must_use]
pub fn format_metric_lines(result: &MetricResult) -> String {
    let rows = [
        ("DER", result.der),
        ("B-cubed precision", result.b3_precision),
        ("B-cubed recall", result.b3_recall),
        ("B-cubed F1", result.b3_f1),
        ("GKT(ref, sys)", result.gkt_ref_sys),
        ("GKT(sys, ref)", result.gkt_sys_ref),
        ("H(ref|sys)", result.h_ref_sys),
        ("MI", result.mi),
        ("NMI", result.nmi),
    ];
    let mut out = String::new();
    for (name, value) in rows {
        match value {
            Some(value) => out.push_str(&format!("{name}: {value:.2}\n")),
            None => out.push_str(&format!("{name}: undefined\n")),
        }
    }
    out
}

/// One dataframe row for a result.
fn dataframe_row(result: &MetricResult, additional: &[(String, String)]) -> String {
    let mut values = vec![result.recording_id.clone()];
    for metric in [
        result.der,
        result.b3_precision,
        result.b3_recall,
        result.b3_f1,
        result.gkt_ref_sys,
        result.gkt_sys_ref,
        result.h_ref_sys,
        result.mi,
        result.nmi,
    ] {
        values.push(format_cell(metric));
    }
    values.extend(additional.iter().map(|(_, value)| value.clone()));
    values.join("\t")
}

/// Undefined metrics print as `NA`, which R's dataframe reader understands.
fn format_cell(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.6}"),
        None => "NA".to_owned(),
    }
}

/// Write the batch scores as a tab-delimited dataframe: one row per scored
/// recording, then the `OVERALL` aggregate row when present.
pub fn write_dataframe(
    path: &Path,
    report: &BatchReport,
    additional: &[(String, String)],
) -> DsResult<()> {
    let mut lines = Vec::with_capacity(report.results.len() + 2);

    let mut header: Vec<&str> = DATAFRAME_COLUMNS.to_vec();
    header.extend(additional.iter().map(|(name, _)| name.as_str()));
    lines.push(header.join("\t"));

    for result in &report.results {
        lines.push(dataframe_row(result, additional));
    }
    if let Some(aggregate) = &report.aggregate {
        lines.push(dataframe_row(aggregate, additional));
    }

    fs::write(path, lines.join("\n") + "\n")?;
    Ok(())
}

/// Parse an additional-columns spec: semicolon-delimited `CNAME=VAL` pairs,
/// e.g. `Corpus=AMI;NClusters=4`.
pub fn parse_additional_columns(spec: &str) -> DsResult<Vec<(String, String)>> {
    if spec.is_empty() {
        return Ok(Vec::new());
    }
    spec.split(';')
        .map(|pair| {
            pair.split_once('=')
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .ok_or_else(|| {
                    DsError::InvalidRequest(format!(
                        "additional column `{pair}` is not of the form CNAME=VAL"
                    ))
                })
        })
        .collect()
}

/// Aligned-column rendering of a confusion matrix; the top-left cell is the
/// recording id, rows are reference classes, columns system classes.
#[must_use]
pub fn format_confusion_matrix(matrix: &ConfusionMatrix) -> String {
    let format_value = |value: f64| {
        if matrix.normalized {
            format!("{value:.4}")
        } else {
            format!("{value:.0}")
        }
    };

    let mut grid: Vec<Vec<String>> = Vec::with_capacity(matrix.rows.len() + 1);
    let mut header = vec![matrix.recording_id.clone()];
    header.extend(matrix.sys_classes.iter().cloned());
    grid.push(header);
    for (class, row) in matrix.ref_classes.iter().zip(&matrix.rows) {
        let mut cells = vec![class.clone()];
        cells.extend(row.iter().map(|&value| format_value(value)));
        grid.push(cells);
    }

    let n_columns = grid.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..n_columns)
        .map(|column| {
            grid.iter()
                .filter_map(|row| row.get(column))
                .map(String::len)
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    for row in &grid {
        let mut line = String::new();
        for (column, cell) in row.iter().enumerate() {
            if column > 0 {
                line.push_str("  ");
            }
            line.push_str(&format!("{cell:>width$}", width = widths[column]));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
