//! RTTM loading.
//!
//! RTTM is a line-oriented format: whitespace-separated fields, one speaker
//! turn per `SPEAKER` line. The fields used here are the recording id
//! (field 2), onset in seconds (field 4), duration in seconds (field 5),
//! and speaker id (field 8). Other line types (`SPKR-INFO`, `NON-SPEECH`,
//! ...) are skipped; malformed `SPEAKER` lines are hard errors carrying the
//! file path and line number.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{DsError, DsResult};
use crate::model::{Diarization, Segment};

/// Parse an RTTM file into raw segments, grouped by recording id.
pub fn load_segments(path: &Path) -> DsResult<BTreeMap<String, Vec<Segment>>> {
    let text = fs::read_to_string(path)?;
    let mut by_recording: BTreeMap<String, Vec<Segment>> = BTreeMap::new();

    for (line_index, line) in text.lines().enumerate() {
        let line_no = line_index + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields[0] != "SPEAKER" {
            tracing::debug!(
                path = %path.display(),
                line = line_no,
                kind = fields[0],
                "skipping non-SPEAKER line"
            );
            continue;
        }
        if fields.len() < 9 {
            return Err(rttm_error(
                path,
                line_no,
                format!("expected at least 9 fields, got {}", fields.len()),
            ));
        }

        let recording_id = fields[1];
        let onset_sec = parse_seconds(path, line_no, "onset", fields[3])?;
        let duration_sec = parse_seconds(path, line_no, "duration", fields[4])?;
        let speaker_id = fields[7];

        let segment = Segment::new(
            recording_id,
            speaker_id,
            onset_sec,
            onset_sec + duration_sec,
        )
        .map_err(|error| rttm_error(path, line_no, error.to_string()))?;
        by_recording
            .entry(recording_id.to_owned())
            .or_default()
            .push(segment);
    }

    Ok(by_recording)
}

/// Parse an RTTM file and validate each recording's labeling.
pub fn load_diarizations(path: &Path) -> DsResult<BTreeMap<String, Diarization>> {
    load_segments(path)?
        .into_iter()
        .map(|(recording_id, segments)| Ok((recording_id, Diarization::new(segments)?)))
        .collect()
}

fn parse_seconds(path: &Path, line_no: usize, field: &str, raw: &str) -> DsResult<f64> {
    raw.parse::<f64>()
        .map_err(|_| rttm_error(path, line_no, format!("unparseable {field} `{raw}`")))
}

fn rttm_error(path: &Path, line: usize, reason: String) -> DsError {
    DsError::InvalidRttm {
        path: path.display().to_string(),
        line,
        reason,
    }
}
