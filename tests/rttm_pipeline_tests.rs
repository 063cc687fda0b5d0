//! RTTM-to-dataframe pipeline tests: parse fixture RTTM files from a temp
//! directory, score them as a batch, and check the written report.

use std::fs;
use std::path::{Path, PathBuf};

use diascore::model::Weighting;
use diascore::report;
use diascore::rttm;
use diascore::score::{score_batch, BatchOptions, RecordingPair};
use diascore::ScoringConfig;

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write fixture");
    path
}

fn speaker_line(recording: &str, onset: f64, duration: f64, speaker: &str) -> String {
    format!("SPEAKER {recording} 1 {onset:.2} {duration:.2} <NA> <NA> {speaker} <NA> <NA>\n")
}

fn zero_collar() -> ScoringConfig {
    ScoringConfig {
        collar_sec: 0.0,
        ..ScoringConfig::default()
    }
}

fn pair_from_files(recording: &str, ref_path: &Path, sys_path: &Path) -> RecordingPair {
    let mut reference = rttm::load_diarizations(ref_path).expect("reference parses");
    let mut system = rttm::load_diarizations(sys_path).expect("system parses");
    RecordingPair {
        recording_id: recording.to_owned(),
        reference: reference.remove(recording).expect("reference recording"),
        system: system.remove(recording).expect("system recording"),
    }
}

#[test]
fn perfect_system_output_scores_clean_through_the_whole_pipeline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let turns = speaker_line("meeting1", 0.0, 4.0, "alice")
        + &speaker_line("meeting1", 4.0, 6.0, "bob");
    let matching = speaker_line("meeting1", 0.0, 4.0, "spk0")
        + &speaker_line("meeting1", 4.0, 6.0, "spk1");
    let ref_path = write_file(dir.path(), "ref.rttm", &turns);
    let sys_path = write_file(dir.path(), "sys.rttm", &matching);

    let pair = pair_from_files("meeting1", &ref_path, &sys_path);
    let batch = score_batch(
        vec![pair],
        &BatchOptions {
            config: zero_collar(),
            ..BatchOptions::default()
        },
    )
    .expect("batch");

    assert_eq!(batch.results.len(), 1);
    let result = &batch.results[0];
    assert_eq!(result.der, Some(0.0));
    assert_eq!(result.recording_id, "meeting1");

    let scores_path = dir.path().join("scores.df");
    report::write_dataframe(&scores_path, &batch, &[]).expect("written");
    let text = fs::read_to_string(&scores_path).expect("readable");
    let lines: Vec<&str> = text.lines().collect();
    // Header, one recording, one OVERALL row.
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("FID\tDER\t"));
    assert!(lines[1].starts_with("meeting1\t0.000000\t"));
    assert!(lines[2].starts_with("OVERALL\t0.000000\t"));
}

#[test]
fn batch_over_multiple_recordings_aggregates_by_duration() {
    let dir = tempfile::tempdir().expect("tempdir");

    // meeting1: perfect. meeting2: system silent, DER 100.
    let ref1 = write_file(
        dir.path(),
        "ref1.rttm",
        &speaker_line("meeting1", 0.0, 8.0, "alice"),
    );
    let sys1 = write_file(
        dir.path(),
        "sys1.rttm",
        &speaker_line("meeting1", 0.0, 8.0, "spk0"),
    );
    let ref2 = write_file(
        dir.path(),
        "ref2.rttm",
        &speaker_line("meeting2", 0.0, 2.0, "carol"),
    );

    let pair1 = pair_from_files("meeting1", &ref1, &sys1);
    let mut reference2 = rttm::load_diarizations(&ref2).expect("parses");
    let pair2 = RecordingPair {
        recording_id: "meeting2".to_owned(),
        reference: reference2.remove("meeting2").expect("recording"),
        system: diascore::Diarization::default(),
    };

    let batch = score_batch(
        vec![pair1, pair2],
        &BatchOptions {
            config: zero_collar(),
            weighting: Weighting::Duration,
            ..BatchOptions::default()
        },
    )
    .expect("batch");

    assert_eq!(batch.results.len(), 2);
    assert!(batch.excluded.is_empty());
    let aggregate = batch.aggregate.as_ref().expect("aggregate");
    // 2s of misses over 10s of scored speech.
    let der = aggregate.der.expect("defined");
    assert!((der - 20.0).abs() < 1e-9, "pooled DER: {der}");
}

#[test]
fn undefined_der_lands_as_na_in_the_dataframe() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Reference is silent; system claims speech. DER is undefined.
    let sys_path = write_file(
        dir.path(),
        "sys.rttm",
        &speaker_line("meeting1", 0.0, 3.0, "spk0"),
    );
    let mut system = rttm::load_diarizations(&sys_path).expect("parses");
    let pair = RecordingPair {
        recording_id: "meeting1".to_owned(),
        reference: diascore::Diarization::default(),
        system: system.remove("meeting1").expect("recording"),
    };

    let batch = score_batch(
        vec![pair],
        &BatchOptions {
            config: zero_collar(),
            ..BatchOptions::default()
        },
    )
    .expect("batch");
    assert_eq!(batch.results[0].der, None);

    let scores_path = dir.path().join("scores.df");
    report::write_dataframe(&scores_path, &batch, &[]).expect("written");
    let text = fs::read_to_string(&scores_path).expect("readable");
    let row = text.lines().nth(1).expect("row");
    let cells: Vec<&str> = row.split('\t').collect();
    assert_eq!(cells[0], "meeting1");
    assert_eq!(cells[1], "NA", "undefined DER must not print as a number");
}

#[test]
fn confusion_matrix_prints_rendered_speaker_subsets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let turns = speaker_line("meeting1", 0.0, 6.0, "alice")
        + &speaker_line("meeting1", 2.0, 4.0, "bob");
    let guesses = speaker_line("meeting1", 0.0, 6.0, "spk0");
    let ref_path = write_file(dir.path(), "ref.rttm", &turns);
    let sys_path = write_file(dir.path(), "sys.rttm", &guesses);

    let pair = pair_from_files("meeting1", &ref_path, &sys_path);
    let matrix = diascore::confusion_matrix(
        &pair.reference,
        &pair.system,
        "meeting1",
        &zero_collar(),
        false,
    )
    .expect("matrix");

    assert_eq!(matrix.ref_classes, vec!["alice", "alice_bob"]);
    assert_eq!(matrix.sys_classes, vec!["spk0"]);

    let rendered = report::format_confusion_matrix(&matrix);
    assert!(rendered.contains("meeting1"));
    assert!(rendered.contains("alice_bob"));
    // 2s of alice alone before the overlap, 2s after: 400 frames.
    assert!(rendered.contains("400"));
    assert!(rendered.contains("200"));
}
