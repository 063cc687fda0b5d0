use thiserror::Error;

pub type DsResult<T> = Result<T, DsError>;

#[derive(Debug, Error)]
pub enum DsError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid RTTM at {path}:{line}: {reason}")]
    InvalidRttm {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("invalid segment ({context}): {reason}")]
    InvalidSegment { context: String, reason: String },

    #[error(
        "speaker id `{speaker}` appears in both recording `{first}` and recording `{second}`; \
         speaker id sets must be disjoint across recordings"
    )]
    SpeakerIdCollision {
        speaker: String,
        first: String,
        second: String,
    },

    #[error("no scorable reference speech in recording `{recording}`; DER is undefined")]
    EmptyReference { recording: String },

    #[error("speaker assignment infeasible for recording `{recording}`: {reason}")]
    AssignmentInfeasible { recording: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DsError {
    /// Stable, unique, machine-readable error code for every variant.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "DS-IO",
            Self::Json(_) => "DS-JSON",
            Self::InvalidRttm { .. } => "DS-RTTM",
            Self::InvalidSegment { .. } => "DS-SEGMENT",
            Self::SpeakerIdCollision { .. } => "DS-SPEAKER-COLLISION",
            Self::EmptyReference { .. } => "DS-EMPTY-REFERENCE",
            Self::AssignmentInfeasible { .. } => "DS-ASSIGNMENT",
            Self::InvalidRequest(_) => "DS-INVALID-REQUEST",
        }
    }

    pub(crate) fn invalid_segment(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSegment {
            context: context.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DsError;

    fn all_variants() -> Vec<DsError> {
        vec![
            DsError::Io(std::io::Error::other("disk fail")),
            DsError::Json(serde_json::from_str::<serde_json::Value>("{").unwrap_err()),
            DsError::InvalidRttm {
                path: "ref.rttm".to_owned(),
                line: 3,
                reason: "expected 9 fields".to_owned(),
            },
            DsError::invalid_segment("recording `rec1`, speaker `A`", "offset before onset"),
            DsError::SpeakerIdCollision {
                speaker: "A".to_owned(),
                first: "rec1".to_owned(),
                second: "rec2".to_owned(),
            },
            DsError::EmptyReference {
                recording: "rec1".to_owned(),
            },
            DsError::AssignmentInfeasible {
                recording: "rec1".to_owned(),
                reason: "no finite augmenting path".to_owned(),
            },
            DsError::InvalidRequest("frame width must be positive".to_owned()),
        ]
    }

    #[test]
    fn error_codes_are_unique_and_prefixed() {
        let mut seen = std::collections::HashSet::new();
        for error in all_variants() {
            let code = error.error_code();
            assert!(code.starts_with("DS-"), "bad prefix: {code}");
            assert!(seen.insert(code), "duplicate error_code: {code}");
        }
    }

    #[test]
    fn display_messages_mention_key_detail() {
        let cases: Vec<(DsError, &str)> = vec![
            (
                DsError::InvalidRttm {
                    path: "sys.rttm".to_owned(),
                    line: 17,
                    reason: "bad onset".to_owned(),
                },
                "sys.rttm:17",
            ),
            (
                DsError::invalid_segment("interval", "zero-length interval"),
                "zero-length",
            ),
            (
                DsError::SpeakerIdCollision {
                    speaker: "spk3".to_owned(),
                    first: "meeting_a".to_owned(),
                    second: "meeting_b".to_owned(),
                },
                "spk3",
            ),
            (
                DsError::EmptyReference {
                    recording: "meeting_a".to_owned(),
                },
                "DER is undefined",
            ),
            (
                DsError::AssignmentInfeasible {
                    recording: "meeting_a".to_owned(),
                    reason: "incomplete matching".to_owned(),
                },
                "incomplete matching",
            ),
        ];
        for (error, expected) in cases {
            let text = error.to_string();
            assert!(text.contains(expected), "expected `{expected}` in: {text}");
        }
    }

    #[test]
    fn io_and_json_from_conversions() {
        let io: DsError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(io, DsError::Io(_)));

        let json: DsError = serde_json::from_str::<serde_json::Value>("not json")
            .unwrap_err()
            .into();
        assert!(matches!(json, DsError::Json(_)));
    }

    #[test]
    fn ds_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<DsError>();
        assert_sync::<DsError>();
    }
}
