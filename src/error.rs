use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkloadError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("no teachers to aggregate")]
    EmptyInput,

    #[error("teacher {teacher_id} has invalid {field}: {value}")]
    InvalidHours {
        teacher_id: String,
        field: &'static str,
        value: f64,
    },

    #[error("unknown grade level: {0}")]
    UnknownGradeLevel(String),

    #[error("unknown teacher status: {0}")]
    UnknownStatus(String),

    #[error("unknown rule type: {0}")]
    UnknownRuleType(String),

    #[error("unknown substitution status: {0}")]
    UnknownSubstitutionStatus(String),

    #[error("invalid substitution request: {0}")]
    InvalidRequest(String),

    #[error("substitution {id} is already {status}")]
    AlreadyDecided { id: String, status: String },
}

pub type WorkloadResult<T> = Result<T, WorkloadError>;
