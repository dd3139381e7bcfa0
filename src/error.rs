use thiserror::Error;

/// Failures raised by the gradebook and its import boundary.
#[derive(Debug, Error, PartialEq)]
pub enum GradeError {
    #[error("student name must not be empty")]
    InvalidStudent,

    #[error("subject must not be empty")]
    InvalidSubject,

    #[error("{field} must be a finite, non-negative number (got {value})")]
    InvalidNumber { field: &'static str, value: f64 },

    #[error("score {0} is outside the 0-20 range")]
    ScoreOutOfRange(f64),

    #[error("unknown term {0:?}, expected 1, 2 or 3")]
    InvalidTerm(String),

    #[error("student {0:?} already exists")]
    StudentExists(String),

    #[error("no grade with id {0}")]
    NotFound(String),

    /// The caller handed over something other than a list of records.
    #[error("expected an array of grade records, found {0}")]
    NotACollection(&'static str),
}
