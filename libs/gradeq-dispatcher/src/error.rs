use std::time::Duration;

use gradeq_common::types::{JobKey, ValidationError};
use thiserror::Error;

/// Why a submission was not admitted. Neither case changes dispatcher state.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Invalid grading job: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Job {0} is already pending")]
    Duplicate(JobKey),
}

/// Failure of a single grading attempt.
#[derive(Error, Debug)]
pub enum GradeError {
    #[error("Grader failed: {0:#}")]
    Failed(anyhow::Error),

    #[error("Grading timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Grader panicked: {0}")]
    Panicked(String),
}
