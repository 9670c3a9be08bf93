//! Seams between the dispatcher and its collaborators.

use anyhow::Result;
use async_trait::async_trait;
use gradeq_common::types::{GradingJob, GradingOutcome};
use tracing::error;

use crate::error::GradeError;

/// Evaluates one admitted job.
///
/// The dispatcher imposes no latency or reliability expectations beyond the
/// optional per-attempt deadline in its configuration. Implementations must
/// not assume they are called at most once per job when retries are enabled.
#[async_trait]
pub trait Grader: Send + Sync {
    async fn evaluate(&self, job: &GradingJob) -> Result<GradingOutcome>;
}

/// Receives jobs whose grading attempts were exhausted.
pub trait DeadLetterSink: Send + Sync {
    fn record(&self, job: &GradingJob, error: &GradeError, attempts: u32);
}

/// Default sink: the job is dropped and only the log remembers it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDeadLetters;

impl DeadLetterSink for LogDeadLetters {
    fn record(&self, job: &GradingJob, error: &GradeError, attempts: u32) {
        error!(
            job = %job.key(),
            attempts,
            enqueued_at = %job.enqueued_at,
            error = %error,
            "Grading abandoned, job dropped"
        );
    }
}
