// Deadline and retry wrapper around a single grading call
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use gradeq_common::config::RetryPolicy;
use gradeq_common::types::{GradingJob, GradingOutcome};
use tracing::warn;

use crate::error::GradeError;
use crate::grader::Grader;

async fn attempt_once(
    grader: &dyn Grader,
    job: &GradingJob,
    deadline: Option<Duration>,
) -> Result<GradingOutcome, GradeError> {
    let call = AssertUnwindSafe(grader.evaluate(job)).catch_unwind();
    let caught = match deadline {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| GradeError::TimedOut(limit))?,
        None => call.await,
    };

    match caught {
        Ok(result) => result.map_err(GradeError::Failed),
        Err(payload) => Err(GradeError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Grade `job`, retrying failed attempts per `retry`.
///
/// Returns the final result together with the number of attempts made.
pub(crate) async fn grade(
    grader: &dyn Grader,
    job: &GradingJob,
    retry: &RetryPolicy,
    deadline: Option<Duration>,
) -> (Result<GradingOutcome, GradeError>, u32) {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match attempt_once(grader, job, deadline).await {
            Ok(outcome) => return (Ok(outcome), attempt),
            Err(e) if attempt < max_attempts => {
                let delay = retry.backoff(attempt);
                warn!(
                    job = %job.key(),
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Grading attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}
