use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Short-answer grading request as handed over by a producer.
///
/// Fields missing from a JSON payload deserialize as empty strings so that
/// they are rejected by [`GradingRequest::validate`] instead of the parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingRequest {
    pub subject_id: String,
    pub kind: String,
    pub prompt: String,
    pub expected_answer: String,
    pub student_answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

impl GradingRequest {
    pub fn new(
        subject_id: impl Into<String>,
        kind: impl Into<String>,
        prompt: impl Into<String>,
        expected_answer: impl Into<String>,
        student_answer: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            kind: kind.into(),
            prompt: prompt.into(),
            expected_answer: expected_answer.into(),
            student_answer: student_answer.into(),
        }
    }

    /// Check that every required field is present and non-empty.
    ///
    /// Content is not interpreted; a field made only of whitespace counts
    /// as present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing: Vec<&'static str> = [
            ("subject_id", &self.subject_id),
            ("kind", &self.kind),
            ("prompt", &self.prompt),
            ("expected_answer", &self.expected_answer),
            ("student_answer", &self.student_answer),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingFields(missing))
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey {
            subject_id: self.subject_id.clone(),
            kind: self.kind.clone(),
        }
    }
}

/// Identity of a pending job: at most one job per key may be resident.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub subject_id: String,
    pub kind: String,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.subject_id)
    }
}

/// A request that passed admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingJob {
    pub request: GradingRequest,
    pub enqueued_at: DateTime<Utc>,
}

impl GradingJob {
    pub fn admit(request: GradingRequest) -> Self {
        Self {
            request,
            enqueued_at: Utc::now(),
        }
    }

    pub fn key(&self) -> JobKey {
        self.request.key()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingMethod {
    Exact,
    Keywords,
    Model,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingStatus {
    Graded,
    ManualReview,
}

impl fmt::Display for GradingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradingStatus::Graded => write!(f, "graded"),
            GradingStatus::ManualReview => write!(f, "manual_review"),
        }
    }
}

/// What a grader concluded about one answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingOutcome {
    pub correct: bool,
    /// 0..=100
    pub confidence: u8,
    pub method: GradingMethod,
    pub status: GradingStatus,
}
