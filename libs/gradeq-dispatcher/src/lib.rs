//! In-process background grading dispatcher.
//!
//! Producers hand short-answer [`GradingRequest`]s to a [`Dispatcher`], which
//! deduplicates them by `(subject_id, kind)`, queues them in admission order
//! and drains the queue through at most `max_concurrent` concurrent calls to
//! an injected [`Grader`]. A periodic tick pulls batches while there is work
//! and stops itself once the queue is empty and nothing is in flight; the
//! next successful submit starts it again.
//!
//! Nothing is persisted. A failed grading call is logged and handed to the
//! [`DeadLetterSink`]; it is never re-queued.
//!
//! [`GradingRequest`]: gradeq_common::types::GradingRequest

mod attempt;
pub mod dispatcher;
pub mod error;
pub mod grader;


pub use dispatcher::{Dispatcher, DispatcherStatus};
pub use error::{GradeError, SubmitError};
pub use grader::{DeadLetterSink, Grader, LogDeadLetters};
