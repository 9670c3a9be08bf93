// Reads grading requests as JSON lines and submits them
use anyhow::{Context, Result};
use gradeq_common::types::GradingRequest;
use gradeq_dispatcher::Dispatcher;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub malformed: usize,
}

/// Submit every request in `reader` until EOF. Blank lines are skipped;
/// lines that fail to parse are logged and counted, never fatal.
pub async fn feed<R>(reader: R, dispatcher: &Dispatcher) -> Result<FeedSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = FeedSummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<GradingRequest>(line) {
            Ok(request) => {
                if dispatcher.submit(request) {
                    summary.accepted += 1;
                } else {
                    summary.rejected += 1;
                }
            }
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed input line");
                summary.malformed += 1;
            }
        }
    }

    debug!(lines = line_no, "Input exhausted");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::KeywordGrader;
    use gradeq_common::config::DispatcherConfig;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_feed_counts_and_submits() {
        let dispatcher =
            Dispatcher::new(DispatcherConfig::default(), Arc::new(KeywordGrader)).unwrap();
        let input = concat!(
            r#"{"subject_id":"1","kind":"quiz","prompt":"p","expected_answer":"a","student_answer":"a"}"#,
            "\n\n",
            r#"{"subject_id":"1","kind":"quiz","prompt":"p","expected_answer":"a","student_answer":"b"}"#,
            "\n",
            r#"{"subject_id":"2","kind":"quiz","prompt":"p"}"#,
            "\n",
            "not json\n",
            r#"{"subject_id":"3","kind":"simulacion","prompt":"p","expected_answer":"a","student_answer":"c"}"#,
        );

        let summary = feed(input.as_bytes(), &dispatcher).await.unwrap();

        assert_eq!(
            summary,
            FeedSummary {
                accepted: 2,
                // duplicate of subject 1 plus the incomplete subject 2
                rejected: 2,
                malformed: 1,
            }
        );
        assert_eq!(dispatcher.status().queue_length, 2);
        dispatcher.wait_idle().await;
        assert_eq!(dispatcher.status().queue_length, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_input() {
        let dispatcher =
            Dispatcher::new(DispatcherConfig::default(), Arc::new(KeywordGrader)).unwrap();
        let summary = feed(&b""[..], &dispatcher).await.unwrap();
        assert_eq!(summary, FeedSummary::default());
        assert!(!dispatcher.status().running);
    }
}
