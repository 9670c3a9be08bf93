use std::collections::{HashSet, VecDeque};

use crate::types::{GradingJob, JobKey};

/// Pending grading jobs in admission order.
///
/// A key stays resident from `push` until the job is handed out by
/// `take_batch` (or the queue is cleared); while resident, a second job with
/// the same key is refused.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<GradingJob>,
    keys: HashSet<JobKey>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job at the tail. Returns false if its key is already resident.
    pub fn push(&mut self, job: GradingJob) -> bool {
        if !self.keys.insert(job.key()) {
            return false;
        }
        self.jobs.push_back(job);
        true
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.keys.contains(key)
    }

    /// Remove up to `max` jobs from the head, oldest first.
    pub fn take_batch(&mut self, max: usize) -> Vec<GradingJob> {
        let n = max.min(self.jobs.len());
        let batch: Vec<GradingJob> = self.jobs.drain(..n).collect();
        for job in &batch {
            self.keys.remove(&job.key());
        }
        batch
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GradingRequest;

    fn job(subject: &str, kind: &str) -> GradingJob {
        GradingJob::admit(GradingRequest::new(subject, kind, "q", "a", "b"))
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = JobQueue::new();
        for id in ["1", "2", "3"] {
            assert!(queue.push(job(id, "quiz")));
        }

        let batch = queue.take_batch(10);
        let ids: Vec<&str> = batch.iter().map(|j| j.request.subject_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_duplicate_key_refused_while_resident() {
        let mut queue = JobQueue::new();
        assert!(queue.push(job("1", "quiz")));
        assert!(!queue.push(job("1", "quiz")));
        assert_eq!(queue.len(), 1);

        // Same subject, different kind is a different job
        assert!(queue.push(job("1", "simulacion")));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_key_released_after_take() {
        let mut queue = JobQueue::new();
        queue.push(job("1", "quiz"));
        queue.push(job("2", "quiz"));

        let batch = queue.take_batch(1);
        assert_eq!(batch.len(), 1);
        assert!(!queue.contains(&batch[0].key()));
        assert!(queue.contains(&JobKey {
            subject_id: "2".to_string(),
            kind: "quiz".to_string(),
        }));
        assert!(queue.push(job("1", "quiz")));
    }

    #[test]
    fn test_take_batch_bounded_by_len() {
        let mut queue = JobQueue::new();
        queue.push(job("1", "quiz"));
        assert_eq!(queue.take_batch(5).len(), 1);
        assert!(queue.take_batch(5).is_empty());
        assert!(queue.take_batch(0).is_empty());
    }

    #[test]
    fn test_clear_forgets_keys() {
        let mut queue = JobQueue::new();
        queue.push(job("1", "quiz"));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.push(job("1", "quiz")));
    }
}
