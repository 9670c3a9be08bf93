//! Grading Dispatcher - Queue, Scheduler Loop and Concurrency Cap
//!
//! **Lifecycle:**
//! - Idle until a submit is admitted, then a ticker fires every
//!   `tick_interval` (first tick one interval after start)
//! - Each tick pulls up to `capacity - in_flight` jobs from the queue head
//!   and spawns one grading task per job
//! - The first tick that finds an empty queue and nothing in flight stops
//!   the ticker; the next admitted submit restarts it
//!
//! **Locking:**
//! Queue, counters and ticker handle live behind one mutex. It is held for
//! admission, batch pull, slot release, status reads and reset, and never
//! across a grading call.
//!
//! **Reset:**
//! Grading calls already dispatched keep running but are detached: reset
//! advances an epoch and completions from an older epoch leave `in_flight`
//! alone. Detached calls may overlap with calls dispatched afterwards.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use gradeq_common::config::{DispatcherConfig, RetryPolicy};
use gradeq_common::queue::JobQueue;
use gradeq_common::types::{GradingJob, GradingRequest};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::attempt;
use crate::error::SubmitError;
use crate::grader::{DeadLetterSink, Grader, LogDeadLetters};

/// Point-in-time view of the dispatcher counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatcherStatus {
    pub queue_length: usize,
    pub running: bool,
    pub in_flight: usize,
    pub capacity: usize,
}

#[derive(Default)]
struct State {
    queue: JobQueue,
    running: bool,
    in_flight: usize,
    epoch: u64,
    ticker: Option<JoinHandle<()>>,
}

struct Inner {
    state: Mutex<State>,
    idle: Notify,
    grader: Arc<dyn Grader>,
    dead_letters: Arc<dyn DeadLetterSink>,
    capacity: usize,
    tick_interval: Duration,
    grade_timeout: Option<Duration>,
    retry: RetryPolicy,
    runtime: Handle,
}

/// Shared handle to one dispatcher instance. Clones refer to the same queue.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

/// Releases an in-flight slot when the grading task finishes, panics included.
struct SlotGuard {
    inner: Arc<Inner>,
    epoch: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inner.release(self.epoch);
    }
}

impl Dispatcher {
    /// Create a dispatcher whose failed jobs are only logged.
    ///
    /// Must be called inside a Tokio runtime; the dispatcher spawns its
    /// ticker and grading tasks on the runtime it was created in.
    pub fn new(config: DispatcherConfig, grader: Arc<dyn Grader>) -> Result<Self> {
        Self::with_dead_letters(config, grader, Arc::new(LogDeadLetters))
    }

    /// Create a dispatcher that hands exhausted jobs to `dead_letters`.
    ///
    /// A `max_concurrent` of 0 is treated as 1.
    pub fn with_dead_letters(
        config: DispatcherConfig,
        grader: Arc<dyn Grader>,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .context("Dispatcher must be created inside a Tokio runtime")?;
        let inner = Inner {
            state: Mutex::new(State::default()),
            idle: Notify::new(),
            grader,
            dead_letters,
            capacity: config.max_concurrent.max(1),
            tick_interval: config.tick_interval(),
            grade_timeout: config.grade_timeout(),
            retry: config.retry,
            runtime,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Admit a grading request. Returns false if it was rejected.
    ///
    /// Callable from any thread, async or not.
    pub fn submit(&self, request: GradingRequest) -> bool {
        self.try_submit(request).is_ok()
    }

    /// Admit a grading request, reporting why it was rejected.
    pub fn try_submit(&self, request: GradingRequest) -> Result<(), SubmitError> {
        if let Err(e) = request.validate() {
            warn!(
                subject_id = %request.subject_id,
                kind = %request.kind,
                error = %e,
                "Rejected invalid grading job"
            );
            return Err(e.into());
        }

        let key = request.key();
        let mut state = self.inner.lock();

        if !state.queue.push(GradingJob::admit(request)) {
            debug!(job = %key, "Job already pending, ignoring duplicate");
            return Err(SubmitError::Duplicate(key));
        }
        info!(job = %key, queue_length = state.queue.len(), "Job queued for grading");

        if !state.running {
            self.inner.start_ticker(&mut state);
        }
        Ok(())
    }

    pub fn status(&self) -> DispatcherStatus {
        let state = self.inner.lock();
        DispatcherStatus {
            queue_length: state.queue.len(),
            running: state.running,
            in_flight: state.in_flight,
            capacity: self.inner.capacity,
        }
    }

    /// Drop every queued job, zero the in-flight count and stop the ticker.
    ///
    /// Meant for test isolation. Grading calls already running are not
    /// cancelled; their completions no longer count against `in_flight`.
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        let dropped = state.queue.len();
        let detached = state.in_flight;

        state.queue.clear();
        state.in_flight = 0;
        state.epoch += 1;
        state.running = false;
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        drop(state);

        self.inner.idle.notify_waiters();
        info!(dropped, detached, "Grading queue reset");
    }

    /// Wait until the ticker has stopped: queue empty and nothing in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if !self.inner.lock().running {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("status", &self.status())
            .field("tick_interval", &self.inner.tick_interval)
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_ticker(self: &Arc<Self>, state: &mut State) {
        state.running = true;
        let epoch = state.epoch;
        let inner = Arc::clone(self);
        state.ticker = Some(self.runtime.spawn(inner.run_ticker(epoch)));
        info!(
            interval_ms = u64::try_from(self.tick_interval.as_millis()).unwrap_or(u64::MAX),
            capacity = self.capacity,
            "Grading loop started"
        );
    }

    async fn run_ticker(self: Arc<Self>, epoch: u64) {
        let mut ticks = time::interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticks.tick().await;
            if !self.process_next(epoch) {
                break;
            }
        }
    }

    /// One scheduler tick. Returns false once the ticker should stop.
    fn process_next(self: &Arc<Self>, epoch: u64) -> bool {
        let batch = {
            let mut state = self.lock();
            if state.epoch != epoch {
                return false;
            }

            if state.queue.is_empty() {
                if state.in_flight > 0 {
                    return true;
                }
                state.running = false;
                state.ticker = None;
                drop(state);
                self.idle.notify_waiters();
                info!("Grading queue drained, loop stopped");
                return false;
            }

            let available = self.capacity.saturating_sub(state.in_flight);
            if available == 0 {
                debug!(
                    in_flight = state.in_flight,
                    queue_length = state.queue.len(),
                    "At capacity, waiting for a free slot"
                );
                return true;
            }

            let batch = state.queue.take_batch(available);
            state.in_flight += batch.len();
            info!(
                batch = batch.len(),
                remaining = state.queue.len(),
                in_flight = state.in_flight,
                "Dispatching grading batch"
            );
            batch
        };

        for job in batch {
            self.dispatch(job, epoch);
        }
        true
    }

    fn dispatch(self: &Arc<Self>, job: GradingJob, epoch: u64) {
        let slot = SlotGuard {
            inner: Arc::clone(self),
            epoch,
        };

        self.runtime.spawn(async move {
            let inner = Arc::clone(&slot.inner);
            let key = job.key();
            let (result, attempts) =
                attempt::grade(inner.grader.as_ref(), &job, &inner.retry, inner.grade_timeout)
                    .await;

            match result {
                Ok(outcome) => {
                    info!(
                        job = %key,
                        correct = outcome.correct,
                        confidence = outcome.confidence,
                        status = %outcome.status,
                        attempts,
                        "Job graded"
                    );
                }
                Err(e) => {
                    warn!(job = %key, attempts, error = %e, "Grading failed");
                    inner.dead_letters.record(&job, &e, attempts);
                }
            }
            drop(slot);
        });
    }

    fn release(&self, epoch: u64) {
        let mut state = self.lock();
        if state.epoch == epoch {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gradeq_common::types::{GradingMethod, GradingOutcome, GradingStatus};

    struct AlwaysCorrect;

    #[async_trait]
    impl Grader for AlwaysCorrect {
        async fn evaluate(&self, _job: &GradingJob) -> anyhow::Result<GradingOutcome> {
            Ok(GradingOutcome {
                correct: true,
                confidence: 100,
                method: GradingMethod::Exact,
                status: GradingStatus::Graded,
            })
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(DispatcherConfig::default(), Arc::new(AlwaysCorrect)).unwrap()
    }

    fn request(subject: &str) -> GradingRequest {
        GradingRequest::new(subject, "quiz", "Capital of France?", "Paris", "paris")
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let err =
            Dispatcher::new(DispatcherConfig::default(), Arc::new(AlwaysCorrect)).unwrap_err();
        assert!(err.to_string().contains("inside a Tokio runtime"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_dispatcher_is_idle() {
        let d = dispatcher();
        assert_eq!(
            d.status(),
            DispatcherStatus {
                queue_length: 0,
                running: false,
                in_flight: 0,
                capacity: 5,
            }
        );
        // Nothing to wait for
        d.wait_idle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_submit_leaves_state_untouched() {
        let d = dispatcher();
        let mut req = request("1");
        req.student_answer.clear();

        assert!(!d.submit(req.clone()));
        assert!(matches!(d.try_submit(req), Err(SubmitError::Invalid(_))));
        let status = d.status();
        assert_eq!(status.queue_length, 0);
        assert!(!status.running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_capacity_is_clamped() {
        let config = DispatcherConfig {
            max_concurrent: 0,
            ..DispatcherConfig::default()
        };
        let d = Dispatcher::new(config, Arc::new(AlwaysCorrect)).unwrap();
        assert_eq!(d.status().capacity, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_serializes_for_health_checks() {
        let d = dispatcher();
        let json = serde_json::to_value(d.status()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "queue_length": 0,
                "running": false,
                "in_flight": 0,
                "capacity": 5
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_from_plain_thread() {
        let d = dispatcher();
        let handle = d.clone();
        let accepted = std::thread::spawn(move || handle.submit(request("1")))
            .join()
            .unwrap();

        assert!(accepted);
        assert!(d.status().running);
        d.wait_idle().await;
        assert_eq!(d.status().queue_length, 0);
    }
}
