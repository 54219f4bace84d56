//! Bounded, deduplicating hand-off from the webhook to the pipeline.
//!
//! `dispatch` never blocks: a notification is either queued, recognized as a
//! duplicate, or dropped when the queue is full. A fixed pool of worker tasks
//! drains the queue, each run bounded by a timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::pipeline::PipelineError;
use crate::sanitize;
use crate::tickets::TicketStore;

/// Work executed for each dispatched message id.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, message_id: &str) -> Result<(), PipelineError>;
}

/// Pool settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Runs exceeding this are abandoned and their message released.
    pub run_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            run_timeout: Duration::from_secs(45),
        }
    }
}

/// What happened to a dispatched message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Scheduled,
    /// A ticket already exists for the message.
    AlreadyProcessed,
    /// A run for the message is queued or executing.
    InFlight,
    /// The queue is at capacity; the notification is dropped.
    QueueFull,
    /// The dispatcher is shutting down.
    Closed,
}

impl DispatchOutcome {
    pub fn is_duplicate(self) -> bool {
        matches!(self, DispatchOutcome::AlreadyProcessed | DispatchOutcome::InFlight)
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub scheduled: u64,
    pub duplicates: u64,
    pub dropped: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub in_flight: u64,
}

#[derive(Default)]
struct Counters {
    scheduled: AtomicU64,
    duplicates: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

/// Membership in the in-flight set, released on drop.
struct InFlightClaim {
    set: Arc<DashSet<String>>,
    message_id: String,
}

impl InFlightClaim {
    fn acquire(set: &Arc<DashSet<String>>, message_id: &str) -> Option<Self> {
        set.insert(message_id.to_string()).then(|| Self {
            set: Arc::clone(set),
            message_id: message_id.to_string(),
        })
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.set.remove(&self.message_id);
    }
}

struct Job {
    claim: InFlightClaim,
}

/// Deduplicating dispatcher with a bounded worker pool.
pub struct NotificationDispatcher {
    store: TicketStore,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    in_flight: Arc<DashSet<String>>,
    counters: Arc<Counters>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl NotificationDispatcher {
    /// Starts `config.workers` worker tasks (at least one). Must be called
    /// inside a tokio runtime.
    pub fn start(
        store: TicketStore,
        processor: Arc<dyn MessageProcessor>,
        config: DispatcherConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(config.queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let counters = Arc::new(Counters::default());
        let worker_count = config.workers.max(1);

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&receiver),
                    Arc::clone(&processor),
                    Arc::clone(&counters),
                    config.run_timeout,
                ))
            })
            .collect();

        info!(
            workers = worker_count,
            queue_capacity = config.queue_capacity,
            "Dispatcher started"
        );

        Self {
            store,
            sender: Mutex::new(Some(sender)),
            in_flight: Arc::new(DashSet::new()),
            counters,
            workers: Mutex::new(workers),
        }
    }

    /// Schedules processing of `message_id` unless it is a duplicate.
    pub fn dispatch(&self, message_id: &str) -> DispatchOutcome {
        let short = sanitize::short_id(message_id);

        // Claim first so a run finishing between the two checks cannot slip
        // a second run through.
        let Some(claim) = InFlightClaim::acquire(&self.in_flight, message_id) else {
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(message_id = %short, "Message already in flight");
            return DispatchOutcome::InFlight;
        };

        match self.store.is_processed(message_id) {
            Ok(true) => {
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                debug!(message_id = %short, "Message already processed");
                return DispatchOutcome::AlreadyProcessed;
            }
            Ok(false) => {}
            // The pipeline checks again before creating anything.
            Err(e) => warn!(message_id = %short, error = %e, "Processed lookup failed"),
        }

        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        let Some(sender) = sender else {
            return DispatchOutcome::Closed;
        };

        match sender.try_send(Job { claim }) {
            Ok(()) => {
                self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
                debug!(message_id = %short, "Message scheduled");
                DispatchOutcome::Scheduled
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                error!(message_id = %short, "Dispatch queue full, notification dropped");
                DispatchOutcome::QueueFull
            }
            Err(TrySendError::Closed(_)) => DispatchOutcome::Closed,
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            in_flight: self.in_flight.len() as u64,
        }
    }

    /// Stops accepting work, lets the workers drain the queue and waits for
    /// them.
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().ok().and_then(|mut guard| guard.take());
        drop(sender);

        let workers: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for (i, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                error!(worker = i, error = %e, "Dispatcher worker panicked");
            }
        }
        info!("Dispatcher stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    processor: Arc<dyn MessageProcessor>,
    counters: Arc<Counters>,
    run_timeout: Duration,
) {
    debug!(worker = worker_id, "Worker started");
    loop {
        let job = { receiver.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };
        let message_id = job.claim.message_id.as_str();
        let short = sanitize::short_id(message_id);

        match tokio::time::timeout(run_timeout, processor.process(message_id)).await {
            Ok(Ok(())) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(worker = worker_id, message_id = %short, error = %e, "Pipeline run failed");
            }
            Err(_) => {
                counters.timed_out.fetch_add(1, Ordering::Relaxed);
                error!(
                    worker = worker_id,
                    message_id = %short,
                    timeout_secs = run_timeout.as_secs(),
                    "Pipeline run timed out and was abandoned"
                );
            }
        }
        // Dropping the job releases the in-flight claim.
        drop(job);
    }
    debug!(worker = worker_id, "Worker stopped");
}
