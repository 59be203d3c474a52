//! Rate-limited archive dispatch.
//!
//! A single global FIFO of archive requests, drained by exactly one worker
//! task. Two archive attempts never overlap, and consecutive attempts reach
//! the archive service at least `min_interval` apart, measured from the start
//! of one attempt to the start of the next. A failed attempt goes back to the
//! tail of the queue until the request has used `max_attempts`, after which it
//! is dropped and reported.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::{ArchiveConfig, ArchiveRequest};
use crate::pipeline::detect::ArchiveQueue;
use crate::services::ArchiveService;
use crate::storage::Store;

/// Monotonic time source of the dispatcher.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep_until(&self, deadline: Instant);
}

/// Clock backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Floor between the starts of two attempts
    pub min_interval: Duration,
    /// Attempts per request, the first one included
    pub max_attempts: u32,
    /// Used when the store has no User-Agent pool
    pub fallback_user_agent: String,
}

impl DispatcherConfig {
    pub fn from_archive_config(config: &ArchiveConfig, fallback_user_agent: &str) -> Self {
        Self {
            min_interval: config.min_interval(),
            max_attempts: config.max_attempts.max(1),
            fallback_user_agent: fallback_user_agent.to_string(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from_archive_config(&ArchiveConfig::default(), "Mozilla/5.0")
    }
}

/// Result of one archive attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Captured; holds the snapshot URL
    Success(String),
    /// Failed, with attempts left
    Retryable(String),
    /// Failed for the last time
    Exhausted(String),
}

/// Fold an attempt result into an outcome, counting the failure on `request`.
pub fn classify(
    result: Result<String>,
    request: &mut ArchiveRequest,
    max_attempts: u32,
) -> AttemptOutcome {
    match result {
        Ok(archive_url) => AttemptOutcome::Success(archive_url),
        Err(e) => {
            request.attempt += 1;
            if request.attempt >= max_attempts {
                AttemptOutcome::Exhausted(e.to_string())
            } else {
                AttemptOutcome::Retryable(e.to_string())
            }
        }
    }
}

/// Terminal and retry notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    Archived {
        target_id: i64,
        url: String,
        archive_url: String,
        attempts: u32,
    },
    RetryScheduled {
        target_id: i64,
        url: String,
        attempt: u32,
        reason: String,
    },
    Exhausted {
        target_id: i64,
        url: String,
        attempts: u32,
        reason: String,
    },
}

/// Counts of what the worker did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub archived: usize,
    pub retried: usize,
    pub exhausted: usize,
}

struct QueueState {
    pending: VecDeque<ArchiveRequest>,
    /// When the last attempt reached the archive service; `None` until the
    /// first attempt
    last_attempt_started: Option<Instant>,
    closed: bool,
    summary: DispatchSummary,
}

struct Shared {
    state: Mutex<QueueState>,
    wake: Notify,
    clock: Arc<dyn Clock>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Global archive queue with its single worker.
pub struct ArchiveDispatcher {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<DispatchSummary>>,
}

impl ArchiveDispatcher {
    /// Start a dispatcher on the tokio clock.
    pub fn spawn(
        config: DispatcherConfig,
        store: Arc<dyn Store>,
        service: Arc<dyn ArchiveService>,
    ) -> Self {
        Self::spawn_with(config, store, service, Arc::new(TokioClock), None)
    }

    /// Start a dispatcher with an explicit clock and event subscriber.
    pub fn spawn_with(
        config: DispatcherConfig,
        store: Arc<dyn Store>,
        service: Arc<dyn ArchiveService>,
        clock: Arc<dyn Clock>,
        events: Option<mpsc::UnboundedSender<DispatchEvent>>,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                last_attempt_started: None,
                closed: false,
                summary: DispatchSummary::default(),
            }),
            wake: Notify::new(),
            clock,
        });

        let worker = Worker {
            shared: Arc::clone(&shared),
            store,
            service,
            config,
            events,
        };

        Self {
            shared,
            worker: Some(tokio::spawn(worker.run())),
        }
    }

    /// Append a request to the tail of the queue. Never blocks.
    pub fn enqueue(&self, target_id: i64, url: &str) {
        let request = ArchiveRequest::new(target_id, url, self.shared.clock.now());
        {
            let mut state = self.shared.lock();
            if state.closed {
                log::warn!("Archive queue closed, dropping request for {}", url);
                return;
            }
            state.pending.push_back(request);
            log::debug!("Queued archive of {} ({} pending)", url, state.pending.len());
        }
        self.shared.wake.notify_one();
    }

    /// Requests waiting in the queue, not counting one in flight.
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Close the queue, let the worker drain it, and return its summary.
    pub async fn shutdown(mut self) -> DispatchSummary {
        self.close();
        match self.worker.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                log::error!("Archive worker ended abnormally: {}", e);
                self.shared.lock().summary
            }),
            None => self.shared.lock().summary,
        }
    }

    fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.wake.notify_one();
    }
}

impl ArchiveQueue for ArchiveDispatcher {
    fn enqueue(&self, target_id: i64, url: &str) {
        ArchiveDispatcher::enqueue(self, target_id, url);
    }
}

impl Drop for ArchiveDispatcher {
    fn drop(&mut self) {
        // The detached worker still drains what is queued.
        self.close();
    }
}

struct Worker {
    shared: Arc<Shared>,
    store: Arc<dyn Store>,
    service: Arc<dyn ArchiveService>,
    config: DispatcherConfig,
    events: Option<mpsc::UnboundedSender<DispatchEvent>>,
}

impl Worker {
    async fn run(self) -> DispatchSummary {
        while let Some(mut request) = self.next_request().await {
            self.wait_for_slot().await;
            let result = self.attempt(&request).await;
            let outcome = classify(result, &mut request, self.config.max_attempts);
            self.settle(request, outcome);
        }
        log::debug!("Archive worker stopped");
        self.shared.lock().summary
    }

    /// Head of the queue; `None` once the queue is closed and empty.
    async fn next_request(&self) -> Option<ArchiveRequest> {
        loop {
            {
                let mut state = self.shared.lock();
                if let Some(request) = state.pending.pop_front() {
                    return Some(request);
                }
                if state.closed {
                    return None;
                }
            }
            self.shared.wake.notified().await;
        }
    }

    async fn wait_for_slot(&self) {
        let deadline = self
            .shared
            .lock()
            .last_attempt_started
            .map(|last| last + self.config.min_interval);

        let now = self.shared.clock.now();
        if let Some(deadline) = deadline
            && deadline > now
        {
            log::debug!("Waiting {:?} for the next archive slot", deadline - now);
            self.shared.clock.sleep_until(deadline).await;
        }
    }

    fn mark_attempt_started(&self) {
        self.shared.lock().last_attempt_started = Some(self.shared.clock.now());
    }

    async fn attempt(&self, request: &ArchiveRequest) -> Result<String> {
        let user_agent = match self.store.pick_random_user_agent().await {
            Ok(Some(agent)) => agent,
            Ok(None) => self.config.fallback_user_agent.clone(),
            Err(e) => {
                log::warn!("User-Agent lookup failed, using fallback: {}", e);
                self.config.fallback_user_agent.clone()
            }
        };

        let status = self.service.check_status(&request.url, &user_agent).await;
        self.mark_attempt_started();
        let status = status?;
        if status != 200 {
            return Err(AppError::archive(
                &request.url,
                Some(status),
                "page status check failed",
            ));
        }

        let archive_url = self.service.capture(&request.url, &user_agent).await?;
        self.store
            .upsert_archive_record(request.target_id, &archive_url)
            .await?;
        Ok(archive_url)
    }

    fn settle(&self, request: ArchiveRequest, outcome: AttemptOutcome) {
        let event = match outcome {
            AttemptOutcome::Success(archive_url) => {
                log::info!("Archived {} -> {}", request.url, archive_url);
                self.shared.lock().summary.archived += 1;
                DispatchEvent::Archived {
                    target_id: request.target_id,
                    url: request.url,
                    archive_url,
                    attempts: request.attempt + 1,
                }
            }
            AttemptOutcome::Retryable(reason) => {
                log::warn!(
                    "Archive failed for {} (attempt {}/{}): {}",
                    request.url,
                    request.attempt,
                    self.config.max_attempts,
                    reason
                );
                let event = DispatchEvent::RetryScheduled {
                    target_id: request.target_id,
                    url: request.url.clone(),
                    attempt: request.attempt,
                    reason,
                };
                let mut state = self.shared.lock();
                state.summary.retried += 1;
                state.pending.push_back(request);
                event
            }
            AttemptOutcome::Exhausted(reason) => {
                log::error!(
                    "Archive gave up on {} after {} attempts: {}",
                    request.url,
                    request.attempt,
                    reason
                );
                self.shared.lock().summary.exhausted += 1;
                DispatchEvent::Exhausted {
                    target_id: request.target_id,
                    url: request.url,
                    attempts: request.attempt,
                    reason,
                }
            }
        };

        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is listening.
            let _ = events.send(event);
        }
    }
}
