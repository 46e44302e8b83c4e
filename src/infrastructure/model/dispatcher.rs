//! Rate-limited priority dispatch to the completion endpoint
//!
//! One dispatcher instance is constructed at process start and shared by
//! every component needing the external model; nothing else may call the
//! endpoint directly. The dispatcher owns the request and token budgets,
//! so its limiters are the authoritative load-shedding contract for the
//! whole pipeline.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, Semaphore, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::errors::ModelError;
use crate::config::ModelConfig;

use super::chat::{CompletionClient, CompletionRequest, TokenCoster};
use super::rate_limit::TokenBucket;

/// Priority tier of a dispatch requestor.
///
/// Lower tiers always drain first; within a tier dispatch is strictly
/// first-submitted-first-served. A saturated low tier can starve higher
/// ones, which is the accepted tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestorTier {
    Reconcile,
    Filter,
    Anonymous,
}

struct QueuedRequest {
    tier: RequestorTier,
    seq: u64,
    cost: usize,
    request: CompletionRequest,
    reply: oneshot::Sender<Result<String, ModelError>>,
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.tier == other.tier && self.seq == other.seq
    }
}

impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops its greatest element; invert so the lowest tier
        // and earliest sequence number surface first.
        other
            .tier
            .cmp(&self.tier)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Handle to a submitted request. Submission returns immediately; waiting
/// on the handle is the submitter's only suspension point.
pub struct CompletionHandle {
    receiver: oneshot::Receiver<Result<String, ModelError>>,
}

impl CompletionHandle {
    pub async fn wait(self) -> Result<String, ModelError> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Abandoned),
        }
    }
}

#[derive(Default)]
struct StatsCounters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of dispatcher activity counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherStats {
    pub submitted: u64,
    pub rejected: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
}

struct Shared {
    queue: Mutex<BinaryHeap<QueuedRequest>>,
    queue_notify: Notify,
    next_seq: AtomicU64,
    token_bucket: TokenBucket,
    request_bucket: TokenBucket,
    workers: Arc<Semaphore>,
    client: Arc<dyn CompletionClient>,
    coster: TokenCoster,
    context_window: usize,
    accepting: AtomicBool,
    stats: StatsCounters,
}

impl Shared {
    /// The dispatch loop's suspension point: parks until work arrives.
    async fn next_request(&self) -> QueuedRequest {
        loop {
            if let Some(request) = self
                .queue
                .lock()
                .expect("dispatch queue lock poisoned")
                .pop()
            {
                return request;
            }
            self.queue_notify.notified().await;
        }
    }
}

/// Process-wide dispatcher for completion requests
pub struct ModelDispatcher {
    shared: Arc<Shared>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

impl ModelDispatcher {
    /// Construct the dispatcher and spawn its dispatch task. Must be
    /// called inside a tokio runtime.
    pub fn new(
        config: &ModelConfig,
        client: Arc<dyn CompletionClient>,
    ) -> Result<Self, ModelError> {
        let coster = TokenCoster::new()?;
        let shared = Arc::new(Shared {
            queue: Mutex::new(BinaryHeap::new()),
            queue_notify: Notify::new(),
            next_seq: AtomicU64::new(0),
            token_bucket: TokenBucket::per_minute(config.tokens_per_minute),
            request_bucket: TokenBucket::per_minute(config.requests_per_minute),
            workers: Arc::new(Semaphore::new(config.workers.max(1))),
            client,
            coster,
            context_window: config.context_window_tokens,
            accepting: AtomicBool::new(true),
            stats: StatsCounters::default(),
        });

        let dispatch_task = tokio::spawn(Self::dispatch_loop(Arc::clone(&shared)));

        Ok(Self {
            shared,
            dispatch_task: Mutex::new(Some(dispatch_task)),
        })
    }

    /// Enqueue a request for dispatch. Returns immediately with a handle.
    ///
    /// Oversized requests are rejected here, before they can consume queue
    /// space or limiter budget.
    pub fn submit(
        &self,
        request: CompletionRequest,
        tier: RequestorTier,
    ) -> Result<CompletionHandle, ModelError> {
        if !self.shared.accepting.load(AtomicOrdering::SeqCst) {
            return Err(ModelError::ShuttingDown);
        }

        let cost = self.shared.coster.cost(&request);
        if cost > self.shared.context_window {
            self.shared
                .stats
                .rejected
                .fetch_add(1, AtomicOrdering::Relaxed);
            return Err(ModelError::OversizedRequest {
                cost,
                limit: self.shared.context_window,
            });
        }

        let (reply, receiver) = oneshot::channel();
        let seq = self.shared.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.shared
            .queue
            .lock()
            .expect("dispatch queue lock poisoned")
            .push(QueuedRequest {
                tier,
                seq,
                cost,
                request,
                reply,
            });
        self.shared
            .stats
            .submitted
            .fetch_add(1, AtomicOrdering::Relaxed);
        self.shared.queue_notify.notify_one();

        Ok(CompletionHandle { receiver })
    }

    /// Pure token cost of a request; no network involved
    pub fn token_cost(&self, request: &CompletionRequest) -> usize {
        self.shared.coster.cost(request)
    }

    /// Largest request cost accepted for dispatch
    pub fn context_window(&self) -> usize {
        self.shared.context_window
    }

    /// Probe the completion endpoint without consuming limiter budget
    pub async fn test_connection(&self) -> bool {
        match self.shared.client.list_models().await {
            Ok(models) => {
                debug!(models = models.len(), "Completion endpoint reachable");
                true
            }
            Err(error) => {
                warn!(error = %error, "Completion endpoint probe failed");
                false
            }
        }
    }

    /// Activity counters since construction
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            submitted: self.shared.stats.submitted.load(AtomicOrdering::Relaxed),
            rejected: self.shared.stats.rejected.load(AtomicOrdering::Relaxed),
            dispatched: self.shared.stats.dispatched.load(AtomicOrdering::Relaxed),
            completed: self.shared.stats.completed.load(AtomicOrdering::Relaxed),
            failed: self.shared.stats.failed.load(AtomicOrdering::Relaxed),
        }
    }

    /// Stop accepting submissions and cancel the dispatch task.
    ///
    /// In-flight worker calls are left to finish. Requests still queued are
    /// abandoned; their handles resolve with [`ModelError::Abandoned`]
    /// rather than hanging forever.
    pub fn shutdown(&self) {
        self.shared.accepting.store(false, AtomicOrdering::SeqCst);

        if let Some(task) = self
            .dispatch_task
            .lock()
            .expect("dispatch task lock poisoned")
            .take()
        {
            task.abort();
        }

        let abandoned = {
            let mut queue = self
                .shared
                .queue
                .lock()
                .expect("dispatch queue lock poisoned");
            let count = queue.len();
            queue.clear();
            count
        };
        if abandoned > 0 {
            warn!(abandoned, "Abandoning undispatched requests at shutdown");
        }
    }

    /// One dedicated ordering task: takes the highest-priority request,
    /// pays for it at both limiters, then hands it to the worker pool.
    /// A failed call never takes the loop down.
    async fn dispatch_loop(shared: Arc<Shared>) {
        loop {
            let queued = shared.next_request().await;

            shared.token_bucket.acquire(queued.cost as u32).await;
            shared.request_bucket.acquire(1).await;

            let permit = match Arc::clone(&shared.workers).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            shared
                .stats
                .dispatched
                .fetch_add(1, AtomicOrdering::Relaxed);

            let worker_shared = Arc::clone(&shared);
            tokio::spawn(async move {
                let _permit = permit;
                let result = worker_shared.client.complete(&queued.request).await;
                match &result {
                    Ok(_) => {
                        worker_shared
                            .stats
                            .completed
                            .fetch_add(1, AtomicOrdering::Relaxed);
                    }
                    Err(error) => {
                        warn!(error = %error, "Completion call failed");
                        worker_shared
                            .stats
                            .failed
                            .fetch_add(1, AtomicOrdering::Relaxed);
                    }
                }
                // The submitter may have gone away; nothing to do then.
                let _ = queued.reply.send(result);
            });
        }
    }
}
