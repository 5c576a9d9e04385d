//! Bounded background work queue.
//!
//! A fixed pool of worker tasks pulls jobs from a bounded channel. Every job
//! carries its own [`CancellationToken`] and is cancelled when it outlives the
//! configured timeout, so a wedged job frees its slot.

use crate::callback::{IdentifierServiceCallback, ProviderSelection};
use crate::config::WorkQueueConfig;
use crate::error::QueueError;
use crate::resolve::HandleResolver;
use crate::resource::{HandleTarget, Resource, ResourceType};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Named string arguments handed to a worker.
pub type TaskArgs = HashMap<String, String>;

/// A unit of background work.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Run one task. Long-running work should watch `cancel`.
    async fn work(&self, args: TaskArgs, cancel: CancellationToken) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The worker returned `Ok`.
    Completed,
    /// The worker returned an error, or its task panicked.
    Failed(String),
    /// The task outlived the queue's timeout and was cancelled.
    TimedOut,
    /// The task was cancelled through its [`TaskHandle`].
    Cancelled,
}

struct Job {
    id: u64,
    worker: Arc<dyn Worker>,
    args: TaskArgs,
    cancel: CancellationToken,
    outcome: oneshot::Sender<TaskOutcome>,
}

/// Caller's view of a queued task.
#[derive(Debug)]
pub struct TaskHandle {
    id: u64,
    cancel: CancellationToken,
    outcome: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancel the task, whether it is still queued or already running.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the task to finish.
    pub async fn outcome(self) -> TaskOutcome {
        self.outcome
            .await
            .unwrap_or_else(|_| TaskOutcome::Failed("task was dropped before it finished".to_string()))
    }
}

async fn run(job: Job, timeout: Duration) {
    let Job {
        id,
        worker,
        args,
        cancel,
        outcome,
    } = job;

    let result = if cancel.is_cancelled() {
        TaskOutcome::Cancelled
    } else {
        let token = cancel.clone();
        let mut task = tokio::spawn(async move { worker.work(args, token).await });
        tokio::select! {
            biased;
            joined = &mut task => match joined {
                Ok(Ok(())) => TaskOutcome::Completed,
                Ok(Err(message)) => TaskOutcome::Failed(message),
                Err(err) => TaskOutcome::Failed(err.to_string()),
            },
            () = cancel.cancelled() => {
                task.abort();
                TaskOutcome::Cancelled
            }
            () = tokio::time::sleep(timeout) => {
                cancel.cancel();
                task.abort();
                TaskOutcome::TimedOut
            }
        }
    };

    match &result {
        TaskOutcome::Completed => debug!(task = id, "background task completed"),
        TaskOutcome::Failed(message) => warn!(task = id, error = %message, "background task failed"),
        TaskOutcome::TimedOut => warn!(task = id, ?timeout, "background task timed out"),
        TaskOutcome::Cancelled => debug!(task = id, "background task cancelled"),
    }
    // The caller may have dropped its handle.
    let _ = outcome.send(result);
}

/// Fixed-size pool of background workers fed by a bounded queue.
pub struct WorkQueue {
    config: WorkQueueConfig,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl WorkQueue {
    /// Spawn `config.threads` workers on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(config: WorkQueueConfig) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(config.capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers = (0..config.threads.max(1))
            .map(|slot| {
                let receiver = Arc::clone(&receiver);
                let timeout = config.task_timeout;
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else {
                            break;
                        };
                        run(job, timeout).await;
                    }
                    debug!(slot, "background worker stopped");
                })
            })
            .collect();
        info!(
            threads = config.threads,
            capacity = config.capacity,
            "started background work queue"
        );
        Self {
            config,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &WorkQueueConfig {
        &self.config
    }

    /// Queue a task without waiting. Fails when the queue is full or shut down.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] when every slot is taken and
    /// [`QueueError::Closed`] after [`shutdown`](Self::shutdown).
    pub fn enqueue(&self, worker: Arc<dyn Worker>, args: TaskArgs) -> Result<TaskHandle, QueueError> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(QueueError::Closed)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        sender
            .try_send(Job {
                id,
                worker,
                args,
                cancel: cancel.clone(),
                outcome: outcome_tx,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            })?;
        debug!(task = id, "queued background task");
        Ok(TaskHandle {
            id,
            cancel,
            outcome: outcome_rx,
        })
    }

    /// Stop accepting tasks and wait for the workers to drain the queue.
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "background worker ended abnormally");
            }
        }
        info!("background work queue shut down");
    }
}

/// Provider name the handle resolver answers to in provider rules.
pub const HANDLE_PROVIDER: &str = "handle";

/// Mints a handle for a freshly imported resource.
///
/// Arguments: `resource_id` (UUID), `resource_type` (numeric tag) and an
/// optional `collection_id` consulted against the provider rules.
///
/// Cancellation is checked on the blocking pool right before minting. A mint
/// that has already started runs to completion even when the task is
/// cancelled or times out, so the handle it binds stays bound.
pub struct AssignIdentifierWorker {
    resolver: Arc<dyn HandleResolver>,
    selection: Option<Arc<ProviderSelection>>,
}

impl AssignIdentifierWorker {
    pub fn new(resolver: Arc<dyn HandleResolver>) -> Self {
        Self {
            resolver,
            selection: None,
        }
    }

    pub fn with_selection(mut self, selection: Arc<ProviderSelection>) -> Self {
        self.selection = Some(selection);
        self
    }

    fn wanted(&self, args: &TaskArgs) -> Result<bool, String> {
        let (Some(selection), Some(collection)) = (&self.selection, args.get("collection_id")) else {
            return Ok(true);
        };
        let collection = Uuid::parse_str(collection).map_err(|e| format!("bad collection_id: {e}"))?;
        Ok(selection.for_collection(collection).register_p(HANDLE_PROVIDER))
    }
}

fn parse_target(args: &TaskArgs) -> Result<Resource, String> {
    let id = args
        .get("resource_id")
        .ok_or("missing resource_id")?
        .parse::<Uuid>()
        .map_err(|e| format!("bad resource_id: {e}"))?;
    let tag = args
        .get("resource_type")
        .ok_or("missing resource_type")?
        .parse::<i32>()
        .map_err(|e| format!("bad resource_type: {e}"))?;
    let resource_type =
        ResourceType::from_tag(tag).ok_or_else(|| format!("unknown resource type tag {tag}"))?;
    Ok(Resource::with_id(id, resource_type))
}

#[async_trait]
impl Worker for AssignIdentifierWorker {
    async fn work(&self, args: TaskArgs, cancel: CancellationToken) -> Result<(), String> {
        let mut resource = parse_target(&args)?;
        if !self.wanted(&args)? {
            debug!(id = %resource.to_ref().id, "handle provider not wanted for collection");
            return Ok(());
        }
        let resolver = Arc::clone(&self.resolver);
        let token = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            if token.is_cancelled() {
                return Err("cancelled before minting".to_string());
            }
            let handle = resolver.mint_and_bind(&mut resource).map_err(|e| e.to_string())?;
            if token.is_cancelled() {
                warn!(handle = %handle, "minted handle for a task that was cancelled meanwhile");
            }
            Ok(handle)
        })
        .await
        .map_err(|e| e.to_string())??;
        info!(handle = %handle, "assigned identifier to imported resource");
        Ok(())
    }
}
