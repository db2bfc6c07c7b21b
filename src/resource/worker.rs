//! Background Worker
//!
//! One thread drains the load queue in FIFO order. For each pipe it runs
//! worker-tagged tasks inline and hands context-tagged tasks to the context
//! thread through a single-slot channel, blocking until the result comes back.
//!
//! ```text
//!  load_async ──queue──▶ Worker ──jobs (cap 1)──▶ dispatch_next (context thread)
//!                          ▲                            │
//!                          └──────results (cap 1)───────┘
//! ```
//!
//! The worker never touches the backend, and at most one context task is
//! outstanding at any time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, error, info, warn};

use super::handle::{ResourceId, ResourceSlot};
use super::manager::Shared;
use super::pipe::ResourcePipe;
use super::state::ResourceState;
use super::task::{ContextTask, ResourceTask};
use crate::backend::RenderBackend;
use crate::errors::{ResourceError, TaskResult};
use crate::settings::ResourceSettings;

// ============================================================================
// Diagnostics
// ============================================================================

/// Snapshot of what the worker is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerState {
    /// Processing a pipe (as opposed to waiting for one).
    pub active: bool,
    /// Owner of the pipe being processed, or of the last one processed.
    pub target_id: Option<ResourceId>,
    /// Pipes queued but not yet picked up.
    pub tasks_pending: usize,
    /// Blocked on a context task.
    pub awaiting_context: bool,
}

#[derive(Debug, Default)]
pub(crate) struct WorkerStatus {
    active: AtomicBool,
    target: AtomicU32,
    pending: AtomicUsize,
    awaiting_context: AtomicBool,
}

impl WorkerStatus {
    pub(crate) fn snapshot(&self) -> WorkerState {
        let target = self.target.load(Ordering::Acquire);
        WorkerState {
            active: self.active.load(Ordering::Acquire),
            target_id: (target != 0).then(|| ResourceId::new(target)),
            tasks_pending: self.pending.load(Ordering::Acquire),
            awaiting_context: self.awaiting_context.load(Ordering::Acquire),
        }
    }

    pub(crate) fn enqueued(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unqueued(&self) {
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Result of one [`dispatch_next`](super::ResourceManager::dispatch_next) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No context task was waiting.
    Idle,
    /// One context task ran.
    Dispatched {
        resource: ResourceId,
        task: &'static str,
        ok: bool,
    },
}

impl DispatchOutcome {
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

// ============================================================================
// Hand-off Channels
// ============================================================================

pub(crate) struct ContextJob {
    owner: ResourceId,
    task: ContextTask,
}

/// Worker end of the hand-off.
pub(crate) struct WorkerLink {
    jobs: flume::Sender<ContextJob>,
    results: flume::Receiver<TaskResult>,
}

/// Context-thread end of the hand-off.
pub(crate) struct ContextLink {
    jobs: flume::Receiver<ContextJob>,
    results: flume::Sender<TaskResult>,
}

pub(crate) fn hand_off_channel() -> (WorkerLink, ContextLink) {
    let (job_tx, job_rx) = flume::bounded(1);
    let (result_tx, result_rx) = flume::bounded(1);
    (
        WorkerLink {
            jobs: job_tx,
            results: result_rx,
        },
        ContextLink {
            jobs: job_rx,
            results: result_tx,
        },
    )
}

impl ContextLink {
    /// Runs the waiting context task, if any. Never blocks.
    pub(crate) fn dispatch(&self, backend: &mut dyn RenderBackend) -> DispatchOutcome {
        let Ok(ContextJob { owner, task }) = self.jobs.try_recv() else {
            return DispatchOutcome::Idle;
        };
        let label = task.label();
        let result = task.run(backend);
        let ok = result.is_ok();
        if self.results.send(result).is_err() {
            warn!("Worker went away before receiving the result of '{label}' (resource {owner})");
        }
        DispatchOutcome::Dispatched {
            resource: owner,
            task: label,
            ok,
        }
    }
}

// ============================================================================
// Worker Thread
// ============================================================================

pub(crate) struct Worker {
    shared: Arc<Shared>,
    queue: flume::Receiver<ResourcePipe>,
    link: WorkerLink,
}

impl Worker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        queue: flume::Receiver<ResourcePipe>,
        link: WorkerLink,
    ) -> Self {
        Self {
            shared,
            queue,
            link,
        }
    }

    pub(crate) fn spawn(self, settings: &ResourceSettings) -> std::io::Result<JoinHandle<()>> {
        let mut builder = thread::Builder::new().name(settings.worker_name.clone());
        if let Some(stack_size) = settings.worker_stack_size {
            builder = builder.stack_size(stack_size);
        }
        builder.spawn(move || self.run())
    }

    fn run(self) {
        info!("Resource worker started");
        let status = &self.shared.status;
        loop {
            status.active.store(false, Ordering::Release);
            let Ok(pipe) = self.queue.recv() else {
                break;
            };
            status.active.store(true, Ordering::Release);
            status.unqueued();
            self.process(pipe);
        }
        status.active.store(false, Ordering::Release);
        info!("Resource worker stopped");
    }

    fn process(&self, pipe: ResourcePipe) {
        let owner = pipe.owner();
        self.shared.status.target.store(owner.get(), Ordering::Release);

        let Some(slot) = self.shared.slot(owner) else {
            warn!("Dropping queued load for resource {owner}: no longer registered");
            pipe.finish();
            return;
        };
        if !self.shared.advance(&slot, ResourceState::Queued, ResourceState::Loading) {
            debug!(
                "Skipping stale load for '{}' (now {:?})",
                slot.name,
                slot.state.get()
            );
            pipe.finish();
            return;
        }

        let _ = drive(&self.shared, &slot, pipe, |task| match task {
            ResourceTask::Worker(task) => task.run(),
            ResourceTask::Context(task) => self.hand_off(owner, task),
        });
    }

    fn hand_off(&self, owner: ResourceId, task: ContextTask) -> TaskResult {
        let awaiting = &self.shared.status.awaiting_context;
        let already = awaiting.swap(true, Ordering::AcqRel);
        debug_assert!(!already, "a context task is already outstanding");

        let result = match self.link.jobs.send(ContextJob { owner, task }) {
            Ok(()) => self
                .link
                .results
                .recv()
                .unwrap_or(Err(ResourceError::Shutdown)),
            Err(_) => Err(ResourceError::Shutdown),
        };
        awaiting.store(false, Ordering::Release);
        result
    }
}

// ============================================================================
// Pipe Execution
// ============================================================================

/// Drains `pipe` through `exec`, stopping at the first failure.
///
/// The resource must already be `Loading`. Runs the pipe's release hook, then
/// records the terminal state.
pub(crate) fn drive(
    shared: &Shared,
    slot: &ResourceSlot,
    mut pipe: ResourcePipe,
    mut exec: impl FnMut(ResourceTask) -> TaskResult,
) -> TaskResult {
    let started = Instant::now();
    let outcome = loop {
        if shared.is_shutting_down() {
            break Err(("shutdown", ResourceError::Shutdown));
        }
        if slot.is_cancelled() {
            break Err(("cancel", ResourceError::Cancelled));
        }
        let Some(task) = pipe.next() else {
            break Ok(());
        };
        let label = task.label();
        let task_started = Instant::now();
        let result = exec(task);
        if shared.task_timing {
            debug!(
                "{} '{}': {label} took {:?}",
                slot.kind,
                slot.name,
                task_started.elapsed()
            );
        }
        if let Err(err) = result {
            break Err((label, err));
        }
    };
    pipe.finish();

    match outcome {
        Ok(()) => {
            info!(
                "Loaded {} '{}' in {:?}",
                slot.kind,
                slot.name,
                started.elapsed()
            );
            shared.finish(slot, Ok(()));
            Ok(())
        }
        Err((label, err)) => {
            match err {
                ResourceError::Cancelled | ResourceError::Shutdown => warn!(
                    "Load of {} '{}' abandoned: {err}",
                    slot.kind, slot.name
                ),
                _ => error!(
                    "Failed to load {} '{}' from {} at '{label}': {err}",
                    slot.kind,
                    slot.name,
                    slot.resource.source()
                ),
            }
            shared.finish(slot, Err(err.clone()));
            Err(err)
        }
    }
}
