//! Resource Manager
//!
//! [`ResourceManager`] is the table of every resource plus the machinery that
//! loads them: a FIFO queue drained by one background worker, and a hand-off
//! slot through which the worker passes context tasks to the thread owning the
//! backend.
//!
//! # Usage
//!
//! ```rust,ignore
//! let manager = ResourceManager::new();
//! let brick = manager.create("brick", Texture::new("textures/brick.png"));
//!
//! manager.load_async(brick.id())?;
//!
//! // Frame loop, on the context thread:
//! loop {
//!     manager.dispatch_next(&mut backend);
//!     if brick.is_ready() {
//!         break;
//!     }
//! }
//! ```
//!
//! `load_sync` runs the same pipe on the calling thread, context tasks
//! included, and is meant for loading screens and tools.
//!
//! # Threading
//!
//! All methods take `&self`. `dispatch_next`, `load_sync` and `prune` need the
//! backend and therefore belong to the context thread.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::JoinHandle;

use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use super::events::{EventBus, ResourceEvent};
use super::handle::{ResourceHandle, ResourceId, ResourceSlot};
use super::pipe::ResourcePipe;
use super::state::ResourceState;
use super::traits::Resource;
use super::worker::{
    ContextLink, DispatchOutcome, Worker, WorkerState, WorkerStatus, drive, hand_off_channel,
};
use crate::backend::RenderBackend;
use crate::errors::{ResourceError, Result, TaskResult};
use crate::settings::ResourceSettings;

// ============================================================================
// Shared State
// ============================================================================

struct Entry {
    slot: Arc<ResourceSlot>,
    typed: Arc<dyn Any + Send + Sync>,
}

/// State reachable from both the manager and the worker thread.
pub(crate) struct Shared {
    table: RwLock<FxHashMap<ResourceId, Entry>>,
    pub(crate) status: WorkerStatus,
    events: EventBus,
    shutdown: AtomicBool,
    pub(crate) task_timing: bool,
}

impl Shared {
    fn new(settings: &ResourceSettings) -> Self {
        Self {
            table: RwLock::new(FxHashMap::default()),
            status: WorkerStatus::default(),
            events: EventBus::default(),
            shutdown: AtomicBool::new(false),
            task_timing: settings.task_timing,
        }
    }

    pub(crate) fn slot(&self, id: ResourceId) -> Option<Arc<ResourceSlot>> {
        self.table.read().get(&id).map(|entry| Arc::clone(&entry.slot))
    }

    #[inline]
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn notify(&self, slot: &ResourceSlot, state: ResourceState, error: Option<ResourceError>) {
        trace!("Resource {} '{}' -> {state:?}", slot.id, slot.name);
        self.events.emit(&ResourceEvent {
            id: slot.id,
            name: Arc::clone(&slot.name),
            state,
            error,
        });
    }

    /// Exact `from -> next` move; publishes the change on success.
    pub(crate) fn advance(
        &self,
        slot: &ResourceSlot,
        from: ResourceState,
        next: ResourceState,
    ) -> bool {
        let moved = slot.state.advance(from, next);
        if moved {
            self.notify(slot, next, None);
        }
        moved
    }

    /// Starts a new load attempt (`next` is `Queued` or `Loading`).
    fn begin(
        &self,
        slot: &ResourceSlot,
        next: ResourceState,
    ) -> std::result::Result<(), ResourceError> {
        let current = slot.state.get();
        if !current.accepts_load() {
            return Err(ResourceError::InvalidState {
                id: slot.id,
                state: current,
            });
        }
        slot.reset_attempt();
        if self.advance(slot, current, next) {
            Ok(())
        } else {
            Err(ResourceError::InvalidState {
                id: slot.id,
                state: slot.state.get(),
            })
        }
    }

    /// Records the outcome of a load that reached `Loading`.
    pub(crate) fn finish(&self, slot: &ResourceSlot, result: TaskResult) {
        let (next, error) = match result {
            Ok(()) => (ResourceState::Ready, None),
            Err(err) => {
                slot.set_error(err.clone());
                (ResourceState::Failed, Some(err))
            }
        };
        if slot.state.advance(ResourceState::Loading, next) {
            self.notify(slot, next, error);
        } else {
            warn!(
                "Resource '{}' left Loading before its pipe finished (now {:?})",
                slot.name,
                slot.state.get()
            );
        }
    }

    /// Fails a load that never left the queue.
    fn abort_queued(&self, slot: &ResourceSlot, error: ResourceError) {
        if slot.state.advance(ResourceState::Queued, ResourceState::Failed) {
            slot.set_error(error.clone());
            self.notify(slot, ResourceState::Failed, Some(error));
        }
    }
}

// ============================================================================
// Resource Manager
// ============================================================================

enum WorkerThread {
    /// Built but not started (lazy start).
    Idle(Worker),
    Running(JoinHandle<()>),
    /// Spawning failed; loads are refused with this reason.
    Unavailable(String),
    Stopped,
}

/// Owner of all resources and of the background loading worker.
pub struct ResourceManager {
    shared: Arc<Shared>,
    settings: ResourceSettings,
    next_id: AtomicU32,
    queue: Option<flume::Sender<ResourcePipe>>,
    context: Option<ContextLink>,
    worker: Mutex<WorkerThread>,
    /// Destroyed resources whose backend objects have not been freed yet.
    graveyard: Mutex<Vec<Arc<ResourceSlot>>>,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceManager {
    /// A manager with default settings. The worker starts on the first `load_async`.
    #[must_use]
    pub fn new() -> Self {
        Self::build(ResourceSettings::default())
    }

    /// A manager with custom settings.
    ///
    /// Fails only when `lazy_worker` is off and the worker thread cannot be spawned.
    pub fn with_settings(settings: ResourceSettings) -> Result<Self> {
        let lazy = settings.lazy_worker;
        let manager = Self::build(settings);
        if !lazy {
            manager.ensure_worker()?;
        }
        Ok(manager)
    }

    fn build(settings: ResourceSettings) -> Self {
        let shared = Arc::new(Shared::new(&settings));
        let (queue_tx, queue_rx) = flume::unbounded();
        let (worker_link, context_link) = hand_off_channel();
        let worker = Worker::new(Arc::clone(&shared), queue_rx, worker_link);
        Self {
            shared,
            settings,
            next_id: AtomicU32::new(1),
            queue: Some(queue_tx),
            context: Some(context_link),
            worker: Mutex::new(WorkerThread::Idle(worker)),
            graveyard: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ResourceSettings {
        &self.settings
    }

    // ========================================================================
    // Registration & Lookup
    // ========================================================================

    /// Registers `resource` under a fresh id. The resource starts `Unloaded`.
    ///
    /// # Panics
    ///
    /// Panics once `u32::MAX - 1` ids have been handed out. Ids are never reused.
    pub fn create<T: Resource>(&self, name: impl Into<String>, resource: T) -> ResourceHandle<T> {
        let id = self.allocate_id();
        let resource = Arc::new(resource);
        let untyped: Arc<dyn Resource> = Arc::clone(&resource) as Arc<dyn Resource>;
        let slot = Arc::new(ResourceSlot::new(id, Arc::from(name.into()), untyped));

        debug!("Registered {} '{}' as resource {id}", slot.kind, slot.name);
        self.shared.table.write().insert(
            id,
            Entry {
                slot: Arc::clone(&slot),
                typed: Arc::clone(&resource) as Arc<dyn Any + Send + Sync>,
            },
        );
        ResourceHandle::new(slot, resource)
    }

    fn allocate_id(&self) -> ResourceId {
        match self
            .next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| id.checked_add(1))
        {
            Ok(id) => ResourceId::new(id),
            Err(_) => panic!("resource ids exhausted"),
        }
    }

    /// Untyped handle to a registered resource.
    #[must_use]
    pub fn get_resource(&self, id: ResourceId) -> Option<ResourceHandle> {
        let table = self.shared.table.read();
        let slot = &table.get(&id)?.slot;
        Some(ResourceHandle::new(
            Arc::clone(slot),
            Arc::clone(&slot.resource),
        ))
    }

    /// Typed handle; `None` if the id is unknown or holds another type.
    #[must_use]
    pub fn get<T: Resource>(&self, id: ResourceId) -> Option<ResourceHandle<T>> {
        let table = self.shared.table.read();
        let entry = table.get(&id)?;
        let typed = Arc::clone(&entry.typed).downcast::<T>().ok()?;
        Some(ResourceHandle::new(Arc::clone(&entry.slot), typed))
    }

    #[must_use]
    pub fn state(&self, id: ResourceId) -> Option<ResourceState> {
        self.shared.slot(id).map(|slot| slot.state.get())
    }

    #[must_use]
    pub fn last_error(&self, id: ResourceId) -> Option<ResourceError> {
        self.shared.slot(id).and_then(|slot| slot.last_error())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.table.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.table.read().is_empty()
    }

    /// Registered ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<_> = self.shared.table.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Receives every state change from now on.
    pub fn subscribe(&self) -> flume::Receiver<ResourceEvent> {
        self.shared.events.subscribe()
    }

    fn require(&self, id: ResourceId) -> std::result::Result<Arc<ResourceSlot>, ResourceError> {
        self.shared
            .slot(id)
            .ok_or(ResourceError::UnknownResource(id))
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Loads `id` on the calling thread, context tasks included.
    ///
    /// Blocks until the resource is `Ready` or `Failed`. Must be called on
    /// the context thread.
    pub fn load_sync(&self, id: ResourceId, backend: &mut dyn RenderBackend) -> Result<()> {
        let slot = self.require(id)?;
        self.shared.begin(&slot, ResourceState::Loading)?;
        let pipe = Arc::clone(&slot.resource).create(ResourcePipe::new(id));
        drive(&self.shared, &slot, pipe, |task| task.run_inline(&mut *backend))?;
        Ok(())
    }

    /// Queues `id` for background loading and returns immediately.
    ///
    /// The resource is `Queued` on return. Context tasks only make progress
    /// while the context thread calls [`dispatch_next`](Self::dispatch_next).
    pub fn load_async(&self, id: ResourceId) -> Result<()> {
        let slot = self.require(id)?;
        let queue = self.queue.as_ref().ok_or(ResourceError::Shutdown)?;
        self.ensure_worker()?;

        self.shared.begin(&slot, ResourceState::Queued)?;
        let pipe = Arc::clone(&slot.resource).create(ResourcePipe::new(id));
        self.shared.status.enqueued();
        if queue.send(pipe).is_err() {
            self.shared.status.unqueued();
            self.shared.abort_queued(&slot, ResourceError::Shutdown);
            return Err(ResourceError::Shutdown.into());
        }
        debug!("Queued {} '{}'", slot.kind, slot.name);
        Ok(())
    }

    /// Runs at most one pending context task. Never blocks.
    ///
    /// Call once per frame on the context thread.
    pub fn dispatch_next(&self, backend: &mut dyn RenderBackend) -> DispatchOutcome {
        self.context
            .as_ref()
            .map_or(DispatchOutcome::Idle, |link| link.dispatch(backend))
    }

    #[must_use]
    pub fn read_worker_state(&self) -> WorkerState {
        self.shared.status.snapshot()
    }

    fn ensure_worker(&self) -> std::result::Result<(), ResourceError> {
        let mut worker = self.worker.lock();
        if matches!(*worker, WorkerThread::Idle(_)) {
            let idle = std::mem::replace(&mut *worker, WorkerThread::Stopped);
            if let WorkerThread::Idle(pending) = idle {
                *worker = match pending.spawn(&self.settings) {
                    Ok(handle) => {
                        debug!("Spawned resource worker '{}'", self.settings.worker_name);
                        WorkerThread::Running(handle)
                    }
                    Err(err) => {
                        error!("Failed to start resource worker: {err}");
                        WorkerThread::Unavailable(err.to_string())
                    }
                };
            }
        }
        match &*worker {
            WorkerThread::Running(_) => Ok(()),
            WorkerThread::Unavailable(reason) => Err(ResourceError::Worker(reason.clone())),
            WorkerThread::Idle(_) | WorkerThread::Stopped => Err(ResourceError::Shutdown),
        }
    }

    // ========================================================================
    // Cancellation & Removal
    // ========================================================================

    /// Asks an in-flight load of `id` to stop at the next task boundary.
    ///
    /// The load then ends `Failed` with [`ResourceError::Cancelled`]. A
    /// resource that is not loading is unaffected.
    pub fn cancel(&self, id: ResourceId) -> Result<()> {
        let slot = self.require(id)?;
        if slot.state.get().is_in_flight() {
            slot.cancel();
            info!("Cancelling load of {} '{}'", slot.kind, slot.name);
        }
        Ok(())
    }

    /// Removes `id` from the table.
    ///
    /// Outstanding handles stay usable but report `is_valid() == false`. A
    /// queued load is dropped, a running one stops at the next task boundary.
    /// Backend objects are freed by the next [`prune`](Self::prune).
    pub fn destroy(&self, id: ResourceId) -> Result<()> {
        let entry = self
            .shared
            .table
            .write()
            .remove(&id)
            .ok_or(ResourceError::UnknownResource(id))?;
        let slot = entry.slot;
        slot.mark_removed();
        self.shared.abort_queued(&slot, ResourceError::Cancelled);
        debug!("Destroyed {} '{}' ({id})", slot.kind, slot.name);
        self.graveyard.lock().push(slot);
        Ok(())
    }

    /// Destroys every registered resource.
    pub fn destroy_all(&self) {
        for id in self.ids() {
            // Ids come straight from the table; a concurrent destroy is the only miss.
            let _ = self.destroy(id);
        }
    }

    /// Frees backend objects of destroyed resources that are no longer in
    /// flight. Returns how many were freed.
    pub fn prune(&self, backend: &mut dyn RenderBackend) -> usize {
        let mut graveyard = self.graveyard.lock();
        let before = graveyard.len();
        graveyard.retain(|slot| {
            if slot.state.get().is_in_flight() {
                return true;
            }
            slot.resource.free_backend(&mut *backend);
            slot.resource.release_data();
            trace!("Freed backend objects of '{}'", slot.name);
            false
        });
        before - graveyard.len()
    }

    /// Destroyed resources still waiting for [`prune`](Self::prune).
    #[must_use]
    pub fn pending_prune(&self) -> usize {
        self.graveyard.lock().len()
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        // Disconnecting both channels wakes a worker blocked on either.
        self.queue.take();
        self.context.take();
        let worker = std::mem::replace(self.worker.get_mut(), WorkerThread::Stopped);
        if let WorkerThread::Running(handle) = worker {
            if handle.join().is_err() {
                error!("Resource worker panicked during shutdown");
            }
        }
        let leaked = self.graveyard.get_mut().len();
        if leaked > 0 {
            warn!("{leaked} destroyed resource(s) were never pruned; their backend objects leak");
        }
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("resources", &self.len())
            .field("worker", &self.read_worker_state())
            .field("pending_prune", &self.pending_prune())
            .finish_non_exhaustive()
    }
}
