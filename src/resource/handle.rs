//! Resource Identity and Handles
//!
//! The manager's table owns every resource through an `Arc`; callers get a
//! [`ResourceHandle`], which is another strong reference to the same slot.
//!
//! # Design Principles
//! - Ids come from a monotonic counter and are never reused
//! - A handle never dangles: destroying a resource only removes it from the
//!   table and marks outstanding handles invalid
//! - Typed handles (`ResourceHandle<Texture>`) and untyped handles
//!   (`ResourceHandle<dyn Resource>`) point at the same slot

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::state::{ResourceState, StateCell};
use super::traits::{Resource, ResourceKind};
use crate::errors::ResourceError;

/// Manager-assigned resource identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u32);

impl ResourceId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bookkeeping shared by the table, the worker and every handle.
pub(crate) struct ResourceSlot {
    pub(crate) id: ResourceId,
    pub(crate) name: Arc<str>,
    pub(crate) kind: ResourceKind,
    pub(crate) state: StateCell,
    pub(crate) resource: Arc<dyn Resource>,
    cancelled: AtomicBool,
    removed: AtomicBool,
    last_error: Mutex<Option<ResourceError>>,
}

impl ResourceSlot {
    pub(crate) fn new(id: ResourceId, name: Arc<str>, resource: Arc<dyn Resource>) -> Self {
        Self {
            id,
            name,
            kind: resource.kind(),
            state: StateCell::default(),
            resource,
            cancelled: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    #[inline]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
        self.cancel();
    }

    #[inline]
    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Clears the per-attempt flags before a new load.
    pub(crate) fn reset_attempt(&self) {
        self.cancelled.store(false, Ordering::Release);
        *self.last_error.lock() = None;
    }

    pub(crate) fn set_error(&self, error: ResourceError) {
        *self.last_error.lock() = Some(error);
    }

    pub(crate) fn last_error(&self) -> Option<ResourceError> {
        self.last_error.lock().clone()
    }
}

impl fmt::Debug for ResourceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSlot")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

/// Shared reference to a managed resource.
///
/// Dereferences to the resource itself. Cloning is cheap.
pub struct ResourceHandle<T: ?Sized + Resource = dyn Resource> {
    slot: Arc<ResourceSlot>,
    resource: Arc<T>,
}

impl<T: ?Sized + Resource> ResourceHandle<T> {
    pub(crate) fn new(slot: Arc<ResourceSlot>, resource: Arc<T>) -> Self {
        Self { slot, resource }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.slot.id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.slot.kind
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.slot.state.get()
    }

    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ResourceState::Ready
    }

    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state() == ResourceState::Failed
    }

    /// Error of the most recent failed attempt.
    #[must_use]
    pub fn last_error(&self) -> Option<ResourceError> {
        self.slot.last_error()
    }

    /// `false` once the resource was destroyed; re-resolve by id to find out
    /// whether something replaced it.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.slot.is_removed()
    }

    /// The underlying shared resource.
    #[inline]
    #[must_use]
    pub fn resource(&self) -> &Arc<T> {
        &self.resource
    }
}

impl<T: Resource> ResourceHandle<T> {
    /// Forgets the concrete type.
    #[must_use]
    pub fn into_untyped(self) -> ResourceHandle {
        ResourceHandle {
            slot: self.slot,
            resource: self.resource,
        }
    }
}

impl<T: ?Sized + Resource> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            resource: Arc::clone(&self.resource),
        }
    }
}

impl<T: ?Sized + Resource> Deref for ResourceHandle<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

impl<T: ?Sized + Resource> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.slot.id)
            .field("name", &self.slot.name)
            .field("state", &self.slot.state.get())
            .finish()
    }
}
