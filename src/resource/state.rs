use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a resource.
///
/// ```text
/// Unloaded ──load──▶ Queued ──worker──▶ Loading ──▶ Ready
///                                          └──────▶ Failed
/// ```
///
/// `load_sync` skips `Queued`. A new load request is the only way out of a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResourceState {
    Unloaded = 0,
    Queued = 1,
    Loading = 2,
    Ready = 3,
    Failed = 4,
}

impl ResourceState {
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    /// Queued or loading.
    #[inline]
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Queued | Self::Loading)
    }

    /// Whether a new load request may start from this state.
    #[inline]
    #[must_use]
    pub fn accepts_load(self) -> bool {
        !self.is_in_flight()
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Unloaded | Self::Ready | Self::Failed, Self::Queued | Self::Loading) => true,
            (Self::Queued, Self::Loading | Self::Failed) => true,
            (Self::Loading, Self::Ready | Self::Failed) => true,
            _ => false,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Queued,
            2 => Self::Loading,
            3 => Self::Ready,
            4 => Self::Failed,
            _ => Self::Unloaded,
        }
    }
}

/// Atomic cell holding a [`ResourceState`].
///
/// Written by at most one thread at a time per resource (the caller of a load
/// request, then the worker); read from anywhere.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    #[must_use]
    pub fn new(state: ResourceState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn get(&self) -> ResourceState {
        ResourceState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` if the transition is legal. Returns the observed state on refusal.
    pub fn transition(&self, next: ResourceState) -> Result<ResourceState, ResourceState> {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let state = ResourceState::from_u8(current);
            if !state.can_transition_to(next) {
                return Err(state);
            }
            match self.0.compare_exchange_weak(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(state),
                Err(observed) => current = observed,
            }
        }
    }

    /// Moves from exactly `from` to `next`. Fails if another writer got there first.
    pub fn advance(&self, from: ResourceState, next: ResourceState) -> bool {
        from.can_transition_to(next)
            && self
                .0
                .compare_exchange(from as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(ResourceState::Unloaded)
    }
}
