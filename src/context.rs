//! Application Context
//!
//! [`ApplicationContext`] ties the resource manager to the frame loop. It owns
//! the [`ResourceManager`] and the backend of the context thread, and
//! [`next_frame`](ApplicationContext::next_frame) is the one place where
//! background loads get to touch the backend.
//!
//! ```rust,ignore
//! let mut app = ApplicationContext::new(HeadlessBackend::new());
//! let tex = app.resources().create("albedo", Texture::new("albedo.png"));
//! app.resources().load_async(tex.id())?;
//!
//! while !tex.is_ready() {
//!     let frame = app.next_frame();
//!     // ... update and render ...
//! }
//! ```

use std::time::{Duration, Instant};

use log::debug;

use crate::backend::RenderBackend;
use crate::errors::Result;
use crate::resource::{DispatchOutcome, ResourceId, ResourceManager};
use crate::settings::ResourceSettings;

/// Per-frame timing and resource work done by [`ApplicationContext::next_frame`].
#[derive(Debug, Clone, Copy)]
pub struct FrameState {
    /// Seconds since the context was created.
    pub time: f32,
    /// Seconds since the previous frame.
    pub dt: f32,
    /// Frames since startup, this one included.
    pub frame_count: u64,
    /// The context task run this frame, if any.
    pub dispatch: DispatchOutcome,
    /// Destroyed resources whose backend objects were freed this frame.
    pub pruned: usize,
}

/// Owner of the resource manager and the context-thread backend.
///
/// Lives on the thread that owns the backend's context.
pub struct ApplicationContext<B: RenderBackend> {
    resources: ResourceManager,
    backend: B,
    started: Instant,
    last_frame: Instant,
    frame_count: u64,
}

impl<B: RenderBackend> ApplicationContext<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self::from_parts(ResourceManager::new(), backend)
    }

    pub fn with_settings(backend: B, settings: ResourceSettings) -> Result<Self> {
        Ok(Self::from_parts(ResourceManager::with_settings(settings)?, backend))
    }

    fn from_parts(resources: ResourceManager, backend: B) -> Self {
        let now = Instant::now();
        Self {
            resources,
            backend,
            started: now,
            last_frame: now,
            frame_count: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Loads `id` on this thread using the owned backend.
    pub fn load_sync(&mut self, id: ResourceId) -> Result<()> {
        self.resources.load_sync(id, &mut self.backend)
    }

    /// Advances one frame: runs at most one pending context task, then frees
    /// backend objects of destroyed resources.
    pub fn next_frame(&mut self) -> FrameState {
        let now = Instant::now();
        let dt = now - self.last_frame;
        self.last_frame = now;
        self.frame_count += 1;

        let dispatch = self.resources.dispatch_next(&mut self.backend);
        let pruned = self.resources.prune(&mut self.backend);
        if pruned > 0 {
            debug!("Frame {}: pruned {pruned} destroyed resource(s)", self.frame_count);
        }

        FrameState {
            time: (now - self.started).as_secs_f32(),
            dt: dt.as_secs_f32(),
            frame_count: self.frame_count,
            dispatch,
            pruned,
        }
    }
}

impl<B: RenderBackend> Drop for ApplicationContext<B> {
    fn drop(&mut self) {
        // Free what can be freed while the backend is still alive.
        self.resources.destroy_all();
        self.resources.prune(&mut self.backend);
    }
}
