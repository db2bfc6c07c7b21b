use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::backend::RenderBackend;
use crate::errors::{ResourceError, TaskResult};

/// Thread a task must run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskTarget {
    /// Background worker: file I/O and decoding.
    Worker,
    /// Thread owning the graphics/audio context.
    Context,
}

type WorkerFn = Box<dyn FnOnce() -> TaskResult + Send>;
type ContextFn = Box<dyn FnOnce(&mut dyn RenderBackend) -> TaskResult + Send>;

/// A context-tagged callable, detached from its [`ResourceTask`].
///
/// This is what crosses the hand-off channel to the context thread.
pub struct ContextTask {
    label: &'static str,
    run: ContextFn,
}

impl ContextTask {
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Runs the task. A panic is contained and reported as an error.
    pub fn run(self, backend: &mut dyn RenderBackend) -> TaskResult {
        let run = self.run;
        panic::catch_unwind(AssertUnwindSafe(move || run(backend)))
            .unwrap_or_else(|payload| Err(panic_error(payload.as_ref())))
    }
}

impl fmt::Debug for ContextTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextTask").field("label", &self.label).finish_non_exhaustive()
    }
}

/// A worker-tagged callable.
pub struct WorkerTask {
    label: &'static str,
    run: WorkerFn,
}

impl WorkerTask {
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Runs the task. A panic is contained and reported as an error.
    pub fn run(self) -> TaskResult {
        panic::catch_unwind(AssertUnwindSafe(self.run))
            .unwrap_or_else(|payload| Err(panic_error(payload.as_ref())))
    }
}

/// One step of a [`ResourcePipe`](super::ResourcePipe).
///
/// Worker tasks never see the backend, so a backend call off the context
/// thread cannot be written.
pub enum ResourceTask {
    Worker(WorkerTask),
    Context(ContextTask),
}

impl ResourceTask {
    /// A task for the background worker.
    pub fn worker(label: &'static str, run: impl FnOnce() -> TaskResult + Send + 'static) -> Self {
        Self::Worker(WorkerTask {
            label,
            run: Box::new(run),
        })
    }

    /// A task for the context thread.
    pub fn context(
        label: &'static str,
        run: impl FnOnce(&mut dyn RenderBackend) -> TaskResult + Send + 'static,
    ) -> Self {
        Self::Context(ContextTask {
            label,
            run: Box::new(run),
        })
    }

    #[must_use]
    pub fn target(&self) -> TaskTarget {
        match self {
            Self::Worker(_) => TaskTarget::Worker,
            Self::Context(_) => TaskTarget::Context,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Worker(task) => task.label,
            Self::Context(task) => task.label,
        }
    }

    /// Runs the task on the calling thread, whatever its target.
    ///
    /// Only valid on the context thread; this is the `load_sync` path.
    pub fn run_inline(self, backend: &mut dyn RenderBackend) -> TaskResult {
        match self {
            Self::Worker(task) => task.run(),
            Self::Context(task) => task.run(backend),
        }
    }
}

impl fmt::Debug for ResourceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTask")
            .field("target", &self.target())
            .field("label", &self.label())
            .finish_non_exhaustive()
    }
}

fn panic_error(payload: &(dyn Any + Send)) -> ResourceError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    ResourceError::TaskPanicked(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    #[test]
    fn test_targets() {
        let w = ResourceTask::worker("read", || Ok(()));
        let c = ResourceTask::context("upload", |_| Ok(()));
        assert_eq!(w.target(), TaskTarget::Worker);
        assert_eq!(c.target(), TaskTarget::Context);
        assert_eq!(c.label(), "upload");
    }

    #[test]
    fn test_panic_is_contained() {
        let task = ResourceTask::worker("boom", || panic!("decoder exploded"));
        let mut backend = HeadlessBackend::new();
        let err = task.run_inline(&mut backend).unwrap_err();
        assert_eq!(err, ResourceError::TaskPanicked("decoder exploded".to_string()));
    }
}
