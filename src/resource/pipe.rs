//! Resource Pipes
//!
//! A [`ResourcePipe`] is the ordered list of steps that turns a resource
//! description into backend objects. It is built with `>>`:
//!
//! ```rust,ignore
//! let pipe = ResourcePipe::new(id)
//!     >> ResourceTask::worker("read", move || texture.load_io_data())
//!     >> ResourceTask::context("upload", move |gpu| texture2.upload_buffers(gpu));
//! ```
//!
//! Pipes are move-only and drained exactly once with [`ResourcePipe::next`].

use std::collections::VecDeque;
use std::fmt;
use std::ops::Shr;

use super::ResourceId;
use super::task::ResourceTask;

type ReleaseFn = Box<dyn FnOnce() + Send>;

pub struct ResourcePipe {
    owner: ResourceId,
    tasks: VecDeque<ResourceTask>,
    release: Option<ReleaseFn>,
}

impl ResourcePipe {
    /// An empty pipe bound to `owner`.
    #[must_use]
    pub fn new(owner: ResourceId) -> Self {
        Self {
            owner,
            tasks: VecDeque::new(),
            release: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn owner(&self) -> ResourceId {
        self.owner
    }

    /// Appends a task. Same as `pipe >> task`.
    #[must_use]
    pub fn then(mut self, task: ResourceTask) -> Self {
        self.tasks.push_back(task);
        self
    }

    /// Sets the hook run once when the pipe is finished with, whatever the outcome.
    ///
    /// Replaces any previously set hook.
    #[must_use]
    pub fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    /// Pulls the next task; `None` once exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<ResourceTask> {
        self.tasks.pop_front()
    }

    /// Tasks not yet pulled.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of context-tagged tasks not yet pulled.
    #[must_use]
    pub fn context_tasks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t, ResourceTask::Context(_)))
            .count()
    }

    /// Drops the remaining tasks and runs the release hook.
    pub fn finish(mut self) {
        self.tasks.clear();
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Shr<ResourceTask> for ResourcePipe {
    type Output = ResourcePipe;

    fn shr(self, task: ResourceTask) -> Self::Output {
        self.then(task)
    }
}

impl Drop for ResourcePipe {
    // A pipe dropped unfinished (e.g. still queued at shutdown) still releases.
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for ResourcePipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePipe")
            .field("owner", &self.owner)
            .field("tasks", &self.tasks)
            .field("has_release", &self.release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::TaskTarget;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_shr_appends_in_order() {
        let mut pipe = ResourcePipe::new(ResourceId::new(7))
            >> ResourceTask::worker("a", || Ok(()))
            >> ResourceTask::context("b", |_| Ok(()))
            >> ResourceTask::worker("c", || Ok(()));

        assert_eq!(pipe.owner(), ResourceId::new(7));
        assert_eq!(pipe.remaining(), 3);
        assert_eq!(pipe.context_tasks(), 1);

        let labels: Vec<_> = std::iter::from_fn(|| pipe.next()).map(|t| t.label()).collect();
        assert_eq!(labels, ["a", "b", "c"]);
        assert!(pipe.next().is_none());
    }

    #[test]
    fn test_release_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let pipe = ResourcePipe::new(ResourceId::new(1))
            .then(ResourceTask::worker("a", || Ok(())))
            .on_release(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        pipe.finish();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_runs_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        {
            let _pipe = ResourcePipe::new(ResourceId::new(1)).on_release(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_target_of_pulled_task() {
        let mut pipe = ResourcePipe::new(ResourceId::new(1)) >> ResourceTask::context("gpu", |_| Ok(()));
        assert_eq!(pipe.next().map(|t| t.target()), Some(TaskTarget::Context));
    }
}
