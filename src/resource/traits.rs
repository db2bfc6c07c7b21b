use std::fmt;
use std::sync::Arc;

use super::pipe::ResourcePipe;
use super::task::ResourceTask;
use crate::backend::RenderBackend;
use crate::errors::TaskResult;

/// Broad category of a resource, used for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    Cubemap,
    Shader,
    Model,
    AudioClip,
    Custom,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Texture => "texture",
            Self::Cubemap => "cubemap",
            Self::Shader => "shader",
            Self::Model => "model",
            Self::AudioClip => "audio clip",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// A loadable resource.
///
/// Implementors keep their staged data and backend ids behind interior
/// mutability: the worker and the context thread both reach the resource
/// through a shared `Arc`, but never at the same time for the same pipe.
///
/// The default [`Resource::create`] builds the usual two-step pipe:
///
/// ```text
/// worker:  load_io_data     (read + decode into staging)
/// context: upload_buffers   (staging -> backend objects)
/// release: release_data     (drop staging, whatever the outcome)
/// ```
pub trait Resource: Send + Sync + 'static {
    fn kind(&self) -> ResourceKind;

    /// Human-readable source description (usually the file path).
    fn source(&self) -> String;

    /// Reads and decodes source data. Runs on the worker; must not touch the backend.
    fn load_io_data(&self) -> TaskResult;

    /// Creates backend objects from staged data. Runs on the context thread.
    fn upload_buffers(&self, backend: &mut dyn RenderBackend) -> TaskResult;

    /// Drops staged data. Must be idempotent.
    fn release_data(&self);

    /// Deletes the backend objects this resource owns.
    fn free_backend(&self, backend: &mut dyn RenderBackend) {
        let _ = backend;
    }

    /// Appends this resource's load steps to `pipe`.
    ///
    /// Declarative only: nothing runs until the pipe is drained.
    fn create(self: Arc<Self>, pipe: ResourcePipe) -> ResourcePipe {
        let io = Arc::clone(&self);
        let gpu = Arc::clone(&self);
        (pipe
            >> ResourceTask::worker("load_io_data", move || io.load_io_data())
            >> ResourceTask::context("upload_buffers", move |backend| {
                gpu.upload_buffers(backend)
            }))
        .on_release(move || self.release_data())
    }
}
