use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use parking_lot::Mutex;

use super::io::read_text;
use crate::backend::{BackendId, RenderBackend, ShaderStage};
use crate::errors::{ResourceError, TaskResult};
use crate::resource::{Resource, ResourceKind, ResourcePipe, ResourceTask};

#[derive(Debug)]
struct ShaderSources {
    vertex: String,
    fragment: String,
}

/// A linked vertex + fragment program.
///
/// Both sources are read on the worker. Compiling each stage and linking are
/// separate context tasks, one per `dispatch_next`.
#[derive(Debug)]
pub struct Shader {
    vertex_path: PathBuf,
    fragment_path: PathBuf,
    staging: Mutex<Option<ShaderSources>>,
    vertex_stage: AtomicU32,
    fragment_stage: AtomicU32,
    program_id: AtomicU32,
}

impl Shader {
    #[must_use]
    pub fn new(vertex_path: impl Into<PathBuf>, fragment_path: impl Into<PathBuf>) -> Self {
        Self {
            vertex_path: vertex_path.into(),
            fragment_path: fragment_path.into(),
            staging: Mutex::new(None),
            vertex_stage: AtomicU32::new(0),
            fragment_stage: AtomicU32::new(0),
            program_id: AtomicU32::new(0),
        }
    }

    /// Raw backend program id; `0` until linking succeeded.
    #[inline]
    #[must_use]
    pub fn program_id(&self) -> u32 {
        self.program_id.load(Ordering::Acquire)
    }

    fn label(&self) -> String {
        self.vertex_path
            .file_stem()
            .map_or_else(|| self.source(), |stem| stem.to_string_lossy().into_owned())
    }

    fn stage_cell(&self, stage: ShaderStage) -> &AtomicU32 {
        match stage {
            ShaderStage::Vertex => &self.vertex_stage,
            ShaderStage::Fragment => &self.fragment_stage,
        }
    }

    fn compile(&self, backend: &mut dyn RenderBackend, stage: ShaderStage) -> TaskResult {
        let staging = self.staging.lock();
        let sources = staging
            .as_ref()
            .ok_or_else(|| ResourceError::MissingStagingData(self.source()))?;
        let (path, source): (&Path, &str) = match stage {
            ShaderStage::Vertex => (&self.vertex_path, &sources.vertex),
            ShaderStage::Fragment => (&self.fragment_path, &sources.fragment),
        };
        let label = self.label();
        match backend.compile_shader(stage, &label, source) {
            Ok(id) => {
                debug!("Compiled {stage:?} stage of '{label}' as {id}");
                let previous = self.stage_cell(stage).swap(id.get(), Ordering::AcqRel);
                if let Some(stale) = BackendId::new(previous) {
                    backend.delete_object(stale);
                }
                Ok(())
            }
            Err(log) => {
                drop(staging);
                self.discard_stages(backend);
                Err(ResourceError::Backend(format!("{}: {log}", path.display())))
            }
        }
    }

    fn link(&self, backend: &mut dyn RenderBackend) -> TaskResult {
        let vertex = BackendId::new(self.vertex_stage.load(Ordering::Acquire));
        let fragment = BackendId::new(self.fragment_stage.load(Ordering::Acquire));
        let (Some(vertex), Some(fragment)) = (vertex, fragment) else {
            return Err(ResourceError::MissingStagingData(self.source()));
        };
        let label = self.label();
        let linked = backend.link_program(&label, vertex, fragment);
        // Stage objects are only needed until the program exists.
        self.discard_stages(backend);

        let id = linked.map_err(|log| ResourceError::Backend(format!("{label}: {log}")))?;
        if let Some(old) = BackendId::new(self.program_id.swap(id.get(), Ordering::AcqRel)) {
            backend.delete_object(old);
        }
        Ok(())
    }

    fn discard_stages(&self, backend: &mut dyn RenderBackend) {
        for cell in [&self.vertex_stage, &self.fragment_stage] {
            if let Some(id) = BackendId::new(cell.swap(0, Ordering::AcqRel)) {
                backend.delete_object(id);
            }
        }
    }
}

impl Resource for Shader {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Shader
    }

    fn source(&self) -> String {
        format!(
            "{} + {}",
            self.vertex_path.display(),
            self.fragment_path.display()
        )
    }

    fn load_io_data(&self) -> TaskResult {
        let vertex = read_text(&self.vertex_path)?;
        let fragment = read_text(&self.fragment_path)?;
        *self.staging.lock() = Some(ShaderSources { vertex, fragment });
        Ok(())
    }

    fn upload_buffers(&self, backend: &mut dyn RenderBackend) -> TaskResult {
        self.compile(backend, ShaderStage::Vertex)?;
        self.compile(backend, ShaderStage::Fragment)?;
        self.link(backend)
    }

    fn release_data(&self) {
        self.staging.lock().take();
    }

    fn free_backend(&self, backend: &mut dyn RenderBackend) {
        self.discard_stages(backend);
        if let Some(id) = BackendId::new(self.program_id.swap(0, Ordering::AcqRel)) {
            backend.delete_object(id);
        }
    }

    fn create(self: Arc<Self>, pipe: ResourcePipe) -> ResourcePipe {
        let io = Arc::clone(&self);
        let vertex = Arc::clone(&self);
        let fragment = Arc::clone(&self);
        let link = Arc::clone(&self);
        (pipe
            >> ResourceTask::worker("read_sources", move || io.load_io_data())
            >> ResourceTask::context("compile_vertex", move |backend| {
                vertex.compile(backend, ShaderStage::Vertex)
            })
            >> ResourceTask::context("compile_fragment", move |backend| {
                fragment.compile(backend, ShaderStage::Fragment)
            })
            >> ResourceTask::context("link_program", move |backend| link.link(backend)))
        .on_release(move || self.release_data())
    }
}
