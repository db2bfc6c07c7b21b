use std::thread::{self, ThreadId};

use rustc_hash::FxHashMap;

use super::{
    AudioUpload, BackendId, CubemapUpload, MeshUpload, PixelFormat, RenderBackend, ShaderStage,
    TextureUpload,
};

/// An object held by a [`HeadlessBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendObject {
    Texture {
        label: String,
        width: u32,
        height: u32,
        format: PixelFormat,
        mip_levels: u32,
        data: Vec<u8>,
    },
    Cubemap {
        label: String,
        size: u32,
        format: PixelFormat,
        data: Vec<u8>,
    },
    Mesh {
        label: String,
        vertex_count: usize,
        index_count: usize,
        /// positions, normals and texcoords as raw bytes
        vertex_data: Vec<u8>,
    },
    ShaderStage {
        label: String,
        stage: ShaderStage,
    },
    Program {
        label: String,
        vertex: BackendId,
        fragment: BackendId,
    },
    AudioBuffer {
        label: String,
        channels: u16,
        sample_rate: u32,
        samples: Vec<i16>,
    },
}

/// In-memory [`RenderBackend`].
///
/// Validates its inputs like a real driver would (sizes, bounds, entry points),
/// hands out sequential non-zero ids and remembers which thread issued each
/// call.
///
/// Meant for tests and short-lived tools. Ids are never recycled and the call
/// log is unbounded.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u32,
    objects: FxHashMap<BackendId, BackendObject>,
    call_threads: Vec<ThreadId>,
    injected_failure: Option<String>,
}

impl HeadlessBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next creation call fail with `reason`.
    pub fn fail_next(&mut self, reason: impl Into<String>) {
        self.injected_failure = Some(reason.into());
    }

    #[must_use]
    pub fn object(&self, id: BackendId) -> Option<&BackendObject> {
        self.objects.get(&id)
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Threads that issued backend calls, in call order.
    #[must_use]
    pub fn call_threads(&self) -> &[ThreadId] {
        &self.call_threads
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_threads.len()
    }

    fn begin_call(&mut self) -> Result<(), String> {
        self.call_threads.push(thread::current().id());
        match self.injected_failure.take() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Panics after `u32::MAX` objects.
    fn insert(&mut self, object: BackendObject) -> BackendId {
        self.next_id += 1;
        let id = BackendId::new(self.next_id)
            .unwrap_or_else(|| unreachable!("id counter starts at 1"));
        self.objects.insert(id, object);
        id
    }

    fn mip_levels(width: u32, height: u32) -> u32 {
        32 - width.max(height).max(1).leading_zeros()
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_texture(&mut self, desc: &TextureUpload<'_>) -> Result<BackendId, String> {
        self.begin_call()?;
        if desc.width == 0 || desc.height == 0 {
            return Err(format!("texture '{}' has zero extent", desc.label));
        }
        let expected = desc.width as usize * desc.height as usize * desc.format.bytes_per_pixel();
        if desc.data.len() != expected {
            return Err(format!(
                "texture '{}': expected {expected} bytes, got {}",
                desc.label,
                desc.data.len()
            ));
        }
        let mip_levels = if desc.generate_mipmaps {
            Self::mip_levels(desc.width, desc.height)
        } else {
            1
        };
        Ok(self.insert(BackendObject::Texture {
            label: desc.label.to_string(),
            width: desc.width,
            height: desc.height,
            format: desc.format,
            mip_levels,
            data: desc.data.to_vec(),
        }))
    }

    fn create_cubemap(&mut self, desc: &CubemapUpload<'_>) -> Result<BackendId, String> {
        self.begin_call()?;
        let face_len = desc.size as usize * desc.size as usize * desc.format.bytes_per_pixel();
        if desc.size == 0 {
            return Err(format!("cubemap '{}' has zero extent", desc.label));
        }
        if let Some(face) = desc.faces.iter().position(|f| f.len() != face_len) {
            return Err(format!(
                "cubemap '{}': face {face} has {} bytes, expected {face_len}",
                desc.label,
                desc.faces[face].len()
            ));
        }
        Ok(self.insert(BackendObject::Cubemap {
            label: desc.label.to_string(),
            size: desc.size,
            format: desc.format,
            data: desc.faces.concat(),
        }))
    }

    fn create_mesh(&mut self, desc: &MeshUpload<'_>) -> Result<BackendId, String> {
        self.begin_call()?;
        if desc.positions.is_empty() || desc.positions.len() % 3 != 0 {
            return Err(format!("mesh '{}' has malformed positions", desc.label));
        }
        let vertex_count = desc.vertex_count();
        if let Some(bad) = desc.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(format!(
                "mesh '{}': index {bad} out of range for {vertex_count} vertices",
                desc.label
            ));
        }
        let mut vertex_data = Vec::with_capacity(
            (desc.positions.len() + desc.normals.len() + desc.texcoords.len()) * 4,
        );
        vertex_data.extend_from_slice(bytemuck::cast_slice(desc.positions));
        vertex_data.extend_from_slice(bytemuck::cast_slice(desc.normals));
        vertex_data.extend_from_slice(bytemuck::cast_slice(desc.texcoords));
        Ok(self.insert(BackendObject::Mesh {
            label: desc.label.to_string(),
            vertex_count,
            index_count: desc.indices.len(),
            vertex_data,
        }))
    }

    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        label: &str,
        source: &str,
    ) -> Result<BackendId, String> {
        self.begin_call()?;
        if source.trim().is_empty() {
            return Err(format!("{label}: empty {stage:?} shader"));
        }
        if !source.contains("main") {
            return Err(format!("{label}: {stage:?} shader has no entry point 'main'"));
        }
        Ok(self.insert(BackendObject::ShaderStage {
            label: label.to_string(),
            stage,
        }))
    }

    fn link_program(
        &mut self,
        label: &str,
        vertex: BackendId,
        fragment: BackendId,
    ) -> Result<BackendId, String> {
        self.begin_call()?;
        let stage_of = |id: BackendId| match self.objects.get(&id) {
            Some(BackendObject::ShaderStage { stage, .. }) => Some(*stage),
            _ => None,
        };
        if stage_of(vertex) != Some(ShaderStage::Vertex) {
            return Err(format!("{label}: {vertex} is not a vertex stage"));
        }
        if stage_of(fragment) != Some(ShaderStage::Fragment) {
            return Err(format!("{label}: {fragment} is not a fragment stage"));
        }
        Ok(self.insert(BackendObject::Program {
            label: label.to_string(),
            vertex,
            fragment,
        }))
    }

    fn create_audio_buffer(&mut self, desc: &AudioUpload<'_>) -> Result<BackendId, String> {
        self.begin_call()?;
        if desc.channels == 0 || desc.sample_rate == 0 {
            return Err(format!("audio '{}' has an invalid format", desc.label));
        }
        if desc.samples.len() % usize::from(desc.channels) != 0 {
            return Err(format!(
                "audio '{}': {} samples do not divide into {} channels",
                desc.label,
                desc.samples.len(),
                desc.channels
            ));
        }
        Ok(self.insert(BackendObject::AudioBuffer {
            label: desc.label.to_string(),
            channels: desc.channels,
            sample_rate: desc.sample_rate,
            samples: desc.samples.to_vec(),
        }))
    }

    fn delete_object(&mut self, id: BackendId) -> bool {
        self.call_threads.push(thread::current().id());
        self.objects.remove(&id).is_some()
    }
}
