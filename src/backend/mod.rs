//! Context-Thread Backend
//!
//! The resource engine never talks to a graphics or audio API directly. Every
//! backend call goes through [`RenderBackend`], which is owned by the thread
//! holding the GL/AL context and is only ever lent out as `&mut dyn RenderBackend`
//! to context-tagged tasks.
//!
//! [`HeadlessBackend`] keeps created objects in memory and is used by tests and
//! offline tooling.

pub mod headless;

use std::fmt;
use std::num::NonZeroU32;

pub use headless::{BackendObject, HeadlessBackend};

/// Identifier of an object created by a [`RenderBackend`].
///
/// Never zero; resources store `0` to mean "no backend object".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(NonZeroU32);

impl BackendId {
    #[inline]
    #[must_use]
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    #[inline]
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pixel layout of uploaded image data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    Rgba8Srgb,
    /// Four little-endian `f32` channels (HDR sources).
    Rgba32Float,
}

impl PixelFormat {
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 | Self::Rgba8Srgb => 4,
            Self::Rgba32Float => 16,
        }
    }
}

/// 2D texture upload.
#[derive(Debug, Clone, Copy)]
pub struct TextureUpload<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub generate_mipmaps: bool,
    pub data: &'a [u8],
}

/// Cubemap upload; faces in +X, -X, +Y, -Y, +Z, -Z order.
#[derive(Debug, Clone, Copy)]
pub struct CubemapUpload<'a> {
    pub label: &'a str,
    pub size: u32,
    pub format: PixelFormat,
    pub faces: [&'a [u8]; 6],
}

/// Indexed triangle mesh upload.
#[derive(Debug, Clone, Copy)]
pub struct MeshUpload<'a> {
    pub label: &'a str,
    /// xyz triplets
    pub positions: &'a [f32],
    /// xyz triplets, empty when the source has none
    pub normals: &'a [f32],
    /// uv pairs, empty when the source has none
    pub texcoords: &'a [f32],
    pub indices: &'a [u32],
}

impl MeshUpload<'_> {
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Interleaved signed 16-bit PCM.
#[derive(Debug, Clone, Copy)]
pub struct AudioUpload<'a> {
    pub label: &'a str,
    pub channels: u16,
    pub sample_rate: u32,
    pub samples: &'a [i16],
}

/// Backend owned by the context thread.
///
/// Implementations may assume every call comes from the thread that owns the
/// context: the resource manager only hands `&mut dyn RenderBackend` to
/// context-tagged tasks, from `dispatch_next` or `load_sync`.
pub trait RenderBackend {
    fn create_texture(&mut self, desc: &TextureUpload<'_>) -> Result<BackendId, String>;

    fn create_cubemap(&mut self, desc: &CubemapUpload<'_>) -> Result<BackendId, String>;

    fn create_mesh(&mut self, desc: &MeshUpload<'_>) -> Result<BackendId, String>;

    /// Compiles a single stage. The error carries the compiler log.
    fn compile_shader(&mut self, stage: ShaderStage, label: &str, source: &str)
    -> Result<BackendId, String>;

    fn link_program(
        &mut self,
        label: &str,
        vertex: BackendId,
        fragment: BackendId,
    ) -> Result<BackendId, String>;

    fn create_audio_buffer(&mut self, desc: &AudioUpload<'_>) -> Result<BackendId, String>;

    /// Deletes any object. Returns `false` if the id was unknown.
    fn delete_object(&mut self, id: BackendId) -> bool;
}
