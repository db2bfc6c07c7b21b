use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use super::io::read_file;
use super::texture::{StagedImage, TextureOptions, decode_image};
use crate::backend::{BackendId, CubemapUpload, PixelFormat, RenderBackend};
use crate::errors::{ResourceError, TaskResult};
use crate::resource::{Resource, ResourceKind};

/// Six-face cube texture (skyboxes, environment maps).
///
/// Faces are given in +X, -X, +Y, -Y, +Z, -Z order and must all decode to
/// the same square size.
#[derive(Debug)]
pub struct Cubemap {
    faces: [PathBuf; 6],
    options: TextureOptions,
    staging: Mutex<Option<(u32, PixelFormat, [Vec<u8>; 6])>>,
    size: AtomicU32,
    cubemap_id: AtomicU32,
}

impl Cubemap {
    #[must_use]
    pub fn new(faces: [PathBuf; 6]) -> Self {
        Self::with_options(
            faces,
            TextureOptions {
                generate_mipmaps: false,
                ..Default::default()
            },
        )
    }

    #[must_use]
    pub fn with_options(faces: [PathBuf; 6], options: TextureOptions) -> Self {
        Self {
            faces,
            options,
            staging: Mutex::new(None),
            size: AtomicU32::new(0),
            cubemap_id: AtomicU32::new(0),
        }
    }

    /// Raw backend cubemap id; `0` until an upload succeeded.
    #[inline]
    #[must_use]
    pub fn cubemap_id(&self) -> u32 {
        self.cubemap_id.load(Ordering::Acquire)
    }

    /// Edge length of every face in texels.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size.load(Ordering::Acquire)
    }
}

impl Resource for Cubemap {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Cubemap
    }

    fn source(&self) -> String {
        self.faces
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn load_io_data(&self) -> TaskResult {
        let mut first: Option<(u32, PixelFormat)> = None;
        let mut faces: [Vec<u8>; 6] = Default::default();

        for (slot, path) in faces.iter_mut().zip(&self.faces) {
            let bytes = read_file(path)?;
            let StagedImage {
                width,
                height,
                format,
                data,
            } = decode_image(path, &bytes, self.options)?;
            if width != height {
                return Err(ResourceError::decode(
                    path,
                    format!("cubemap face is {width}x{height}, expected a square"),
                ));
            }
            match first {
                None => first = Some((width, format)),
                Some((size, fmt)) if size != width || fmt != format => {
                    return Err(ResourceError::decode(
                        path,
                        format!("cubemap face is {width}x{width} {format:?}, expected {size}x{size} {fmt:?}"),
                    ));
                }
                Some(_) => {}
            }
            *slot = data;
        }

        let (size, format) = first.unwrap_or((0, PixelFormat::Rgba8));
        self.size.store(size, Ordering::Release);
        *self.staging.lock() = Some((size, format, faces));
        Ok(())
    }

    fn upload_buffers(&self, backend: &mut dyn RenderBackend) -> TaskResult {
        let (size, format, faces) = self
            .staging
            .lock()
            .take()
            .ok_or_else(|| ResourceError::MissingStagingData(self.source()))?;
        let label = self.faces[0].display().to_string();
        let id = backend
            .create_cubemap(&CubemapUpload {
                label: &label,
                size,
                format,
                faces: std::array::from_fn(|i| faces[i].as_slice()),
            })
            .map_err(ResourceError::Backend)?;

        if let Some(old) = BackendId::new(self.cubemap_id.swap(id.get(), Ordering::AcqRel)) {
            backend.delete_object(old);
        }
        Ok(())
    }

    fn release_data(&self) {
        self.staging.lock().take();
    }

    fn free_backend(&self, backend: &mut dyn RenderBackend) {
        if let Some(id) = BackendId::new(self.cubemap_id.swap(0, Ordering::AcqRel)) {
            backend.delete_object(id);
        }
    }
}
