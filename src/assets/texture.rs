use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use image::DynamicImage;
use log::debug;
use parking_lot::Mutex;

use super::io::read_file;
use crate::backend::{BackendId, PixelFormat, RenderBackend, TextureUpload};
use crate::errors::{ResourceError, TaskResult};
use crate::resource::{Resource, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureOptions {
    /// Treat 8-bit color data as sRGB encoded.
    pub srgb: bool,
    /// Flip rows so the first row is the bottom of the image (GL convention).
    pub flip_vertically: bool,
    pub generate_mipmaps: bool,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            srgb: true,
            flip_vertically: false,
            generate_mipmaps: true,
        }
    }
}

/// Decoded pixels waiting for upload.
#[derive(Debug)]
pub(crate) struct StagedImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

/// Decodes PNG/JPEG/HDR bytes into RGBA8, or RGBA32F for float sources.
pub(crate) fn decode_image(
    path: &Path,
    bytes: &[u8],
    options: TextureOptions,
) -> Result<StagedImage, ResourceError> {
    let mut img = image::load_from_memory(bytes).map_err(|err| ResourceError::decode(path, err))?;
    if options.flip_vertically {
        img = img.flipv();
    }
    let (width, height) = (img.width(), img.height());

    let is_float = matches!(
        img,
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_)
    );
    let (format, data) = if is_float {
        let texels = img.into_rgba32f().into_raw();
        (
            PixelFormat::Rgba32Float,
            bytemuck::cast_slice::<f32, u8>(&texels).to_vec(),
        )
    } else if options.srgb {
        (PixelFormat::Rgba8Srgb, img.into_rgba8().into_raw())
    } else {
        (PixelFormat::Rgba8, img.into_rgba8().into_raw())
    };

    Ok(StagedImage {
        width,
        height,
        format,
        data,
    })
}

/// A 2D texture loaded from an image file.
#[derive(Debug)]
pub struct Texture {
    path: PathBuf,
    options: TextureOptions,
    staging: Mutex<Option<StagedImage>>,
    width: AtomicU32,
    height: AtomicU32,
    /// Backend object, 0 when none.
    texture_id: AtomicU32,
}

impl Texture {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_options(path, TextureOptions::default())
    }

    #[must_use]
    pub fn with_options(path: impl Into<PathBuf>, options: TextureOptions) -> Self {
        Self {
            path: path.into(),
            options,
            staging: Mutex::new(None),
            width: AtomicU32::new(0),
            height: AtomicU32::new(0),
            texture_id: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn options(&self) -> TextureOptions {
        self.options
    }

    /// Raw backend texture id; `0` until an upload succeeded.
    #[inline]
    #[must_use]
    pub fn texture_id(&self) -> u32 {
        self.texture_id.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn backend_id(&self) -> Option<BackendId> {
        BackendId::new(self.texture_id())
    }

    /// `(width, height)` of the last decoded image.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (
            self.width.load(Ordering::Acquire),
            self.height.load(Ordering::Acquire),
        )
    }

    /// Whether decoded pixels are waiting for upload.
    #[must_use]
    pub fn has_staged_data(&self) -> bool {
        self.staging.lock().is_some()
    }
}

impl Resource for Texture {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Texture
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }

    fn load_io_data(&self) -> TaskResult {
        let bytes = read_file(&self.path)?;
        let image = decode_image(&self.path, &bytes, self.options)?;
        debug!(
            "Decoded '{}': {}x{} {:?}",
            self.path.display(),
            image.width,
            image.height,
            image.format
        );
        self.width.store(image.width, Ordering::Release);
        self.height.store(image.height, Ordering::Release);
        *self.staging.lock() = Some(image);
        Ok(())
    }

    fn upload_buffers(&self, backend: &mut dyn RenderBackend) -> TaskResult {
        let image = self
            .staging
            .lock()
            .take()
            .ok_or_else(|| ResourceError::MissingStagingData(self.source()))?;
        let label = self.source();
        let id = backend
            .create_texture(&TextureUpload {
                label: &label,
                width: image.width,
                height: image.height,
                format: image.format,
                generate_mipmaps: self.options.generate_mipmaps,
                data: &image.data,
            })
            .map_err(ResourceError::Backend)?;

        // Reloads replace the previous object.
        if let Some(old) = BackendId::new(self.texture_id.swap(id.get(), Ordering::AcqRel)) {
            backend.delete_object(old);
        }
        Ok(())
    }

    fn release_data(&self) {
        self.staging.lock().take();
    }

    fn free_backend(&self, backend: &mut dyn RenderBackend) {
        if let Some(id) = BackendId::new(self.texture_id.swap(0, Ordering::AcqRel)) {
            backend.delete_object(id);
        }
    }
}
