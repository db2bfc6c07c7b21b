use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::io::read_file;
use crate::backend::{AudioUpload, BackendId, RenderBackend};
use crate::errors::{ResourceError, TaskResult};
use crate::resource::{Resource, ResourceKind};

/// Format of a decoded clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub channels: u16,
    pub sample_rate: u32,
    /// Samples per channel.
    pub frames: usize,
}

impl AudioInfo {
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / f64::from(self.sample_rate))
    }
}

/// A WAV sound effect, uploaded as one interleaved 16-bit PCM buffer.
#[derive(Debug)]
pub struct AudioClip {
    path: PathBuf,
    staging: Mutex<Option<Vec<i16>>>,
    info: Mutex<Option<AudioInfo>>,
    buffer_id: AtomicU32,
}

impl AudioClip {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staging: Mutex::new(None),
            info: Mutex::new(None),
            buffer_id: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn info(&self) -> Option<AudioInfo> {
        *self.info.lock()
    }

    /// Raw backend buffer id; `0` until uploaded.
    #[inline]
    #[must_use]
    pub fn buffer_id(&self) -> u32 {
        self.buffer_id.load(Ordering::Acquire)
    }

    fn decode(path: &Path, bytes: &[u8]) -> Result<(AudioInfo, Vec<i16>), ResourceError> {
        let reader =
            hound::WavReader::new(Cursor::new(bytes)).map_err(|err| ResourceError::decode(path, err))?;
        let spec = reader.spec();

        let samples: Result<Vec<i16>, hound::Error> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .map(|s| s.map(|s| (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16))
                .collect(),
            hound::SampleFormat::Int => {
                let bits = u32::from(spec.bits_per_sample);
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| rescale_to_i16(s, bits)))
                    .collect()
            }
        };
        let samples = samples.map_err(|err| ResourceError::decode(path, err))?;

        let channels = spec.channels.max(1);
        let info = AudioInfo {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            frames: samples.len() / usize::from(channels),
        };
        Ok((info, samples))
    }
}

fn rescale_to_i16(sample: i32, bits: u32) -> i16 {
    let scaled = if bits >= 16 {
        sample >> (bits - 16)
    } else {
        sample << (16 - bits)
    };
    scaled.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

impl Resource for AudioClip {
    fn kind(&self) -> ResourceKind {
        ResourceKind::AudioClip
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }

    fn load_io_data(&self) -> TaskResult {
        let bytes = read_file(&self.path)?;
        let (info, samples) = Self::decode(&self.path, &bytes)?;
        *self.info.lock() = Some(info);
        *self.staging.lock() = Some(samples);
        Ok(())
    }

    fn upload_buffers(&self, backend: &mut dyn RenderBackend) -> TaskResult {
        let samples = self
            .staging
            .lock()
            .take()
            .ok_or_else(|| ResourceError::MissingStagingData(self.source()))?;
        let info = self
            .info()
            .ok_or_else(|| ResourceError::MissingStagingData(self.source()))?;
        let label = self.source();
        let id = backend
            .create_audio_buffer(&AudioUpload {
                label: &label,
                channels: info.channels,
                sample_rate: info.sample_rate,
                samples: &samples,
            })
            .map_err(ResourceError::Backend)?;

        if let Some(old) = BackendId::new(self.buffer_id.swap(id.get(), Ordering::AcqRel)) {
            backend.delete_object(old);
        }
        Ok(())
    }

    fn release_data(&self) {
        self.staging.lock().take();
    }

    fn free_backend(&self, backend: &mut dyn RenderBackend) {
        if let Some(id) = BackendId::new(self.buffer_id.swap(0, Ordering::AcqRel)) {
            backend.delete_object(id);
        }
    }
}
