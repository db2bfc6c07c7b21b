//! Built-in resource kinds: textures, cubemaps, shaders, OBJ models and WAV clips.
//!
//! Each keeps its decoded data in a staging buffer between `load_io_data` (worker)
//! and `upload_buffers` (context thread), and frees it in `release_data`.

pub mod audio;
pub mod cubemap;
pub mod io;
pub mod model;
pub mod shader;
pub mod texture;

pub use audio::{AudioClip, AudioInfo};
pub use cubemap::Cubemap;
pub use model::{Aabb, Model};
pub use shader::Shader;
pub use texture::{Texture, TextureOptions};
