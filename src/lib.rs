#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod assets;
pub mod backend;
pub mod context;
pub mod errors;
pub mod resource;
pub mod settings;

pub use assets::{AudioClip, Cubemap, Model, Shader, Texture, TextureOptions};
pub use backend::{BackendId, HeadlessBackend, RenderBackend};
pub use context::{ApplicationContext, FrameState};
pub use errors::{NuroError, ResourceError, Result};
pub use resource::{
    DispatchOutcome, Resource, ResourceEvent, ResourceHandle, ResourceId, ResourceKind,
    ResourceManager, ResourcePipe, ResourceState, ResourceTask, TaskTarget, WorkerState,
};
pub use settings::ResourceSettings;
