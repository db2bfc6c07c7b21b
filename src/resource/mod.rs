//! Resource Loading Engine
//!
//! - [`Resource`]: something that can be loaded (texture, shader, model, ...)
//! - [`ResourceTask`] / [`ResourcePipe`]: the ordered load steps, each tagged
//!   for the worker or the context thread
//! - [`ResourceManager`]: owns resources, runs pipes synchronously or on the
//!   background worker, and hands context tasks to the frame loop

pub mod events;
pub mod handle;
pub mod manager;
pub mod pipe;
pub mod state;
pub mod task;
pub mod traits;
pub mod worker;

pub use events::ResourceEvent;
pub use handle::{ResourceHandle, ResourceId};
pub use manager::ResourceManager;
pub use pipe::ResourcePipe;
pub use state::{ResourceState, StateCell};
pub use task::{ContextTask, ResourceTask, TaskTarget, WorkerTask};
pub use traits::{Resource, ResourceKind};
pub use worker::{DispatchOutcome, WorkerState};
