//! Resource Manager Settings
//!
//! ```rust,ignore
//! use nuro_core::ResourceSettings;
//!
//! // Start the worker up front and log per-task timings
//! let settings = ResourceSettings {
//!     lazy_worker: false,
//!     task_timing: true,
//!     ..Default::default()
//! };
//!
//! let manager = ResourceManager::with_settings(settings)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Configuration for a [`ResourceManager`](crate::resource::ResourceManager).
///
/// All fields have defaults, so a settings file only needs the ones it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    /// Name of the background worker thread (shows up in debuggers and panics).
    pub worker_name: String,

    /// Stack size of the worker thread in bytes. `None` uses the platform default.
    ///
    /// Large image decoders can be stack hungry; raise this if loads overflow.
    pub worker_stack_size: Option<usize>,

    /// Start the worker on the first `load_async` rather than at construction.
    pub lazy_worker: bool,

    /// Log the duration of every task at `debug` level.
    pub task_timing: bool,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            worker_name: "nuro-resource-worker".to_string(),
            worker_stack_size: None,
            lazy_worker: true,
            task_timing: false,
        }
    }
}

impl ResourceSettings {
    /// Parses settings from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
