//! Error Types
//!
//! This module defines the error types used throughout the resource engine.
//!
//! # Overview
//!
//! - [`ResourceError`] describes why a single load attempt failed. It is
//!   `Clone` so the manager can keep the last failure of every resource and
//!   broadcast it without moving it across threads.
//! - [`NuroError`] is the umbrella type returned by the public API.
//!
//! Task failures never travel across the worker/context boundary as panics:
//! they are captured as a [`ResourceError`] per task, folded into the
//! resource's state and logged.
//!
//! ```rust,ignore
//! use nuro_core::errors::{NuroError, Result};
//!
//! fn load() -> Result<()> {
//!     manager.load_sync(id, &mut backend)?;
//!     Ok(())
//! }
//! ```

use std::path::Path;

use thiserror::Error;

use crate::resource::{ResourceId, ResourceState};

/// Failure of a single resource load step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    // ========================================================================
    // Load Step Errors
    // ========================================================================
    /// Reading the source file failed (missing file, permissions, ...).
    #[error("IO error on '{path}': {message}")]
    Io {
        /// Source path that could not be read
        path: String,
        /// Underlying error message
        message: String,
    },

    /// The source was read but could not be decoded or parsed.
    #[error("Decode error on '{path}': {message}")]
    Decode {
        /// Source path of the corrupt data
        path: String,
        /// Decoder error message
        message: String,
    },

    /// The backend refused to create an object (shader compile error, ...).
    #[error("Backend error: {0}")]
    Backend(String),

    /// A context task ran but the resource had no staged data to consume.
    #[error("No staged data for '{0}'")]
    MissingStagingData(String),

    // ========================================================================
    // Manager Errors
    // ========================================================================
    /// The id is not (or no longer) present in the resource table.
    #[error("Unknown resource {0}")]
    UnknownResource(ResourceId),

    /// A load was requested while the resource is already queued or loading.
    #[error("Resource {id} cannot start a load while {state:?}")]
    InvalidState {
        /// Resource the request targeted
        id: ResourceId,
        /// State the resource was observed in
        state: ResourceState,
    },

    /// The load was abandoned because the resource was cancelled or destroyed.
    #[error("Load cancelled")]
    Cancelled,

    /// The manager shut down before the load completed.
    #[error("Resource manager is shutting down")]
    Shutdown,

    /// A task panicked; the panic was contained at the task boundary.
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// The background worker could not be started.
    #[error("Worker error: {0}")]
    Worker(String),
}

impl ResourceError {
    /// Builds an [`ResourceError::Io`] for `path`.
    pub fn io(path: impl AsRef<Path>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    /// Builds a [`ResourceError::Decode`] for `path`.
    pub fn decode(path: impl AsRef<Path>, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }
}

/// The main error type for the Nuro engine core.
#[derive(Error, Debug)]
pub enum NuroError {
    /// A resource operation failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// File I/O error outside of a resource pipe.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings could not be parsed.
    #[error("Settings parse error: {0}")]
    Settings(#[from] serde_json::Error),
}

impl NuroError {
    /// Returns the resource-level cause, if any.
    #[must_use]
    pub fn as_resource_error(&self) -> Option<&ResourceError> {
        match self {
            Self::Resource(err) => Some(err),
            _ => None,
        }
    }
}

/// Alias for `Result<T, NuroError>`.
pub type Result<T> = std::result::Result<T, NuroError>;

/// Result type returned by pipe tasks.
pub type TaskResult = std::result::Result<(), ResourceError>;
