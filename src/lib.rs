use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[source] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Kubeconfig Error: {0}")]
    KubeconfigError(#[from] kube::config::KubeconfigError),

    #[error("Store Error: {0}")]
    Store(#[from] StoreError),

    #[error("resource {name} was applied but did not become READY: {source}")]
    NotReady {
        name: String,
        #[source]
        source: WaitError<WaitCause>,
    },

    #[error("resource {name} was not deleted: {source}")]
    NotDeleted {
        name: String,
        #[source]
        source: WaitError<WaitCause>,
    },

    #[error("reading resource {name} took longer than {timeout:?}")]
    ReadTimeout { name: String, timeout: Duration },

    #[error("resource name changed from {from} to {to}, the resource must be replaced")]
    RequiresReplace { from: String, to: String },

    #[error("InvalidDuration: {0}")]
    InvalidDuration(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("resource file: {0}")]
    ResourceFile(#[source] serde_yaml::Error),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// True when the operation gave up waiting, as opposed to being rejected.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::NotReady { source, .. } | Error::NotDeleted { source, .. } => {
                source.is_timeout()
            }
            Error::ReadTimeout { .. } => true,
            _ => false,
        }
    }
}

/// Status conditions published by the controller
pub mod conditions;
pub use conditions::{Condition, HasConditions, is_ready};

/// Retry until deadline
pub mod retry;
pub use retry::{RetryConfig, RetryError, WaitError};

/// Remote object store
pub mod store;
pub use store::{KubeStore, ResourceStore, StoreError};

/// Readiness and deletion waiters
pub mod wait;
pub use wait::{WaitCause, wait_deleted, wait_ready};

/// Log and trace integrations
pub mod telemetry;

/// Resources
pub mod resources;

/// Settings
mod settings;
pub use settings::{PollSettings, Settings};

/// State
mod state;
pub use state::*;

/// Context
mod context;
pub use context::*;

/// Provider wiring
pub mod provider;
pub use provider::Provider;
