use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = RegistryError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration unavailable at {path}: {reason}")]
    Unavailable { path: PathBuf, reason: String },
    #[error("unexpected error writing configuration file: {0}")]
    Write(String),
}

/// Which reconciler operation was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Register,
    Update,
    Delete,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Action::Register => "register",
            Action::Update => "update",
            Action::Delete => "delete",
        })
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),
    #[error("Product ID {0} already configured")]
    Conflict(String),
    #[error("Product ID {0} not already configured")]
    NotFound(String),
    #[error("failed to {action} {uid}: {source}")]
    Persistence {
        uid: String,
        action: Action,
        #[source]
        source: StoreError,
    },
}

impl RegistryError {
    pub fn uid(&self) -> Option<&str> {
        match self {
            RegistryError::Validation(_) => None,
            RegistryError::Conflict(uid)
            | RegistryError::NotFound(uid)
            | RegistryError::Persistence { uid, .. } => Some(uid),
        }
    }
}
