use std::path::PathBuf;

use agesync_events::{ClientId, ObjectKey, ScalarKind};
use thiserror::Error;

/// Recoverable fault categories. None of these is fatal: each is handled by
/// the layer that detects it and shows up only in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum FaultKind {
    NotOwner,
    StaleOrMissingConfiguration,
    DuplicateSignal,
    UnresolvableTarget,
}

/// Errors from the shared variable store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SdlError {
    #[error("{client} does not own {object}; write to '{name}' rejected")]
    NotOwner {
        name: String,
        object: ObjectKey,
        client: ClientId,
    },

    #[error("variable '{name}' is not declared")]
    UnknownVariable { name: String },

    #[error("variable '{name}' has arity {expected}, write had {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("variable '{name}' element {index} is {expected}, write had {actual}")]
    KindMismatch {
        name: String,
        index: usize,
        expected: ScalarKind,
        actual: ScalarKind,
    },
}

impl SdlError {
    pub fn fault(&self) -> FaultKind {
        match self {
            SdlError::NotOwner { .. } => FaultKind::NotOwner,
            SdlError::UnknownVariable { .. }
            | SdlError::ArityMismatch { .. }
            | SdlError::KindMismatch { .. } => FaultKind::StaleOrMissingConfiguration,
        }
    }

    pub fn is_not_owner(&self) -> bool {
        matches!(self, SdlError::NotOwner { .. })
    }
}

/// Errors reported synchronously by external collaborators
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("cannot resolve '{target}' for {operation}")]
    UnresolvableTarget {
        target: String,
        operation: &'static str,
    },

    #[error("{operation} rejected: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
}

impl ServiceError {
    pub fn unresolvable(target: impl ToString, operation: &'static str) -> Self {
        ServiceError::UnresolvableTarget {
            target: target.to_string(),
            operation,
        }
    }

    pub fn fault(&self) -> Option<FaultKind> {
        match self {
            ServiceError::UnresolvableTarget { .. } => Some(FaultKind::UnresolvableTarget),
            ServiceError::Rejected { .. } => None,
        }
    }
}

/// Errors loading or validating an age configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
