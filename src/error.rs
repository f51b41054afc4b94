//! Error types for staged edits and dispatch.

use crate::permissions::Permissions;
use crate::transport::TransportError;

/// Anything that can go wrong between staging a field edit and a completed
/// dispatch.
///
/// Everything except [`Transport`] is raised locally before any network
/// traffic. A rejected setter never stages its value, and a rejected dispatch
/// leaves the pending buffer untouched so the caller can fix the problem and
/// retry the same batch.
///
/// [`Transport`]: UpdateError::Transport
#[derive(Debug)]
pub enum UpdateError {
    /// A staged value violated its field's validation rule. The value was not
    /// staged.
    Validation {
        field: &'static str,
        reason: String,
    },
    /// The acting member is missing a permission the mutation requires.
    InsufficientCapability(Permissions),
    /// The acting member does not rank above the mutation's target.
    HierarchyViolation(String),
    /// The original value of this field cannot be cheaply read back, so a
    /// read accessor on the un-staged field is a contract violation rather
    /// than a silent `None`.
    UnsupportedOperation(&'static str),
    /// The manager's entity (or the acting member) is no longer present in
    /// the cache.
    MissingEntity(&'static str),
    /// The transport collaborator failed. The pending buffer is retained so
    /// the same diff can be retried.
    Transport(TransportError),
}

impl std::fmt::Display for UpdateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateError::Validation { field, reason } => {
                write!(f, "invalid value for field '{}': {}", field, reason)
            }
            UpdateError::InsufficientCapability(perm) => {
                write!(f, "missing permission: {}", perm.name())
            }
            UpdateError::HierarchyViolation(reason) => {
                write!(f, "hierarchy violation: {}", reason)
            }
            UpdateError::UnsupportedOperation(field) => {
                write!(f, "original value of field '{}' cannot be provided", field)
            }
            UpdateError::MissingEntity(what) => {
                write!(f, "{} not found in cache", what)
            }
            UpdateError::Transport(e) => write!(f, "dispatch failed: {}", e),
        }
    }
}

impl std::error::Error for UpdateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UpdateError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for UpdateError {
    fn from(e: TransportError) -> Self {
        UpdateError::Transport(e)
    }
}
