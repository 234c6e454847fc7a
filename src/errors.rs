use std::fmt;

use serde::{Deserialize, Serialize};

use crate::auth::Capability;
use crate::store::StoreError;

/// A single violated field, tagged with the field name so callers can point
/// the user at the offending input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Accumulated validation verdict. Every violated field is listed, not just
/// the first one encountered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub errors: Vec<FieldError>,
}

impl ValidationFailure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Folds the field errors produced by the `validator` derive into this
    /// failure, preserving the per-field tagging.
    pub fn absorb(&mut self, errors: &validator::ValidationErrors) {
        for (field, field_errors) in errors.field_errors() {
            for err in field_errors {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                self.push(field, message);
            }
        }
    }

    /// Like [`absorb`](Self::absorb), with each field name qualified by a
    /// parent path (e.g. `customer.email`).
    pub fn absorb_prefixed(&mut self, prefix: &str, errors: &validator::ValidationErrors) {
        for (field, field_errors) in errors.field_errors() {
            for err in field_errors {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                self.push(format!("{prefix}.{field}"), message);
            }
        }
    }

    /// Returns `Err(CoreError::ValidationFailed)` if anything was recorded.
    pub fn into_result(self) -> Result<(), CoreError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CoreError::ValidationFailed(self))
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.errors {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
            first = false;
        }
        Ok(())
    }
}

impl From<validator::ValidationErrors> for ValidationFailure {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut failure = ValidationFailure::new();
        failure.absorb(&errors);
        failure
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    ValidationFailed(ValidationFailure),

    #[error("{entity} name already exists: {name}")]
    DuplicateName { entity: &'static str, name: String },

    #[error("cannot delete {entity} \"{name}\": in use by {dependents} product(s)")]
    ReferentialIntegrityViolation {
        entity: &'static str,
        name: String,
        dependents: usize,
    },

    #[error("permission denied: {operation} requires {capability}")]
    PermissionDenied {
        operation: &'static str,
        capability: Capability,
    },

    #[error("product {0} not found")]
    ProductNotFound(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("store read failed: {0}")]
    StoreReadFailed(#[source] StoreError),

    #[error("store write failed: {0}")]
    StoreWriteFailed(#[source] StoreError),

    #[error("event channel error: {0}")]
    EventError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Transient errors the caller may retry verbatim.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::StoreReadFailed(_) | CoreError::StoreWriteFailed(_)
        )
    }

    /// Recoverable errors: the caller can correct the input, switch
    /// principal, or retry. Nothing here is globally fatal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CoreError::Other(_))
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CoreError::ValidationFailed(errors.into())
    }
}
