use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of a [`RegistryError`], stable across context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    PartialFailure,
    Transaction,
    Misuse,
    Store,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{entity} not found: {detail}")]
    NotFound { entity: String, detail: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(
        "Bulk operation on {entity} rejected: {} of {requested} identities did not resolve",
        .missing.len()
    )]
    PartialFailure {
        entity: String,
        requested: usize,
        missing: Vec<Uuid>,
    },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Misuse: {0}")]
    Misuse(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("{operation} failed for {target}: {source}")]
    Context {
        operation: &'static str,
        target: String,
        #[source]
        source: Box<RegistryError>,
    },
}

impl RegistryError {
    pub fn not_found(entity: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::PartialFailure { .. } => ErrorKind::PartialFailure,
            Self::Transaction(_) => ErrorKind::Transaction,
            Self::Misuse(_) => ErrorKind::Misuse,
            Self::TableNotFound(_) | Self::ConstraintViolation(_) | Self::LockError(_) => {
                ErrorKind::Store
            }
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// Strips every layer of operation context.
    pub fn root(&self) -> &RegistryError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Attaches the failing operation and its subject to an error.
pub trait ResultExt<T> {
    fn context(self, operation: &'static str, target: impl std::fmt::Display) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, operation: &'static str, target: impl std::fmt::Display) -> Result<T> {
        self.map_err(|err| RegistryError::Context {
            operation,
            target: target.to_string(),
            source: Box::new(err),
        })
    }
}

impl<T> From<std::sync::PoisonError<T>> for RegistryError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}
