use thiserror::Error;

/// Failure reported by a customization hook, or a hook output that does not
/// fit the record it is folded into.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HookError {
    #[error("{0}")]
    Rejected(String),

    #[error("{operation} hook for {type_name} produced {found}, expected {expected}")]
    OutputMismatch {
        operation: String,
        type_name: &'static str,
        expected: &'static str,
        found: String,
    },
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// Error taxonomy surfaced by the CRUD core to the routing layer
#[derive(Debug, Error)]
pub enum CrudError {
    /// Malformed request structure, always raised before any mutation
    #[error("bind error: {0}")]
    Bind(String),

    /// A referenced field could not be found
    #[error("not found: {0}")]
    Resolution(String),

    #[error("hook error: {0}")]
    Hook(#[from] HookError),

    /// Propagated from the storage collaborator
    #[error("persistence error: {0:#}")]
    Persistence(anyhow::Error),

    /// The record type describes itself inconsistently
    #[error("invalid schema for {type_name}: {message}")]
    Schema {
        type_name: &'static str,
        message: String,
    },
}

impl CrudError {
    pub fn bind(message: impl Into<String>) -> Self {
        Self::Bind(message.into())
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution(message.into())
    }
}

/// Stores report failures through `anyhow`. A store may wrap a core error
/// (for instance a rejected sort token); that classification is kept.
impl From<anyhow::Error> for CrudError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<CrudError>() {
            Ok(inner) => inner,
            Err(err) => Self::Persistence(err),
        }
    }
}

pub type Result<T, E = CrudError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_keep_core_classification() {
        let wrapped = anyhow::Error::from(CrudError::bind("unknown sort field 'x'"));
        match CrudError::from(wrapped) {
            CrudError::Bind(message) => assert_eq!(message, "unknown sort field 'x'"),
            other => panic!("expected bind error, got {:?}", other),
        }

        let plain = anyhow::anyhow!("connection reset");
        assert!(matches!(CrudError::from(plain), CrudError::Persistence(_)));
    }

    #[test]
    fn test_hook_error_display() {
        let err = CrudError::from(HookError::new("age must be positive"));
        assert_eq!(err.to_string(), "hook error: age must be positive");
    }
}
