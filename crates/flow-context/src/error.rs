use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("No context flow is active while looking up '{id}': inject must be used upward in the call stack")]
    NoActiveFlow { id: String },

    #[error("No context bound to '{id}' in the current flow")]
    UnboundIdentifier { id: String },

    #[error("A context is already bound to '{id}' in the current flow")]
    DuplicateBinding { id: String },

    #[error("Context bound to '{id}' is not a {expected}")]
    TypeMismatch { id: String, expected: &'static str },
}

impl ContextError {
    /// Identifier the failing operation was called with.
    pub fn id(&self) -> &str {
        match self {
            ContextError::NoActiveFlow { id }
            | ContextError::UnboundIdentifier { id }
            | ContextError::DuplicateBinding { id }
            | ContextError::TypeMismatch { id, .. } => id,
        }
    }
}

pub type ContextResult<T> = Result<T, ContextError>;
