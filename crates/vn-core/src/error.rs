//! Errors surfaced to page code.
//!
//! Variants render the way a native engine would print them so a stubbed or
//! vetoed capability is indistinguishable from one that is genuinely absent.

/// An exception thrown across the interception boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("TypeError: {0} is not a function")]
    NotAFunction(String),
    #[error("TypeError: {0} is not a constructor")]
    NotAConstructor(String),
    #[error("{name}: {message}")]
    Thrown { name: String, message: String },
}

impl Error {
    /// A plain `TypeError` with a custom message.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Thrown {
            name: "TypeError".to_string(),
            message: message.into(),
        }
    }

    /// An arbitrary named exception.
    pub fn thrown(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Thrown {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Name of the exception class, as page code would read `err.name`.
    pub fn name(&self) -> &str {
        match self {
            Self::NotAFunction(_) | Self::NotAConstructor(_) => "TypeError",
            Self::Thrown { name, .. } => name,
        }
    }

    pub fn is_type_error(&self) -> bool {
        self.name() == "TypeError"
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
