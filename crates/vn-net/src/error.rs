/// Failures inside the request pipeline.
///
/// A failure is carried in [`NetworkState::Failed`](crate::NetworkState) until
/// response processing decides what the page sees; only then is it turned
/// into a page-visible [`vn_core::Error`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetworkError {
    /// The real network failed.
    #[error("Transport error: {0}")]
    Transport(String),
    /// An exception from page-level code, such as the native `fetch` rejecting.
    #[error(transparent)]
    Script(vn_core::Error),
    #[error("Response body has already been consumed")]
    BodyUsed,
    /// A consumer asked for the outcome of a request nobody resolved.
    #[error("Network context was never resolved")]
    Unresolved,
    #[error("Invalid URL: '{0}'")]
    InvalidUrl(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Vetoed by a rule.
    #[error("Request to '{0}' was blocked")]
    Blocked(String),
}

impl From<vn_core::Error> for NetworkError {
    fn from(err: vn_core::Error) -> Self {
        Self::Script(err)
    }
}

/// What page code observes when a request fails: its own exception when it
/// raised one, the engine's generic network error otherwise.
impl From<NetworkError> for vn_core::Error {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::Script(err) => err,
            NetworkError::BodyUsed => vn_core::Error::type_error("body stream already read"),
            NetworkError::InvalidUrl(url) => vn_core::Error::type_error(format!("Failed to parse URL from {url}")),
            NetworkError::InvalidRequest(message) => vn_core::Error::type_error(message),
            NetworkError::Unresolved => vn_core::Error::thrown("InvalidStateError", NetworkError::Unresolved.to_string()),
            NetworkError::Transport(_) | NetworkError::Blocked(_) => {
                vn_core::Error::type_error("Failed to fetch")
            }
        }
    }
}
