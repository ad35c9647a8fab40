/// Host misuse of the node tree, reported to page code as a `DOMException`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomError {
    #[error("NotFoundError: {0}")]
    NotFound(String),
    #[error("HierarchyRequestError: {0}")]
    HierarchyRequest(String),
}

impl From<DomError> for vn_core::Error {
    fn from(err: DomError) -> Self {
        match err {
            DomError::NotFound(message) => vn_core::Error::thrown("NotFoundError", message),
            DomError::HierarchyRequest(message) => {
                vn_core::Error::thrown("HierarchyRequestError", message)
            }
        }
    }
}
