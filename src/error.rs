use thiserror::Error;

/// Errors surfaced by the sync core.
///
/// Load-time failures become a persistent error on the session and block the
/// page; save-time failures are one-shot notifications and leave both local
/// and persisted state untouched. Nothing here retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The document row does not exist (or is not visible to the caller).
    #[error("Document not found.")]
    NotFound,

    /// The share token is unknown, revoked, or past its expiry.
    #[error("This share link is invalid or has expired.")]
    LinkInvalid,

    /// A write was attempted without edit permission.
    #[error("You don't have edit permission for this document.")]
    Forbidden,

    /// The operation needs an authenticated identity and none is present.
    #[error("Please log in to create a document.")]
    AuthRequired,

    /// Share links can only be created for persisted documents.
    #[error("Please save the document first.")]
    UnsavedDraft,

    /// Any other failure from the store or RPC layer, message passed
    /// through verbatim for display.
    #[error("{0}")]
    Backend(String),
}

impl SyncError {
    pub fn backend(message: impl Into<String>) -> Self {
        SyncError::Backend(message.into())
    }

    /// Terminal errors end the session (blocking screen, no retry).
    /// Everything else is recoverable and the user stays on the page.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncError::NotFound | SyncError::LinkInvalid)
    }
}
