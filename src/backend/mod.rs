mod memory;
mod rest;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::document::{DocumentRecord, TokenDocumentRow};
use crate::error::SyncError;
use crate::presence::PresencePayload;
use crate::share::{CreateShareTokenInput, ShareToken};

pub use memory::MemoryBackend;
pub use rest::RestStore;

pub type BackendResult<T> = Result<T, SyncError>;

/// CRUD and RPC surface of the managed relational store.
///
/// Row-level authorization lives behind this trait: the sync core trusts the
/// store to reject writes the caller is not entitled to make, and the
/// token-scoped RPCs enforce expiry, active state, and permission on the
/// server side.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch_document(&self, document_id: &str) -> BackendResult<Option<DocumentRecord>>;

    async fn insert_document(
        &self,
        title: &str,
        content: &str,
        owner_id: &str,
    ) -> BackendResult<DocumentRecord>;

    async fn update_document(
        &self,
        document_id: &str,
        title: &str,
        content: &str,
    ) -> BackendResult<()>;

    /// Token-scoped read RPC. An empty result means the token is unknown,
    /// revoked, or expired; the caller cannot tell which.
    async fn get_document_by_token(&self, token: &str) -> BackendResult<Option<TokenDocumentRow>>;

    /// Token-scoped write RPC. Returns false when the token does not grant
    /// edit permission.
    async fn update_document_by_token(
        &self,
        token: &str,
        title: &str,
        content: &str,
    ) -> BackendResult<bool>;

    /// Share tokens for one document, newest first.
    async fn list_share_tokens(&self, document_id: &str) -> BackendResult<Vec<ShareToken>>;

    async fn insert_share_token(&self, input: CreateShareTokenInput) -> BackendResult<ShareToken>;

    /// Soft revoke: sets `is_active = false`. Idempotent.
    async fn deactivate_share_token(&self, token_id: &str) -> BackendResult<()>;

    /// Permanently removes the row.
    async fn delete_share_token(&self, token_id: &str) -> BackendResult<()>;
}

/// Change-notification and presence surface of the realtime transport.
pub trait RealtimeTransport: Send + Sync {
    /// Subscribe to row updates for one document. Each UPDATE delivers the
    /// full updated row; the subscription ends when the receiver is dropped.
    fn subscribe_changes(&self, document_id: &str) -> mpsc::UnboundedReceiver<DocumentRecord>;

    /// Join the ephemeral presence channel for one document.
    fn join_presence(&self, document_id: &str) -> Box<dyn PresenceSession>;
}

/// Handle to a joined presence channel. Dropping the session leaves the
/// channel and removes the local participant from everyone's roster.
#[async_trait]
pub trait PresenceSession: Send {
    /// Publish the local participant's payload.
    async fn track(&mut self, payload: PresencePayload) -> BackendResult<()>;

    /// Next full-membership snapshot; None once the channel is torn down.
    /// Snapshots carry the complete roster, so latest wins.
    async fn next_snapshot(&mut self) -> Option<Vec<PresencePayload>>;
}
