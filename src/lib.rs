//! Sync and sharing core for the Coscribe collaborative document editor.
//!
//! Persistence, authentication, realtime fan-out, and row-level permission
//! enforcement belong to the managed platform behind the [`backend`] traits.
//! This crate owns what sits in front of it: debounced optimistic autosave
//! with last-writer-wins reconciliation ([`DocumentSession`]), share-link
//! issuance and revocation ([`ShareLinkManager`]), and ephemeral collaborator
//! presence ([`presence::PresenceTracker`]).

pub mod auth;
pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod presence;
pub mod share;

pub use auth::{AuthProvider, StaticAuth, UserIdentity};
pub use config::SyncConfig;
pub use document::{AccessPath, DocumentRecord, DocumentSession, Permission};
pub use error::SyncError;
pub use presence::Collaborator;
pub use share::{ShareLinkManager, SharePermission, ShareToken};
