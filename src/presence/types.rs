use serde::{Deserialize, Serialize};

/// Payload each participant publishes into a document's presence channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub user_id: String,
    pub name: String,
    pub color: String,
    pub online_at: i64,
    pub cursor_position: Option<usize>,
}

/// A remote participant who has the document open right now. Derived from
/// the latest presence snapshot, never persisted, gone on disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: String,
    pub name: String,
    pub color: String,
    pub cursor_position: Option<usize>,
}
