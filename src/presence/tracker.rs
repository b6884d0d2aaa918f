use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::types::{Collaborator, PresencePayload};
use crate::auth::UserIdentity;
use crate::backend::RealtimeTransport;

/// Fixed cursor palette. Picks are random per session and may collide
/// between participants.
pub const COLOR_PALETTE: [&str; 6] = [
    "#6366f1", // indigo
    "#10b981", // emerald
    "#f59e0b", // amber
    "#f43f5e", // rose
    "#8b5cf6", // violet
    "#06b6d4", // cyan
];

pub fn pick_color() -> &'static str {
    COLOR_PALETTE[rand::rng().random_range(0..COLOR_PALETTE.len())]
}

/// Derive the live roster from a full-membership snapshot: everyone except
/// the local identity, deduplicated by id. The transport always delivers
/// full snapshots, so no incremental add/remove tracking is needed.
pub fn roster_from_snapshot(snapshot: &[PresencePayload], local_id: &str) -> Vec<Collaborator> {
    let mut seen = HashSet::new();
    snapshot
        .iter()
        .filter(|p| p.user_id != local_id)
        .filter(|p| seen.insert(p.user_id.clone()))
        .map(|p| Collaborator {
            id: p.user_id.clone(),
            name: p.name.clone(),
            color: p.color.clone(),
            cursor_position: p.cursor_position,
        })
        .collect()
}

/// Tracks who else has a document open, via the document's ephemeral
/// presence channel.
///
/// Joining publishes the local identity; the roster then follows the
/// channel's membership snapshots until the tracker is dropped, at which
/// point the channel is left and the roster resets to empty.
pub struct PresenceTracker {
    collaborators: Arc<Mutex<Vec<Collaborator>>>,
    task: JoinHandle<()>,
}

impl PresenceTracker {
    pub fn join(
        realtime: &dyn RealtimeTransport,
        document_id: &str,
        user: &UserIdentity,
    ) -> PresenceTracker {
        let mut session = realtime.join_presence(document_id);
        let payload = PresencePayload {
            user_id: user.id.clone(),
            name: user.display_name(),
            color: pick_color().to_string(),
            online_at: chrono::Utc::now().timestamp_millis(),
            cursor_position: None,
        };

        let collaborators = Arc::new(Mutex::new(Vec::new()));
        let roster = collaborators.clone();
        let local_id = user.id.clone();
        let document_id = document_id.to_string();

        let task = tokio::spawn(async move {
            if let Err(e) = session.track(payload).await {
                warn!(document_id = %document_id, error = %e, "presence track failed");
                return;
            }
            while let Some(snapshot) = session.next_snapshot().await {
                let next = roster_from_snapshot(&snapshot, &local_id);
                debug!(document_id = %document_id, collaborators = next.len(), "presence sync");
                *roster.lock().unwrap() = next;
            }
        });

        PresenceTracker {
            collaborators,
            task,
        }
    }

    /// Current roster, excluding the local participant.
    pub fn collaborators(&self) -> Vec<Collaborator> {
        self.collaborators.lock().unwrap().clone()
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        // Aborting drops the session, which leaves the channel.
        self.task.abort();
    }
}
