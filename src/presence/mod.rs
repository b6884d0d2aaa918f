mod tracker;
mod types;

pub use tracker::{pick_color, roster_from_snapshot, PresenceTracker, COLOR_PALETTE};
pub use types::{Collaborator, PresencePayload};
