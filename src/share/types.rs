use serde::{Deserialize, Serialize};

use crate::document::Permission;

/// Scope granted by a share link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharePermission {
    View,
    Edit,
}

impl From<SharePermission> for Permission {
    fn from(permission: SharePermission) -> Self {
        match permission {
            SharePermission::View => Permission::View,
            SharePermission::Edit => Permission::Edit,
        }
    }
}

/// A share token row. Possession of the token string grants nothing once
/// the row is inactive or expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareToken {
    pub id: String,
    pub document_id: String,
    pub token: String,
    pub permission: SharePermission,
    pub created_at: i64,
    /// Millisecond timestamp; None never expires.
    pub expires_at: Option<i64>,
    pub is_active: bool,
    pub access_count: i64,
    pub created_by: String,
}

impl ShareToken {
    /// A token grants access only while active and unexpired.
    pub fn grants_access(&self, now: i64) -> bool {
        self.is_active && self.expires_at.map_or(true, |at| at > now)
    }
}

/// Input for inserting a new share token row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateShareTokenInput {
    pub document_id: String,
    pub token: String,
    pub permission: SharePermission,
    pub expires_at: Option<i64>,
    pub created_by: String,
}

/// Result of creating a share link.
#[derive(Debug, Clone)]
pub struct CreatedShareLink {
    /// Fully qualified URL embedding the raw token.
    pub url: String,
    pub token: ShareToken,
}
