use serde::{Deserialize, Serialize};

use crate::share::SharePermission;

/// A document row as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub owner_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Access level resolved for the current session. Derived at load time from
/// the access path, never stored on the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    View,
    Edit,
    Owner,
}

impl Permission {
    pub fn can_edit(&self) -> bool {
        matches!(self, Permission::Edit | Permission::Owner)
    }
}

/// How a session reaches its document. Resolved once when the session opens;
/// load, save, and subscription all dispatch on the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPath {
    /// Never-persisted draft; no backend row exists yet.
    Draft,
    /// Direct row access by id (owner, or a collaborator the backend's
    /// row-level policy already admits).
    Direct { document_id: String },
    /// Anonymous access through a share token.
    Token { token: String },
}

/// Row shape returned by the token-scoped read RPC: the document plus the
/// permission the token resolved to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenDocumentRow {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub owner_id: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub permission: SharePermission,
}

impl TokenDocumentRow {
    pub fn into_record(self) -> (DocumentRecord, SharePermission) {
        let permission = self.permission;
        let record = DocumentRecord {
            id: self.id,
            title: self.title,
            content: self.content,
            owner_id: self.owner_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        (record, permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_can_edit() {
        assert!(!Permission::View.can_edit());
        assert!(Permission::Edit.can_edit());
        assert!(Permission::Owner.can_edit());
    }

    #[test]
    fn test_permission_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Permission::Owner).unwrap(), "\"owner\"");
        assert_eq!(serde_json::to_string(&Permission::View).unwrap(), "\"view\"");
    }
}
