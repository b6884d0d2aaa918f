use std::sync::{Arc, Mutex};

use tracing::warn;

use super::token::generate_share_token;
use super::types::{CreateShareTokenInput, CreatedShareLink, SharePermission, ShareToken};
use crate::auth::AuthProvider;
use crate::backend::DocumentStore;
use crate::config::SyncConfig;
use crate::error::SyncError;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Owner-side CRUD over a document's share links.
///
/// The in-memory list only changes after the backend confirms a mutation:
/// prepend on create, flag-flip on revoke, filter on delete. Owner-only
/// enforcement is the backend's access policy, not re-checked here.
pub struct ShareLinkManager {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthProvider>,
    config: SyncConfig,
    /// None while the document is an unsaved draft.
    document_id: Option<String>,
    state: Mutex<ShareState>,
}

#[derive(Default)]
struct ShareState {
    tokens: Vec<ShareToken>,
    generated_link: Option<String>,
}

impl ShareLinkManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
        config: SyncConfig,
        document_id: Option<String>,
    ) -> Self {
        ShareLinkManager {
            store,
            auth,
            config,
            document_id,
            state: Mutex::new(ShareState::default()),
        }
    }

    /// Existing share tokens, newest first. Unsaved drafts have nothing to
    /// list.
    pub async fn load(&self) -> Result<Vec<ShareToken>, SyncError> {
        let Some(document_id) = self.document_id.as_deref() else {
            return Ok(Vec::new());
        };
        let rows = match self.store.list_share_tokens(document_id).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(document_id = %document_id, error = %e, "failed to load share tokens");
                return Err(e);
            }
        };
        self.state.lock().unwrap().tokens = rows.clone();
        Ok(rows)
    }

    /// Issue a new share link. `expires_in_days` of None means the link
    /// never expires.
    pub async fn create(
        &self,
        permission: SharePermission,
        expires_in_days: Option<i64>,
    ) -> Result<CreatedShareLink, SyncError> {
        let Some(document_id) = self.document_id.clone() else {
            return Err(SyncError::UnsavedDraft);
        };
        let user = self.auth.current_user().ok_or(SyncError::AuthRequired)?;

        let token = generate_share_token();
        let expires_at =
            expires_in_days.map(|days| chrono::Utc::now().timestamp_millis() + days * DAY_MS);

        let row = self
            .store
            .insert_share_token(CreateShareTokenInput {
                document_id,
                token,
                permission,
                expires_at,
                created_by: user.id,
            })
            .await?;

        let url = self.config.share_url(&row.token);
        {
            let mut state = self.state.lock().unwrap();
            state.generated_link = Some(url.clone());
            state.tokens.insert(0, row.clone());
        }
        Ok(CreatedShareLink { url, token: row })
    }

    /// Soft revoke: the row stays listed with `is_active = false`. Revoking
    /// an already-revoked token is a no-op success.
    pub async fn revoke(&self, token_id: &str) -> Result<(), SyncError> {
        self.store.deactivate_share_token(token_id).await?;
        let mut state = self.state.lock().unwrap();
        for token in state.tokens.iter_mut() {
            if token.id == token_id {
                token.is_active = false;
            }
        }
        Ok(())
    }

    /// Permanently remove the row.
    pub async fn delete(&self, token_id: &str) -> Result<(), SyncError> {
        self.store.delete_share_token(token_id).await?;
        self.state
            .lock()
            .unwrap()
            .tokens
            .retain(|t| t.id != token_id);
        Ok(())
    }

    pub fn tokens(&self) -> Vec<ShareToken> {
        self.state.lock().unwrap().tokens.clone()
    }

    /// URL of the most recently created link, until cleared.
    pub fn generated_link(&self) -> Option<String> {
        self.state.lock().unwrap().generated_link.clone()
    }

    pub fn clear_generated_link(&self) {
        self.state.lock().unwrap().generated_link = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuth;
    use crate::backend::MemoryBackend;
    use crate::document::DocumentRecord;

    async fn seed_document(backend: &MemoryBackend) -> DocumentRecord {
        backend
            .insert_document("Roadmap", "q3 goals", "owner-1")
            .await
            .unwrap()
    }

    fn manager_for(
        backend: &MemoryBackend,
        auth: StaticAuth,
        document_id: Option<String>,
    ) -> ShareLinkManager {
        ShareLinkManager::new(
            Arc::new(backend.clone()),
            Arc::new(auth),
            SyncConfig {
                share_origin: "https://app.coscribe.io".to_string(),
                ..Default::default()
            },
            document_id,
        )
    }

    #[tokio::test]
    async fn test_create_on_unsaved_draft_fails() {
        let backend = MemoryBackend::new();
        let manager = manager_for(&backend, StaticAuth::signed_in("owner-1", "o@x.io"), None);

        let err = manager
            .create(SharePermission::View, None)
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::UnsavedDraft);
        assert!(manager.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_identity() {
        let backend = MemoryBackend::new();
        let doc = seed_document(&backend).await;
        let manager = manager_for(&backend, StaticAuth::anonymous(), Some(doc.id));

        let err = manager
            .create(SharePermission::View, None)
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::AuthRequired);
    }

    #[tokio::test]
    async fn test_create_by_non_owner_is_forbidden() {
        let backend = MemoryBackend::new();
        let doc = seed_document(&backend).await;
        let manager = manager_for(
            &backend,
            StaticAuth::signed_in("intruder", "i@x.io"),
            Some(doc.id),
        );

        let err = manager
            .create(SharePermission::Edit, None)
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::Forbidden);
        assert!(manager.tokens().is_empty());
    }

    #[tokio::test]
    async fn test_create_builds_url_and_expiry() {
        let backend = MemoryBackend::new();
        let doc = seed_document(&backend).await;
        let manager = manager_for(
            &backend,
            StaticAuth::signed_in("owner-1", "o@x.io"),
            Some(doc.id),
        );

        let before = chrono::Utc::now().timestamp_millis();
        let created = manager.create(SharePermission::View, Some(7)).await.unwrap();

        assert_eq!(
            created.url,
            format!("https://app.coscribe.io/shared/{}", created.token.token)
        );
        assert_eq!(created.token.token.len(), 48);
        let expires_at = created.token.expires_at.unwrap();
        let week = 7 * DAY_MS;
        assert!(expires_at >= before + week);
        assert!(expires_at <= before + week + 5_000);

        assert_eq!(manager.generated_link(), Some(created.url.clone()));
        manager.clear_generated_link();
        assert!(manager.generated_link().is_none());
    }

    #[tokio::test]
    async fn test_created_links_listed_newest_first() {
        let backend = MemoryBackend::new();
        let doc = seed_document(&backend).await;
        let manager = manager_for(
            &backend,
            StaticAuth::signed_in("owner-1", "o@x.io"),
            Some(doc.id),
        );

        let first = manager.create(SharePermission::View, None).await.unwrap();
        let second = manager.create(SharePermission::Edit, None).await.unwrap();

        let cached = manager.tokens();
        assert_eq!(cached[0].id, second.token.id);
        assert_eq!(cached[1].id, first.token.id);

        let reloaded = manager.load().await.unwrap();
        assert_eq!(reloaded[0].id, second.token.id);
        assert_eq!(reloaded[1].id, first.token.id);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent_and_kills_access() {
        let backend = MemoryBackend::new();
        let doc = seed_document(&backend).await;
        let manager = manager_for(
            &backend,
            StaticAuth::signed_in("owner-1", "o@x.io"),
            Some(doc.id),
        );

        let created = manager.create(SharePermission::Edit, None).await.unwrap();
        manager.revoke(&created.token.id).await.unwrap();
        manager.revoke(&created.token.id).await.unwrap();

        assert!(!manager.tokens()[0].is_active);
        assert!(backend
            .get_document_by_token(&created.token.token)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_row() {
        let backend = MemoryBackend::new();
        let doc = seed_document(&backend).await;
        let manager = manager_for(
            &backend,
            StaticAuth::signed_in("owner-1", "o@x.io"),
            Some(doc.id.clone()),
        );

        let created = manager.create(SharePermission::View, None).await.unwrap();
        manager.delete(&created.token.id).await.unwrap();

        assert!(manager.tokens().is_empty());
        assert!(backend.list_share_tokens(&doc.id).await.unwrap().is_empty());
    }
}
