use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{BackendResult, DocumentStore, PresenceSession, RealtimeTransport};
use crate::document::{DocumentRecord, TokenDocumentRow};
use crate::error::SyncError;
use crate::presence::PresencePayload;
use crate::share::{CreateShareTokenInput, ShareToken};

/// In-process backend implementing the full platform contract: row storage,
/// the token-scoped RPCs with their server-side expiry/active/permission
/// checks, UPDATE fan-out to change subscribers, and full-snapshot presence
/// rooms. Owner-only share-token insertion stands in for the store's
/// row-level policy.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    documents: Mutex<HashMap<String, DocumentRecord>>,
    share_tokens: Mutex<Vec<ShareToken>>,
    change_subs: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<DocumentRecord>>>>,
    rooms: Mutex<HashMap<String, PresenceRoom>>,
    next_member: AtomicU64,
}

#[derive(Default)]
struct PresenceRoom {
    /// Join order preserved so snapshots are stable.
    members: Vec<(u64, PresencePayload)>,
    listeners: Vec<(u64, mpsc::UnboundedSender<Vec<PresencePayload>>)>,
}

impl PresenceRoom {
    fn snapshot(&self) -> Vec<PresencePayload> {
        self.members.iter().map(|(_, p)| p.clone()).collect()
    }

    fn broadcast(&mut self) {
        let snapshot = self.snapshot();
        self.listeners
            .retain(|(_, tx)| tx.send(snapshot.clone()).is_ok());
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            inner: Arc::new(MemoryInner {
                documents: Mutex::new(HashMap::new()),
                share_tokens: Mutex::new(Vec::new()),
                change_subs: Mutex::new(HashMap::new()),
                rooms: Mutex::new(HashMap::new()),
                next_member: AtomicU64::new(1),
            }),
        }
    }

    /// Number of persisted documents. Test observability.
    pub fn document_count(&self) -> usize {
        self.inner.documents.lock().unwrap().len()
    }

    /// Insert a row with a caller-chosen id. Fixture seeding for tests and
    /// demos; regular inserts go through `insert_document`.
    pub fn seed_document(&self, record: DocumentRecord) {
        self.inner
            .documents
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
    }

    fn notify_update(&self, record: &DocumentRecord) {
        let mut subs = self.inner.change_subs.lock().unwrap();
        if let Some(senders) = subs.get_mut(&record.id) {
            senders.retain(|tx| tx.send(record.clone()).is_ok());
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn fetch_document(&self, document_id: &str) -> BackendResult<Option<DocumentRecord>> {
        Ok(self.inner.documents.lock().unwrap().get(document_id).cloned())
    }

    async fn insert_document(
        &self,
        title: &str,
        content: &str,
        owner_id: &str,
    ) -> BackendResult<DocumentRecord> {
        let now = now_ms();
        let record = DocumentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: Some(content.to_string()),
            owner_id: owner_id.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.inner
            .documents
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_document(
        &self,
        document_id: &str,
        title: &str,
        content: &str,
    ) -> BackendResult<()> {
        let updated = {
            let mut documents = self.inner.documents.lock().unwrap();
            let record = documents.get_mut(document_id).ok_or(SyncError::NotFound)?;
            record.title = title.to_string();
            record.content = Some(content.to_string());
            // Keep updated_at strictly increasing even within one millisecond.
            record.updated_at = now_ms().max(record.updated_at + 1);
            record.clone()
        };
        self.notify_update(&updated);
        Ok(())
    }

    async fn get_document_by_token(&self, token: &str) -> BackendResult<Option<TokenDocumentRow>> {
        let now = now_ms();
        let resolved = {
            let mut tokens = self.inner.share_tokens.lock().unwrap();
            match tokens.iter_mut().find(|t| t.token == token) {
                Some(row) if row.grants_access(now) => {
                    row.access_count += 1;
                    Some((row.document_id.clone(), row.permission))
                }
                _ => None,
            }
        };
        let Some((document_id, permission)) = resolved else {
            return Ok(None);
        };
        let documents = self.inner.documents.lock().unwrap();
        Ok(documents.get(&document_id).map(|doc| TokenDocumentRow {
            id: doc.id.clone(),
            title: doc.title.clone(),
            content: doc.content.clone(),
            owner_id: doc.owner_id.clone(),
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            permission,
        }))
    }

    async fn update_document_by_token(
        &self,
        token: &str,
        title: &str,
        content: &str,
    ) -> BackendResult<bool> {
        use crate::share::SharePermission;

        let now = now_ms();
        let document_id = {
            let tokens = self.inner.share_tokens.lock().unwrap();
            match tokens.iter().find(|t| t.token == token) {
                Some(row) if row.grants_access(now) && row.permission == SharePermission::Edit => {
                    row.document_id.clone()
                }
                _ => return Ok(false),
            }
        };
        match self.update_document(&document_id, title, content).await {
            Ok(()) => Ok(true),
            Err(SyncError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_share_tokens(&self, document_id: &str) -> BackendResult<Vec<ShareToken>> {
        let tokens = self.inner.share_tokens.lock().unwrap();
        let mut rows: Vec<ShareToken> = tokens
            .iter()
            .filter(|t| t.document_id == document_id)
            .cloned()
            .collect();
        // Newest first; reversal before the stable sort keeps insertion
        // order for same-millisecond rows.
        rows.reverse();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert_share_token(&self, input: CreateShareTokenInput) -> BackendResult<ShareToken> {
        let owner_id = {
            let documents = self.inner.documents.lock().unwrap();
            documents
                .get(&input.document_id)
                .map(|d| d.owner_id.clone())
                .ok_or(SyncError::NotFound)?
        };
        // Stand-in for the store's row-level policy: only the owner may
        // issue links.
        if owner_id != input.created_by {
            return Err(SyncError::Forbidden);
        }
        let row = ShareToken {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: input.document_id,
            token: input.token,
            permission: input.permission,
            created_at: now_ms(),
            expires_at: input.expires_at,
            is_active: true,
            access_count: 0,
            created_by: input.created_by,
        };
        self.inner.share_tokens.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn deactivate_share_token(&self, token_id: &str) -> BackendResult<()> {
        let mut tokens = self.inner.share_tokens.lock().unwrap();
        let row = tokens
            .iter_mut()
            .find(|t| t.id == token_id)
            .ok_or(SyncError::NotFound)?;
        row.is_active = false;
        Ok(())
    }

    async fn delete_share_token(&self, token_id: &str) -> BackendResult<()> {
        let mut tokens = self.inner.share_tokens.lock().unwrap();
        let before = tokens.len();
        tokens.retain(|t| t.id != token_id);
        if tokens.len() == before {
            return Err(SyncError::NotFound);
        }
        Ok(())
    }
}

impl RealtimeTransport for MemoryBackend {
    fn subscribe_changes(&self, document_id: &str) -> mpsc::UnboundedReceiver<DocumentRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .change_subs
            .lock()
            .unwrap()
            .entry(document_id.to_string())
            .or_default()
            .push(tx);
        rx
    }

    fn join_presence(&self, document_id: &str) -> Box<dyn PresenceSession> {
        let member_id = self.inner.next_member.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut rooms = self.inner.rooms.lock().unwrap();
            let room = rooms.entry(document_id.to_string()).or_default();
            // Initial sync so a joiner sees the roster before anyone moves.
            let _ = tx.send(room.snapshot());
            room.listeners.push((member_id, tx));
        }
        Box::new(MemoryPresenceSession {
            inner: self.inner.clone(),
            document_id: document_id.to_string(),
            member_id,
            snapshots: rx,
        })
    }
}

struct MemoryPresenceSession {
    inner: Arc<MemoryInner>,
    document_id: String,
    member_id: u64,
    snapshots: mpsc::UnboundedReceiver<Vec<PresencePayload>>,
}

#[async_trait]
impl PresenceSession for MemoryPresenceSession {
    async fn track(&mut self, payload: PresencePayload) -> BackendResult<()> {
        let mut rooms = self.inner.rooms.lock().unwrap();
        let room = rooms.entry(self.document_id.clone()).or_default();
        match room.members.iter_mut().find(|(id, _)| *id == self.member_id) {
            Some((_, existing)) => *existing = payload,
            None => room.members.push((self.member_id, payload)),
        }
        room.broadcast();
        Ok(())
    }

    async fn next_snapshot(&mut self) -> Option<Vec<PresencePayload>> {
        self.snapshots.recv().await
    }
}

impl Drop for MemoryPresenceSession {
    fn drop(&mut self) {
        let mut rooms = self.inner.rooms.lock().unwrap();
        if let Some(room) = rooms.get_mut(&self.document_id) {
            room.members.retain(|(id, _)| *id != self.member_id);
            room.listeners.retain(|(id, _)| *id != self.member_id);
            if room.members.is_empty() && room.listeners.is_empty() {
                rooms.remove(&self.document_id);
            } else {
                room.broadcast();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share::SharePermission;

    fn payload(user_id: &str) -> PresencePayload {
        PresencePayload {
            user_id: user_id.to_string(),
            name: user_id.to_string(),
            color: "#6366f1".to_string(),
            online_at: 0,
            cursor_position: None,
        }
    }

    async fn seed(backend: &MemoryBackend) -> DocumentRecord {
        backend
            .insert_document("Notes", "hello", "owner-1")
            .await
            .unwrap()
    }

    async fn seed_token(
        backend: &MemoryBackend,
        doc: &DocumentRecord,
        permission: SharePermission,
        expires_at: Option<i64>,
    ) -> ShareToken {
        backend
            .insert_share_token(CreateShareTokenInput {
                document_id: doc.id.clone(),
                token: crate::share::generate_share_token(),
                permission,
                expires_at,
                created_by: doc.owner_id.clone(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_token_read_checks_and_counts_access() {
        let backend = MemoryBackend::new();
        let doc = seed(&backend).await;
        let token = seed_token(&backend, &doc, SharePermission::View, None).await;

        let row = backend
            .get_document_by_token(&token.token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.id, doc.id);
        assert_eq!(row.permission, SharePermission::View);

        backend.get_document_by_token(&token.token).await.unwrap();
        let listed = backend.list_share_tokens(&doc.id).await.unwrap();
        assert_eq!(listed[0].access_count, 2);
    }

    #[tokio::test]
    async fn test_revoked_or_expired_token_never_resolves() {
        let backend = MemoryBackend::new();
        let doc = seed(&backend).await;

        let expired =
            seed_token(&backend, &doc, SharePermission::Edit, Some(now_ms() - 1)).await;
        assert!(backend
            .get_document_by_token(&expired.token)
            .await
            .unwrap()
            .is_none());

        let revoked = seed_token(&backend, &doc, SharePermission::Edit, None).await;
        backend.deactivate_share_token(&revoked.id).await.unwrap();
        assert!(backend
            .get_document_by_token(&revoked.token)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_view_token_write_rejected_without_mutation() {
        let backend = MemoryBackend::new();
        let doc = seed(&backend).await;
        let token = seed_token(&backend, &doc, SharePermission::View, None).await;

        let ok = backend
            .update_document_by_token(&token.token, "Hacked", "hacked")
            .await
            .unwrap();
        assert!(!ok);

        let stored = backend.fetch_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(stored.content.as_deref(), Some("hello"));
        assert_eq!(stored.title, "Notes");
    }

    #[tokio::test]
    async fn test_edit_token_write_updates_row() {
        let backend = MemoryBackend::new();
        let doc = seed(&backend).await;
        let token = seed_token(&backend, &doc, SharePermission::Edit, None).await;

        let ok = backend
            .update_document_by_token(&token.token, "Notes v2", "world")
            .await
            .unwrap();
        assert!(ok);

        let stored = backend.fetch_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(stored.content.as_deref(), Some("world"));
        assert!(stored.updated_at > doc.updated_at);
    }

    #[tokio::test]
    async fn test_share_token_insert_is_owner_only() {
        let backend = MemoryBackend::new();
        let doc = seed(&backend).await;

        let err = backend
            .insert_share_token(CreateShareTokenInput {
                document_id: doc.id.clone(),
                token: crate::share::generate_share_token(),
                permission: SharePermission::View,
                expires_at: None,
                created_by: "intruder".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::Forbidden);
    }

    #[tokio::test]
    async fn test_list_share_tokens_newest_first() {
        let backend = MemoryBackend::new();
        let doc = seed(&backend).await;
        let first = seed_token(&backend, &doc, SharePermission::View, None).await;
        let second = seed_token(&backend, &doc, SharePermission::Edit, None).await;

        let listed = backend.list_share_tokens(&doc.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[tokio::test]
    async fn test_update_fans_out_to_subscribers() {
        let backend = MemoryBackend::new();
        let doc = seed(&backend).await;
        let mut rx = backend.subscribe_changes(&doc.id);

        backend
            .update_document(&doc.id, "Notes", "changed")
            .await
            .unwrap();

        let row = rx.recv().await.unwrap();
        assert_eq!(row.content.as_deref(), Some("changed"));
    }

    #[tokio::test]
    async fn test_presence_track_and_leave_rebroadcast() {
        let backend = MemoryBackend::new();

        let mut alice = backend.join_presence("d1");
        // Initial sync: empty room.
        assert_eq!(alice.next_snapshot().await.unwrap().len(), 0);
        alice.track(payload("alice")).await.unwrap();
        assert_eq!(alice.next_snapshot().await.unwrap().len(), 1);

        let mut bob = backend.join_presence("d1");
        assert_eq!(bob.next_snapshot().await.unwrap().len(), 1);
        bob.track(payload("bob")).await.unwrap();
        assert_eq!(alice.next_snapshot().await.unwrap().len(), 2);
        assert_eq!(bob.next_snapshot().await.unwrap().len(), 2);

        drop(bob);
        let snapshot = alice.next_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].user_id, "alice");
    }
}
