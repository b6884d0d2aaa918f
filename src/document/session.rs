use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::autosave::Debouncer;
use super::types::{AccessPath, DocumentRecord, Permission};
use crate::auth::AuthProvider;
use crate::backend::{DocumentStore, RealtimeTransport};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::presence::{Collaborator, PresenceTracker};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One open document: load, debounced autosave, last-writer-wins remote
/// reconciliation, and the collaborator roster.
///
/// The access path is resolved once when the session opens and every later
/// operation dispatches on it. Local edits echo immediately; persistence is
/// debounced and skipped entirely for view-only holders. A remote update
/// replaces the in-memory record, but never the locally edited title and
/// content while a save is in flight.
pub struct DocumentSession {
    inner: Arc<SessionInner>,
    notices: Mutex<Option<mpsc::UnboundedReceiver<SyncError>>>,
}

struct SessionInner {
    store: Arc<dyn DocumentStore>,
    realtime: Arc<dyn RealtimeTransport>,
    auth: Arc<dyn AuthProvider>,
    state: Mutex<SessionState>,
    is_saving: AtomicBool,
    debounce: Mutex<Debouncer>,
    attachments: Mutex<Attachments>,
    notice_tx: mpsc::UnboundedSender<SyncError>,
}

struct SessionState {
    access: AccessPath,
    document: Option<DocumentRecord>,
    title: String,
    content: String,
    permission: Permission,
    is_loading: bool,
    last_saved: Option<i64>,
    error: Option<SyncError>,
}

#[derive(Default)]
struct Attachments {
    document_id: Option<String>,
    change_task: Option<JoinHandle<()>>,
    presence: Option<PresenceTracker>,
}

impl DocumentSession {
    /// Open a session on a draft, a document id, or a share token, and load
    /// it. Load failures land in `error()` rather than failing construction,
    /// so the caller can render the blocking message.
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        realtime: Arc<dyn RealtimeTransport>,
        auth: Arc<dyn AuthProvider>,
        config: SyncConfig,
        access: AccessPath,
    ) -> DocumentSession {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(SessionInner {
            store,
            realtime,
            auth,
            state: Mutex::new(SessionState {
                access,
                document: None,
                title: String::new(),
                content: String::new(),
                permission: Permission::View,
                is_loading: true,
                last_saved: None,
                error: None,
            }),
            is_saving: AtomicBool::new(false),
            debounce: Mutex::new(Debouncer::new(config.autosave_debounce)),
            attachments: Mutex::new(Attachments::default()),
            notice_tx,
        });
        SessionInner::load(&inner).await;
        DocumentSession {
            inner,
            notices: Mutex::new(Some(notice_rx)),
        }
    }

    /// Re-run the load for the resolved access path.
    pub async fn reload(&self) {
        SessionInner::load(&self.inner).await;
    }

    /// Write the current title and content through the resolved access path.
    /// Returns the document id, which is fresh exactly once: when a draft is
    /// promoted to a persisted document.
    pub async fn save(&self) -> Result<Option<String>, SyncError> {
        SessionInner::save(&self.inner).await
    }

    /// Update the local title. Echoes immediately; arms the autosave timer
    /// unless the session is view-only.
    pub fn set_title(&self, title: impl Into<String>) {
        let can_edit = {
            let mut state = self.inner.state.lock().unwrap();
            state.title = title.into();
            state.permission.can_edit()
        };
        if can_edit {
            self.inner.arm_autosave();
        }
    }

    /// Update the local content. Same debounce rules as `set_title`.
    pub fn set_content(&self, content: impl Into<String>) {
        let can_edit = {
            let mut state = self.inner.state.lock().unwrap();
            state.content = content.into();
            state.permission.can_edit()
        };
        if can_edit {
            self.inner.arm_autosave();
        }
    }

    pub fn document(&self) -> Option<DocumentRecord> {
        self.inner.state.lock().unwrap().document.clone()
    }

    pub fn title(&self) -> String {
        self.inner.state.lock().unwrap().title.clone()
    }

    pub fn content(&self) -> String {
        self.inner.state.lock().unwrap().content.clone()
    }

    pub fn permission(&self) -> Permission {
        self.inner.state.lock().unwrap().permission
    }

    pub fn can_edit(&self) -> bool {
        self.permission().can_edit()
    }

    pub fn is_owner(&self) -> bool {
        self.permission() == Permission::Owner
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().unwrap().is_loading
    }

    pub fn is_saving(&self) -> bool {
        self.inner.is_saving.load(Ordering::SeqCst)
    }

    /// Millisecond timestamp of the last successful save in this session.
    pub fn last_saved(&self) -> Option<i64> {
        self.inner.state.lock().unwrap().last_saved
    }

    /// Terminal load error, if any. Consumed by the UI as a blocking screen.
    pub fn error(&self) -> Option<SyncError> {
        self.inner.state.lock().unwrap().error.clone()
    }

    /// Current collaborator roster from the presence channel. Empty when
    /// anonymous or before the first snapshot.
    pub fn collaborators(&self) -> Vec<Collaborator> {
        let attachments = self.inner.attachments.lock().unwrap();
        attachments
            .presence
            .as_ref()
            .map(|p| p.collaborators())
            .unwrap_or_default()
    }

    /// One-shot failure notifications from background autosaves. Yields the
    /// receiver once; background failures before this call are buffered.
    pub fn notices(&self) -> Option<mpsc::UnboundedReceiver<SyncError>> {
        self.notices.lock().unwrap().take()
    }

    /// Cancel the pending debounce timer and tear down the realtime and
    /// presence subscriptions. A save already sent will complete; its
    /// response is ignored.
    pub fn close(&self) {
        self.inner.debounce.lock().unwrap().cancel();
        let mut attachments = self.inner.attachments.lock().unwrap();
        if let Some(task) = attachments.change_task.take() {
            task.abort();
        }
        attachments.presence = None;
        attachments.document_id = None;
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl SessionInner {
    async fn load(inner: &Arc<SessionInner>) {
        let access = {
            let mut state = inner.state.lock().unwrap();
            state.is_loading = true;
            state.error = None;
            state.access.clone()
        };

        match access {
            AccessPath::Token { token } => {
                match inner.store.get_document_by_token(&token).await {
                    Ok(Some(row)) => {
                        let (record, share_permission) = row.into_record();
                        let mut state = inner.state.lock().unwrap();
                        state.title = record.title.clone();
                        state.content = record.content.clone().unwrap_or_default();
                        state.permission = share_permission.into();
                        state.document = Some(record);
                    }
                    Ok(None) => Self::fail_load(inner, SyncError::LinkInvalid),
                    Err(e) => Self::fail_load(inner, e),
                }
            }
            AccessPath::Direct { document_id } => {
                match inner.store.fetch_document(&document_id).await {
                    Ok(Some(record)) => {
                        // Owner/non-owner is the only distinction drawn here;
                        // anyone else the store's row policy admitted is an
                        // editor.
                        let caller = inner.auth.current_user();
                        let permission = if caller.map(|u| u.id).as_deref()
                            == Some(record.owner_id.as_str())
                        {
                            Permission::Owner
                        } else {
                            Permission::Edit
                        };
                        let mut state = inner.state.lock().unwrap();
                        state.title = record.title.clone();
                        state.content = record.content.clone().unwrap_or_default();
                        state.permission = permission;
                        state.document = Some(record);
                    }
                    Ok(None) => Self::fail_load(inner, SyncError::NotFound),
                    Err(e) => Self::fail_load(inner, e),
                }
            }
            AccessPath::Draft => {
                let mut state = inner.state.lock().unwrap();
                state.document = None;
                state.title.clear();
                state.content.clear();
                state.permission = Permission::Owner;
            }
        }

        let document_id = {
            let mut state = inner.state.lock().unwrap();
            state.is_loading = false;
            state.document.as_ref().map(|d| d.id.clone())
        };
        if let Some(id) = document_id {
            Self::attach(inner, &id);
        }
    }

    fn fail_load(inner: &Arc<SessionInner>, error: SyncError) {
        warn!(error = %error, "failed to load document");
        inner.state.lock().unwrap().error = Some(error);
    }

    /// Subscribe to row changes and join presence for the resolved document.
    /// Called from load and from draft promotion; no-op if already attached
    /// to the same id.
    fn attach(inner: &Arc<SessionInner>, document_id: &str) {
        let mut attachments = inner.attachments.lock().unwrap();
        if attachments.document_id.as_deref() == Some(document_id) {
            return;
        }
        if let Some(task) = attachments.change_task.take() {
            task.abort();
        }

        let mut changes = inner.realtime.subscribe_changes(document_id);
        let weak = Arc::downgrade(inner);
        attachments.change_task = Some(tokio::spawn(async move {
            while let Some(row) = changes.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.apply_remote_update(row);
            }
        }));

        attachments.presence = inner
            .auth
            .current_user()
            .map(|user| PresenceTracker::join(inner.realtime.as_ref(), document_id, &user));
        attachments.document_id = Some(document_id.to_string());
    }

    /// Fold an inbound change notification into the session. The remote row
    /// always becomes the latest known record (last writer wins at row
    /// granularity), but a save in flight owns the local title and content.
    fn apply_remote_update(&self, row: DocumentRecord) {
        let mut state = self.state.lock().unwrap();
        if state.document.as_ref().map(|d| d.updated_at) == Some(row.updated_at) {
            return;
        }
        if !self.is_saving.load(Ordering::SeqCst) {
            state.title = row.title.clone();
            state.content = row.content.clone().unwrap_or_default();
        }
        state.document = Some(row);
    }

    fn arm_autosave(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.debounce.lock().unwrap().arm(move || async move {
            // Failures land on the notice channel.
            let _ = SessionInner::save(&inner).await;
        });
    }

    async fn save(inner: &Arc<SessionInner>) -> Result<Option<String>, SyncError> {
        let (access, title, content) = {
            let state = inner.state.lock().unwrap();
            (
                state.access.clone(),
                state.title.clone(),
                state.content.clone(),
            )
        };

        inner.is_saving.store(true, Ordering::SeqCst);
        let result = Self::write_through(inner, access, title, content).await;
        inner.is_saving.store(false, Ordering::SeqCst);

        match result {
            Ok(document_id) => {
                inner.state.lock().unwrap().last_saved = Some(now_ms());
                Ok(document_id)
            }
            Err(e) => {
                warn!(error = %e, "failed to save document");
                let _ = inner.notice_tx.send(e.clone());
                Err(e)
            }
        }
    }

    async fn write_through(
        inner: &Arc<SessionInner>,
        access: AccessPath,
        title: String,
        content: String,
    ) -> Result<Option<String>, SyncError> {
        match access {
            AccessPath::Token { token } => {
                let allowed = inner
                    .store
                    .update_document_by_token(&token, &title, &content)
                    .await?;
                if !allowed {
                    return Err(SyncError::Forbidden);
                }
                let state = inner.state.lock().unwrap();
                Ok(state.document.as_ref().map(|d| d.id.clone()))
            }
            AccessPath::Draft => {
                let user = inner.auth.current_user().ok_or(SyncError::AuthRequired)?;
                let title = if title.is_empty() {
                    "Untitled".to_string()
                } else {
                    title
                };
                let record = inner.store.insert_document(&title, &content, &user.id).await?;
                let document_id = record.id.clone();
                {
                    let mut state = inner.state.lock().unwrap();
                    state.document = Some(record);
                    state.access = AccessPath::Direct {
                        document_id: document_id.clone(),
                    };
                    state.permission = Permission::Owner;
                }
                Self::attach(inner, &document_id);
                Ok(Some(document_id))
            }
            AccessPath::Direct { document_id } => {
                inner
                    .store
                    .update_document(&document_id, &title, &content)
                    .await?;
                Ok(Some(document_id))
            }
        }
    }
}
