use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{BackendResult, DocumentStore};
use crate::document::{DocumentRecord, TokenDocumentRow};
use crate::error::SyncError;
use crate::share::{CreateShareTokenInput, ShareToken};

/// `DocumentStore` over a PostgREST-style HTTP API: `/documents` and
/// `/share_tokens` tables plus the two token-scoped RPC functions. Row-level
/// authorization is enforced by the platform behind these endpoints.
///
/// The realtime transport (change feed, presence) is websocket
/// infrastructure provided by the platform client, not by this store.
#[derive(Debug)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    bearer: Option<String>,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        RestStore {
            client,
            base_url: normalize_base_url(base_url.into()),
            api_key: api_key.into(),
            bearer: None,
        }
    }

    /// Attach the signed-in user's access token so the platform can apply
    /// its row-level policy to this session.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut request = request.header("apikey", &self.api_key);
        if let Some(ref bearer) = self.bearer {
            request = request.header("Authorization", format!("Bearer {}", bearer));
        }
        request
    }

    async fn check(response: reqwest::Response) -> BackendResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status.as_u16(), body))
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn map_status(status: u16, body: String) -> SyncError {
    match status {
        401 => SyncError::AuthRequired,
        403 => SyncError::Forbidden,
        404 => SyncError::NotFound,
        _ => {
            let message = if body.is_empty() {
                format!("request failed with status {}", status)
            } else {
                body
            };
            SyncError::Backend(message)
        }
    }
}

fn transport_err(e: reqwest::Error) -> SyncError {
    SyncError::Backend(e.to_string())
}

#[async_trait]
impl DocumentStore for RestStore {
    async fn fetch_document(&self, document_id: &str) -> BackendResult<Option<DocumentRecord>> {
        let request = self.client.get(self.endpoint("documents")).query(&[
            ("id", format!("eq.{}", document_id)),
            ("select", "*".to_string()),
        ]);
        let response = self.authed(request).send().await.map_err(transport_err)?;
        let rows: Vec<DocumentRecord> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport_err)?;
        Ok(rows.into_iter().next())
    }

    async fn insert_document(
        &self,
        title: &str,
        content: &str,
        owner_id: &str,
    ) -> BackendResult<DocumentRecord> {
        let request = self
            .client
            .post(self.endpoint("documents"))
            .header("Prefer", "return=representation")
            .json(&json!({
                "title": title,
                "content": content,
                "owner_id": owner_id,
            }));
        let response = self.authed(request).send().await.map_err(transport_err)?;
        let rows: Vec<DocumentRecord> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport_err)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| SyncError::backend("insert returned no row"))
    }

    async fn update_document(
        &self,
        document_id: &str,
        title: &str,
        content: &str,
    ) -> BackendResult<()> {
        let request = self
            .client
            .patch(self.endpoint("documents"))
            .query(&[("id", format!("eq.{}", document_id))])
            .json(&json!({ "title": title, "content": content }));
        let response = self.authed(request).send().await.map_err(transport_err)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_document_by_token(&self, token: &str) -> BackendResult<Option<TokenDocumentRow>> {
        let request = self
            .client
            .post(self.endpoint("rpc/get_document_by_token"))
            .json(&json!({ "p_token": token }));
        let response = self.authed(request).send().await.map_err(transport_err)?;
        let rows: Vec<TokenDocumentRow> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport_err)?;
        Ok(rows.into_iter().next())
    }

    async fn update_document_by_token(
        &self,
        token: &str,
        title: &str,
        content: &str,
    ) -> BackendResult<bool> {
        let request = self
            .client
            .post(self.endpoint("rpc/update_document_by_token"))
            .json(&json!({
                "p_token": token,
                "p_title": title,
                "p_content": content,
            }));
        let response = self.authed(request).send().await.map_err(transport_err)?;
        let allowed: bool = Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport_err)?;
        Ok(allowed)
    }

    async fn list_share_tokens(&self, document_id: &str) -> BackendResult<Vec<ShareToken>> {
        let request = self.client.get(self.endpoint("share_tokens")).query(&[
            ("document_id", format!("eq.{}", document_id)),
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ]);
        let response = self.authed(request).send().await.map_err(transport_err)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport_err)
    }

    async fn insert_share_token(&self, input: CreateShareTokenInput) -> BackendResult<ShareToken> {
        let request = self
            .client
            .post(self.endpoint("share_tokens"))
            .header("Prefer", "return=representation")
            .json(&input);
        let response = self.authed(request).send().await.map_err(transport_err)?;
        let rows: Vec<ShareToken> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport_err)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| SyncError::backend("insert returned no row"))
    }

    async fn deactivate_share_token(&self, token_id: &str) -> BackendResult<()> {
        let request = self
            .client
            .patch(self.endpoint("share_tokens"))
            .query(&[("id", format!("eq.{}", token_id))])
            .json(&json!({ "is_active": false }));
        let response = self.authed(request).send().await.map_err(transport_err)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_share_token(&self, token_id: &str) -> BackendResult<()> {
        let request = self
            .client
            .delete(self.endpoint("share_tokens"))
            .query(&[("id", format!("eq.{}", token_id))]);
        let response = self.authed(request).send().await.map_err(transport_err)?;
        Self::check(response).await?;
        Ok(())
    }
}
