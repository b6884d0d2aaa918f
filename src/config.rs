use std::time::Duration;

/// Tunables for the sync core.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Trailing-edge debounce applied to local edits before autosave fires.
    pub autosave_debounce: Duration,
    /// Origin used to build share URLs, e.g. "https://app.coscribe.io".
    pub share_origin: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            autosave_debounce: Duration::from_secs(1),
            share_origin: "http://localhost:8080".to_string(),
        }
    }
}

impl SyncConfig {
    /// Fully qualified share URL embedding the raw token.
    pub fn share_url(&self, token: &str) -> String {
        format!("{}/shared/{}", self.share_origin.trim_end_matches('/'), token)
    }
}
