use serde::{Deserialize, Serialize};

/// An authenticated principal as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        UserIdentity {
            id: id.into(),
            email: email.into(),
        }
    }

    /// Display name shown to collaborators: the email local part.
    pub fn display_name(&self) -> String {
        let name = self.email.split('@').next().unwrap_or("");
        if name.is_empty() {
            "Anonymous".to_string()
        } else {
            name.to_string()
        }
    }
}

/// Read side of the external identity provider. Sign-in and sign-up live in
/// the surrounding application, not in this core.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<UserIdentity>;
}

/// Auth provider backed by a fixed session, for embedding and tests.
pub struct StaticAuth(Option<UserIdentity>);

impl StaticAuth {
    pub fn signed_in(id: impl Into<String>, email: impl Into<String>) -> Self {
        StaticAuth(Some(UserIdentity::new(id, email)))
    }

    pub fn anonymous() -> Self {
        StaticAuth(None)
    }
}

impl AuthProvider for StaticAuth {
    fn current_user(&self) -> Option<UserIdentity> {
        self.0.clone()
    }
}
