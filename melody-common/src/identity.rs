//! User identity as supplied by the auth provider

use serde::{Deserialize, Serialize};

/// How the current user was signed in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum AuthMode {
    TokenAuth,
    Anonymous,
    #[default]
    Unauthenticated,
}

/// Identity gating access to the per-user liked-tracks collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserIdentity {
    pub user_id: Option<String>,
    pub mode: AuthMode,
}

impl UserIdentity {
    pub fn unauthenticated() -> Self {
        Self::default()
    }

    pub fn token(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            mode: AuthMode::TokenAuth,
        }
    }

    /// Anonymous identity; a random id is generated when none is given
    pub fn anonymous(user_id: Option<String>) -> Self {
        let user_id = user_id.unwrap_or_else(|| format!("anonymous-{}", uuid::Uuid::new_v4()));
        Self {
            user_id: Some(user_id),
            mode: AuthMode::Anonymous,
        }
    }

    /// True when library access is allowed
    pub fn is_authenticated(&self) -> bool {
        self.mode != AuthMode::Unauthenticated && self.user_id.is_some()
    }
}
