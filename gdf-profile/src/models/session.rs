//! Account store session types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Account as returned by the account store's user endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Raw, loosely typed metadata blob
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

impl AccountUser {
    /// Identity facts the normalizer needs besides the metadata blob
    pub fn identity(&self) -> AccountIdentity {
        // OAuth providers put the profile name under either key
        let full_name = ["full_name", "name"].iter().find_map(|key| {
            self.user_metadata
                .get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

        AccountIdentity {
            email: self.email.clone(),
            full_name,
        }
    }
}

/// Authenticated session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user: AccountUser,
}

/// Email and OAuth-provided name of an account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountIdentity {
    pub email: Option<String>,
    pub full_name: Option<String>,
}

/// Auth state change delivered by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    SignedIn,
    InitialSession,
    TokenRefreshed,
    SignedOut,
    PasswordRecovery,
}

impl SessionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEvent::SignedIn => "signed_in",
            SessionEvent::InitialSession => "initial_session",
            SessionEvent::TokenRefreshed => "token_refreshed",
            SessionEvent::SignedOut => "signed_out",
            SessionEvent::PasswordRecovery => "password_recovery",
        }
    }
}
