//! Account store client
//!
//! The account store owns authentication and a per-user JSON metadata blob.
//! `SupabaseAccountStore` talks to a Supabase-compatible REST API: the auth
//! user endpoint for reads and whole-record writes, and the RPC endpoint for
//! server-side procedures.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::StoreError;
use crate::models::{AccountUser, Session};

const USER_AGENT: &str = concat!("gdf-profile/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Remote account store
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Resolve an access token to the signed-in account; `None` when the
    /// token is not (or no longer) valid
    async fn get_session(&self, access_token: &str) -> Result<Option<Session>, StoreError>;

    /// Replace the user's metadata with `patch`; returns the stored account
    async fn update_user_record(
        &self,
        session: &Session,
        patch: &Map<String, Value>,
    ) -> Result<AccountUser, StoreError>;

    async fn call_remote_procedure(
        &self,
        session: Option<&Session>,
        name: &str,
        args: &Value,
    ) -> Result<Value, StoreError>;
}

#[derive(Serialize)]
struct UpdateUserBody<'a> {
    data: &'a Map<String, Value>,
}

/// Supabase-compatible account store
pub struct SupabaseAccountStore {
    http_client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseAccountStore {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self, StoreError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        request
            .header("apikey", self.anon_key.as_str())
            .bearer_auth(token)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StoreError> {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let error_text = response.text().await.unwrap_or_default();
            return Err(StoreError::Unauthorized(error_text));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message: error_text,
            });
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))
    }
}

fn network_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Network(format!("timed out: {}", e))
    } else if e.is_connect() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Network(e.to_string())
    }
}

#[async_trait]
impl AccountStore for SupabaseAccountStore {
    async fn get_session(&self, access_token: &str) -> Result<Option<Session>, StoreError> {
        let response = self
            .authorized(self.http_client.get(self.url("/auth/v1/user")), access_token)
            .send()
            .await
            .map_err(network_error)?;

        let user: AccountUser = match Self::read_json(response).await {
            Ok(user) => user,
            Err(StoreError::Unauthorized(reason)) => {
                tracing::debug!(reason = %reason, "Access token rejected");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        tracing::debug!(user_id = %user.id, "Resolved account session");

        Ok(Some(Session {
            access_token: access_token.to_string(),
            user,
        }))
    }

    async fn update_user_record(
        &self,
        session: &Session,
        patch: &Map<String, Value>,
    ) -> Result<AccountUser, StoreError> {
        tracing::debug!(user_id = %session.user.id, keys = patch.len(), "Writing user metadata");

        let response = self
            .authorized(
                self.http_client.put(self.url("/auth/v1/user")),
                &session.access_token,
            )
            .json(&UpdateUserBody { data: patch })
            .send()
            .await
            .map_err(network_error)?;

        Self::read_json(response).await
    }

    async fn call_remote_procedure(
        &self,
        session: Option<&Session>,
        name: &str,
        args: &Value,
    ) -> Result<Value, StoreError> {
        // Anonymous calls authenticate with the anon key itself
        let token = session
            .map(|s| s.access_token.as_str())
            .unwrap_or(self.anon_key.as_str());

        let response = self
            .authorized(
                self.http_client
                    .post(self.url(&format!("/rest/v1/rpc/{}", name))),
                token,
            )
            .json(args)
            .send()
            .await
            .map_err(network_error)?;

        Self::read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_trims_base_url() {
        let store = SupabaseAccountStore::new("https://project.supabase.co/", "anon").unwrap();
        assert_eq!(store.url("/auth/v1/user"), "https://project.supabase.co/auth/v1/user");
    }

    #[test]
    fn test_update_body_wraps_patch_in_data() {
        let mut patch = Map::new();
        patch.insert("activity_points".into(), Value::from(10));
        let body = serde_json::to_value(UpdateUserBody { data: &patch }).unwrap();
        assert_eq!(body, serde_json::json!({"data": {"activity_points": 10}}));
    }
}
