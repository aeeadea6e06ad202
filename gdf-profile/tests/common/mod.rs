//! Shared fakes for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gdf_common::events::EventBus;
use gdf_profile::config::EngineSettings;
use gdf_profile::error::{GenerationError, StoreError};
use gdf_profile::models::{AccountUser, Session};
use gdf_profile::reconcile::{Clock, DriverDeps};
use gdf_profile::services::{AccountStore, GenerationOutput, GenerationService, ModelConfig};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TOKEN: &str = "token-ann";
pub const USER_ID: &str = "user-ann";
pub const EMAIL: &str = "ann@example.com";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
}

/// In-memory account store keyed by access token
#[derive(Default)]
pub struct FakeAccountStore {
    users: Mutex<HashMap<String, AccountUser>>,
    write_attempts: AtomicUsize,
    fail_writes: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
    procedure_calls: Mutex<Vec<(String, Value)>>,
}

impl FakeAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, token: &str, id: &str, email: Option<&str>, metadata: Value) {
        let user = AccountUser {
            id: id.to_string(),
            email: email.map(str::to_string),
            user_metadata: metadata.as_object().cloned().unwrap_or_default(),
        };
        self.users.lock().unwrap().insert(token.to_string(), user);
    }

    pub fn metadata(&self, token: &str) -> Map<String, Value> {
        self.users.lock().unwrap()[token].user_metadata.clone()
    }

    pub fn session(&self, token: &str) -> Session {
        Session {
            access_token: token.to_string(),
            user: self.users.lock().unwrap()[token].clone(),
        }
    }

    /// Change a stored record behind the driver's back
    pub fn patch_metadata(&self, token: &str, patch: Value) {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(token).unwrap();
        for (key, value) in patch.as_object().cloned().unwrap_or_default() {
            user.user_metadata.insert(key, value);
        }
    }

    pub fn procedure_calls(&self) -> Vec<(String, Value)> {
        self.procedure_calls.lock().unwrap().clone()
    }

    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl AccountStore for FakeAccountStore {
    async fn get_session(&self, access_token: &str) -> Result<Option<Session>, StoreError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .map(|user| Session {
                access_token: access_token.to_string(),
                user,
            }))
    }

    async fn update_user_record(
        &self,
        session: &Session,
        patch: &Map<String, Value>,
    ) -> Result<AccountUser, StoreError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected {
                status: 500,
                message: "store down".to_string(),
            });
        }

        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&session.access_token)
            .ok_or_else(|| StoreError::Unauthorized("unknown token".to_string()))?;
        // Shallow merge, like the hosted store's user metadata update
        for (key, value) in patch {
            user.user_metadata.insert(key.clone(), value.clone());
        }
        Ok(user.clone())
    }

    async fn call_remote_procedure(
        &self,
        _session: Option<&Session>,
        name: &str,
        args: &Value,
    ) -> Result<Value, StoreError> {
        self.procedure_calls
            .lock()
            .unwrap()
            .push((name.to_string(), args.clone()));

        if name == "grant_premium" {
            let mut users = self.users.lock().unwrap();
            let target = args["target_user_id"].as_str().unwrap_or_default();
            for user in users.values_mut().filter(|u| u.id == target) {
                user.user_metadata.insert("is_premium".to_string(), Value::Bool(true));
                user.user_metadata
                    .insert("premium_expires_at".to_string(), args["expires_at"].clone());
            }
        }
        Ok(Value::Null)
    }
}

/// Generator returning a fixed response and counting calls
pub struct FakeGenerator {
    response: Result<GenerationOutput, GenerationError>,
    calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn text(text: &str) -> Self {
        Self {
            response: Ok(GenerationOutput::Text(text.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: Err(GenerationError::Network("offline".to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationService for FakeGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _model: &ModelConfig,
    ) -> Result<GenerationOutput, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

/// Settable wall clock
#[derive(Clone)]
pub struct FakeClock(Arc<Mutex<DateTime<Utc>>>);

impl FakeClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(now)))
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }

    pub fn clock(&self) -> Clock {
        let inner = Arc::clone(&self.0);
        Arc::new(move || *inner.lock().unwrap())
    }
}

pub fn deps(store: Arc<FakeAccountStore>, clock: &FakeClock) -> DriverDeps {
    DriverDeps::new(store, EventBus::new(64))
        .with_clock(clock.clock())
        .with_settings(EngineSettings::default())
}
