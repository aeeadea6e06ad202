//! Per-user driver registry
//!
//! Two browser tabs of the same account resolve to the same driver and so
//! share one operation queue. A driver is only dropped when nothing else
//! holds it, so an account never has two queues at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{DriverDeps, ReconciliationDriver};
use crate::models::Session;

pub struct SessionRegistry {
    deps: DriverDeps,
    drivers: RwLock<HashMap<String, Arc<ReconciliationDriver>>>,
}

impl SessionRegistry {
    pub fn new(deps: DriverDeps) -> Self {
        Self {
            deps,
            drivers: RwLock::new(HashMap::new()),
        }
    }

    pub fn deps(&self) -> &DriverDeps {
        &self.deps
    }

    /// Driver for the session's account, created on first use
    ///
    /// An existing driver picks up the (possibly refreshed) session token.
    pub async fn driver_for(&self, session: &Session) -> Arc<ReconciliationDriver> {
        let user_id = &session.user.id;

        let existing = self.drivers.read().await.get(user_id).cloned();
        if let Some(driver) = existing {
            driver.update_session(session.clone()).await;
            return driver;
        }

        let mut drivers = self.drivers.write().await;
        // Another request may have inserted it while we waited for the write lock
        if let Some(driver) = drivers.get(user_id) {
            let driver = Arc::clone(driver);
            drop(drivers);
            driver.update_session(session.clone()).await;
            return driver;
        }

        debug!(user_id = %user_id, "Creating reconciliation driver");
        let driver = Arc::new(ReconciliationDriver::new(
            session.clone(),
            self.deps.clone(),
        ));
        drivers.insert(user_id.clone(), Arc::clone(&driver));
        driver
    }

    /// Existing driver for an account, if it is online
    pub async fn get(&self, user_id: &str) -> Option<Arc<ReconciliationDriver>> {
        self.drivers.read().await.get(user_id).cloned()
    }

    /// Forget the account's driver on sign-out
    ///
    /// A driver still held by a request is kept with its cached profile
    /// cleared. Returns whether the driver was dropped.
    pub async fn release(&self, user_id: &str) -> bool {
        let mut drivers = self.drivers.write().await;
        let Some(driver) = drivers.get(user_id) else {
            return false;
        };

        if Arc::strong_count(driver) > 1 {
            let driver = Arc::clone(driver);
            drop(drivers);
            driver.clear_cached().await;
            debug!(user_id = %user_id, "Driver busy; kept after sign-out");
            return false;
        }

        drivers.remove(user_id);
        debug!(user_id = %user_id, "Dropped reconciliation driver");
        true
    }

    /// Drop drivers nobody holds that have been idle for `max_idle`
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = (self.deps.clock)();
        let max_idle_ms = i64::try_from(max_idle.as_millis()).unwrap_or(i64::MAX);

        let mut drivers = self.drivers.write().await;
        let before = drivers.len();
        drivers.retain(|_, driver| {
            Arc::strong_count(driver) > 1 || driver.idle_millis(now) < max_idle_ms
        });
        let evicted = before - drivers.len();
        if evicted > 0 {
            debug!(evicted, remaining = drivers.len(), "Evicted idle drivers");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.drivers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.drivers.read().await.is_empty()
    }
}

/// Periodically evict idle drivers
pub fn spawn_idle_eviction(registry: Arc<SessionRegistry>, max_idle: Duration) -> JoinHandle<()> {
    let period = (max_idle / 4).max(Duration::from_secs(1));
    info!(
        "Driver idle eviction: after {}s, checked every {}s",
        max_idle.as_secs(),
        period.as_secs()
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            registry.evict_idle(max_idle).await;
        }
    })
}
