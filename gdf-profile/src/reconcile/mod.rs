//! Reconciliation driver
//!
//! Chains the pure stages (normalize → recalculate → regenerate expired
//! cooldowns → action → evaluate) and performs at most one account store
//! write per operation. All operations for one user go through a single
//! FIFO mutex, so whole-record writes never interleave, and every pass
//! starts from the record the store holds at that moment.
//!
//! Every operation draws a sequence number once it holds the queue. A
//! finished operation installs its profile as the cached one only when its
//! sequence is newer than the last installed result.

mod registry;

pub use registry::{spawn_idle_eviction, SessionRegistry};

use chrono::{DateTime, Utc};
use gdf_common::events::{EventBus, GdfEvent};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::catalog::{AdminDirectory, Catalog, DailyTaskDefinition, TaskTrigger};
use crate::config::EngineSettings;
use crate::engine::{self, tasks, ClaimOutcome, EvaluationContext, PassKind};
use crate::error::ProfileError;
use crate::models::{Notification, Session, UserMetadataRecord, UserProfile};
use crate::services::{AccountStore, GenerationService, ModelConfig};

/// Wall clock source
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Collaborators shared by every driver
#[derive(Clone)]
pub struct DriverDeps {
    pub store: Arc<dyn AccountStore>,
    pub generator: Option<Arc<dyn GenerationService>>,
    pub catalog: Arc<Catalog>,
    pub admins: Arc<AdminDirectory>,
    pub settings: Arc<EngineSettings>,
    pub events: EventBus,
    pub clock: Clock,
}

impl DriverDeps {
    pub fn new(store: Arc<dyn AccountStore>, events: EventBus) -> Self {
        Self {
            store,
            generator: None,
            catalog: Arc::new(Catalog::standard()),
            admins: Arc::new(AdminDirectory::default()),
            settings: Arc::new(EngineSettings::default()),
            events,
            clock: Arc::new(gdf_common::time::now),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn GenerationService>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_admins(mut self, admins: AdminDirectory) -> Self {
        self.admins = Arc::new(admins);
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

/// User-initiated profile mutation
///
/// Premium is granted by an admin through the account store and picked up
/// by the account's next pass, never through this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UserAction {
    /// One AI chat request; rejected when the quota is exhausted
    AiRequest,
    SupportTicketCreated,
}

/// What happened to the write of one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum WriteStatus {
    /// Nothing changed; no network call made
    Skipped,
    Persisted,
    /// Error or timeout; the returned profile is local and unpersisted
    Failed(String),
}

/// Result of one driver operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileOutcome {
    pub profile: UserProfile,
    pub notifications: Vec<Notification>,
    pub write: WriteStatus,
    #[serde(skip)]
    pub seq: u64,
}

/// Mutation applied between regeneration and evaluation
#[derive(Clone, Copy)]
enum Mutation<'a> {
    None,
    Action(&'a UserAction),
    Claim(&'a DailyTaskDefinition),
    /// Regenerate only this task
    Refresh(&'a str),
}

struct Installed {
    seq: u64,
    profile: Option<UserProfile>,
}

/// Per-user single-flight reconciliation
pub struct ReconciliationDriver {
    user_id: String,
    deps: DriverDeps,
    session: RwLock<Session>,
    /// Operation queue; guards the last drawn sequence number
    queue: Mutex<u64>,
    installed: RwLock<Installed>,
    /// Epoch millis of the last operation
    last_active_ms: AtomicI64,
}

impl ReconciliationDriver {
    pub fn new(session: Session, deps: DriverDeps) -> Self {
        let now_ms = (deps.clock)().timestamp_millis();
        Self {
            user_id: session.user.id.clone(),
            deps,
            session: RwLock::new(session),
            queue: Mutex::new(0),
            installed: RwLock::new(Installed {
                seq: 0,
                profile: None,
            }),
            last_active_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Swap in a newer session (token refresh) without queueing
    pub async fn update_session(&self, session: Session) {
        *self.session.write().await = session;
    }

    /// Last installed profile
    pub async fn cached_profile(&self) -> Option<UserProfile> {
        self.installed.read().await.profile.clone()
    }

    /// Drop the cached profile (sign-out while a request is in flight)
    pub async fn clear_cached(&self) {
        self.installed.write().await.profile = None;
    }

    /// Milliseconds since the last operation started
    pub fn idle_millis(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - self.last_active_ms.load(Ordering::SeqCst)
    }

    /// Reconcile the stored record against the wall clock
    ///
    /// `session` supplies the (possibly refreshed) token; the record itself
    /// is read from the store once the operation holds the queue.
    pub async fn reconcile(
        &self,
        session: Session,
        is_new_sign_in: bool,
    ) -> Result<ReconcileOutcome, ProfileError> {
        self.update_session(session).await;
        self.run(PassKind::SessionLoad, is_new_sign_in, Mutation::None)
            .await
    }

    /// Reconcile with the session already held, e.g. after an admin changed
    /// the record out of band
    pub async fn resync(&self) -> Result<ReconcileOutcome, ProfileError> {
        self.run(PassKind::SessionLoad, false, Mutation::None).await
    }

    /// Apply a user action in one pass
    pub async fn apply_action(&self, action: UserAction) -> Result<ReconcileOutcome, ProfileError> {
        self.run(PassKind::UserAction, false, Mutation::Action(&action))
            .await
    }

    /// Claim a completed daily task; a no-op when not claimable
    pub async fn claim_task(&self, task_id: &str) -> Result<ReconcileOutcome, ProfileError> {
        let definition = self.definition(task_id)?;
        self.run(PassKind::UserAction, false, Mutation::Claim(&definition))
            .await
    }

    /// Regenerate `task_id` if its cooldown expired; a no-op otherwise
    pub async fn refresh_task(&self, task_id: &str) -> Result<ReconcileOutcome, ProfileError> {
        self.definition(task_id)?;
        self.run(PassKind::UserAction, false, Mutation::Refresh(task_id))
            .await
    }

    fn definition(&self, task_id: &str) -> Result<DailyTaskDefinition, ProfileError> {
        self.deps
            .catalog
            .task(task_id)
            .cloned()
            .ok_or_else(|| ProfileError::UnknownTask(task_id.to_string()))
    }

    async fn run(
        &self,
        kind: PassKind,
        is_new_sign_in: bool,
        mutation: Mutation<'_>,
    ) -> Result<ReconcileOutcome, ProfileError> {
        let mut last_seq = self.queue.lock().await;
        *last_seq += 1;
        let seq = *last_seq;
        self.last_active_ms
            .store((self.deps.clock)().timestamp_millis(), Ordering::SeqCst);

        let session = self.fetch_session().await?;
        self.run_pass(session, seq, kind, is_new_sign_in, mutation)
            .await
    }

    /// Current session and record from the store
    async fn fetch_session(&self) -> Result<Session, ProfileError> {
        let token = self.session.read().await.access_token.clone();
        match self.deps.store.get_session(&token).await {
            Ok(Some(session)) if session.user.id == self.user_id => {
                self.update_session(session.clone()).await;
                Ok(session)
            }
            Ok(Some(session)) => {
                warn!(
                    user_id = %self.user_id,
                    token_user = %session.user.id,
                    "Token belongs to another account"
                );
                Err(ProfileError::Unauthenticated)
            }
            Ok(None) => Err(ProfileError::Unauthenticated),
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "Could not read account record");
                Err(e.into())
            }
        }
    }

    async fn run_pass(
        &self,
        session: Session,
        seq: u64,
        kind: PassKind,
        is_new_sign_in: bool,
        mutation: Mutation<'_>,
    ) -> Result<ReconcileOutcome, ProfileError> {
        let deps = &self.deps;
        let catalog = deps.catalog.as_ref();
        let now = (deps.clock)();
        let identity = session.user.identity();
        let is_admin = deps.admins.is_admin(identity.email.as_deref());

        let normalized = engine::normalize(
            &session.user.user_metadata,
            &identity,
            &deps.admins,
            catalog,
            now,
        );
        let mut record = normalized.record;
        let mut changed = normalized.changed;
        changed |= engine::recalculate(&mut record, now, &deps.settings.quota, catalog);

        let only = match mutation {
            Mutation::Refresh(task_id) => Some(task_id),
            _ => None,
        };
        let mut notifications = Vec::new();
        for notification in self.regenerate_expired(&mut record, now, only).await {
            changed = true;
            notifications.push(notification);
        }

        let mut rejection = None;
        match mutation {
            Mutation::None | Mutation::Refresh(_) => {}
            Mutation::Action(action) => match self.apply_mutation(&mut record, action, now) {
                Ok(progress) => {
                    changed = true;
                    notifications.extend(progress.notifications);
                }
                Err(e) => rejection = Some(e),
            },
            Mutation::Claim(definition) => {
                if let ClaimOutcome::Claimed { notification, .. } =
                    tasks::claim(&mut record, definition, now)
                {
                    changed = true;
                    notifications.push(notification);
                }
            }
        }

        let ctx = EvaluationContext {
            catalog,
            is_new_sign_in,
            is_admin,
            kind,
            now,
        };
        let evaluation = engine::evaluate(&mut record, &ctx);
        changed |= evaluation.changed;
        notifications.extend(evaluation.notifications);

        let write = if changed {
            let (write, merged) = self.write(&session, record).await;
            record = merged;
            write
        } else {
            debug!(user_id = %self.user_id, "Record already reconciled; no write");
            WriteStatus::Skipped
        };

        let profile = UserProfile {
            user_id: self.user_id.clone(),
            email: identity.email,
            is_admin,
            metadata: record,
        };
        self.install(seq, &profile).await;
        self.publish(&profile, &notifications, &write);

        match rejection {
            Some(e) => Err(e),
            None => Ok(ReconcileOutcome {
                profile,
                notifications,
                write,
                seq,
            }),
        }
    }

    /// Regenerate tasks whose cooldown has expired, or just `only`
    async fn regenerate_expired(
        &self,
        record: &mut UserMetadataRecord,
        now: DateTime<Utc>,
        only: Option<&str>,
    ) -> Vec<Notification> {
        let deps = &self.deps;
        let settings = deps.settings.as_ref();
        let generator = deps
            .generator
            .as_deref()
            .filter(|_| settings.generate_task_content);
        let model = ModelConfig::json(&settings.generation_model);

        let mut notifications = Vec::new();
        for task_id in tasks::expired_cooldowns(record, now) {
            if only.is_some_and(|id| id != task_id) {
                continue;
            }
            let (Some(definition), Some(task)) = (deps.catalog.task(&task_id), record.task(&task_id))
            else {
                continue;
            };
            let content = tasks::generate_content(
                task,
                definition,
                generator,
                &model,
                settings.max_generated_points,
            )
            .await;
            if let Some(notification) = tasks::apply_regeneration(record, definition, &content, now) {
                notifications.push(notification);
            }
        }
        notifications
    }

    fn apply_mutation(
        &self,
        record: &mut UserMetadataRecord,
        action: &UserAction,
        now: DateTime<Utc>,
    ) -> Result<engine::Evaluation, ProfileError> {
        let catalog = self.deps.catalog.as_ref();
        match action {
            UserAction::AiRequest => {
                if record.ai_requests_made >= record.ai_requests_limit {
                    info!(
                        user_id = %self.user_id,
                        made = record.ai_requests_made,
                        limit = record.ai_requests_limit,
                        "AI request rejected: quota exhausted"
                    );
                    return Err(ProfileError::QuotaExceeded {
                        made: record.ai_requests_made,
                        limit: record.ai_requests_limit,
                    });
                }
                record.ai_requests_made += 1;
                Ok(tasks::record_progress(record, TaskTrigger::AiRequest, catalog, now))
            }
            UserAction::SupportTicketCreated => {
                record.support_tickets_created += 1;
                Ok(tasks::record_progress(record, TaskTrigger::SupportTicket, catalog, now))
            }
        }
    }

    /// Write the full record once; returns the record to keep
    async fn write(
        &self,
        session: &Session,
        record: UserMetadataRecord,
    ) -> (WriteStatus, UserMetadataRecord) {
        let patch = record.to_patch();
        let timeout = self.deps.settings.store_write_timeout;

        let result = tokio::time::timeout(
            timeout,
            self.deps.store.update_user_record(session, &patch),
        )
        .await;

        let error = match result {
            Ok(Ok(stored)) => {
                let merged = merge_stored(&stored.user_metadata, &patch).unwrap_or(record);
                debug!(user_id = %self.user_id, "Profile persisted");
                return (WriteStatus::Persisted, merged);
            }
            Ok(Err(e)) => ProfileError::WriteFailed(e.to_string()),
            Err(_) => ProfileError::WriteFailed(format!(
                "write timed out after {} ms",
                timeout.as_millis()
            )),
        };
        warn!(user_id = %self.user_id, error = %error, "Keeping local state");
        (WriteStatus::Failed(error.to_string()), record)
    }

    async fn install(&self, seq: u64, profile: &UserProfile) -> bool {
        let mut installed = self.installed.write().await;
        if seq <= installed.seq {
            debug!(seq, installed = installed.seq, "Discarding stale profile result");
            return false;
        }
        installed.seq = seq;
        installed.profile = Some(profile.clone());
        true
    }

    fn publish(&self, profile: &UserProfile, notifications: &[Notification], write: &WriteStatus) {
        let events = &self.deps.events;
        let timestamp = (self.deps.clock)();

        for notification in notifications {
            events.emit_lossy(GdfEvent::NotificationRaised {
                user_id: self.user_id.clone(),
                kind: notification.kind.as_str().to_string(),
                message: notification.message.clone(),
                timestamp,
            });
        }

        match write {
            WriteStatus::Persisted => events.emit_lossy(GdfEvent::ProfileSynced {
                user_id: self.user_id.clone(),
                activity_points: profile.metadata.activity_points,
                ai_requests_made: profile.metadata.ai_requests_made,
                ai_requests_limit: profile.metadata.ai_requests_limit,
                timestamp,
            }),
            WriteStatus::Failed(reason) => events.emit_lossy(GdfEvent::ProfileWriteFailed {
                user_id: self.user_id.clone(),
                reason: reason.clone(),
                timestamp,
            }),
            WriteStatus::Skipped => {}
        }
    }
}

/// Overlay the local patch on the stored metadata; local wins per key
fn merge_stored(stored: &Map<String, Value>, local: &Map<String, Value>) -> Option<UserMetadataRecord> {
    let mut merged = stored.clone();
    for (key, value) in local {
        merged.insert(key.clone(), value.clone());
    }
    match serde_json::from_value(Value::Object(merged)) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(error = %e, "Stored record unreadable after merge; using local record");
            None
        }
    }
}
