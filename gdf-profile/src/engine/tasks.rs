//! Daily task progress, claims and cooldown regeneration
//!
//! A claimed task sits in a 24h cooldown. Once the cooldown has expired the
//! task is regenerated: the Generation Service is asked for fresh content and
//! any failure falls back to the static definition, so regeneration itself
//! never fails.

use chrono::{DateTime, Utc};
use gdf_common::time;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, DailyTaskDefinition, TaskTrigger};
use crate::engine::evaluator::Evaluation;
use crate::error::GenerationError;
use crate::models::{Notification, TaskProgress, UserMetadataRecord};
use crate::services::generation::{GenerationOutput, GenerationService, ModelConfig};

/// Display name, honouring an AI override
pub fn effective_name<'a>(task: &'a TaskProgress, definition: &'a DailyTaskDefinition) -> &'a str {
    task.ai_generated_name.as_deref().unwrap_or(definition.name)
}

pub fn effective_description<'a>(
    task: &'a TaskProgress,
    definition: &'a DailyTaskDefinition,
) -> &'a str {
    task.ai_generated_description
        .as_deref()
        .unwrap_or(definition.description)
}

/// Reward paid on claim, honouring an AI override
pub fn effective_points(task: &TaskProgress, definition: &DailyTaskDefinition) -> i64 {
    task.ai_generated_points.unwrap_or(definition.points)
}

/// Advance one task by `amount`, capped at its target
///
/// Emits "task ready" only on the call that first reaches the target.
pub fn credit(
    record: &mut UserMetadataRecord,
    definition: &DailyTaskDefinition,
    amount: i64,
    now: DateTime<Utc>,
) -> Evaluation {
    let mut evaluation = Evaluation::default();
    let now_ms = time::to_epoch_millis(now);

    let Some(task) = record.task_mut(definition.id) else {
        return evaluation;
    };
    if task.completed_today || task.claimed_today || task.in_active_cooldown(now_ms) {
        return evaluation;
    }

    let next = (task.current_value + amount).min(definition.target_value);
    if next == task.current_value {
        return evaluation;
    }

    task.current_value = next;
    task.last_progress_date = time::today(now);
    evaluation.changed = true;

    if next >= definition.target_value {
        task.completed_today = true;
        let name = effective_name(task, definition);
        debug!(task = definition.id, "Daily task completed");
        evaluation
            .notifications
            .push(Notification::task_ready(definition.id, name));
    }

    evaluation
}

/// Credit every task driven by `trigger`
pub fn record_progress(
    record: &mut UserMetadataRecord,
    trigger: TaskTrigger,
    catalog: &Catalog,
    now: DateTime<Utc>,
) -> Evaluation {
    let mut evaluation = Evaluation::default();
    for definition in catalog.tasks.iter().filter(|d| d.trigger == trigger) {
        evaluation.merge(credit(record, definition, 1, now));
    }
    evaluation
}

/// Result of a claim attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed {
        points: i64,
        notification: Notification,
    },
    /// Not completed, already claimed or no progress row; nothing changed
    NotClaimable,
}

/// Pay out a completed task and start its cooldown
pub fn claim(
    record: &mut UserMetadataRecord,
    definition: &DailyTaskDefinition,
    now: DateTime<Utc>,
) -> ClaimOutcome {
    let Some(task) = record.task_mut(definition.id) else {
        return ClaimOutcome::NotClaimable;
    };
    if !task.can_claim() {
        debug!(
            task = definition.id,
            completed = task.completed_today,
            claimed = task.claimed_today,
            "Claim ignored"
        );
        return ClaimOutcome::NotClaimable;
    }

    let points = effective_points(task, definition);
    task.claimed_today = true;
    task.claimed_at_timestamp = Some(time::to_epoch_millis(now));
    let notification = Notification::task_claimed(definition.id, effective_name(task, definition), points);

    record.activity_points += points;
    info!(task = definition.id, points, "Daily task claimed");

    ClaimOutcome::Claimed {
        points,
        notification,
    }
}

/// Ids of tasks whose claim cooldown has run out
pub fn expired_cooldowns(record: &UserMetadataRecord, now: DateTime<Utc>) -> Vec<String> {
    let now_ms = time::to_epoch_millis(now);
    record
        .daily_task_progress
        .iter()
        .filter(|t| t.cooldown_expired(now_ms))
        .map(|t| t.task_id.clone())
        .collect()
}

/// Content for a regenerated task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContent {
    pub name: String,
    pub description: String,
    pub points: i64,
    /// False when this is the static fallback
    pub generated: bool,
}

impl TaskContent {
    pub fn from_definition(definition: &DailyTaskDefinition) -> Self {
        Self {
            name: definition.name.to_string(),
            description: definition.description.to_string(),
            points: definition.points,
            generated: false,
        }
    }
}

/// Prompt asking for a replacement of the previous task content
pub fn regeneration_prompt(task: &TaskProgress, definition: &DailyTaskDefinition) -> String {
    format!(
        "You write short daily challenges for a game development community platform.\n\
         The previous challenge was:\n\
         name: {name}\n\
         description: {description}\n\
         points: {points}\n\
         The challenge is completed by the same kind of activity and needs {target} step(s).\n\
         Write a fresh variation. Respond with a single JSON object and nothing else, \
         in the form {{\"name\": string, \"description\": string, \"points\": integer}}.",
        name = effective_name(task, definition),
        description = effective_description(task, definition),
        points = effective_points(task, definition),
        target = definition.target_value,
    )
}

#[derive(Debug, Deserialize)]
struct GeneratedTask {
    name: String,
    description: String,
    points: i64,
}

/// Remove a surrounding markdown code fence, if any
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a model response against the `{name, description, points}` contract
pub fn parse_generated_task(text: &str, max_points: i64) -> Result<TaskContent, GenerationError> {
    let body = strip_code_fence(text);
    let parsed: GeneratedTask = serde_json::from_str(body)
        .map_err(|e| GenerationError::Malformed(format!("not a task object: {}", e)))?;

    let name = parsed.name.trim();
    let description = parsed.description.trim();
    if name.is_empty() || description.is_empty() {
        return Err(GenerationError::Malformed(
            "name and description must be non-empty".to_string(),
        ));
    }
    if parsed.points < 1 || parsed.points > max_points {
        return Err(GenerationError::Malformed(format!(
            "points {} outside 1..={}",
            parsed.points, max_points
        )));
    }

    Ok(TaskContent {
        name: name.to_string(),
        description: description.to_string(),
        points: parsed.points,
        generated: true,
    })
}

/// Ask the generator for new content, falling back to the static definition
pub async fn generate_content(
    task: &TaskProgress,
    definition: &DailyTaskDefinition,
    generator: Option<&dyn GenerationService>,
    model: &ModelConfig,
    max_points: i64,
) -> TaskContent {
    let Some(generator) = generator else {
        return TaskContent::from_definition(definition);
    };

    let prompt = regeneration_prompt(task, definition);
    let result = match generator.generate(&prompt, model).await {
        Ok(GenerationOutput::Text(text)) => parse_generated_task(&text, max_points),
        Ok(GenerationOutput::Image { mime_type, .. }) => Err(GenerationError::Malformed(format!(
            "expected text, got {}",
            mime_type
        ))),
        Err(e) => Err(e),
    };

    match result {
        Ok(content) => content,
        Err(e) => {
            warn!(task = definition.id, error = %e, "Task regeneration fell back to static definition");
            TaskContent::from_definition(definition)
        }
    }
}

/// Install regenerated content and clear the cooldown
///
/// Re-checks the expired cooldown first, so applying the same regeneration
/// twice changes nothing the second time.
pub fn apply_regeneration(
    record: &mut UserMetadataRecord,
    definition: &DailyTaskDefinition,
    content: &TaskContent,
    now: DateTime<Utc>,
) -> Option<Notification> {
    let now_ms = time::to_epoch_millis(now);
    let task = record.task_mut(definition.id)?;
    if !task.cooldown_expired(now_ms) {
        return None;
    }

    task.reset_progress(time::today(now));
    task.claimed_at_timestamp = None;
    if content.generated {
        task.ai_generated_name = Some(content.name.clone());
        task.ai_generated_description = Some(content.description.clone());
        task.ai_generated_points = Some(content.points);
        task.is_ai_refreshed = true;
    } else {
        task.ai_generated_name = None;
        task.ai_generated_description = None;
        task.ai_generated_points = None;
        task.is_ai_refreshed = false;
    }

    info!(task = definition.id, generated = content.generated, "Daily task regenerated");
    Some(Notification::task_refreshed(definition.id, &content.name))
}
