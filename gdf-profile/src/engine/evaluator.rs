//! Achievement evaluator
//!
//! Applies the static rule list to a metadata snapshot. Points for an
//! achievement are added at most once ever: the key in
//! `awarded_achievement_points_log` is the only guard, so repeating a pass
//! (or losing a write and recomputing) never pays twice.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::catalog::{AchievementSnapshot, Catalog, RuleCheck, TaskTrigger};
use crate::engine::tasks;
use crate::models::{Notification, UserMetadataRecord};

/// What triggered the pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Session bootstrap or auth state change: immediate rules only
    SessionLoad,
    /// AI request, ticket, premium grant, claim or refresh: all rules
    UserAction,
}

#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub catalog: &'a Catalog,
    pub is_new_sign_in: bool,
    pub is_admin: bool,
    pub kind: PassKind,
    pub now: DateTime<Utc>,
}

/// Evaluator output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub changed: bool,
    pub notifications: Vec<Notification>,
}

impl Evaluation {
    pub fn merge(&mut self, other: Evaluation) {
        self.changed |= other.changed;
        self.notifications.extend(other.notifications);
    }
}

/// Run the daily sign-in credit and award every newly satisfied achievement
pub fn evaluate(record: &mut UserMetadataRecord, ctx: &EvaluationContext<'_>) -> Evaluation {
    let mut evaluation = Evaluation::default();

    if ctx.is_new_sign_in {
        evaluation.merge(credit_sign_in(record, ctx));
    }

    evaluation.merge(award_achievements(record, ctx));
    evaluation
}

/// Mark sign-in tasks complete when one credit reaches the target
///
/// Completing is not claiming; the reward still needs an explicit claim.
fn credit_sign_in(record: &mut UserMetadataRecord, ctx: &EvaluationContext<'_>) -> Evaluation {
    let mut evaluation = Evaluation::default();

    for definition in ctx
        .catalog
        .tasks
        .iter()
        .filter(|d| d.trigger == TaskTrigger::SignIn)
    {
        let reachable = record
            .task(definition.id)
            .map(|t| t.current_value + 1 >= definition.target_value)
            .unwrap_or(false);
        if reachable {
            evaluation.merge(tasks::credit(record, definition, 1, ctx.now));
        }
    }

    evaluation
}

/// Award achievements until no further rule fires
///
/// Iterates to a fixed point so a points threshold crossed by another award
/// in this pass is paid in this pass too.
fn award_achievements(record: &mut UserMetadataRecord, ctx: &EvaluationContext<'_>) -> Evaluation {
    let mut evaluation = Evaluation::default();

    loop {
        let mut awarded_this_round = false;

        for rule in &ctx.catalog.achievements {
            if rule.check == RuleCheck::OnAction && ctx.kind != PassKind::UserAction {
                continue;
            }
            if record.has_award(rule.id) {
                continue;
            }

            let earned = {
                let snapshot = AchievementSnapshot {
                    record,
                    is_new_sign_in: ctx.is_new_sign_in,
                    is_admin: ctx.is_admin,
                };
                (rule.is_earned)(&snapshot)
            };
            if !earned {
                continue;
            }

            record.activity_points += rule.points;
            record
                .awarded_achievement_points_log
                .insert(rule.id.to_string(), true);
            info!(achievement = rule.id, points = rule.points, "Achievement unlocked");

            evaluation
                .notifications
                .push(Notification::achievement(rule.id, rule.name, rule.points));
            evaluation.changed = true;
            awarded_this_round = true;
        }

        if !awarded_this_round {
            break;
        }
    }

    evaluation
}
