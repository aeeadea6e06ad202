//! Achievement rules
//!
//! Rules are static data plus a pure predicate over the metadata snapshot.
//! Predicates must not perform I/O or read anything outside the snapshot.

use crate::models::UserMetadataRecord;

/// When a rule is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCheck {
    /// Checked on every reconciliation, including plain session loads
    Immediate,
    /// Checked only on passes triggered by a user action
    OnAction,
}

/// Everything a predicate may look at
#[derive(Debug, Clone, Copy)]
pub struct AchievementSnapshot<'a> {
    pub record: &'a UserMetadataRecord,
    pub is_new_sign_in: bool,
    pub is_admin: bool,
}

/// One achievement definition
#[derive(Clone, Copy)]
pub struct AchievementRule {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub points: i64,
    pub check: RuleCheck,
    pub is_earned: fn(&AchievementSnapshot<'_>) -> bool,
}

impl std::fmt::Debug for AchievementRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AchievementRule")
            .field("id", &self.id)
            .field("points", &self.points)
            .field("check", &self.check)
            .finish_non_exhaustive()
    }
}

pub const FIRST_SIGN_IN: &str = "first_sign_in";
pub const ADMIN_ACCESS: &str = "admin_access";
pub const PREMIUM_SUPPORTER: &str = "premium_supporter";
pub const NEWBIE_CHATTER: &str = "newbie_chatter";
pub const ACTIVE_CHATTER: &str = "active_chatter";
pub const HELP_SEEKER: &str = "help_seeker";
pub const POINT_COLLECTOR: &str = "point_collector";

/// Built-in achievement list
pub fn standard_achievements() -> Vec<AchievementRule> {
    vec![
        AchievementRule {
            id: FIRST_SIGN_IN,
            name: "Welcome Aboard",
            description: "Sign in to GameDev Factory",
            points: 10,
            check: RuleCheck::Immediate,
            is_earned: |s| s.is_new_sign_in,
        },
        AchievementRule {
            id: ADMIN_ACCESS,
            name: "Factory Keeper",
            description: "Hold an administrator account",
            points: 25,
            check: RuleCheck::Immediate,
            is_earned: |s| s.is_admin,
        },
        AchievementRule {
            id: PREMIUM_SUPPORTER,
            name: "Premium Supporter",
            description: "Activate a premium subscription",
            points: 50,
            check: RuleCheck::Immediate,
            is_earned: |s| s.record.is_premium,
        },
        AchievementRule {
            id: NEWBIE_CHATTER,
            name: "Newbie Chatter",
            description: "Send your first message to the AI assistant",
            points: 5,
            check: RuleCheck::OnAction,
            is_earned: |s| s.record.ai_requests_made >= 1,
        },
        AchievementRule {
            id: ACTIVE_CHATTER,
            name: "Active Chatter",
            description: "Send 25 messages to the AI assistant within one quota period",
            points: 20,
            check: RuleCheck::OnAction,
            is_earned: |s| s.record.ai_requests_made >= 25,
        },
        AchievementRule {
            id: HELP_SEEKER,
            name: "Help Seeker",
            description: "Open your first support ticket",
            points: 10,
            check: RuleCheck::OnAction,
            is_earned: |s| s.record.support_tickets_created >= 1,
        },
        AchievementRule {
            id: POINT_COLLECTOR,
            name: "Point Collector",
            description: "Reach 100 activity points",
            points: 25,
            check: RuleCheck::OnAction,
            is_earned: |s| s.record.activity_points >= 100,
        },
    ]
}
