//! Daily task definitions

/// User action that advances a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTrigger {
    SignIn,
    AiRequest,
    SupportTicket,
}

/// Static definition; AI refreshes may override name, description and points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyTaskDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub target_value: i64,
    pub points: i64,
    pub trigger: TaskTrigger,
}

pub const DAILY_LOGIN: &str = "daily_login";
pub const AI_EXPLORER: &str = "ai_explorer";
pub const AI_MARATHON: &str = "ai_marathon";

/// Built-in daily task list
pub fn standard_tasks() -> Vec<DailyTaskDefinition> {
    vec![
        DailyTaskDefinition {
            id: DAILY_LOGIN,
            name: "Daily Check-in",
            description: "Sign in to the factory today",
            target_value: 1,
            points: 10,
            trigger: TaskTrigger::SignIn,
        },
        DailyTaskDefinition {
            id: AI_EXPLORER,
            name: "AI Explorer",
            description: "Ask the AI assistant 3 questions",
            target_value: 3,
            points: 15,
            trigger: TaskTrigger::AiRequest,
        },
        DailyTaskDefinition {
            id: AI_MARATHON,
            name: "Idea Marathon",
            description: "Brainstorm with the AI assistant 5 times",
            target_value: 5,
            points: 30,
            trigger: TaskTrigger::AiRequest,
        },
    ]
}
