//! Static configuration: achievements, daily tasks, admin directory

pub mod achievements;
pub mod admins;
pub mod tasks;

pub use achievements::{AchievementRule, AchievementSnapshot, RuleCheck};
pub use admins::AdminDirectory;
pub use tasks::{DailyTaskDefinition, TaskTrigger};

/// Rule lists consulted by every reconciliation pass
#[derive(Debug, Clone)]
pub struct Catalog {
    pub achievements: Vec<AchievementRule>,
    pub tasks: Vec<DailyTaskDefinition>,
}

impl Catalog {
    pub fn standard() -> Self {
        Self {
            achievements: achievements::standard_achievements(),
            tasks: tasks::standard_tasks(),
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&DailyTaskDefinition> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn knows_task(&self, task_id: &str) -> bool {
        self.task(task_id).is_some()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}
