use wss_core::Task;

/// Lookup a sub-task asks the interaction tool to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    User(String),
    Item(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubTask {
    pub description: String,
    pub tool: ToolCall,
}

/// Fixed two-step plan: profile of the reviewer, then the business.
pub fn baseline_plan(task: &Task) -> Vec<SubTask> {
    vec![
        SubTask {
            description: "First I need to find user information".into(),
            tool: ToolCall::User(task.user_id.clone()),
        },
        SubTask {
            description: "Next, I need to find business information".into(),
            tool: ToolCall::Item(task.item_id.clone()),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_plan_order() {
        let plan = baseline_plan(&Task::new("u1", "b9"));
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].tool, ToolCall::User("u1".into()));
        assert_eq!(plan[1].tool, ToolCall::Item("b9".into()));
    }
}
