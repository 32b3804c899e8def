//! Planner todo list.
//!
//! The planner keeps a short list of tasks through the `write_todos` tool.
//! Front ends show progress from it; a new progress report is only worth
//! emitting when the (content, status) pairs actually change.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    fn badge(self) -> &'static str {
        match self {
            TodoStatus::Pending => "[ ]",
            TodoStatus::InProgress => "[~]",
            TodoStatus::Completed => "[x]",
        }
    }

    fn label(self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::InProgress => "in progress",
            TodoStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub content: String,
    #[serde(default)]
    pub status: TodoStatus,
}

impl Todo {
    pub fn new(content: impl Into<String>, status: TodoStatus) -> Self {
        Self {
            content: content.into(),
            status,
        }
    }
}

/// Number of completed todos.
pub fn completed_count(todos: &[Todo]) -> usize {
    todos
        .iter()
        .filter(|t| t.status == TodoStatus::Completed)
        .count()
}

/// Whether two lists would render the same progress report.
pub fn same_progress(a: &[Todo], b: &[Todo]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.content.trim() == y.content.trim() && x.status == y.status)
}

/// Multi-line progress report, e.g.
///
/// ```text
/// Progress: 1/2 tasks complete
/// ----------------------------
///  1. [x] Gather sources [completed]
///  2. [~] Write report [in progress]
/// ```
pub fn progress_summary(todos: &[Todo]) -> String {
    let total = todos.len().max(1);
    let header = format!(
        "Progress: {}/{} tasks complete",
        completed_count(todos),
        total
    );
    if todos.is_empty() {
        return header;
    }

    let mut lines = vec![header.clone(), "-".repeat(header.len())];
    for (idx, todo) in todos.iter().enumerate() {
        lines.push(format!(
            "{:>2}. {} {} [{}]",
            idx + 1,
            todo.status.badge(),
            todo.content.trim(),
            todo.status.label()
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_deserializes_snake_case() {
        let todo: Todo =
            serde_json::from_str(r#"{"content": "a", "status": "in_progress"}"#).unwrap();
        assert_eq!(todo.status, TodoStatus::InProgress);
    }

    #[test]
    fn status_defaults_to_pending() {
        let todo: Todo = serde_json::from_str(r#"{"content": "a"}"#).unwrap();
        assert_eq!(todo.status, TodoStatus::Pending);
    }

    #[test]
    fn summary_for_empty_list_is_header_only() {
        assert_eq!(progress_summary(&[]), "Progress: 0/1 tasks complete");
    }

    #[test]
    fn summary_lists_each_todo() {
        let todos = vec![
            Todo::new("Gather sources", TodoStatus::Completed),
            Todo::new("Write report", TodoStatus::InProgress),
        ];
        let summary = progress_summary(&todos);
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "Progress: 1/2 tasks complete");
        assert_eq!(lines[1], "-".repeat(lines[0].len()));
        assert_eq!(lines[2], " 1. [x] Gather sources [completed]");
        assert_eq!(lines[3], " 2. [~] Write report [in progress]");
    }

    #[test]
    fn same_progress_ignores_surrounding_whitespace() {
        let a = vec![Todo::new("task ", TodoStatus::Pending)];
        let b = vec![Todo::new("task", TodoStatus::Pending)];
        assert!(same_progress(&a, &b));
    }

    #[test]
    fn status_change_is_new_progress() {
        let a = vec![Todo::new("task", TodoStatus::Pending)];
        let b = vec![Todo::new("task", TodoStatus::Completed)];
        assert!(!same_progress(&a, &b));
    }
}
