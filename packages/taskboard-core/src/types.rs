use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::temporal::Timestamp;

/// Conventional column status tags.
pub const STATUS_TODO: &str = "todo";
pub const STATUS_IN_PROGRESS: &str = "in-progress";
pub const STATUS_DONE: &str = "done";

/// Prefix used by the comment reply convention: `@Author: text`.
const REPLY_MARKER: char = '@';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Lowest,
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Lowest => "lowest",
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default = "Timestamp::now")]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub author: String,
    #[serde(default = "Timestamp::now")]
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_edited: Option<bool>,
}

impl Comment {
    /// Author named by a leading `@Author: ` prefix, if any.
    /// Display convention only; never resolved to another comment.
    pub fn reply_author(&self) -> Option<&str> {
        let rest = self.content.strip_prefix(REPLY_MARKER)?;
        let (author, _) = rest.split_once(": ")?;
        let author = author.trim();
        if author.is_empty() {
            None
        } else {
            Some(author)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: String,
    #[serde(default)]
    pub priority: Priority,
    /// Backward-compatible single assignee; derived from `assignees` when that is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default = "Timestamp::now")]
    pub created_at: Timestamp,
    #[serde(default = "Timestamp::now")]
    pub updated_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<Timestamp>,
}

impl Task {
    pub fn is_archived(&self) -> bool {
        self.archived.unwrap_or(false)
    }

    /// The authoritative assignee list: `assignees` when present,
    /// otherwise the single legacy field.
    pub fn assignee_list(&self) -> Vec<String> {
        match (&self.assignees, &self.assignee) {
            (Some(list), _) => list.clone(),
            (None, Some(one)) => vec![one.clone()],
            (None, None) => Vec::new(),
        }
    }

    /// Replace the assignee list and re-derive the single field from it.
    pub fn set_assignees(&mut self, assignees: Vec<String>) {
        self.assignee = assignees.first().cloned();
        self.assignees = Some(assignees);
    }

    /// Add a tag unless an equal one is already present. Returns true if added.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        if self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    /// Fraction of completed subtasks, `None` when there are none.
    pub fn subtask_progress(&self) -> Option<f64> {
        if self.subtasks.is_empty() {
            return None;
        }
        let done = self.subtasks.iter().filter(|s| s.completed).count();
        Some(done as f64 / self.subtasks.len() as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Advisory capacity; exceeding it is reported, never rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tasks: Option<u32>,
}

impl Column {
    /// Tasks shown in normal views (archived ones hidden).
    pub fn visible_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| !t.is_archived())
    }

    pub fn is_over_capacity(&self) -> bool {
        self.max_tasks
            .map(|max| self.tasks.len() > max as usize)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default = "Timestamp::now")]
    pub created_at: Timestamp,
    #[serde(default = "Timestamp::now")]
    pub updated_at: Timestamp,
}

impl Board {
    /// Total number of tasks across all columns, archived included.
    pub fn task_count(&self) -> usize {
        self.columns.iter().map(|c| c.tasks.len()).sum()
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    pub fn column_mut(&mut self, column_id: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.id == column_id)
    }

    /// First column carrying `status`.
    pub fn column_for_status(&self, status: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.status == status)
    }

    /// Locate a task by scanning columns in order; first match wins.
    /// Returns (column index, task index).
    pub fn locate_task(&self, task_id: &str) -> Option<(usize, usize)> {
        self.columns.iter().enumerate().find_map(|(ci, col)| {
            col.tasks
                .iter()
                .position(|t| t.id == task_id)
                .map(|ti| (ci, ti))
        })
    }

    pub fn find_task(&self, task_id: &str) -> Option<&Task> {
        self.locate_task(task_id)
            .map(|(ci, ti)| &self.columns[ci].tasks[ti])
    }

    pub fn find_task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        let (ci, ti) = self.locate_task(task_id)?;
        Some(&mut self.columns[ci].tasks[ti])
    }

    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.columns.iter().flat_map(|c| c.tasks.iter())
    }
}

/// A broken entity-model invariant found by [`check_board`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    DuplicateColumnId {
        column_id: String,
    },
    /// The same task id appears more than once on the board.
    DuplicateTaskId {
        task_id: String,
        column_ids: Vec<String>,
    },
    StatusMismatch {
        task_id: String,
        column_id: String,
        task_status: String,
        column_status: String,
    },
}

/// Check a board for duplicate ids and task/column status mismatches.
pub fn check_board(board: &Board) -> Vec<Violation> {
    let mut violations = Vec::new();

    let mut column_seen: HashMap<&str, usize> = HashMap::new();
    for col in &board.columns {
        *column_seen.entry(col.id.as_str()).or_default() += 1;
    }
    for col in &board.columns {
        if column_seen.remove(col.id.as_str()).is_some_and(|n| n > 1) {
            violations.push(Violation::DuplicateColumnId {
                column_id: col.id.clone(),
            });
        }
    }

    let mut task_homes: HashMap<&str, Vec<String>> = HashMap::new();
    let mut task_order: Vec<&str> = Vec::new();
    for col in &board.columns {
        for task in &col.tasks {
            let homes = task_homes.entry(task.id.as_str()).or_default();
            if homes.is_empty() {
                task_order.push(task.id.as_str());
            }
            homes.push(col.id.clone());

            if task.status != col.status {
                violations.push(Violation::StatusMismatch {
                    task_id: task.id.clone(),
                    column_id: col.id.clone(),
                    task_status: task.status.clone(),
                    column_status: col.status.clone(),
                });
            }
        }
    }
    for task_id in task_order {
        if let Some(homes) = task_homes.remove(task_id) {
            if homes.len() > 1 {
                violations.push(Violation::DuplicateTaskId {
                    task_id: task_id.to_string(),
                    column_ids: homes,
                });
            }
        }
    }

    violations
}
