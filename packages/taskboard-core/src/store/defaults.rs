//! Seed data for a first run and the standard column set.

use super::NewColumn;
use crate::id::generate_id;
use crate::temporal::Timestamp;
use crate::types::{Board, Column, Priority, Subtask, Task, STATUS_DONE, STATUS_IN_PROGRESS, STATUS_TODO};

const NEUTRAL_COLOR: &str = "#94a3b8";

pub fn color_for_status(status: &str) -> &'static str {
    match status {
        STATUS_TODO => "#64748b",
        STATUS_IN_PROGRESS => "#3b82f6",
        STATUS_DONE => "#22c55e",
        _ => NEUTRAL_COLOR,
    }
}

/// To Do / In Progress / Done.
pub fn default_column_drafts() -> Vec<NewColumn> {
    vec![
        NewColumn::new("To Do", STATUS_TODO),
        NewColumn::new("In Progress", STATUS_IN_PROGRESS),
        NewColumn::new("Done", STATUS_DONE),
    ]
}

fn sample_task(title: &str, description: &str, status: &str, priority: Priority, tags: &[&str]) -> Task {
    let now = Timestamp::now();
    Task {
        id: generate_id(),
        title: title.to_string(),
        description: description.to_string(),
        status: status.to_string(),
        priority,
        assignee: None,
        assignees: None,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        subtasks: Vec::new(),
        comments: Vec::new(),
        created_at: now.clone(),
        updated_at: now.clone(),
        completed_at: (status == STATUS_DONE).then_some(now),
        due_date: None,
        estimated_hours: None,
        archived: None,
        archived_at: None,
    }
}

fn subtask(title: &str, completed: bool) -> Subtask {
    Subtask {
        id: generate_id(),
        title: title.to_string(),
        completed,
        created_at: Timestamp::now(),
    }
}

/// The dataset a store starts with when nothing is persisted yet.
pub fn default_boards() -> Vec<Board> {
    let mut columns: Vec<Column> = default_column_drafts()
        .into_iter()
        .map(NewColumn::into_column)
        .collect();

    let mut setup = sample_task(
        "Set up the project",
        "Repository, tooling and a first build.",
        STATUS_TODO,
        Priority::High,
        &["setup"],
    );
    setup.subtasks = vec![subtask("Create repository", false), subtask("Configure CI", false)];
    columns[0].tasks.push(setup);
    columns[0].tasks.push(sample_task(
        "Write documentation",
        "",
        STATUS_TODO,
        Priority::Low,
        &["docs"],
    ));

    let mut design = sample_task(
        "Design the board layout",
        "Columns, cards and the task detail view.",
        STATUS_IN_PROGRESS,
        Priority::Medium,
        &["design", "ui"],
    );
    design.subtasks = vec![subtask("Wireframes", true), subtask("Color palette", false)];
    columns[1].tasks.push(design);

    columns[2].tasks.push(sample_task(
        "Gather requirements",
        "",
        STATUS_DONE,
        Priority::Medium,
        &["planning"],
    ));

    let now = Timestamp::now();
    vec![Board {
        id: generate_id(),
        title: "My Project".to_string(),
        description: "A sample board to get started".to_string(),
        columns,
        created_at: now.clone(),
        updated_at: now,
    }]
}
