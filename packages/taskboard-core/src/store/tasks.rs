//! Task and subtask mutations on the current board.
//!
//! A task always lives in exactly one column and carries that column's
//! status. Anything that changes a task's status therefore relocates it:
//! `move_task` to an explicit index, `update_task` to the end of the first
//! column with the new status.

use super::{StoreError, TaskStore};
use crate::id::generate_id;
use crate::storage::KeyValueStore;
use crate::temporal::Timestamp;
use crate::types::{Board, Comment, Priority, Subtask, Task, STATUS_DONE};

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub assignee: Option<String>,
    /// Wins over `assignee` when set.
    pub assignees: Option<Vec<String>>,
    pub tags: Vec<String>,
    pub subtasks: Vec<Subtask>,
    pub comments: Vec<Comment>,
    pub due_date: Option<Timestamp>,
    pub estimated_hours: Option<f64>,
}

impl NewTask {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    fn into_task(self, status: &str) -> Task {
        let now = Timestamp::now();
        let mut task = Task {
            id: generate_id(),
            title: self.title,
            description: self.description,
            status: status.to_string(),
            priority: self.priority,
            assignee: self.assignee,
            assignees: None,
            tags: Vec::new(),
            subtasks: self.subtasks,
            comments: self.comments,
            created_at: now.clone(),
            updated_at: now.clone(),
            completed_at: None,
            due_date: self.due_date,
            estimated_hours: self.estimated_hours,
            archived: None,
            archived_at: None,
        };
        if let Some(assignees) = self.assignees {
            task.set_assignees(assignees);
        }
        for tag in &self.tags {
            task.add_tag(tag);
        }
        if status == STATUS_DONE {
            task.completed_at = Some(now);
        }
        task
    }
}

/// Partial task update. Outer `None` leaves a field alone; for optional
/// fields `Some(None)` clears them.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Relocates the task to the first column carrying this status.
    pub status: Option<String>,
    pub priority: Option<Priority>,
    pub assignees: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub due_date: Option<Option<Timestamp>>,
    pub estimated_hours: Option<Option<f64>>,
}

impl TaskPatch {
    fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(assignees) = self.assignees {
            task.set_assignees(assignees);
        }
        if let Some(tags) = self.tags {
            task.tags.clear();
            for tag in &tags {
                task.add_tag(tag);
            }
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(hours) = self.estimated_hours {
            task.estimated_hours = hours;
        }
    }
}

/// Give a task a new status, stamping `updatedAt` and, on first entry to
/// done, `completedAt`.
fn set_status(task: &mut Task, status: &str, now: &Timestamp) {
    task.status = status.to_string();
    task.updated_at = now.clone();
    if status == STATUS_DONE && task.completed_at.is_none() {
        task.completed_at = Some(now.clone());
    }
}

/// Move the task at (ci, ti) into the first column with `status`, at
/// `index` (clamped) or at the end. Returns the destination column id, or
/// `None` without touching the board when no column carries `status`.
fn relocate(board: &mut Board, ci: usize, ti: usize, status: &str, index: Option<usize>) -> Option<String> {
    let dest = board.columns.iter().position(|c| c.status == status)?;

    let mut task = board.columns[ci].tasks.remove(ti);
    set_status(&mut task, status, &Timestamp::now());

    let column = &mut board.columns[dest];
    let at = index.map_or(column.tasks.len(), |i| i.min(column.tasks.len()));
    column.tasks.insert(at, task);
    Some(column.id.clone())
}

impl<S: KeyValueStore> TaskStore<S> {
    /// Append a new task to `column_id`. The task takes the column's status.
    pub fn add_task(&mut self, draft: NewTask, column_id: &str) -> Result<Task, StoreError> {
        let task = self
            .edit_current("add_task", |board| {
                let column = board
                    .column_mut(column_id)
                    .ok_or_else(|| StoreError::ColumnNotFound(column_id.to_string()))?;
                let task = draft.into_task(&column.status);
                column.tasks.push(task.clone());
                Ok(Some(task))
            })?
            .ok_or(StoreError::NoCurrentBoard)?;
        self.check_capacity(column_id);
        Ok(task)
    }

    pub fn update_task(&mut self, task_id: &str, mut patch: TaskPatch) -> Result<(), StoreError> {
        let moved_to = self.edit_current("update_task", |board| {
            let Some((ci, ti)) = board.locate_task(task_id) else {
                log::warn!("[taskboard.store.task] update skipped, unknown task {}", task_id);
                return Ok(None);
            };

            let status = patch.status.take();
            let task = &mut board.columns[ci].tasks[ti];
            patch.apply(task);
            task.updated_at = Timestamp::now();

            let mut moved_to = None;
            if let Some(status) = status.filter(|s| *s != board.columns[ci].status) {
                moved_to = relocate(board, ci, ti, &status, None);
                if moved_to.is_none() {
                    log::warn!(
                        "[taskboard.store.task] No column with status {}, task {} stays put",
                        status,
                        task_id
                    );
                }
            }
            Ok(Some(moved_to))
        })?;

        if let Some(Some(column_id)) = moved_to {
            self.check_capacity(&column_id);
        }
        Ok(())
    }

    pub fn delete_task(&mut self, task_id: &str) -> Result<(), StoreError> {
        self.edit_current("delete_task", |board| {
            let Some((ci, ti)) = board.locate_task(task_id) else {
                log::warn!("[taskboard.store.task] delete skipped, unknown task {}", task_id);
                return Ok(None);
            };
            board.columns[ci].tasks.remove(ti);
            Ok(Some(()))
        })?;
        Ok(())
    }

    /// Move a task into the first column whose status is `new_status`,
    /// inserting at `new_index` clamped to that column's length. The board's
    /// task count is unchanged; if either end does not resolve nothing moves.
    pub fn move_task(&mut self, task_id: &str, new_status: &str, new_index: usize) -> Result<(), StoreError> {
        let dest = self.edit_current("move_task", |board| {
            let Some((ci, ti)) = board.locate_task(task_id) else {
                log::warn!("[taskboard.store.move] Task {} not found", task_id);
                return Ok(None);
            };
            let dest = relocate(board, ci, ti, new_status, Some(new_index));
            if dest.is_none() {
                log::warn!("[taskboard.store.move] No column with status {}", new_status);
            }
            Ok(dest)
        })?;

        if let Some(column_id) = dest {
            self.check_capacity(&column_id);
        }
        Ok(())
    }

    /// Copy a task under a new id with a " (Copy)" title. Subtasks get new
    /// ids and start incomplete; comments carry over unchanged. The copy is
    /// appended to the first column with the task's status.
    pub fn duplicate_task(&mut self, task: &Task) -> Result<Task, StoreError> {
        let now = Timestamp::now();
        let mut copy = task.clone();
        copy.id = generate_id();
        copy.title = format!("{} (Copy)", task.title);
        copy.created_at = now.clone();
        copy.updated_at = now.clone();
        copy.subtasks = task
            .subtasks
            .iter()
            .map(|s| Subtask {
                id: generate_id(),
                title: s.title.clone(),
                completed: false,
                created_at: now.clone(),
            })
            .collect();

        let (copy, column_id) = self
            .edit_current("duplicate_task", |board| {
                let column = board
                    .columns
                    .iter_mut()
                    .find(|c| c.status == copy.status)
                    .ok_or_else(|| StoreError::ColumnNotFound(copy.status.clone()))?;
                column.tasks.push(copy.clone());
                Ok(Some((copy, column.id.clone())))
            })?
            .ok_or(StoreError::NoCurrentBoard)?;
        self.check_capacity(&column_id);
        Ok(copy)
    }

    /// Edit one task in place, stamping its `updatedAt`. `edit` returning
    /// `None` means the inner target did not resolve.
    pub(crate) fn edit_task<T>(
        &mut self,
        action: &str,
        task_id: &str,
        edit: impl FnOnce(&mut Task) -> Option<T>,
    ) -> Result<Option<T>, StoreError> {
        self.edit_current(action, |board| {
            let Some(task) = board.find_task_mut(task_id) else {
                log::warn!("[taskboard.store.task] {} skipped, unknown task {}", action, task_id);
                return Ok(None);
            };
            let out = edit(task);
            if out.is_some() {
                task.updated_at = Timestamp::now();
            }
            Ok(out)
        })
    }

    pub fn add_subtask(&mut self, task_id: &str, title: &str) -> Result<Subtask, StoreError> {
        let subtask = Subtask {
            id: generate_id(),
            title: title.to_string(),
            completed: false,
            created_at: Timestamp::now(),
        };
        self.edit_task("add_subtask", task_id, |task| {
            task.subtasks.push(subtask.clone());
            Some(subtask)
        })?
        .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))
    }

    pub fn toggle_subtask(&mut self, task_id: &str, subtask_id: &str) -> Result<(), StoreError> {
        self.edit_task("toggle_subtask", task_id, |task| {
            let subtask = task.subtasks.iter_mut().find(|s| s.id == subtask_id)?;
            subtask.completed = !subtask.completed;
            Some(())
        })?;
        Ok(())
    }

    pub fn update_subtask(&mut self, task_id: &str, subtask_id: &str, title: &str) -> Result<(), StoreError> {
        self.edit_task("update_subtask", task_id, |task| {
            let subtask = task.subtasks.iter_mut().find(|s| s.id == subtask_id)?;
            subtask.title = title.to_string();
            Some(())
        })?;
        Ok(())
    }

    pub fn delete_subtask(&mut self, task_id: &str, subtask_id: &str) -> Result<(), StoreError> {
        self.edit_task("delete_subtask", task_id, |task| {
            let index = task.subtasks.iter().position(|s| s.id == subtask_id)?;
            task.subtasks.remove(index);
            Some(())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{ColumnPatch, NewColumn, StoreEvent};
    use super::*;
    use crate::types::{check_board, STATUS_IN_PROGRESS, STATUS_TODO};

    fn titles(store: &TaskStore<crate::storage::MemoryStore>, column_id: &str) -> Vec<String> {
        store
            .current_board()
            .and_then(|b| b.column(column_id))
            .map(|c| c.tasks.iter().map(|t| t.title.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_add_task_fills_defaults() {
        let (mut store, cols) = board_store();
        let task = store
            .add_task(
                NewTask {
                    title: "Design".to_string(),
                    assignees: Some(vec!["ana".to_string(), "bo".to_string()]),
                    tags: vec!["ui".to_string(), "ui".to_string(), "api".to_string()],
                    ..NewTask::default()
                },
                &cols[0],
            )
            .unwrap();

        assert_eq!(task.status, STATUS_TODO);
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.assignee.as_deref(), Some("ana"));
        assert_eq!(task.tags, vec!["ui", "api"]);
        assert!(task.subtasks.is_empty() && task.comments.is_empty());
        assert_eq!(task.created_at, task.updated_at);
        assert!(task.completed_at.is_none());
        assert_eq!(titles(&store, &cols[0]), vec!["Design"]);
    }

    #[test]
    fn test_add_task_unknown_column() {
        let (mut store, _) = board_store();
        let err = store.add_task(NewTask::titled("x"), "missing").unwrap_err();
        assert!(matches!(err, StoreError::ColumnNotFound(_)));
        assert_eq!(store.current_board().unwrap().task_count(), 0);
    }

    #[test]
    fn test_move_design_to_done() {
        let (mut store, cols) = board_store();
        let task = store.add_task(NewTask::titled("Design"), &cols[0]).unwrap();

        store.move_task(&task.id, STATUS_DONE, 0).unwrap();

        let board = store.current_board().unwrap();
        assert!(board.column(&cols[0]).unwrap().tasks.is_empty());
        let done = &board.column(&cols[2]).unwrap().tasks;
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].status, STATUS_DONE);
        assert!(done[0].updated_at.as_datetime() >= task.updated_at.as_datetime());
        assert!(done[0].completed_at.is_some());
    }

    #[test]
    fn test_move_conserves_count_and_clamps_index() {
        let (mut store, cols) = board_store();
        let a = add(&mut store, &cols[0], "a");
        add(&mut store, &cols[0], "b");
        add(&mut store, &cols[1], "c");
        add(&mut store, &cols[1], "d");

        store.move_task(&a, STATUS_IN_PROGRESS, 99).unwrap();
        assert_eq!(titles(&store, &cols[1]), vec!["c", "d", "a"]);

        store.move_task(&a, STATUS_IN_PROGRESS, 0).unwrap();
        assert_eq!(titles(&store, &cols[1]), vec!["a", "c", "d"]);

        let board = store.current_board().unwrap();
        assert_eq!(board.task_count(), 4);
        assert!(check_board(board).is_empty());
    }

    #[test]
    fn test_move_first_matching_column_only() {
        let (mut store, cols) = board_store();
        let second_done = store.add_column(NewColumn::new("Shipped", STATUS_DONE)).unwrap();
        let a = add(&mut store, &cols[0], "a");

        store.move_task(&a, STATUS_DONE, 0).unwrap();
        assert_eq!(titles(&store, &cols[2]), vec!["a"]);
        assert!(titles(&store, &second_done.id).is_empty());
    }

    #[test]
    fn test_move_unresolved_is_noop() {
        let (mut store, cols) = board_store();
        let a = add(&mut store, &cols[0], "a");
        let mut sub = store.subscribe();

        store.move_task(&a, "nowhere", 0).unwrap();
        store.move_task("ghost", STATUS_DONE, 0).unwrap();

        assert_eq!(titles(&store, &cols[0]), vec!["a"]);
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn test_move_reports_capacity() {
        let (mut store, cols) = board_store();
        store
            .update_column(
                &cols[1],
                ColumnPatch {
                    max_tasks: Some(Some(1)),
                    ..ColumnPatch::default()
                },
            )
            .unwrap();
        let a = add(&mut store, &cols[0], "a");
        let b = add(&mut store, &cols[0], "b");
        store.move_task(&a, STATUS_IN_PROGRESS, 0).unwrap();

        let mut sub = store.subscribe();
        store.move_task(&b, STATUS_IN_PROGRESS, 0).unwrap();
        assert!(sub.drain().contains(&StoreEvent::CapacityExceeded {
            column_id: cols[1].clone(),
            count: 2,
            max: 1,
        }));
        assert_eq!(titles(&store, &cols[1]), vec!["b", "a"]);
    }

    #[test]
    fn test_completed_at_not_cleared() {
        let (mut store, cols) = board_store();
        let a = add(&mut store, &cols[0], "a");
        store.move_task(&a, STATUS_DONE, 0).unwrap();
        let stamped = store.current_board().unwrap().find_task(&a).unwrap().completed_at.clone();

        store.move_task(&a, STATUS_TODO, 0).unwrap();
        store.move_task(&a, STATUS_DONE, 0).unwrap();
        let task = store.current_board().unwrap().find_task(&a).unwrap();
        assert!(stamped.is_some());
        assert_eq!(task.completed_at, stamped);
    }

    #[test]
    fn test_update_task_fields_and_status() {
        let (mut store, cols) = board_store();
        let a = add(&mut store, &cols[0], "a");
        add(&mut store, &cols[1], "existing");

        store
            .update_task(
                &a,
                TaskPatch {
                    title: Some("renamed".to_string()),
                    priority: Some(Priority::Urgent),
                    status: Some(STATUS_IN_PROGRESS.to_string()),
                    estimated_hours: Some(Some(2.5)),
                    ..TaskPatch::default()
                },
            )
            .unwrap();

        assert_eq!(titles(&store, &cols[1]), vec!["existing", "renamed"]);
        let board = store.current_board().unwrap();
        let task = board.find_task(&a).unwrap();
        assert_eq!(task.priority, Priority::Urgent);
        assert_eq!(task.estimated_hours, Some(2.5));
        assert!(check_board(board).is_empty());

        store
            .update_task(
                &a,
                TaskPatch {
                    estimated_hours: Some(None),
                    status: Some("nowhere".to_string()),
                    ..TaskPatch::default()
                },
            )
            .unwrap();
        let task = store.current_board().unwrap().find_task(&a).unwrap();
        assert_eq!(task.estimated_hours, None);
        assert_eq!(task.status, STATUS_IN_PROGRESS);

        store.update_task("ghost", TaskPatch::default()).unwrap();
    }

    #[test]
    fn test_delete_task() {
        let (mut store, cols) = board_store();
        let a = add(&mut store, &cols[0], "a");
        add(&mut store, &cols[0], "b");

        store.delete_task(&a).unwrap();
        store.delete_task(&a).unwrap();
        assert_eq!(titles(&store, &cols[0]), vec!["b"]);
    }

    #[test]
    fn test_duplicate_task() {
        let (mut store, cols) = board_store();
        let a = add(&mut store, &cols[1], "Build");
        let sub = store.add_subtask(&a, "step one").unwrap();
        store.toggle_subtask(&a, &sub.id).unwrap();
        store.add_comment(&a, "looks fine", "ana").unwrap();
        let original = store.current_board().unwrap().find_task(&a).unwrap().clone();

        let copy = store.duplicate_task(&original).unwrap();

        assert_ne!(copy.id, original.id);
        assert_eq!(copy.title, "Build (Copy)");
        assert_eq!(copy.status, STATUS_IN_PROGRESS);
        assert_eq!(copy.subtasks.len(), 1);
        assert_ne!(copy.subtasks[0].id, sub.id);
        assert!(!copy.subtasks[0].completed);
        assert_eq!(copy.comments, original.comments);
        assert_eq!(titles(&store, &cols[1]), vec!["Build", "Build (Copy)"]);

        // The source task is untouched
        let board = store.current_board().unwrap();
        assert!(board.find_task(&a).unwrap().subtasks[0].completed);
        assert!(check_board(board).is_empty());
    }

    #[test]
    fn test_duplicate_without_matching_column() {
        let (mut store, cols) = board_store();
        let a = add(&mut store, &cols[0], "a");
        let mut task = store.current_board().unwrap().find_task(&a).unwrap().clone();
        task.status = "blocked".to_string();

        let err = store.duplicate_task(&task).unwrap_err();
        assert!(matches!(err, StoreError::ColumnNotFound(s) if s == "blocked"));
        assert_eq!(store.current_board().unwrap().task_count(), 1);
    }

    #[test]
    fn test_subtask_lifecycle() {
        let (mut store, cols) = board_store();
        let a = add(&mut store, &cols[0], "a");

        let s1 = store.add_subtask(&a, "one").unwrap();
        let s2 = store.add_subtask(&a, "two").unwrap();
        store.toggle_subtask(&a, &s1.id).unwrap();
        store.update_subtask(&a, &s2.id, "second").unwrap();

        let task = store.current_board().unwrap().find_task(&a).unwrap();
        assert_eq!(task.subtask_progress(), Some(0.5));
        assert_eq!(task.subtasks[1].title, "second");

        store.delete_subtask(&a, &s1.id).unwrap();
        store.delete_subtask(&a, "missing").unwrap();
        let task = store.current_board().unwrap().find_task(&a).unwrap();
        assert_eq!(task.subtasks.len(), 1);

        assert!(matches!(
            store.add_subtask("ghost", "x"),
            Err(StoreError::TaskNotFound(_))
        ));
    }
}
