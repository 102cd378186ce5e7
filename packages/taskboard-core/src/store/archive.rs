//! Archive lifecycle: archive, restore, permanent delete.
//!
//! Archived tasks stay in their column's list; hiding them is up to the
//! reader (`Column::visible_tasks`). Archiving and restoring only touch
//! `archived` / `archivedAt`, so a round trip leaves the task as it was.

use super::{StoreError, TaskStore};
use crate::storage::KeyValueStore;
use crate::temporal::Timestamp;
use crate::types::{Board, Task};

/// An archived task with the column it sits in.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedTask {
    pub task: Task,
    pub column_id: String,
    pub column_title: String,
}

/// Archived tasks of `board`, in board order.
pub fn list_archived_tasks(board: &Board) -> Vec<ArchivedTask> {
    board
        .columns
        .iter()
        .flat_map(|column| {
            column
                .tasks
                .iter()
                .filter(|t| t.is_archived())
                .map(move |task| ArchivedTask {
                    task: task.clone(),
                    column_id: column.id.clone(),
                    column_title: column.title.clone(),
                })
        })
        .collect()
}

impl<S: KeyValueStore> TaskStore<S> {
    /// Archived tasks of the current board; empty without one.
    pub fn archived_tasks(&self) -> Vec<ArchivedTask> {
        self.current_board()
            .map(list_archived_tasks)
            .unwrap_or_default()
    }

    fn set_archived(&mut self, action: &str, task_id: &str, archived: bool) -> Result<(), StoreError> {
        self.edit_current(action, |board| {
            let Some(task) = board.find_task_mut(task_id) else {
                log::warn!("[taskboard.store.archive] {} skipped, unknown task {}", action, task_id);
                return Ok(None);
            };
            if task.is_archived() == archived {
                return Ok(None);
            }
            task.archived = Some(archived);
            task.archived_at = archived.then(Timestamp::now);
            Ok(Some(()))
        })?;
        Ok(())
    }

    pub fn archive_task(&mut self, task_id: &str) -> Result<(), StoreError> {
        self.set_archived("archive_task", task_id, true)
    }

    pub fn restore_task(&mut self, task_id: &str) -> Result<(), StoreError> {
        self.set_archived("restore_task", task_id, false)
    }

    /// Permanently remove a task, only if it is archived.
    pub fn delete_archived_task(&mut self, task_id: &str) -> Result<(), StoreError> {
        self.edit_current("delete_archived_task", |board| {
            match board.locate_task(task_id) {
                Some((ci, ti)) if board.columns[ci].tasks[ti].is_archived() => {
                    board.columns[ci].tasks.remove(ti);
                    Ok(Some(()))
                }
                Some(_) => {
                    log::warn!("[taskboard.store.archive] Task {} is not archived, kept", task_id);
                    Ok(None)
                }
                None => {
                    log::warn!("[taskboard.store.archive] delete skipped, unknown task {}", task_id);
                    Ok(None)
                }
            }
        })?;
        Ok(())
    }

    /// Permanently remove every archived task of the current board.
    /// Returns how many were removed.
    pub fn purge_archived(&mut self) -> Result<usize, StoreError> {
        let index = self.current_index()?;
        let count = self.boards[index]
            .all_tasks()
            .filter(|t| t.is_archived())
            .count();
        if count == 0 {
            return Ok(0);
        }

        self.safety_backup("purge_archived");
        self.edit_current("purge_archived", |board| {
            for column in &mut board.columns {
                column.tasks.retain(|t| !t.is_archived());
            }
            Ok(Some(()))
        })?;
        log::info!("[taskboard.store.archive] Purged {} archived tasks", count);
        Ok(count)
    }
}
