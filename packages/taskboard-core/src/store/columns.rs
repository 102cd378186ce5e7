use std::collections::HashSet;

use super::{defaults, StoreError, TaskStore};
use crate::id::generate_id;
use crate::storage::KeyValueStore;
use crate::temporal::Timestamp;
use crate::types::{Board, Column};

#[derive(Debug, Clone, Default)]
pub struct NewColumn {
    pub title: String,
    pub status: String,
    /// Empty picks the conventional color for the status.
    pub color: String,
    pub max_tasks: Option<u32>,
}

impl NewColumn {
    pub fn new(title: &str, status: &str) -> Self {
        Self {
            title: title.to_string(),
            status: status.to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn into_column(self) -> Column {
        let color = if self.color.is_empty() {
            defaults::color_for_status(&self.status).to_string()
        } else {
            self.color
        };
        Column {
            id: generate_id(),
            title: self.title,
            status: self.status,
            color,
            tasks: Vec::new(),
            max_tasks: self.max_tasks,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ColumnPatch {
    pub title: Option<String>,
    /// A new status is carried over to every task in the column.
    pub status: Option<String>,
    pub color: Option<String>,
    /// `Some(None)` clears the capacity.
    pub max_tasks: Option<Option<u32>>,
}

/// Entities looked up by `ordered_ids` in that order. Stale and repeated
/// ids are dropped.
fn reorder_by_id<T>(items: Vec<T>, ordered_ids: &[String], id_of: impl Fn(&T) -> &str) -> Vec<T> {
    let mut pool: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(ordered_ids.len());
    for id in ordered_ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        let found = pool
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|item| id_of(item) == id));
        if let Some(item) = found.and_then(|pos| pool[pos].take()) {
            out.push(item);
        }
    }
    let dropped = pool.iter().filter(|slot| slot.is_some()).count();
    if dropped > 0 {
        log::warn!("[taskboard.store.reorder] {} entries not listed, dropped", dropped);
    }
    out
}

fn column_exists(board: Option<&Board>, column_id: &str) -> bool {
    board.and_then(|b| b.column(column_id)).is_some()
}

impl<S: KeyValueStore> TaskStore<S> {
    pub fn add_column(&mut self, draft: NewColumn) -> Result<Column, StoreError> {
        let column = draft.into_column();
        let created = column.clone();
        self.edit_current("add_column", move |board| {
            board.columns.push(column);
            board.updated_at = Timestamp::now();
            Ok(Some(()))
        })?;
        Ok(created)
    }

    pub fn update_column(&mut self, column_id: &str, patch: ColumnPatch) -> Result<(), StoreError> {
        self.edit_current("update_column", |board| {
            let Some(column) = board.column_mut(column_id) else {
                log::warn!("[taskboard.store.column] update skipped, unknown column {}", column_id);
                return Ok(None);
            };

            if let Some(title) = patch.title {
                column.title = title;
            }
            if let Some(color) = patch.color {
                column.color = color;
            }
            if let Some(max_tasks) = patch.max_tasks {
                column.max_tasks = max_tasks;
            }
            if let Some(status) = patch.status {
                if status != column.status {
                    let now = Timestamp::now();
                    for task in &mut column.tasks {
                        task.status = status.clone();
                        task.updated_at = now.clone();
                    }
                    column.status = status;
                }
            }
            board.updated_at = Timestamp::now();
            Ok(Some(()))
        })?;
        self.check_capacity(column_id);
        Ok(())
    }

    /// Delete a column together with its tasks.
    pub fn delete_column(&mut self, column_id: &str) -> Result<(), StoreError> {
        self.current_index()?;
        if !column_exists(self.current_board(), column_id) {
            log::warn!("[taskboard.store.column] delete skipped, unknown column {}", column_id);
            return Ok(());
        }

        self.safety_backup("delete_column");
        self.edit_current("delete_column", |board| {
            board.columns.retain(|c| c.id != column_id);
            board.updated_at = Timestamp::now();
            Ok(Some(()))
        })?;
        Ok(())
    }

    /// Delete a column, appending its tasks to `target_column_id` with the
    /// target's status.
    pub fn delete_column_with_move(
        &mut self,
        column_id: &str,
        target_column_id: &str,
    ) -> Result<(), StoreError> {
        self.current_index()?;
        let board = self.current_board();
        if column_id == target_column_id
            || !column_exists(board, column_id)
            || !column_exists(board, target_column_id)
        {
            log::warn!(
                "[taskboard.store.column] delete {} with move to {} skipped",
                column_id,
                target_column_id
            );
            return Ok(());
        }

        self.safety_backup("delete_column_with_move");
        self.edit_current("delete_column_with_move", |board| {
            let Some(index) = board.columns.iter().position(|c| c.id == column_id) else {
                return Ok(None);
            };
            let removed = board.columns.remove(index);
            let Some(target) = board.column_mut(target_column_id) else {
                return Ok(None);
            };

            let now = Timestamp::now();
            let moved = removed.tasks.len();
            for mut task in removed.tasks {
                task.status = target.status.clone();
                task.updated_at = now.clone();
                target.tasks.push(task);
            }
            log::info!(
                "[taskboard.store.column] Moved {} tasks from {} to {}",
                moved,
                column_id,
                target_column_id
            );
            board.updated_at = now;
            Ok(Some(()))
        })?;
        self.check_capacity(target_column_id);
        Ok(())
    }

    /// Replace the column order with the columns named by `ordered_ids`.
    pub fn reorder_columns(&mut self, ordered_ids: &[String]) -> Result<(), StoreError> {
        self.edit_current("reorder_columns", |board| {
            let columns = std::mem::take(&mut board.columns);
            board.columns = reorder_by_id(columns, ordered_ids, |c| c.id.as_str());
            board.updated_at = Timestamp::now();
            Ok(Some(()))
        })?;
        Ok(())
    }

    /// Replace a column's task order with the tasks named by `ordered_ids`.
    pub fn reorder_tasks(&mut self, column_id: &str, ordered_ids: &[String]) -> Result<(), StoreError> {
        self.edit_current("reorder_tasks", |board| {
            let Some(column) = board.column_mut(column_id) else {
                log::warn!("[taskboard.store.column] reorder skipped, unknown column {}", column_id);
                return Ok(None);
            };
            let tasks = std::mem::take(&mut column.tasks);
            column.tasks = reorder_by_id(tasks, ordered_ids, |t| t.id.as_str());
            Ok(Some(()))
        })?;
        Ok(())
    }
}
