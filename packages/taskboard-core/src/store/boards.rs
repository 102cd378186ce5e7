use super::{defaults, NewColumn, StoreError, TaskStore};
use crate::id::generate_id;
use crate::storage::KeyValueStore;
use crate::temporal::Timestamp;
use crate::types::Board;

/// Input for [`TaskStore::add_board`]. Without explicit columns the board
/// gets the standard todo / in-progress / done lanes.
#[derive(Debug, Clone, Default)]
pub struct NewBoard {
    pub title: String,
    pub description: String,
    pub columns: Option<Vec<NewColumn>>,
}

#[derive(Debug, Clone, Default)]
pub struct BoardPatch {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl<S: KeyValueStore> TaskStore<S> {
    /// Create a board. It becomes current only if no board was current.
    pub fn add_board(&mut self, draft: NewBoard) -> Board {
        let now = Timestamp::now();
        let columns = draft
            .columns
            .unwrap_or_else(defaults::default_column_drafts)
            .into_iter()
            .map(NewColumn::into_column)
            .collect();

        let board = Board {
            id: generate_id(),
            title: draft.title,
            description: draft.description,
            columns,
            created_at: now.clone(),
            updated_at: now,
        };

        self.boards.push(board.clone());
        if self.current_board().is_none() {
            self.current_board_id = Some(board.id.clone());
        }
        self.commit("add_board");
        board
    }

    pub fn update_board(&mut self, board_id: &str, patch: BoardPatch) -> Result<(), StoreError> {
        let Some(board) = self.boards.iter_mut().find(|b| b.id == board_id) else {
            log::warn!("[taskboard.store.board] update skipped, unknown board {}", board_id);
            return Ok(());
        };

        if let Some(title) = patch.title {
            board.title = title;
        }
        if let Some(description) = patch.description {
            board.description = description;
        }
        board.updated_at = Timestamp::now();
        self.commit("update_board");
        Ok(())
    }

    /// Delete a board. If it was current, the first remaining board becomes
    /// current, or none when the collection is empty.
    pub fn delete_board(&mut self, board_id: &str) -> Result<(), StoreError> {
        let Some(index) = self.boards.iter().position(|b| b.id == board_id) else {
            log::warn!("[taskboard.store.board] delete skipped, unknown board {}", board_id);
            return Ok(());
        };

        self.safety_backup("delete_board");
        self.boards.remove(index);
        if self.current_board_id.as_deref() == Some(board_id) {
            self.current_board_id = self.boards.first().map(|b| b.id.clone());
        }
        self.commit("delete_board");
        Ok(())
    }

    pub fn set_current_board(&mut self, board_id: &str) -> Result<(), StoreError> {
        if self.board(board_id).is_none() {
            return Err(StoreError::BoardNotFound(board_id.to_string()));
        }
        self.current_board_id = Some(board_id.to_string());
        self.commit("set_current_board");
        Ok(())
    }
}
