//! Task-board state container.
//!
//! Owns the board collection and the current-board pointer. Every mutation
//! is applied to a draft copy of the affected board and swapped in only on
//! success, then committed: subscribers get a `Changed` event and the new
//! snapshot is written through the persistence adapter. A failed write
//! leaves the in-memory state in place and is reported as `PersistFailed`.

pub mod archive;
pub mod boards;
pub mod columns;
pub mod comments;
pub mod defaults;
pub mod tasks;

use std::sync::Arc;

use tokio::sync::broadcast;

pub use archive::{list_archived_tasks, ArchivedTask};
pub use boards::{BoardPatch, NewBoard};
pub use columns::{ColumnPatch, NewColumn};
pub use tasks::{NewTask, TaskPatch};

use crate::codec::{self, PersistedState};
use crate::config::StoreConfig;
use crate::storage::{KeyValueStore, MemoryStore, Persistence, StorageError, UsageMonitor};
use crate::types::Board;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No current board selected")]
    NoCurrentBoard,

    #[error("Board not found: {0}")]
    BoardNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NoCurrentBoard => "NO_CURRENT_BOARD",
            StoreError::BoardNotFound(_) => "BOARD_NOT_FOUND",
            StoreError::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            StoreError::TaskNotFound(_) => "TASK_NOT_FOUND",
            StoreError::BackupNotFound(_) => "BACKUP_NOT_FOUND",
            StoreError::Storage(e) => e.code(),
        }
    }
}

/// Notifications published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// State changed; re-read the snapshot.
    Changed { current_board_id: Option<String> },
    /// The post-commit write failed. In-memory state is kept.
    PersistFailed { code: &'static str, message: String },
    /// A column holds more tasks than its advisory `max_tasks`.
    CapacityExceeded {
        column_id: String,
        count: usize,
        max: u32,
    },
    BackupCreated { key: String },
}

/// How the store obtained its initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Restored,
    Seeded,
    /// Stored data could not be decoded. It was moved to a backup key and
    /// defaults used.
    RecoveredFromCorruption,
}

/// Event listener registration. Dropping it also unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<StoreEvent>,
}

impl Subscription {
    /// Next pending event without waiting. Skips over events lost to lag.
    pub fn try_next(&mut self) -> Option<StoreEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    log::warn!("[taskboard.store.events] Subscriber lagged, {} events dropped", n);
                }
                Err(_) => return None,
            }
        }
    }

    /// Wait for the next event. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<StoreEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("[taskboard.store.events] Subscriber lagged, {} events dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn drain(&mut self) -> Vec<StoreEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    pub fn unsubscribe(self) {}
}

pub struct TaskStore<S: KeyValueStore> {
    boards: Vec<Board>,
    current_board_id: Option<String>,
    persistence: Arc<Persistence<S>>,
    config: StoreConfig,
    events: broadcast::Sender<StoreEvent>,
    load_outcome: LoadOutcome,
}

impl TaskStore<MemoryStore> {
    /// Store over a fresh in-memory backend.
    pub fn in_memory(config: StoreConfig) -> Result<Self, StoreError> {
        let persistence = Arc::new(Persistence::new(Arc::new(MemoryStore::new()), &config));
        Self::open(persistence, config)
    }
}

impl<S: KeyValueStore> TaskStore<S> {
    /// Load persisted state, or seed the default dataset when there is none.
    /// Undecodable data is set aside as a backup and replaced by defaults. Fails only
    /// when the backend itself is unusable (e.g. disabled).
    pub fn open(persistence: Arc<Persistence<S>>, config: StoreConfig) -> Result<Self, StoreError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let mut write_initial = true;
        let (state, load_outcome) = match persistence.load()? {
            Some(raw) => match codec::decode(&raw) {
                Ok(state) => (state, LoadOutcome::Restored),
                Err(e) => {
                    log::warn!(
                        "[taskboard.store.load] Stored state unreadable, starting fresh: {}",
                        e
                    );
                    write_initial = Self::set_aside(&persistence, &raw);
                    (Self::initial_state(&config), LoadOutcome::RecoveredFromCorruption)
                }
            },
            None => (Self::initial_state(&config), LoadOutcome::Seeded),
        };

        let current_board_id = resolve_current(&state.boards, state.current_board_id.as_deref());
        let store = Self {
            boards: state.boards,
            current_board_id,
            persistence,
            config,
            events,
            load_outcome,
        };

        log::info!(
            "[taskboard.store.load] {:?} with {} boards",
            store.load_outcome,
            store.boards.len()
        );
        if store.load_outcome != LoadOutcome::Restored && write_initial {
            store.persist();
        }
        Ok(store)
    }

    /// Copy an undecodable payload to a backup key, then drop the live entry.
    /// Returns false, keeping the entry, when the copy fails.
    fn set_aside(persistence: &Persistence<S>, raw: &str) -> bool {
        match persistence.create_backup(raw) {
            Ok(key) => {
                log::warn!("[taskboard.store.load] Unreadable state saved as {}", key);
                if let Err(e) = persistence.discard() {
                    log::warn!("[taskboard.store.load] Failed to discard stored state: {}", e);
                }
                true
            }
            Err(e) => {
                log::error!("[taskboard.store.load] Could not back up unreadable state: {}", e);
                false
            }
        }
    }

    fn initial_state(config: &StoreConfig) -> PersistedState {
        if config.seed_defaults {
            let boards = defaults::default_boards();
            let current = boards.first().map(|b| b.id.clone());
            PersistedState::new(boards, current)
        } else {
            PersistedState::new(Vec::new(), None)
        }
    }

    pub fn load_outcome(&self) -> LoadOutcome {
        self.load_outcome
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn persistence(&self) -> &Arc<Persistence<S>> {
        &self.persistence
    }

    pub fn boards(&self) -> &[Board] {
        &self.boards
    }

    pub fn board(&self, board_id: &str) -> Option<&Board> {
        self.boards.iter().find(|b| b.id == board_id)
    }

    pub fn current_board_id(&self) -> Option<&str> {
        self.current_board_id.as_deref()
    }

    pub fn current_board(&self) -> Option<&Board> {
        self.current_board_id.as_deref().and_then(|id| self.board(id))
    }

    /// Owned copy of the full persisted state.
    pub fn snapshot(&self) -> PersistedState {
        PersistedState::new(self.boards.clone(), self.current_board_id.clone())
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.events.subscribe(),
        }
    }

    /// Write the current snapshot now, returning the outcome to the caller.
    pub fn flush(&self) -> Result<(), StoreError> {
        let payload = codec::encode(&self.snapshot())?;
        self.persistence.save(&payload)?;
        Ok(())
    }

    /// Start the periodic usage poll on the configured interval.
    pub fn spawn_usage_monitor(&self) -> UsageMonitor
    where
        S: 'static,
    {
        UsageMonitor::spawn(self.persistence.clone(), self.config.usage_poll_interval())
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Post-commit hook: publish, then persist.
    fn commit(&mut self, action: &str) {
        log::debug!("[taskboard.store.commit] {}", action);
        self.emit(StoreEvent::Changed {
            current_board_id: self.current_board_id.clone(),
        });
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = self.flush() {
            log::error!("[taskboard.store.persist] Failed to persist state: {}", e);
            self.emit(StoreEvent::PersistFailed {
                code: e.code(),
                message: e.to_string(),
            });
        }
    }

    fn current_index(&self) -> Result<usize, StoreError> {
        let id = self
            .current_board_id
            .as_deref()
            .ok_or(StoreError::NoCurrentBoard)?;
        self.boards
            .iter()
            .position(|b| b.id == id)
            .ok_or(StoreError::NoCurrentBoard)
    }

    /// Apply `edit` to a draft of the current board. `Ok(Some)` swaps the
    /// draft in and commits; `Ok(None)` means nothing resolved and leaves
    /// state untouched; `Err` aborts without change.
    fn edit_current<T>(
        &mut self,
        action: &str,
        edit: impl FnOnce(&mut Board) -> Result<Option<T>, StoreError>,
    ) -> Result<Option<T>, StoreError> {
        let index = self.current_index()?;
        let mut draft = self.boards[index].clone();
        match edit(&mut draft)? {
            Some(out) => {
                self.boards[index] = draft;
                self.commit(action);
                Ok(Some(out))
            }
            None => {
                log::debug!("[taskboard.store.commit] {} skipped, nothing resolved", action);
                Ok(None)
            }
        }
    }

    /// Report a column over its advisory capacity. Never rejects.
    fn check_capacity(&self, column_id: &str) {
        let Some(column) = self.current_board().and_then(|b| b.column(column_id)) else {
            return;
        };
        if let (true, Some(max)) = (column.is_over_capacity(), column.max_tasks) {
            log::warn!(
                "[taskboard.store.capacity] Column {} holds {} tasks, max {}",
                column.id,
                column.tasks.len(),
                max
            );
            self.emit(StoreEvent::CapacityExceeded {
                column_id: column.id.clone(),
                count: column.tasks.len(),
                max,
            });
        }
    }

    /// Write a safety backup of the current state. Returns the backup key.
    pub fn backup_now(&self) -> Result<String, StoreError> {
        let payload = codec::encode(&self.snapshot())?;
        let key = self.persistence.create_backup(&payload)?;
        self.emit(StoreEvent::BackupCreated { key: key.clone() });
        Ok(key)
    }

    /// Backup before a destructive operation, when configured. A failed
    /// backup is logged and does not block the operation.
    fn safety_backup(&self, action: &str) {
        if !self.config.backup_before_destructive {
            return;
        }
        if let Err(e) = self.backup_now() {
            log::warn!("[taskboard.store.backup] Backup before {} failed: {}", action, e);
        }
    }

    /// Backup keys, newest first.
    pub fn list_backups(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.persistence.list_backups()?)
    }

    /// Replace the whole state with a backup's contents.
    pub fn restore_backup(&mut self, key: &str) -> Result<(), StoreError> {
        let payload = self
            .persistence
            .read_backup(key)?
            .ok_or_else(|| StoreError::BackupNotFound(key.to_string()))?;
        let state = codec::decode(&payload)?;

        self.current_board_id = resolve_current(&state.boards, state.current_board_id.as_deref());
        self.boards = state.boards;
        log::info!("[taskboard.store.backup] Restored {}", key);
        self.commit("restore_backup");
        Ok(())
    }
}

/// The requested id if it names a board, else the first board, else none.
fn resolve_current(boards: &[Board], requested: Option<&str>) -> Option<String> {
    requested
        .and_then(|id| boards.iter().find(|b| b.id == id))
        .or_else(|| boards.first())
        .map(|b| b.id.clone())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::types::{STATUS_DONE, STATUS_IN_PROGRESS, STATUS_TODO};

    /// Store with no boards and no seed data.
    pub fn empty_store() -> TaskStore<MemoryStore> {
        let config = StoreConfig {
            seed_defaults: false,
            ..StoreConfig::default()
        };
        TaskStore::in_memory(config).unwrap()
    }

    /// Store holding board "B1" (current) with todo / in-progress / done columns.
    /// Returns the store and the column ids in that order.
    pub fn board_store() -> (TaskStore<MemoryStore>, [String; 3]) {
        let mut store = empty_store();
        let board = store.add_board(NewBoard {
            title: "B1".to_string(),
            ..NewBoard::default()
        });
        store.set_current_board(&board.id).unwrap();
        let ids = [STATUS_TODO, STATUS_IN_PROGRESS, STATUS_DONE].map(|status| {
            store
                .current_board()
                .and_then(|b| b.column_for_status(status))
                .map(|c| c.id.clone())
                .unwrap()
        });
        (store, ids)
    }

    pub fn add(store: &mut TaskStore<MemoryStore>, column_id: &str, title: &str) -> String {
        store
            .add_task(NewTask::titled(title), column_id)
            .unwrap()
            .id
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn persistence(kv: Arc<MemoryStore>) -> Arc<Persistence<MemoryStore>> {
        Arc::new(Persistence::new(kv, &StoreConfig::default()))
    }

    #[test]
    fn test_open_seeds_defaults_and_persists() {
        let kv = Arc::new(MemoryStore::new());
        let store = TaskStore::open(persistence(kv.clone()), StoreConfig::default()).unwrap();

        assert_eq!(store.load_outcome(), LoadOutcome::Seeded);
        assert!(!store.boards().is_empty());
        assert_eq!(store.current_board_id(), Some(store.boards()[0].id.as_str()));
        assert!(kv.get("kanban-storage").unwrap().is_some());
    }

    #[test]
    fn test_reopen_restores_state() {
        let kv = Arc::new(MemoryStore::new());
        let board_id = {
            let mut store = TaskStore::open(persistence(kv.clone()), StoreConfig::default()).unwrap();
            let board = store.add_board(NewBoard {
                title: "Second".to_string(),
                ..NewBoard::default()
            });
            store.set_current_board(&board.id).unwrap();
            board.id
        };

        let store = TaskStore::open(persistence(kv), StoreConfig::default()).unwrap();
        assert_eq!(store.load_outcome(), LoadOutcome::Restored);
        assert_eq!(store.current_board_id(), Some(board_id.as_str()));
        assert_eq!(store.current_board().unwrap().title, "Second");
    }

    #[test]
    fn test_stale_current_id_falls_back_to_first() {
        let kv = Arc::new(MemoryStore::new());
        let seeded = TaskStore::open(persistence(kv.clone()), StoreConfig::default()).unwrap();
        let mut state = seeded.snapshot();
        state.current_board_id = Some("gone".to_string());
        kv.set("kanban-storage", &codec::encode(&state).unwrap()).unwrap();

        let store = TaskStore::open(persistence(kv), StoreConfig::default()).unwrap();
        assert_eq!(store.current_board_id(), Some(state.boards[0].id.as_str()));
    }

    #[test]
    fn test_corrupted_state_recovers_with_defaults() {
        let kv = Arc::new(MemoryStore::new());
        kv.set("kanban-storage", "{\"boards\": [ {").unwrap();

        let store = TaskStore::open(persistence(kv.clone()), StoreConfig::default()).unwrap();
        assert_eq!(store.load_outcome(), LoadOutcome::RecoveredFromCorruption);
        assert!(!store.boards().is_empty());

        // Fresh state was written back over the broken entry
        let stored = kv.get("kanban-storage").unwrap().unwrap();
        assert!(codec::decode(&stored).is_ok());

        // The broken payload survives under a backup key
        let backups = store.list_backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(
            store.persistence().read_backup(&backups[0]).unwrap().as_deref(),
            Some("{\"boards\": [ {")
        );
    }

    #[test]
    fn test_unreadable_state_kept_when_backup_fails() {
        // Room for the broken entry but not for a second copy of it
        let kv = Arc::new(MemoryStore::with_quota(400));
        let broken = format!("{{{}", "x".repeat(300));
        kv.set("kanban-storage", &broken).unwrap();

        let store = TaskStore::open(persistence(kv.clone()), StoreConfig::default()).unwrap();
        assert_eq!(store.load_outcome(), LoadOutcome::RecoveredFromCorruption);
        assert!(store.list_backups().unwrap().is_empty());
        assert_eq!(kv.get("kanban-storage").unwrap(), Some(broken));
    }

    #[test]
    fn test_null_timestamps_restore_user_boards() {
        let kv = Arc::new(MemoryStore::new());
        let doc = r#"{
            "boards": [{
                "id": "b-mine", "title": "Mine",
                "createdAt": null, "updatedAt": "2024-01-02T00:00:00Z",
                "columns": [{
                    "id": "c1", "title": "Todo", "status": "todo",
                    "tasks": [{
                        "id": "t1", "title": "Keep", "status": "todo",
                        "createdAt": null, "updatedAt": {},
                        "dueDate": null, "completedAt": false
                    }]
                }]
            }],
            "currentBoardId": "b-mine"
        }"#;
        kv.set("kanban-storage", doc).unwrap();

        let store = TaskStore::open(persistence(kv), StoreConfig::default()).unwrap();
        assert_eq!(store.load_outcome(), LoadOutcome::Restored);
        assert_eq!(store.current_board().unwrap().title, "Mine");

        let task = store.current_board().unwrap().find_task("t1").unwrap();
        assert_eq!(task.title, "Keep");
        assert!(task.created_at.is_parsed());
        assert_eq!(task.updated_at.to_iso_string(), "{}");
        assert_eq!(task.due_date, None);
        assert_eq!(
            task.completed_at,
            Some(crate::temporal::Timestamp::Unparsed("false".to_string()))
        );
        assert!(store.list_backups().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_storage_fails_open() {
        let kv = Arc::new(MemoryStore::new());
        kv.set_disabled(true);
        let err = TaskStore::open(persistence(kv), StoreConfig::default())
            .err()
            .unwrap();
        assert_eq!(err.code(), "STORAGE_DISABLED");
    }

    #[test]
    fn test_no_current_board_is_reported() {
        let mut store = empty_store();
        assert!(store.current_board().is_none());

        let err = store.add_task(NewTask::titled("x"), "col").unwrap_err();
        assert!(matches!(err, StoreError::NoCurrentBoard));
        assert!(matches!(
            store.move_task("t", "done", 0),
            Err(StoreError::NoCurrentBoard)
        ));
        assert!(matches!(
            store.reorder_columns(&[]),
            Err(StoreError::NoCurrentBoard)
        ));
        assert_eq!(store.boards().len(), 0);
    }

    #[test]
    fn test_events_changed_then_unsubscribe() {
        let (mut store, cols) = board_store();
        let mut sub = store.subscribe();

        add(&mut store, &cols[0], "Design");
        let events = sub.drain();
        assert_eq!(
            events,
            vec![StoreEvent::Changed {
                current_board_id: store.current_board_id().map(str::to_string)
            }]
        );

        sub.unsubscribe();
        assert_eq!(store.events.receiver_count(), 0);
    }

    #[test]
    fn test_persist_failure_keeps_memory_and_reports() {
        let kv = Arc::new(MemoryStore::new());
        let mut store = TaskStore::open(
            persistence(kv.clone()),
            StoreConfig {
                seed_defaults: false,
                ..StoreConfig::default()
            },
        )
        .unwrap();
        let mut sub = store.subscribe();

        kv.set_disabled(true);
        let board = store.add_board(NewBoard {
            title: "Offline".to_string(),
            ..NewBoard::default()
        });

        assert_eq!(store.boards().len(), 1);
        assert_eq!(store.boards()[0].id, board.id);
        let events = sub.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            StoreEvent::PersistFailed { code: "STORAGE_DISABLED", .. }
        )));
        assert!(store.flush().is_err());

        kv.set_disabled(false);
        store.flush().unwrap();
        assert!(kv.get("kanban-storage").unwrap().unwrap().contains("Offline"));
    }

    #[test]
    fn test_quota_failure_after_retry_reported() {
        let kv = Arc::new(MemoryStore::with_quota(4096));
        let mut store = TaskStore::open(
            persistence(kv),
            StoreConfig {
                seed_defaults: false,
                ..StoreConfig::default()
            },
        )
        .unwrap();
        let mut sub = store.subscribe();

        store.add_board(NewBoard {
            title: "x".repeat(8192),
            ..NewBoard::default()
        });

        let events = sub.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            StoreEvent::PersistFailed { code: "QUOTA_EXCEEDED", message }
                if message.contains("exceeded the quota")
        )));
        // The board is still there in memory
        assert_eq!(store.boards().len(), 1);
    }

    #[test]
    fn test_file_backed_store_survives_reload() {
        use crate::storage::FileStore;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("local-storage.json");
        let config = StoreConfig::default();
        let open = || {
            let kv = Arc::new(FileStore::open(&path, config.capacity_bytes).unwrap());
            TaskStore::open(Arc::new(Persistence::new(kv, &config)), config.clone()).unwrap()
        };

        let task_id = {
            let mut store = open();
            assert_eq!(store.load_outcome(), LoadOutcome::Seeded);
            let column_id = store.current_board().unwrap().columns[0].id.clone();
            store
                .add_task(NewTask::titled("Persist me"), &column_id)
                .unwrap()
                .id
        };

        let store = open();
        assert_eq!(store.load_outcome(), LoadOutcome::Restored);
        let task = store.current_board().unwrap().find_task(&task_id).unwrap();
        assert_eq!(task.title, "Persist me");
        assert!(task.created_at.is_parsed());
    }

    #[test]
    fn test_backup_and_restore() {
        let (mut store, cols) = board_store();
        add(&mut store, &cols[0], "Keep me");
        let key = store.backup_now().unwrap();

        let task_id = store.current_board().unwrap().columns[0].tasks[0].id.clone();
        store.delete_task(&task_id).unwrap();
        assert_eq!(store.current_board().unwrap().task_count(), 0);

        store.restore_backup(&key).unwrap();
        assert_eq!(store.current_board().unwrap().task_count(), 1);
        assert!(matches!(
            store.restore_backup("kanban-backup-0000000000000"),
            Err(StoreError::BackupNotFound(_))
        ));
    }
}
