pub mod codec;
pub mod config;
pub mod id;
pub mod search;
pub mod storage;
pub mod store;
pub mod temporal;
pub mod types;
pub mod window;

pub use config::StoreConfig;
pub use store::{LoadOutcome, StoreError, StoreEvent, Subscription, TaskStore};
pub use types::{Board, Column, Comment, Priority, Subtask, Task};
