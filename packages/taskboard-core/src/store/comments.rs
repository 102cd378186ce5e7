use super::{StoreError, TaskStore};
use crate::id::generate_id;
use crate::storage::KeyValueStore;
use crate::temporal::Timestamp;
use crate::types::Comment;

impl<S: KeyValueStore> TaskStore<S> {
    /// Append a comment to a task. Replies are written as `@Author: text`
    /// by the caller; the store keeps content verbatim.
    pub fn add_comment(&mut self, task_id: &str, content: &str, author: &str) -> Result<Comment, StoreError> {
        let comment = Comment {
            id: generate_id(),
            content: content.to_string(),
            author: author.to_string(),
            created_at: Timestamp::now(),
            updated_at: None,
            is_edited: None,
        };
        self.edit_task("add_comment", task_id, |task| {
            task.comments.push(comment.clone());
            Some(comment)
        })?
        .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))
    }

    pub fn update_comment(&mut self, task_id: &str, comment_id: &str, content: &str) -> Result<(), StoreError> {
        self.edit_task("update_comment", task_id, |task| {
            let comment = task.comments.iter_mut().find(|c| c.id == comment_id)?;
            comment.content = content.to_string();
            comment.updated_at = Some(Timestamp::now());
            comment.is_edited = Some(true);
            Some(())
        })?;
        Ok(())
    }

    pub fn delete_comment(&mut self, task_id: &str, comment_id: &str) -> Result<(), StoreError> {
        self.edit_task("delete_comment", task_id, |task| {
            let index = task.comments.iter().position(|c| c.id == comment_id)?;
            task.comments.remove(index);
            Some(())
        })?;
        Ok(())
    }
}
