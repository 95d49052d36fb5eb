use std::collections::HashMap;

use thiserror::Error;

use crate::engine::word_store::WordEntry;

#[derive(Debug, Error, PartialEq)]
pub enum BindingError {
    #[error("thread '{thread_id}' is already bound to '{word}'")]
    AlreadyBound { thread_id: String, word: String },
}

/// Reverse index from chat thread to the word introduced in it.
#[derive(Clone, Debug, Default)]
pub struct ThreadBinding {
    by_thread: HashMap<String, String>,
}

impl ThreadBinding {
    pub fn from_entries(entries: &[WordEntry]) -> Self {
        let by_thread = entries
            .iter()
            .map(|e| (e.thread_id.clone(), e.word.clone()))
            .collect();
        Self { by_thread }
    }

    pub fn resolve(&self, thread_id: &str) -> Option<&str> {
        self.by_thread.get(thread_id).map(String::as_str)
    }

    /// Threads are bound once, when their word is committed.
    pub fn bind(&mut self, thread_id: &str, word: &str) -> Result<(), BindingError> {
        if let Some(existing) = self.by_thread.get(thread_id) {
            return Err(BindingError::AlreadyBound {
                thread_id: thread_id.to_string(),
                word: existing.clone(),
            });
        }
        self.by_thread
            .insert(thread_id.to_string(), word.to_string());
        Ok(())
    }
}
