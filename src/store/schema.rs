use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::engine::word_store::WordEntry;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WordHistoryData {
    pub schema_version: u32,
    pub words: Vec<WordEntry>,
}

impl Default for WordHistoryData {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            words: Vec::new(),
        }
    }
}

impl WordHistoryData {
    pub fn new(words: Vec<WordEntry>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            words,
        }
    }

    /// Files written by a newer build cannot be trusted by this one.
    pub fn is_supported(&self) -> bool {
        self.schema_version <= SCHEMA_VERSION
    }
}

pub const EXPORT_VERSION: u32 = 1;

/// Export contract: the thread binding is always rebuilt from the word
/// history, so it is not part of the payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportData {
    pub vocabot_export_version: u32,
    pub exported_at: DateTime<Utc>,
    pub config: Config,
    pub history: WordHistoryData,
}
