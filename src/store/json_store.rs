use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Serialize;

use crate::config::Config;
use crate::store::schema::{EXPORT_VERSION, ExportData, WordHistoryData};

const HISTORY_FILE: &str = "words.json";

pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("creating data dir {}", base_dir.display()))?;
        Ok(Self { base_dir })
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let path = self.file_path(name);
        let tmp_path = path.with_extension("tmp");

        let json = serde_json::to_string_pretty(data)?;
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;

        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// A missing file is a fresh start. An unreadable one is an error, so a
    /// corrupt history is never silently replaced by an empty one.
    pub fn load_history(&self) -> Result<WordHistoryData> {
        let path = self.file_path(HISTORY_FILE);
        if !path.exists() {
            return Ok(WordHistoryData::default());
        }
        let content = fs::read_to_string(&path)?;
        let data: WordHistoryData = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        if !data.is_supported() {
            bail!(
                "{} has schema version {}, newer than this build supports",
                path.display(),
                data.schema_version
            );
        }
        Ok(data)
    }

    pub fn save_history(&self, data: &WordHistoryData) -> Result<()> {
        self.save(HISTORY_FILE, data)
    }

    pub fn export_all(&self, config: &Config) -> Result<ExportData> {
        Ok(ExportData {
            vocabot_export_version: EXPORT_VERSION,
            exported_at: Utc::now(),
            config: config.clone(),
            history: self.load_history()?,
        })
    }

    /// Stage to a .tmp file, move the current history to .bak, then rename
    /// the staged file into place. On failure the .bak is restored.
    pub fn import_all(&self, data: &ExportData) -> Result<()> {
        if data.vocabot_export_version != EXPORT_VERSION {
            bail!(
                "Unsupported export version: {} (expected {})",
                data.vocabot_export_version,
                EXPORT_VERSION
            );
        }
        if !data.history.is_supported() {
            bail!(
                "Unsupported history schema version: {}",
                data.history.schema_version
            );
        }

        let final_path = self.file_path(HISTORY_FILE);
        let tmp_path = final_path.with_extension("json.tmp");
        let bak_path = final_path.with_extension("json.bak");

        let json = serde_json::to_string_pretty(&data.history)?;
        if let Err(e) = (|| -> Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            Ok(())
        })() {
            let _ = fs::remove_file(&tmp_path);
            bail!("Import failed during staging: {e}");
        }

        let had_original = final_path.exists();
        if had_original && let Err(e) = fs::rename(&final_path, &bak_path) {
            let _ = fs::remove_file(&tmp_path);
            bail!("Import failed during commit (backup): {e}");
        }

        if let Err(e) = fs::rename(&tmp_path, &final_path) {
            if had_original {
                let _ = fs::rename(&bak_path, &final_path);
            }
            let _ = fs::remove_file(&tmp_path);
            bail!("Import failed during commit (rename): {e}");
        }

        if had_original {
            let _ = fs::remove_file(&bak_path);
        }
        Ok(())
    }

    /// Check for a leftover .bak file from an interrupted import.
    /// Returns true if one was found. If the history itself is missing the
    /// backup is restored, otherwise it is discarded.
    pub fn check_interrupted_import(&self) -> bool {
        let final_path = self.file_path(HISTORY_FILE);
        let bak_path = final_path.with_extension("json.bak");
        if !bak_path.exists() {
            return false;
        }
        if final_path.exists() {
            let _ = fs::remove_file(&bak_path);
        } else {
            let _ = fs::rename(&bak_path, &final_path);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::word_store::WordEntry;
    use tempfile::TempDir;

    fn make_test_store() -> (TempDir, JsonStore) {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path()).unwrap();
        (dir, store)
    }

    fn history(words: &[&str]) -> WordHistoryData {
        WordHistoryData::new(
            words
                .iter()
                .enumerate()
                .map(|(i, w)| WordEntry::new(w, &format!("t{i}"), Utc::now()))
                .collect(),
        )
    }

    #[test]
    fn test_missing_file_is_empty_history() {
        let (_dir, store) = make_test_store();
        let data = store.load_history().unwrap();
        assert!(data.words.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, store) = make_test_store();
        store.save_history(&history(&["laconic"])).unwrap();
        let data = store.load_history().unwrap();
        assert_eq!(data.words.len(), 1);
        assert_eq!(data.words[0].word, "laconic");
        assert!(!store.file_path("words.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let (_dir, store) = make_test_store();
        fs::write(store.file_path(HISTORY_FILE), "{not json").unwrap();
        assert!(store.load_history().is_err());
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let (_dir, store) = make_test_store();
        let mut data = history(&[]);
        data.schema_version = 99;
        store.save_history(&data).unwrap();
        let err = store.load_history().unwrap_err().to_string();
        assert!(err.contains("schema version 99"));
    }

    #[test]
    fn test_round_trip_export_import() {
        let (_dir, store) = make_test_store();
        store.save_history(&history(&["laconic", "terse"])).unwrap();
        let export = store.export_all(&Config::default()).unwrap();
        assert_eq!(export.vocabot_export_version, EXPORT_VERSION);

        let (_dir2, store2) = make_test_store();
        store2.save_history(&history(&["old"])).unwrap();
        store2.import_all(&export).unwrap();

        let imported = store2.load_history().unwrap();
        let words: Vec<&str> = imported.words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(words, vec!["laconic", "terse"]);
        assert!(!store2.file_path("words.json.bak").exists());
    }

    #[test]
    fn test_version_rejection() {
        let (_dir, store) = make_test_store();
        let mut export = store.export_all(&Config::default()).unwrap();
        export.vocabot_export_version = 99;

        let err = store.import_all(&export).unwrap_err().to_string();
        assert!(err.contains("Unsupported export version"));
        assert!(err.contains("99"));
    }

    #[test]
    fn test_import_staging_failure_preserves_original() {
        let (dir, store) = make_test_store();
        store.save_history(&history(&["laconic"])).unwrap();
        let original = fs::read_to_string(store.file_path(HISTORY_FILE)).unwrap();

        let bad_store = JsonStore {
            base_dir: dir.path().join("nonexistent_subdir"),
        };
        let export = store.export_all(&Config::default()).unwrap();
        let err = bad_store.import_all(&export).unwrap_err().to_string();
        assert!(err.contains("Import failed during staging"));

        let after = fs::read_to_string(store.file_path(HISTORY_FILE)).unwrap();
        assert_eq!(original, after);
    }

    #[test]
    fn test_check_interrupted_import() {
        let (_dir, store) = make_test_store();
        assert!(!store.check_interrupted_import());

        // Backup with no live file: restored.
        let backup = "{\"schema_version\":1,\"words\":[]}";
        fs::write(store.file_path("words.json.bak"), backup).unwrap();
        assert!(store.check_interrupted_import());
        assert!(store.file_path(HISTORY_FILE).exists());
        assert!(!store.file_path("words.json.bak").exists());

        // Backup next to a live file: discarded.
        fs::write(store.file_path("words.json.bak"), "{}").unwrap();
        assert!(store.check_interrupted_import());
        assert!(!store.file_path("words.json.bak").exists());
    }
}
