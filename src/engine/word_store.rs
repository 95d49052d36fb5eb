use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SCORE_EMA_ALPHA: f64 = 0.3;
const MAX_SCORE: f64 = 100.0;

/// What the user told us about a word on their first reply in its thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorKnowledge {
    /// No reply yet. At most one entry is ever in this state.
    Pending,
    KnownBefore,
    LearnedNew,
}

impl PriorKnowledge {
    pub fn is_resolved(self) -> bool {
        !matches!(self, PriorKnowledge::Pending)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizCategory {
    MultipleChoice,
    FreeTextMeaning,
    ContextualUsage,
}

impl QuizCategory {
    pub const ALL: [QuizCategory; 3] = [
        QuizCategory::MultipleChoice,
        QuizCategory::FreeTextMeaning,
        QuizCategory::ContextualUsage,
    ];

    pub fn index(self) -> usize {
        match self {
            QuizCategory::MultipleChoice => 0,
            QuizCategory::FreeTextMeaning => 1,
            QuizCategory::ContextualUsage => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuizCategory::MultipleChoice => "multiple-choice",
            QuizCategory::FreeTextMeaning => "free-text meaning",
            QuizCategory::ContextualUsage => "contextual usage",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizStat {
    pub asked_count: u32,
    /// Exponentially weighted score in 0..=100.
    pub weighted_score: f64,
}

impl QuizStat {
    pub fn record(&mut self, score: f64) {
        let score = score.clamp(0.0, MAX_SCORE);
        self.asked_count += 1;
        if self.asked_count == 1 {
            self.weighted_score = score;
        } else {
            self.weighted_score =
                SCORE_EMA_ALPHA * score + (1.0 - SCORE_EMA_ALPHA) * self.weighted_score;
        }
        self.weighted_score = self.weighted_score.clamp(0.0, MAX_SCORE);
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WordEntry {
    pub word: String,
    pub prior_knowledge: PriorKnowledge,
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub quiz_stats: [QuizStat; 3],
    #[serde(default)]
    pub meanings: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub theme: Option<String>,
}

impl WordEntry {
    pub fn new(word: &str, thread_id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            word: word.trim().to_string(),
            prior_knowledge: PriorKnowledge::Pending,
            thread_id: thread_id.to_string(),
            created_at,
            quiz_stats: [QuizStat::default(); 3],
            meanings: Vec::new(),
            examples: Vec::new(),
            theme: None,
        }
    }

    pub fn stat(&self, category: QuizCategory) -> &QuizStat {
        &self.quiz_stats[category.index()]
    }

    /// Text handed to the judge so it can grade an answer about this word.
    pub fn reference_context(&self) -> String {
        let mut out = format!("Word: {}\n", self.word);
        if !self.meanings.is_empty() {
            out.push_str("Meanings:\n");
            for meaning in &self.meanings {
                out.push_str(&format!("- {meaning}\n"));
            }
        }
        if !self.examples.is_empty() {
            out.push_str("Examples:\n");
            for example in &self.examples {
                out.push_str(&format!("- {example}\n"));
            }
        }
        out.trim_end().to_string()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("word '{0}' already exists")]
    DuplicateWord(String),
    #[error("thread '{0}' is already bound to a word")]
    DuplicateThread(String),
    #[error("word '{0}' is still awaiting a response")]
    PendingWordExists(String),
    #[error("no word named '{0}'")]
    UnknownWord(String),
    #[error("word '{0}' was already resolved")]
    AlreadyResolved(String),
    #[error("cannot resolve a word back to pending")]
    PendingIsNotAResolution,
}

pub fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}

/// Every word ever introduced, oldest first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WordStore {
    entries: Vec<WordEntry>,
}

impl WordStore {
    /// Build from persisted entries, keeping the first occurrence of any
    /// duplicate word or thread and at most one pending entry (the newest
    /// one left after duplicates are dropped).
    pub fn from_entries(mut entries: Vec<WordEntry>) -> Self {
        entries.sort_by_key(|e| e.created_at);

        let mut store = Self::default();
        for entry in entries {
            if store.contains_word(&entry.word) || store.find_by_thread(&entry.thread_id).is_some()
            {
                continue;
            }
            store.entries.push(entry);
        }

        // A second pending entry can only come from a hand-edited file.
        if let Some(newest) = store
            .entries
            .iter()
            .rposition(|e| e.prior_knowledge == PriorKnowledge::Pending)
        {
            for entry in &mut store.entries[..newest] {
                if entry.prior_knowledge == PriorKnowledge::Pending {
                    entry.prior_knowledge = PriorKnowledge::LearnedNew;
                }
            }
        }
        store
    }

    pub fn entries(&self) -> &[WordEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_word(&self, word: &str) -> bool {
        self.find(word).is_some()
    }

    pub fn find(&self, word: &str) -> Option<&WordEntry> {
        let key = normalize_word(word);
        self.entries.iter().find(|e| normalize_word(&e.word) == key)
    }

    pub fn find_by_thread(&self, thread_id: &str) -> Option<&WordEntry> {
        self.entries.iter().find(|e| e.thread_id == thread_id)
    }

    /// The word still waiting for its first reply, if any.
    pub fn current_word(&self) -> Option<&WordEntry> {
        self.entries
            .iter()
            .find(|e| e.prior_knowledge == PriorKnowledge::Pending)
    }

    pub fn with_knowledge(&self, knowledge: PriorKnowledge) -> impl Iterator<Item = &WordEntry> {
        self.entries
            .iter()
            .filter(move |e| e.prior_knowledge == knowledge)
    }

    /// Most recently created entries first, up to `limit`.
    pub fn most_recent(&self, limit: usize) -> impl Iterator<Item = &WordEntry> {
        self.entries.iter().rev().take(limit)
    }

    pub fn insert(&mut self, entry: WordEntry) -> Result<(), StoreError> {
        if self.contains_word(&entry.word) {
            return Err(StoreError::DuplicateWord(entry.word));
        }
        if self.find_by_thread(&entry.thread_id).is_some() {
            return Err(StoreError::DuplicateThread(entry.thread_id));
        }
        if entry.prior_knowledge == PriorKnowledge::Pending
            && let Some(current) = self.current_word()
        {
            return Err(StoreError::PendingWordExists(current.word.clone()));
        }
        // Keep chronological order even if a caller supplies an older timestamp.
        let pos = self
            .entries
            .partition_point(|e| e.created_at <= entry.created_at);
        self.entries.insert(pos, entry);
        Ok(())
    }

    /// Move a pending word to its terminal classification. Only succeeds once.
    pub fn resolve(&mut self, word: &str, knowledge: PriorKnowledge) -> Result<(), StoreError> {
        if knowledge == PriorKnowledge::Pending {
            return Err(StoreError::PendingIsNotAResolution);
        }
        let entry = self.find_mut(word)?;
        if entry.prior_knowledge.is_resolved() {
            return Err(StoreError::AlreadyResolved(entry.word.clone()));
        }
        entry.prior_knowledge = knowledge;
        Ok(())
    }

    pub fn record_quiz_result(
        &mut self,
        word: &str,
        category: QuizCategory,
        score: f64,
    ) -> Result<QuizStat, StoreError> {
        let entry = self.find_mut(word)?;
        let stat = &mut entry.quiz_stats[category.index()];
        stat.record(score);
        Ok(*stat)
    }

    fn find_mut(&mut self, word: &str) -> Result<&mut WordEntry, StoreError> {
        let key = normalize_word(word);
        self.entries
            .iter_mut()
            .find(|e| normalize_word(&e.word) == key)
            .ok_or_else(|| StoreError::UnknownWord(word.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn resolved(word: &str, thread: &str, minutes: i64, knowledge: PriorKnowledge) -> WordEntry {
        let mut entry = WordEntry::new(word, thread, at(minutes));
        entry.prior_knowledge = knowledge;
        entry
    }

    #[test]
    fn test_insert_rejects_case_insensitive_duplicate() {
        let mut store = WordStore::default();
        store
            .insert(resolved("Ephemeral", "t1", 0, PriorKnowledge::KnownBefore))
            .unwrap();
        let err = store
            .insert(WordEntry::new("ephemeral", "t2", at(1)))
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateWord("ephemeral".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_rejects_reused_thread() {
        let mut store = WordStore::default();
        store
            .insert(resolved("laconic", "t1", 0, PriorKnowledge::LearnedNew))
            .unwrap();
        let err = store.insert(WordEntry::new("terse", "t1", at(1))).unwrap_err();
        assert_eq!(err, StoreError::DuplicateThread("t1".to_string()));
    }

    #[test]
    fn test_insert_refuses_second_pending_word() {
        let mut store = WordStore::default();
        store.insert(WordEntry::new("laconic", "t1", at(0))).unwrap();
        let err = store.insert(WordEntry::new("terse", "t2", at(1))).unwrap_err();
        assert_eq!(err, StoreError::PendingWordExists("laconic".to_string()));
        assert_eq!(store.current_word().unwrap().word, "laconic");
    }

    #[test]
    fn test_resolve_only_once() {
        let mut store = WordStore::default();
        store.insert(WordEntry::new("laconic", "t1", at(0))).unwrap();
        store.resolve("LACONIC", PriorKnowledge::LearnedNew).unwrap();
        assert!(store.current_word().is_none());

        let err = store
            .resolve("laconic", PriorKnowledge::KnownBefore)
            .unwrap_err();
        assert_eq!(err, StoreError::AlreadyResolved("laconic".to_string()));
        assert_eq!(
            store.find("laconic").unwrap().prior_knowledge,
            PriorKnowledge::LearnedNew
        );
    }

    #[test]
    fn test_resolve_to_pending_is_rejected() {
        let mut store = WordStore::default();
        store.insert(WordEntry::new("laconic", "t1", at(0))).unwrap();
        assert_eq!(
            store.resolve("laconic", PriorKnowledge::Pending),
            Err(StoreError::PendingIsNotAResolution)
        );
    }

    #[test]
    fn test_entries_stay_chronological() {
        let mut store = WordStore::default();
        store
            .insert(resolved("second", "t2", 10, PriorKnowledge::KnownBefore))
            .unwrap();
        store
            .insert(resolved("first", "t1", 0, PriorKnowledge::KnownBefore))
            .unwrap();
        let words: Vec<&str> = store.entries().iter().map(|e| e.word.as_str()).collect();
        assert_eq!(words, vec!["first", "second"]);
        let recent: Vec<&str> = store.most_recent(1).map(|e| e.word.as_str()).collect();
        assert_eq!(recent, vec!["second"]);
    }

    #[test]
    fn test_quiz_score_ema() {
        let mut store = WordStore::default();
        store
            .insert(resolved("laconic", "t1", 0, PriorKnowledge::LearnedNew))
            .unwrap();

        let first = store
            .record_quiz_result("laconic", QuizCategory::MultipleChoice, 100.0)
            .unwrap();
        assert_eq!(first.asked_count, 1);
        assert!((first.weighted_score - 100.0).abs() < f64::EPSILON);

        let second = store
            .record_quiz_result("laconic", QuizCategory::MultipleChoice, 0.0)
            .unwrap();
        assert_eq!(second.asked_count, 2);
        assert!((second.weighted_score - 70.0).abs() < 1e-9);

        // Other categories untouched.
        let entry = store.find("laconic").unwrap();
        assert_eq!(entry.stat(QuizCategory::ContextualUsage).asked_count, 0);
    }

    #[test]
    fn test_quiz_score_is_clamped() {
        let mut store = WordStore::default();
        store
            .insert(resolved("laconic", "t1", 0, PriorKnowledge::LearnedNew))
            .unwrap();
        let stat = store
            .record_quiz_result("laconic", QuizCategory::FreeTextMeaning, 250.0)
            .unwrap();
        assert!((stat.weighted_score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_quiz_result_unknown_word() {
        let mut store = WordStore::default();
        assert_eq!(
            store
                .record_quiz_result("nope", QuizCategory::MultipleChoice, 50.0)
                .unwrap_err(),
            StoreError::UnknownWord("nope".to_string())
        );
    }

    #[test]
    fn test_from_entries_repairs_extra_pending_and_duplicates() {
        let entries = vec![
            WordEntry::new("older", "t1", at(0)),
            WordEntry::new("Older", "t9", at(1)),
            WordEntry::new("newer", "t2", at(5)),
        ];
        let store = WordStore::from_entries(entries);
        assert_eq!(store.len(), 2);
        assert_eq!(store.current_word().unwrap().word, "newer");
        assert_eq!(
            store.find("older").unwrap().prior_knowledge,
            PriorKnowledge::LearnedNew
        );
    }

    #[test]
    fn test_duplicate_newest_pending_does_not_demote_survivor() {
        let mut known = WordEntry::new("laconic", "t0", at(0));
        known.prior_knowledge = PriorKnowledge::KnownBefore;
        let entries = vec![
            known,
            WordEntry::new("terse", "t1", at(1)),
            WordEntry::new("Laconic", "t2", at(2)),
        ];
        let store = WordStore::from_entries(entries);
        assert_eq!(store.len(), 2);
        assert_eq!(store.current_word().unwrap().word, "terse");
        assert_eq!(
            store.find("laconic").unwrap().prior_knowledge,
            PriorKnowledge::KnownBefore
        );
    }

    #[test]
    fn test_reference_context_lists_meanings_and_examples() {
        let mut entry = WordEntry::new("laconic", "t1", at(0));
        entry.meanings = vec!["using very few words".to_string()];
        entry.examples = vec!["His laconic reply ended the talk.".to_string()];
        let ctx = entry.reference_context();
        assert!(ctx.starts_with("Word: laconic"));
        assert!(ctx.contains("- using very few words"));
        assert!(ctx.contains("- His laconic reply ended the talk."));
    }
}
