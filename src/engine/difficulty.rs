use serde::{Deserialize, Serialize};

use crate::engine::word_store::{PriorKnowledge, WordStore, normalize_word};

/// Everything the word generator needs to pick the next word.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Every word ever introduced; none of these may be generated again.
    pub existing_words: Vec<String>,
    pub known_words: Vec<String>,
    pub learned_words: Vec<String>,
    /// known / (known + learned); 1.0 on a cold start.
    pub known_ratio: f64,
    pub theme: Option<String>,
    /// Candidates rejected earlier in the same generation cycle.
    #[serde(default)]
    pub rejected: Vec<String>,
}

impl GenerationRequest {
    /// True if `word` collides, case-insensitively, with an existing or
    /// already-rejected word.
    pub fn excludes(&self, word: &str) -> bool {
        let key = normalize_word(word);
        self.existing_words
            .iter()
            .chain(self.rejected.iter())
            .any(|w| normalize_word(w) == key)
    }

    pub fn reject(&mut self, word: &str) {
        if !self
            .rejected
            .iter()
            .any(|w| normalize_word(w) == normalize_word(word))
        {
            self.rejected.push(word.trim().to_string());
        }
    }
}

pub fn known_ratio(known: usize, learned: usize) -> f64 {
    if known + learned == 0 {
        1.0
    } else {
        known as f64 / (known + learned) as f64
    }
}

pub fn generation_request(store: &WordStore, theme: Option<&str>) -> GenerationRequest {
    let known_words: Vec<String> = store
        .with_knowledge(PriorKnowledge::KnownBefore)
        .map(|e| e.word.clone())
        .collect();
    let learned_words: Vec<String> = store
        .with_knowledge(PriorKnowledge::LearnedNew)
        .map(|e| e.word.clone())
        .collect();

    GenerationRequest {
        existing_words: store.entries().iter().map(|e| e.word.clone()).collect(),
        known_ratio: known_ratio(known_words.len(), learned_words.len()),
        known_words,
        learned_words,
        theme: theme.map(str::to_string),
        rejected: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::word_store::WordEntry;
    use chrono::{Duration, Utc};

    fn store_with(words: &[(&str, PriorKnowledge)]) -> WordStore {
        let base = Utc::now();
        let entries = words
            .iter()
            .enumerate()
            .map(|(i, (w, k))| {
                let mut e = WordEntry::new(w, &format!("t{i}"), base + Duration::minutes(i as i64));
                e.prior_knowledge = *k;
                e
            })
            .collect();
        WordStore::from_entries(entries)
    }

    #[test]
    fn test_cold_start_ratio_is_one() {
        let req = generation_request(&WordStore::default(), None);
        assert!((req.known_ratio - 1.0).abs() < f64::EPSILON);
        assert!(req.existing_words.is_empty());
        assert!(req.rejected.is_empty());
        assert_eq!(req.theme, None);
    }

    #[test]
    fn test_ratio_and_partition() {
        let store = store_with(&[
            ("alpha", PriorKnowledge::KnownBefore),
            ("beta", PriorKnowledge::LearnedNew),
            ("gamma", PriorKnowledge::LearnedNew),
            ("delta", PriorKnowledge::KnownBefore),
            ("epsilon", PriorKnowledge::Pending),
        ]);
        let req = generation_request(&store, Some("ocean"));
        assert!((req.known_ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(req.existing_words.len(), 5);
        assert_eq!(req.known_words, vec!["alpha", "delta"]);
        assert_eq!(req.learned_words, vec!["beta", "gamma"]);
        assert_eq!(req.theme.as_deref(), Some("ocean"));
    }

    #[test]
    fn test_request_is_deterministic() {
        let store = store_with(&[
            ("alpha", PriorKnowledge::KnownBefore),
            ("beta", PriorKnowledge::LearnedNew),
        ]);
        assert_eq!(generation_request(&store, None), generation_request(&store, None));
    }

    #[test]
    fn test_excludes_is_case_insensitive() {
        let store = store_with(&[("Ephemeral", PriorKnowledge::LearnedNew)]);
        let mut req = generation_request(&store, None);
        assert!(req.excludes("ephemeral "));
        assert!(!req.excludes("transient"));

        req.reject("Transient");
        req.reject("transient");
        assert_eq!(req.rejected, vec!["Transient"]);
        assert!(req.excludes("TRANSIENT"));
    }
}
