use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

use crate::engine::word_store::{PriorKnowledge, QuizCategory, WordEntry, WordStore};

/// Share of questions drawn from words the user had to learn.
pub const LEARNED_SHARE: f64 = 0.9;
/// Floor so a perfectly-scored word can still be picked.
pub const WEIGHT_EPSILON: f64 = 1.0;
const UNTESTED_WEIGHT: f64 = 100.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuizItem {
    pub word: String,
    pub category: QuizCategory,
    pub prior_knowledge: PriorKnowledge,
}

/// Least-asked category for this word; ties go to the first in `QuizCategory::ALL`.
pub fn next_category(entry: &WordEntry) -> QuizCategory {
    QuizCategory::ALL
        .into_iter()
        .min_by_key(|&c| entry.stat(c).asked_count)
        .unwrap_or(QuizCategory::MultipleChoice)
}

pub fn selection_weight(entry: &WordEntry, category: QuizCategory) -> f64 {
    let stat = entry.stat(category);
    if stat.asked_count == 0 {
        UNTESTED_WEIGHT
    } else {
        (100.0 - stat.weighted_score).max(WEIGHT_EPSILON)
    }
}

struct Pool<'a> {
    candidates: Vec<&'a WordEntry>,
}

impl<'a> Pool<'a> {
    fn new(store: &'a WordStore, knowledge: PriorKnowledge) -> Self {
        // Store entries are already oldest first.
        Self {
            candidates: store.with_knowledge(knowledge).collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    fn draw<R: Rng>(&mut self, rng: &mut R) -> Option<QuizItem> {
        let weights: Vec<f64> = self
            .candidates
            .iter()
            .map(|e| selection_weight(e, next_category(e)))
            .collect();
        let idx = WeightedIndex::new(&weights).ok()?.sample(rng);
        let entry = self.candidates.remove(idx);
        Some(QuizItem {
            word: entry.word.clone(),
            category: next_category(entry),
            prior_knowledge: entry.prior_knowledge,
        })
    }
}

/// Pick up to `count` distinct words to quiz, 90/10 between learned-new and
/// known-before words, weighted toward poorly-scored and untested material.
/// Pending words are never quizzed.
pub fn select_quiz<R: Rng>(store: &WordStore, count: usize, rng: &mut R) -> Vec<QuizItem> {
    let mut learned = Pool::new(store, PriorKnowledge::LearnedNew);
    let mut known = Pool::new(store, PriorKnowledge::KnownBefore);
    let mut items = Vec::with_capacity(count);

    while items.len() < count {
        let pool = match (learned.is_empty(), known.is_empty()) {
            (true, true) => break,
            (false, true) => &mut learned,
            (true, false) => &mut known,
            (false, false) => {
                if rng.gen_bool(LEARNED_SHARE) {
                    &mut learned
                } else {
                    &mut known
                }
            }
        };
        match pool.draw(rng) {
            Some(item) => items.push(item),
            None => break,
        }
    }

    items
}
