use crate::engine::word_store::{PriorKnowledge, WordEntry, WordStore};

/// Where the learning loop stands as a whole.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No word awaits a reply; a new one may be generated.
    Idle,
    /// A generation cycle is out talking to collaborators.
    Generating,
    /// The current word has not been answered yet. Ticks are no-ops.
    AwaitingResponse { word: String },
}

impl Phase {
    pub fn derive(store: &WordStore, generating: bool) -> Self {
        if let Some(current) = store.current_word() {
            Phase::AwaitingResponse {
                word: current.word.clone(),
            }
        } else if generating {
            Phase::Generating
        } else {
            Phase::Idle
        }
    }
}

/// State of one word thread, as seen by an inbound reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    Unbound,
    AwaitingResponse,
    Tutoring,
}

impl ThreadState {
    pub fn of(entry: Option<&WordEntry>) -> Self {
        match entry.map(|e| e.prior_knowledge) {
            None => ThreadState::Unbound,
            Some(PriorKnowledge::Pending) => ThreadState::AwaitingResponse,
            Some(_) => ThreadState::Tutoring,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    FromBot,
    Duplicate,
    UnboundThread,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Discard(DiscardReason),
    /// First reply was the affirmation: mark known, move on to a new word.
    MarkKnown,
    /// First reply was anything else: mark learned, hand over to the tutor.
    StartTutoring,
    /// Later reply in a resolved thread.
    ContinueTutoring,
    /// Affirmation in a resolved thread: the user asks for another word.
    RequestWord,
}

pub fn route_reply(state: ThreadState, is_affirmation: bool) -> Route {
    match (state, is_affirmation) {
        (ThreadState::Unbound, _) => Route::Discard(DiscardReason::UnboundThread),
        (ThreadState::AwaitingResponse, true) => Route::MarkKnown,
        (ThreadState::AwaitingResponse, false) => Route::StartTutoring,
        (ThreadState::Tutoring, true) => Route::RequestWord,
        (ThreadState::Tutoring, false) => Route::ContinueTutoring,
    }
}

/// Exact match against the configured tokens after trimming; no guessing.
pub fn is_affirmation(text: &str, tokens: &[String]) -> bool {
    let text = text.trim();
    tokens.iter().any(|t| t.trim().eq_ignore_ascii_case(text))
}

/// The token quoted to the user in instructions.
pub fn primary_affirmation(tokens: &[String]) -> &str {
    tokens.first().map(String::as_str).unwrap_or("1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_phase_prefers_pending_word_over_generating() {
        let mut store = WordStore::default();
        assert_eq!(Phase::derive(&store, false), Phase::Idle);
        assert_eq!(Phase::derive(&store, true), Phase::Generating);

        store
            .insert(WordEntry::new("laconic", "t1", Utc::now()))
            .unwrap();
        assert_eq!(
            Phase::derive(&store, true),
            Phase::AwaitingResponse {
                word: "laconic".to_string()
            }
        );
    }

    #[test]
    fn test_routing_table() {
        use DiscardReason::*;
        assert_eq!(route_reply(ThreadState::Unbound, true), Route::Discard(UnboundThread));
        assert_eq!(route_reply(ThreadState::Unbound, false), Route::Discard(UnboundThread));
        assert_eq!(route_reply(ThreadState::AwaitingResponse, true), Route::MarkKnown);
        assert_eq!(route_reply(ThreadState::AwaitingResponse, false), Route::StartTutoring);
        assert_eq!(route_reply(ThreadState::Tutoring, true), Route::RequestWord);
        assert_eq!(route_reply(ThreadState::Tutoring, false), Route::ContinueTutoring);
    }

    #[test]
    fn test_thread_state_follows_flag() {
        let mut entry = WordEntry::new("laconic", "t1", Utc::now());
        assert_eq!(ThreadState::of(None), ThreadState::Unbound);
        assert_eq!(ThreadState::of(Some(&entry)), ThreadState::AwaitingResponse);
        entry.prior_knowledge = PriorKnowledge::KnownBefore;
        assert_eq!(ThreadState::of(Some(&entry)), ThreadState::Tutoring);
    }

    #[test]
    fn test_affirmation_is_exact_token_match() {
        let tokens = vec!["1".to_string(), "Knew it".to_string()];
        assert!(is_affirmation(" 1\n", &tokens));
        assert!(is_affirmation("knew it", &tokens));
        assert!(!is_affirmation("1 I think", &tokens));
        assert!(!is_affirmation("I knew it already", &tokens));
        assert!(!is_affirmation("yes", &tokens));
    }

    #[test]
    fn test_primary_affirmation_falls_back_to_one() {
        assert_eq!(primary_affirmation(&["knew it".to_string()]), "knew it");
        assert_eq!(primary_affirmation(&[]), "1");
    }
}
