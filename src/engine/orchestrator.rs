use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::collab::messages;
use crate::collab::{
    ChatTransport, CollabError, GeneratedWord, InboundEvent, Judge, Tutor, Verdict, WordGenerator,
};
use crate::config::Config;
use crate::engine::binding::{BindingError, ThreadBinding};
use crate::engine::dedupe::{EventDeduper, dedupe_key};
use crate::engine::difficulty::{self, GenerationRequest};
use crate::engine::quiz::{self, QuizItem};
use crate::engine::state::{
    DiscardReason, Phase, Route, ThreadState, is_affirmation, primary_affirmation, route_reply,
};
use crate::engine::word_store::{PriorKnowledge, QuizStat, StoreError, WordEntry, WordStore};
use crate::store::json_store::JsonStore;
use crate::store::schema::WordHistoryData;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("no unique word after {attempts} attempts (rejected: {rejected:?})")]
    DuplicateExhausted { attempts: u32, rejected: Vec<String> },
    #[error("collaborator failed: {0}")]
    Collaborator(#[from] CollabError),
    #[error("thread {thread_id} left incomplete after {posted} of {total} posts: {source}")]
    PartialPost {
        thread_id: String,
        posted: usize,
        total: usize,
        #[source]
        source: CollabError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Binding(#[from] BindingError),
}

#[derive(Debug)]
pub enum TickOutcome {
    Posted { word: String, thread_id: String },
    /// A word is still awaiting its first reply.
    Dormant { word: String },
    /// Another generation cycle already holds the claim.
    InFlight,
    /// The cycle failed; nothing was committed and the next tick retries.
    Failed(CycleError),
}

impl TickOutcome {
    /// True when nothing more needs to happen until the next scheduled time.
    pub fn is_settled(&self) -> bool {
        !matches!(self, TickOutcome::Failed(_))
    }
}

#[derive(Debug)]
pub enum ReplyOutcome {
    Discarded(DiscardReason),
    Known { word: String, next: TickOutcome },
    Tutored { word: String, first_reply: bool },
    /// Affirmation in a resolved thread; `next` says whether a word was posted.
    WordRequested { word: String, next: TickOutcome },
}

#[derive(Debug)]
pub struct QuizGrade {
    pub verdict: Verdict,
    pub stat: QuizStat,
}

#[derive(Clone)]
pub struct Collaborators {
    pub chat: Arc<dyn ChatTransport>,
    pub generator: Arc<dyn WordGenerator>,
    pub tutor: Arc<dyn Tutor>,
    pub judge: Arc<dyn Judge>,
}

#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub theme: Option<String>,
    pub affirmation_tokens: Vec<String>,
    pub max_generation_attempts: u32,
    pub quiz_tolerance: String,
    pub event_cache_ttl: Duration,
    pub event_cache_max_size: usize,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            theme: config.theme.clone(),
            affirmation_tokens: config.affirmation_tokens.clone(),
            max_generation_attempts: config.max_generation_attempts.max(1),
            quiz_tolerance: config.quiz_tolerance.clone(),
            event_cache_ttl: Duration::from_secs(config.event_cache_ttl_secs),
            event_cache_max_size: config.event_cache_max_size,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

struct Inner {
    store: WordStore,
    binding: ThreadBinding,
    generating: bool,
    seen_events: EventDeduper,
}

impl Inner {
    fn phase(&self) -> Phase {
        Phase::derive(&self.store, self.generating)
    }
}

/// Clears the in-flight flag however the generation cycle ends.
struct GenerationClaim<'a> {
    inner: &'a Mutex<Inner>,
}

impl Drop for GenerationClaim<'_> {
    fn drop(&mut self) {
        lock(self.inner).generating = false;
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives the word thread lifecycle. All state decisions happen under one
/// lock; collaborator calls happen outside it.
pub struct Orchestrator {
    inner: Mutex<Inner>,
    collab: Collaborators,
    settings: OrchestratorSettings,
    persistence: Option<JsonStore>,
}

impl Orchestrator {
    pub fn new(collab: Collaborators, settings: OrchestratorSettings, store: WordStore) -> Self {
        let binding = ThreadBinding::from_entries(store.entries());
        let seen_events =
            EventDeduper::new(settings.event_cache_ttl, settings.event_cache_max_size);
        Self {
            inner: Mutex::new(Inner {
                store,
                binding,
                generating: false,
                seen_events,
            }),
            collab,
            settings,
            persistence: None,
        }
    }

    /// Load history from `json` and write every committed change back to it.
    pub fn open(
        collab: Collaborators,
        settings: OrchestratorSettings,
        json: JsonStore,
    ) -> anyhow::Result<Self> {
        if json.check_interrupted_import() {
            warn!("recovered from an interrupted import");
        }
        let history = json.load_history()?;
        let store = WordStore::from_entries(history.words);
        info!(words = store.len(), "loaded word history");
        let mut orchestrator = Self::new(collab, settings, store);
        orchestrator.persistence = Some(json);
        Ok(orchestrator)
    }

    pub fn phase(&self) -> Phase {
        lock(&self.inner).phase()
    }

    pub fn store_snapshot(&self) -> WordStore {
        lock(&self.inner).store.clone()
    }

    /// Threads worth watching for replies, newest first.
    pub fn recent_threads(&self, limit: usize) -> Vec<String> {
        lock(&self.inner)
            .store
            .most_recent(limit)
            .map(|e| e.thread_id.clone())
            .collect()
    }

    /// Scheduler tick or explicit trigger. A no-op while a word awaits its
    /// first reply or another cycle is in flight.
    pub fn tick(&self) -> TickOutcome {
        let request = {
            let mut inner = lock(&self.inner);
            match self.claim_generation(&mut inner) {
                Ok(request) => request,
                Err(outcome) => return outcome,
            }
        };
        self.run_generation(request)
    }

    fn claim_generation(&self, inner: &mut Inner) -> Result<GenerationRequest, TickOutcome> {
        match inner.phase() {
            Phase::AwaitingResponse { word } => {
                debug!(%word, "dormant: current word has no reply yet");
                Err(TickOutcome::Dormant { word })
            }
            Phase::Generating => {
                debug!("generation already in flight");
                Err(TickOutcome::InFlight)
            }
            Phase::Idle => {
                inner.generating = true;
                Ok(difficulty::generation_request(
                    &inner.store,
                    self.settings.theme.as_deref(),
                ))
            }
        }
    }

    fn run_generation(&self, request: GenerationRequest) -> TickOutcome {
        let _claim = GenerationClaim { inner: &self.inner };
        info!(
            existing = request.existing_words.len(),
            known_ratio = request.known_ratio,
            "starting word generation"
        );
        match self.generate_and_post(request) {
            Ok((word, thread_id)) => {
                info!(%word, thread = %thread_id, "posted new word");
                TickOutcome::Posted { word, thread_id }
            }
            Err(e) => {
                error!(error = %e, "word cycle failed; staying idle");
                TickOutcome::Failed(e)
            }
        }
    }

    fn generate_and_post(
        &self,
        request: GenerationRequest,
    ) -> Result<(String, String), CycleError> {
        let theme = request.theme.clone();
        let word = self.generate_unique(request)?;
        let thread_id = self.post_sequence(&word)?;

        let mut inner = lock(&self.inner);
        if let Some(bound) = inner.binding.resolve(&thread_id) {
            return Err(BindingError::AlreadyBound {
                thread_id: thread_id.clone(),
                word: bound.to_string(),
            }
            .into());
        }
        let mut entry = WordEntry::new(&word.word, &thread_id, Utc::now());
        entry.meanings = word.meanings;
        entry.examples = word.examples;
        entry.theme = theme;
        let committed = entry.word.clone();
        inner.store.insert(entry)?;
        inner.binding.bind(&thread_id, &committed)?;
        self.persist(&inner);
        Ok((committed, thread_id))
    }

    fn generate_unique(&self, mut request: GenerationRequest) -> Result<GeneratedWord, CycleError> {
        let budget = self.settings.max_generation_attempts;
        for attempt in 1..=budget {
            match self.collab.generator.generate(&request) {
                Ok(candidate) if request.excludes(&candidate.word) => {
                    warn!(attempt, word = %candidate.word, "generated a duplicate word");
                    request.reject(&candidate.word);
                }
                Ok(candidate) => return Ok(candidate),
                Err(CollabError::Malformed(msg)) => {
                    warn!(attempt, %msg, "generator returned malformed output");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(CycleError::DuplicateExhausted {
            attempts: budget,
            rejected: request.rejected,
        })
    }

    fn post_sequence(&self, word: &GeneratedWord) -> Result<String, CycleError> {
        let affirmation = primary_affirmation(&self.settings.affirmation_tokens);
        let posts = messages::word_sequence(word, affirmation);
        let total = posts.len();
        let thread_id = self.collab.chat.create_thread(&posts[0])?;
        for (i, text) in posts.iter().enumerate().skip(1) {
            if let Err(source) = self.collab.chat.post_reply(&thread_id, text) {
                warn!(thread = %thread_id, posted = i, total, "orphaned partial thread");
                return Err(CycleError::PartialPost {
                    thread_id,
                    posted: i,
                    total,
                    source,
                });
            }
        }
        Ok(thread_id)
    }

    /// Route one inbound chat message. Discards are not errors; tutoring
    /// failures are returned so the transport can redeliver.
    pub fn handle_event(&self, event: &InboundEvent) -> Result<ReplyOutcome, CycleError> {
        if event.is_bot {
            return Ok(ReplyOutcome::Discarded(DiscardReason::FromBot));
        }
        let key = dedupe_key(event.event_id.as_deref(), &event.ts);

        let mut inner = lock(&self.inner);
        if !inner.seen_events.first_sighting(&key) {
            debug!(%key, "duplicate delivery");
            return Ok(ReplyOutcome::Discarded(DiscardReason::Duplicate));
        }

        let entry = inner
            .binding
            .resolve(&event.thread_id)
            .and_then(|w| inner.store.find(w));
        let word = entry.map(|e| e.word.clone()).unwrap_or_default();
        let theme = entry.and_then(|e| e.theme.clone());
        let affirmation = is_affirmation(&event.text, &self.settings.affirmation_tokens);
        let route = route_reply(ThreadState::of(entry), affirmation);

        match route {
            Route::Discard(reason) => {
                debug!(thread = %event.thread_id, ?reason, "discarding message");
                Ok(ReplyOutcome::Discarded(reason))
            }
            Route::MarkKnown => {
                inner.store.resolve(&word, PriorKnowledge::KnownBefore)?;
                self.persist(&inner);
                info!(%word, "user already knew the word");
                let claim = self.claim_generation(&mut inner);
                drop(inner);

                if let Err(e) = self
                    .collab
                    .chat
                    .post_reply(&event.thread_id, messages::known_acknowledgement())
                {
                    warn!(error = %e, "could not acknowledge known word");
                }
                let next = match claim {
                    Ok(request) => self.run_generation(request),
                    Err(outcome) => outcome,
                };
                Ok(ReplyOutcome::Known { word, next })
            }
            Route::StartTutoring | Route::ContinueTutoring => {
                let first_reply = route == Route::StartTutoring;
                if first_reply {
                    inner.store.resolve(&word, PriorKnowledge::LearnedNew)?;
                    self.persist(&inner);
                    info!(%word, "user is learning the word");
                }
                drop(inner);

                let thread_id = &event.thread_id;
                if let Err(e) = self.tutor_reply(thread_id, &word, theme.as_deref(), &event.text) {
                    // Let a redelivery through; the flag is already committed.
                    lock(&self.inner).seen_events.forget(&key);
                    return Err(e);
                }
                Ok(ReplyOutcome::Tutored { word, first_reply })
            }
            Route::RequestWord => {
                let claim = self.claim_generation(&mut inner);
                drop(inner);

                let notice = match &claim {
                    Err(TickOutcome::Dormant { word: waiting }) => {
                        messages::word_already_waiting(waiting)
                    }
                    _ => messages::new_word_coming().to_string(),
                };
                if let Err(e) = self.collab.chat.post_reply(&event.thread_id, &notice) {
                    warn!(error = %e, "could not answer new word request");
                }
                let next = match claim {
                    Ok(request) => self.run_generation(request),
                    Err(outcome) => outcome,
                };
                info!(%word, ?next, "new word requested from a resolved thread");
                Ok(ReplyOutcome::WordRequested { word, next })
            }
        }
    }

    fn tutor_reply(
        &self,
        thread_id: &str,
        word: &str,
        theme: Option<&str>,
        latest: &str,
    ) -> Result<(), CycleError> {
        let history = self.collab.chat.fetch_thread_messages(thread_id)?;
        let context = messages::thread_context(&history);
        let response = self.collab.tutor.respond(&context, latest, word, theme)?;
        self.collab.chat.post_reply(thread_id, &response)?;
        debug!(thread = %thread_id, "posted tutor response");
        Ok(())
    }

    pub fn plan_quiz<R: Rng>(&self, count: usize, rng: &mut R) -> Vec<QuizItem> {
        quiz::select_quiz(&lock(&self.inner).store, count, rng)
    }

    /// Judge one answer and fold the result into the word's quiz stats.
    pub fn grade_answer(&self, item: &QuizItem, answer: &str) -> Result<QuizGrade, CycleError> {
        let reference = lock(&self.inner)
            .store
            .find(&item.word)
            .map(WordEntry::reference_context)
            .ok_or_else(|| StoreError::UnknownWord(item.word.clone()))?;

        let verdict = self
            .collab
            .judge
            .judge(answer, &reference, &self.settings.quiz_tolerance)?;
        let score = if verdict.correct { 100.0 } else { 0.0 };

        let mut inner = lock(&self.inner);
        let stat = inner
            .store
            .record_quiz_result(&item.word, item.category, score)?;
        self.persist(&inner);
        info!(
            word = %item.word,
            category = item.category.as_str(),
            correct = verdict.correct,
            "graded quiz answer"
        );
        Ok(QuizGrade { verdict, stat })
    }

    fn persist(&self, inner: &Inner) {
        let Some(json) = &self.persistence else {
            return;
        };
        let data = WordHistoryData::new(inner.store.entries().to_vec());
        if let Err(e) = json.save_history(&data) {
            error!(error = %e, "failed to save word history");
        }
    }
}
