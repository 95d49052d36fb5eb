pub mod messages;
#[cfg(feature = "network")]
pub mod openai;
pub mod prompts;
#[cfg(feature = "network")]
pub mod slack;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::difficulty::GenerationRequest;

#[derive(Debug, Error)]
pub enum CollabError {
    /// Network or API failure that survived the collaborator's own retries.
    #[error("transient failure: {0}")]
    Transient(String),
    /// The collaborator answered, but not in the agreed shape.
    #[error("malformed output: {0}")]
    Malformed(String),
    /// The remote side refused the request (bad token, unknown channel, ...).
    #[error("request rejected: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    Bot,
    User(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub sender: Sender,
    pub text: String,
    pub ts: String,
}

/// A message delivered to us by the chat platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub thread_id: String,
    pub user_id: String,
    pub text: String,
    pub is_bot: bool,
    #[serde(default)]
    pub event_id: Option<String>,
    pub ts: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedWord {
    pub word: String,
    pub meanings: Vec<String>,
    pub examples: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub correct: bool,
    pub feedback: String,
}

pub trait ChatTransport: Send + Sync {
    /// Post a top-level message; its id doubles as the thread id.
    fn create_thread(&self, text: &str) -> Result<String, CollabError>;
    fn post_reply(&self, thread_id: &str, text: &str) -> Result<String, CollabError>;
    /// All messages in the thread, oldest first, including the opener.
    fn fetch_thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, CollabError>;
}

pub trait WordGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedWord, CollabError>;
}

pub trait Tutor: Send + Sync {
    fn respond(
        &self,
        thread_context: &str,
        latest_message: &str,
        word: &str,
        theme: Option<&str>,
    ) -> Result<String, CollabError>;
}

pub trait Judge: Send + Sync {
    fn judge(
        &self,
        response: &str,
        reference_context: &str,
        tolerance: &str,
    ) -> Result<Verdict, CollabError>;
}
