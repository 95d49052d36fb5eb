pub mod binding;
pub mod dedupe;
pub mod difficulty;
pub mod orchestrator;
pub mod quiz;
pub mod state;
pub mod word_store;

pub use orchestrator::{Collaborators, Orchestrator, OrchestratorSettings};
