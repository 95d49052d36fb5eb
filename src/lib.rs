// Library target holds the whole learning loop; main.rs only wires the
// concrete Slack/OpenAI collaborators and the CLI around it.

pub mod collab;
pub mod config;
pub mod engine;
pub mod service;
pub mod store;
