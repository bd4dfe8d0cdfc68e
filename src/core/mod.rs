// src/core/mod.rs
mod engine;
mod prompts;
mod render;
mod scanner;
mod session;
mod structure;
mod writer;

pub mod llm;

pub use session::{PageStatus, WikiSelection, WikiSession};
pub use structure::WikiType;

// Export the main engine
pub use engine::{ContentReport, Engine};
