pub mod action;
pub mod agent;
pub mod content;
pub mod desktop;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod llm;
pub mod logger;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use agent::{AgentConfig, CancellationToken, Orchestrator};
pub use error::{DeskpilotError, Result};
pub use history::{Message, Part, Role};
