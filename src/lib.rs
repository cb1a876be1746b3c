// Post Reflection - turns user feedback on generated posts into persisted writing rules

pub mod config;
pub mod models;
pub mod types;
pub mod agents;
pub mod llm;
pub mod rules;
pub mod store;  // Rules store backends (memory, file, Redis)
pub mod utils;

// Re-exports for convenience
pub use agents::{run_reflection_graph, Node, NodeContext, ReflectionAgent, UpdateStrategy};
pub use config::Config;
pub use models::{FeedbackSession, StateUpdate};
pub use rules::RuleSet;
pub use store::{RuleStore, StoreLocation};
pub use types::{AppError, AppResult};
