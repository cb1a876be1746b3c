//! Agent System
//!
//! Workflow nodes that run inside the post-generation graph. The graph
//! engine owns state and routing; a node receives the state and a
//! [`NodeContext`] carrying the store bound to this invocation, and
//! returns the delta to merge back.
//!
//! ## Reflection Graph
//!
//! ```text
//!   START
//!     │  FeedbackSession
//!     ▼
//! ┌─────────────┐   read rules ┌────────────┐
//! │ Reflection  │ ───────────► │ RuleStore  │
//! │    Node     │ ◄─────────── │            │
//! └─────────────┘  write rules └────────────┘
//!     │   │
//!     │   └── 1–2 model calls (update / propose + merge)
//!     ▼
//!    END   (empty StateUpdate)
//! ```

pub mod reflection;

pub use reflection::{ReflectionAgent, ReflectionOutcome, UpdateStrategy};

use crate::models::{FeedbackSession, StateUpdate};
use crate::store::RuleStore;
use crate::types::{AppError, AppResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Per-invocation context supplied by the graph engine
#[derive(Clone, Default)]
pub struct NodeContext {
    store: Option<Arc<dyn RuleStore>>,
}

impl NodeContext {
    /// Context with no store bound
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: Arc<dyn RuleStore>) -> Self {
        Self { store: Some(store) }
    }

    /// The bound store; nodes that persist anything fail without one
    pub fn store(&self) -> AppResult<&dyn RuleStore> {
        self.store.as_deref().ok_or(AppError::StoreNotConfigured)
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }
}

#[async_trait]
pub trait Node: Send + Sync {
    type State: Send + Sync;

    fn name(&self) -> &'static str;

    async fn invoke(&self, state: &Self::State, ctx: &NodeContext) -> AppResult<StateUpdate>;
}

/// Run the single-node reflection graph: START → reflection → END
pub async fn run_reflection_graph(
    agent: &ReflectionAgent,
    session: &FeedbackSession,
    ctx: &NodeContext,
) -> AppResult<StateUpdate> {
    info!(
        node = agent.name(),
        feedback_len = session.user_feedback.len(),
        has_revision = session.revised_post.is_some(),
        "Starting reflection graph"
    );

    let update = agent.invoke(session, ctx).await?;

    info!(node = agent.name(), "Reflection graph complete");
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn test_context_without_store() {
        let ctx = NodeContext::new();
        assert!(!ctx.has_store());
        assert!(matches!(ctx.store(), Err(AppError::StoreNotConfigured)));
    }

    #[test]
    fn test_context_with_store() {
        let ctx = NodeContext::with_store(Arc::new(InMemoryStore::new()));
        assert!(ctx.has_store());
        assert!(ctx.store().is_ok());
    }
}
