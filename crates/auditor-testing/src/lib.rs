#![allow(clippy::unwrap_used)]

//! # Integration Auditor Testing Utilities
//!
//! Shared test support for the auditor workspace:
//!
//! - **`MockExecutor`**: a scriptable `ActionExecutor` for exercising the
//!   planner/executor pipeline without a real side-effect engine.
//! - **Fixture builders**: CSV row builders matching the ingestor's exact
//!   expected headers, plus a `TierFixture` that writes a full five-table
//!   tier directory to disk.
//! - **Golden snapshot helpers**: thin `insta` wrappers that redact
//!   volatile fields (ids, durations, timestamps) before comparing.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use auditor_testing::{MockExecutor, TierFixture, IntegrationFixture};
//!
//! let executor = MockExecutor::new();
//! let fixture = TierFixture::new().with_integration(IntegrationFixture::new("test-001"));
//! ```

pub mod fixtures;
pub mod mock_executor;
pub mod snapshot;

pub use fixtures::{ChildFixture, ConnectionFixture, IntegrationFixture, TierFixture};
pub use mock_executor::{MockExecutor, MockExecutorBuilder, MockExecutorHandler};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        ChildFixture, ConnectionFixture, IntegrationFixture, MockExecutor, MockExecutorBuilder,
        TierFixture,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_reexports_resolve() {
        let _ = std::any::type_name::<prelude::MockExecutor>();
        let _ = std::any::type_name::<prelude::TierFixture>();
    }

    #[tokio::test]
    async fn mock_executor_is_usable_via_top_level_reexport() {
        use auditor_core::executor::ActionExecutor;
        use auditor_core::model::{ActionMetadata, ActionPayload, ActionTarget, ActionType, ExecutionAction};

        let executor = MockExecutor::new();
        let action = ExecutionAction {
            id: "a1".into(),
            action_type: ActionType::Patch,
            target: ActionTarget {
                target_type: "integration".into(),
                resource_type: "settings".into(),
                resource_id: "r1".into(),
            },
            payload: ActionPayload::default(),
            metadata: ActionMetadata {
                reason: "test".into(),
                priority: 1,
                rollbackable: true,
                dependencies: vec![],
                action_index: 0,
            },
        };
        assert!(executor.execute_action(&action).await.is_ok());
    }
}
