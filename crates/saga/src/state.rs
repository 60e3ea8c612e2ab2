//! Lifecycle of one buy or sell saga execution.

use common::SagaId;
use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///     │                    └──► Compensating ──► Failed
///     └──────────────────────────────────────► Failed   (catalog rejected the request)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    #[default]
    NotStarted,

    /// Forward stages are being executed.
    Running,

    /// A line failed; committed stages are being undone.
    Compensating,

    Completed,

    Failed,
}

impl SagaState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Returns true if moving from `self` to `next` is a valid transition.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        matches!(
            (self, next),
            (SagaState::NotStarted, SagaState::Running)
                | (SagaState::NotStarted, SagaState::Failed)
                | (SagaState::Running, SagaState::Completed)
                | (SagaState::Running, SagaState::Compensating)
                | (SagaState::Compensating, SagaState::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running => "Running",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks and logs the state of one saga execution.
#[derive(Debug, Clone)]
pub struct SagaLifecycle {
    saga_id: SagaId,
    saga_type: &'static str,
    state: SagaState,
}

impl SagaLifecycle {
    pub fn new(saga_id: SagaId, saga_type: &'static str) -> Self {
        Self {
            saga_id,
            saga_type,
            state: SagaState::NotStarted,
        }
    }

    pub fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Moves to `next`. Invalid transitions are logged and ignored.
    pub fn advance(&mut self, next: SagaState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::error!(
                saga_id = %self.saga_id,
                saga_type = self.saga_type,
                from = %self.state,
                to = %next,
                "Invalid saga state transition"
            );
            return false;
        }
        tracing::info!(
            saga_id = %self.saga_id,
            saga_type = self.saga_type,
            from = %self.state,
            to = %next,
            "Saga state changed"
        );
        self.state = next;
        true
    }
}
