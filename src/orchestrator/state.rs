//! Run state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "tool", rename_all = "snake_case")]
pub enum RunState {
    /// Waiting for the planner to pick the next step.
    AwaitingPlan,
    /// A tool is in flight.
    Invoking(String),
    /// The planner produced a final response.
    Done,
    /// A tool or the planner failed.
    Failed,
}

impl RunState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: &RunState) -> bool {
        use RunState::*;

        matches!(
            (self, target),
            (AwaitingPlan, Invoking(_)) | (AwaitingPlan, Done) | (AwaitingPlan, Failed) |
            (Invoking(_), AwaitingPlan) | (Invoking(_), Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingPlan => write!(f, "awaiting_plan"),
            Self::Invoking(tool) => write!(f, "invoking({})", tool),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A state transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: RunState,
    pub to: RunState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Current state plus the history of how the run got there.
#[derive(Debug, Clone, Serialize)]
pub struct RunLifecycle {
    state: RunState,
    transitions: Vec<StateTransition>,
}

impl RunLifecycle {
    pub fn new() -> Self {
        Self {
            state: RunState::AwaitingPlan,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Transition to a new state.
    pub fn transition_to(
        &mut self,
        new_state: RunState,
        reason: Option<String>,
    ) -> Result<(), String> {
        if !self.state.can_transition_to(&new_state) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.state, new_state
            ));
        }

        tracing::trace!(from = %self.state, to = %new_state, "Run state transition");
        self.transitions.push(StateTransition {
            from: self.state.clone(),
            to: new_state.clone(),
            timestamp: Utc::now(),
            reason,
        });
        self.state = new_state;
        Ok(())
    }
}

impl Default for RunLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoking() -> RunState {
        RunState::Invoking("execute_sql_query".to_string())
    }

    #[test]
    fn test_allowed_transitions() {
        assert!(RunState::AwaitingPlan.can_transition_to(&invoking()));
        assert!(RunState::AwaitingPlan.can_transition_to(&RunState::Done));
        assert!(RunState::AwaitingPlan.can_transition_to(&RunState::Failed));
        assert!(invoking().can_transition_to(&RunState::AwaitingPlan));
        assert!(invoking().can_transition_to(&RunState::Failed));
    }

    #[test]
    fn test_forbidden_transitions() {
        // One tool in flight at a time.
        assert!(!invoking().can_transition_to(&invoking()));
        // Only the planner can end a run successfully.
        assert!(!invoking().can_transition_to(&RunState::Done));
        assert!(!RunState::Done.can_transition_to(&RunState::AwaitingPlan));
        assert!(!RunState::Failed.can_transition_to(&invoking()));
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::AwaitingPlan.is_terminal());
        assert!(!invoking().is_terminal());
    }

    #[test]
    fn test_lifecycle_records_transitions() {
        let mut lifecycle = RunLifecycle::new();
        lifecycle.transition_to(invoking(), None).unwrap();
        lifecycle.transition_to(RunState::AwaitingPlan, None).unwrap();
        lifecycle
            .transition_to(RunState::Done, Some("final response".into()))
            .unwrap();

        assert_eq!(lifecycle.state(), &RunState::Done);
        assert_eq!(lifecycle.transitions().len(), 3);
        assert_eq!(lifecycle.transitions()[0].from, RunState::AwaitingPlan);

        let err = lifecycle.transition_to(RunState::Failed, None).unwrap_err();
        assert!(err.contains("Cannot transition from done"));
        assert_eq!(lifecycle.transitions().len(), 3);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(invoking()).unwrap();
        assert_eq!(json["state"], "invoking");
        assert_eq!(json["tool"], "execute_sql_query");
    }
}
