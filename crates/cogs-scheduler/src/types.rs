use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A recurring task body. The return value is only surfaced through
/// [`ThreadController::manual_run`]; timer fires discard it.
///
/// [`ThreadController::manual_run`]: crate::ThreadController::manual_run
pub type TaskBody = Arc<dyn Fn() -> Option<Value> + Send + Sync>;

/// Step guard: whether the step's action should run on this tick.
pub type GuardFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Step action, returning an explicit [`StepOutcome`].
pub type ActionFn = Arc<dyn Fn() -> StepOutcome + Send + Sync>;

/// Side effect fired once, right after a step advances.
pub type AdvanceFn = Arc<dyn Fn() + Send + Sync>;

/// Result of a step action. Explicit three-valued outcome: there is no
/// truthiness coercion, and "returned nothing" is not a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Not done yet; run the same step again on the next tick.
    Retry,
    /// Done; move to the next step.
    Advance,
    /// The step failed. Reported to the observer, then retried next tick.
    Fail,
}

/// One guarded step in a sequential step machine.
#[derive(Clone)]
pub struct Step {
    pub(crate) guard: GuardFn,
    pub(crate) action: ActionFn,
    pub(crate) on_advance: Option<AdvanceFn>,
}

impl Step {
    pub fn new(
        guard: impl Fn() -> bool + Send + Sync + 'static,
        action: impl Fn() -> StepOutcome + Send + Sync + 'static,
    ) -> Self {
        Self {
            guard: Arc::new(guard),
            action: Arc::new(action),
            on_advance: None,
        }
    }

    /// Attach a side effect fired when this step advances.
    pub fn on_advance(mut self, effect: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_advance = Some(Arc::new(effect));
        self
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("on_advance", &self.on_advance.is_some())
            .finish()
    }
}

/// The controller state persisted to the durable store on every mutation,
/// under `"<controller>-State"`.
///
/// Task and step bodies are code, not data: only names, awake flags and the
/// step cursor survive a reload. The owning script re-registers bodies on
/// every startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    /// Registered task names (controller-prefixed), in registration order.
    #[serde(default)]
    pub task_names: Vec<String>,
    /// Awake flag per task, parallel to `task_names`.
    #[serde(default)]
    pub task_awake: Vec<bool>,
    /// Index of the next step to attempt.
    #[serde(default)]
    pub step_current: usize,
    /// Whether a step sequence was mid-flight.
    #[serde(default)]
    pub step_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_json() {
        let state = ControllerState {
            task_names: vec!["Portal-poll".to_string()],
            task_awake: vec![true],
            step_current: 2,
            step_active: true,
        };
        let json = serde_json::to_value(&state).unwrap();
        let back: ControllerState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn missing_fields_default() {
        let state: ControllerState = serde_json::from_str("{}").unwrap();
        assert_eq!(state, ControllerState::default());
        assert!(!state.step_active);
    }
}
