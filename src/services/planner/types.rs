//! Planner Core Types
//!
//! A plan is an ordered list of steps produced from one compound command.
//! Steps run strictly in order; a completed step's result never changes.

use serde::{Deserialize, Serialize};

use crate::utils::error::{AppError, AppResult};

// ============================================================================
// Status Types
// ============================================================================

/// Lifecycle of a whole plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Cancelled
        )
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Pending => write!(f, "pending"),
            PlanStatus::Running => write!(f, "running"),
            PlanStatus::Completed => write!(f, "completed"),
            PlanStatus::Failed => write!(f, "failed"),
            PlanStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Lifecycle of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    /// Pending → Running → {Completed | Failed}; a step that never ran may be Skipped.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Pending, StepStatus::Skipped)
                | (StepStatus::Running, StepStatus::Completed)
                | (StepStatus::Running, StepStatus::Failed)
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

// ============================================================================
// Plan & Step
// ============================================================================

/// One unit of work targeting a single capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Position in the plan, zero-based
    pub index: usize,
    /// Capability name, pseudo-capabilities included
    pub capability: String,
    /// Instruction for the capability
    pub input: String,
    pub status: StepStatus,
    /// Captured output once the step completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Failure description when the step failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Step {
    pub fn new(index: usize, capability: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            index,
            capability: capability.into(),
            input: input.into(),
            status: StepStatus::Pending,
            result: None,
            error: None,
        }
    }
}

/// A decomposed compound command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    /// The originating command text
    pub command: String,
    pub steps: Vec<Step>,
    pub status: PlanStatus,
}

impl Plan {
    /// Create a pending plan from `(capability, input)` pairs
    pub fn new(command: impl Into<String>, steps: Vec<(String, String)>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            command: command.into(),
            steps: steps
                .into_iter()
                .enumerate()
                .map(|(i, (capability, input))| Step::new(i, capability, input))
                .collect(),
            status: PlanStatus::Pending,
        }
    }

    fn step_mut(&mut self, index: usize) -> AppResult<&mut Step> {
        self.steps
            .get_mut(index)
            .ok_or_else(|| AppError::not_found(format!("plan step {}", index)))
    }

    /// Move a step to `next`, rejecting transitions the lifecycle forbids
    pub fn set_step_status(&mut self, index: usize, next: StepStatus) -> AppResult<()> {
        let step = self.step_mut(index)?;
        if !step.status.can_transition_to(next) {
            return Err(AppError::validation(format!(
                "step {} cannot move from {} to {}",
                index, step.status, next
            )));
        }
        step.status = next;
        Ok(())
    }

    /// Record a running step's result and mark it completed
    pub fn complete_step(&mut self, index: usize, result: impl Into<String>) -> AppResult<()> {
        self.set_step_status(index, StepStatus::Completed)?;
        let step = self.step_mut(index)?;
        step.result = Some(result.into());
        Ok(())
    }

    /// Mark a running step failed with a reason
    pub fn fail_step(&mut self, index: usize, error: impl Into<String>) -> AppResult<()> {
        self.set_step_status(index, StepStatus::Failed)?;
        let step = self.step_mut(index)?;
        step.error = Some(error.into());
        Ok(())
    }

    /// Schedule a finished step to run again.
    ///
    /// The original step keeps its status and result; a fresh pending copy
    /// is appended. Returns the new step's index.
    pub fn requeue_step(&mut self, index: usize) -> AppResult<usize> {
        let step = self
            .steps
            .get(index)
            .ok_or_else(|| AppError::not_found(format!("plan step {}", index)))?;
        if !step.status.is_terminal() {
            return Err(AppError::validation(format!(
                "step {} is still {}",
                index, step.status
            )));
        }
        let new_index = self.steps.len();
        let copy = Step::new(new_index, step.capability.clone(), step.input.clone());
        self.steps.push(copy);
        Ok(new_index)
    }

    /// Mark every step that has not started as skipped
    pub fn skip_remaining(&mut self) {
        for step in self.steps.iter_mut() {
            if step.status == StepStatus::Pending {
                step.status = StepStatus::Skipped;
            }
        }
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn completed_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
    }

    /// Capabilities this plan touches, in order, without repeats
    pub fn capabilities(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for step in &self.steps {
            if !names.contains(&step.capability.as_str()) {
                names.push(step.capability.as_str());
            }
        }
        names
    }
}
