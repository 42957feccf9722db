//! Planner
//!
//! Decomposes compound commands into plans and runs them step by step.
//!
//! ## Lifecycle
//!
//! - `plan_command` asks the model for steps. Plans touching a capability that
//!   requires confirmation are held until `resolve_confirmation`.
//! - `run` executes one plan at a time. Cancel, skip and pause requests may
//!   come from any task; the loop honours them before the next step starts.
//! - A failed step skips everything after it.

pub mod decomposer;
pub mod executor;
pub mod interrupt;
pub mod synthesis;
pub mod types;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use parley_core::CapabilityManifest;
use parley_llm::provider::LlmProvider;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PlannerConfig;
use crate::services::collaborators::Collaborators;
use crate::utils::error::{AppError, AppResult};

pub use decomposer::{is_compound_candidate, Decomposition, CONJUNCTION_SIGNALS};
pub use executor::StepExecutor;
pub use interrupt::{InterruptQueue, InterruptSignal, InterruptSource};
pub use types::{Plan, PlanStatus, Step, StepStatus};

/// Result of asking the planner to handle a command
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// Not a multi-step command; routing continues
    Single,
    /// Plan is held; the text asks the user to confirm
    NeedsConfirmation { question: String },
    /// Plan may run right away
    Ready(Plan),
}

/// Result of resolving a held plan
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    /// The plan is released to run
    Confirmed(Plan),
    /// The plan was cancelled; every step is skipped
    Denied(Plan),
    NothingPending,
}

/// A finished plan and the text to speak for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    pub plan: Plan,
    pub text: String,
}

#[derive(Default)]
struct PlannerState {
    /// Plan awaiting a yes/no
    pending: Option<Plan>,
    /// Snapshot of the running plan
    active: Option<Plan>,
}

/// Clears the running flag however `run` exits
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Plan owner for one conversation
pub struct Planner {
    model: Arc<dyn LlmProvider>,
    manifest: CapabilityManifest,
    config: PlannerConfig,
    executor: StepExecutor,
    queue: Arc<InterruptQueue>,
    interrupts: Arc<dyn InterruptSource>,
    /// Queued utterances a finished plan did not consume
    unhandled: Mutex<Vec<String>>,
    state: Mutex<PlannerState>,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
    skip_requested: AtomicBool,
    paused: watch::Sender<bool>,
}

impl Planner {
    pub fn new(
        model: Arc<dyn LlmProvider>,
        manifest: CapabilityManifest,
        config: PlannerConfig,
        collaborators: &Collaborators,
    ) -> Self {
        let executor = StepExecutor::new(
            model.clone(),
            collaborators.skills.clone(),
            collaborators.research.clone(),
        );
        let queue = Arc::new(InterruptQueue::new());
        let (paused, _) = watch::channel(false);
        Self {
            model,
            manifest,
            config,
            executor,
            interrupts: queue.clone(),
            queue,
            unhandled: Mutex::new(Vec::new()),
            state: Mutex::new(PlannerState::default()),
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            skip_requested: AtomicBool::new(false),
            paused,
        }
    }

    /// Poll a different interrupt source instead of the built-in queue
    pub fn with_interrupt_source(mut self, source: Arc<dyn InterruptSource>) -> Self {
        self.interrupts = source;
        self
    }

    fn state(&self) -> MutexGuard<'_, PlannerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn token(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn manifest(&self) -> &CapabilityManifest {
        &self.manifest
    }

    /// Whether `text` is worth a decomposition round trip right now
    pub fn should_decompose(&self, text: &str) -> bool {
        !self.is_active() && !self.has_pending_confirmation() && is_compound_candidate(text)
    }

    /// Decompose a command and apply the confirmation gate.
    pub async fn plan_command(&self, command: &str) -> PlanOutcome {
        let steps = match decomposer::decompose(
            self.model.as_ref(),
            command,
            &self.manifest,
            self.config.max_steps,
        )
        .await
        {
            Decomposition::Single => return PlanOutcome::Single,
            Decomposition::Steps(steps) => steps,
        };

        let plan = Plan::new(command, steps);
        let gated: Vec<&str> = plan
            .capabilities()
            .into_iter()
            .filter(|name| self.manifest.requires_confirmation(name))
            .collect();

        if gated.is_empty() {
            info!(plan_id = %plan.id, steps = plan.steps.len(), "plan ready");
            return PlanOutcome::Ready(plan);
        }

        let question = format!(
            "That plan has {} steps and uses {}. Should I go ahead?",
            plan.steps.len(),
            gated.join(" and ")
        );
        info!(plan_id = %plan.id, gated = ?gated, "plan held for confirmation");
        self.state().pending = Some(plan);
        PlanOutcome::NeedsConfirmation { question }
    }

    pub fn has_pending_confirmation(&self) -> bool {
        self.state().pending.is_some()
    }

    /// Release or cancel the held plan.
    ///
    /// Denial is final: the plan is cancelled and all its steps skipped.
    pub fn resolve_confirmation(&self, confirmed: bool) -> Confirmation {
        let Some(mut plan) = self.state().pending.take() else {
            return Confirmation::NothingPending;
        };
        if confirmed {
            info!(plan_id = %plan.id, "plan confirmed");
            Confirmation::Confirmed(plan)
        } else {
            plan.skip_remaining();
            plan.status = PlanStatus::Cancelled;
            info!(plan_id = %plan.id, "plan denied");
            Confirmation::Denied(plan)
        }
    }

    /// Whether a plan is running
    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn can_pause(&self) -> bool {
        self.is_active() && !self.is_paused()
    }

    /// Snapshot of the running plan
    pub fn active_plan(&self) -> Option<Plan> {
        self.state().active.clone()
    }

    /// Request cancellation; returns whether a plan was running
    pub fn cancel(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.token().cancel();
        true
    }

    /// Skip the next step that has not started
    pub fn skip(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.skip_requested.store(true, Ordering::SeqCst);
        true
    }

    pub fn pause(&self) -> bool {
        if !self.can_pause() {
            return false;
        }
        self.paused.send_replace(true);
        true
    }

    pub fn resume(&self) -> bool {
        if !self.is_paused() {
            return false;
        }
        self.paused.send_replace(false);
        true
    }

    /// Forward an utterance that arrived while a plan is running
    pub fn signal(&self, text: impl Into<String>) {
        self.queue.push(text);
    }

    /// Utterances queued during finished plans that were not interrupts,
    /// oldest first
    pub fn take_unhandled(&self) -> Vec<String> {
        std::mem::take(
            &mut *self
                .unhandled
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    /// Empty the queue once a plan is over so nothing in it reaches the
    /// next plan. Late interrupts are dropped; other utterances are kept
    /// for `take_unhandled`.
    fn settle_queue(&self, plan: &Plan) {
        let (late, kept): (Vec<String>, Vec<String>) = self
            .queue
            .take_all()
            .into_iter()
            .partition(|entry| InterruptSignal::classify(entry) != InterruptSignal::None);
        if !late.is_empty() {
            debug!(plan_id = %plan.id, late = ?late, "interrupts arrived after the last step");
        }
        if !kept.is_empty() {
            self.unhandled
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .extend(kept);
        }
    }

    fn publish(&self, plan: &Plan) {
        self.state().active = Some(plan.clone());
    }

    /// Block while paused. Returns false if cancelled while waiting.
    async fn wait_while_paused(&self, token: &CancellationToken) -> bool {
        let mut rx = self.paused.subscribe();
        loop {
            if !*rx.borrow_and_update() {
                return true;
            }
            tokio::select! {
                _ = token.cancelled() => return false,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return true;
                    }
                }
            }
        }
    }

    /// Execute a plan to the end, honouring interrupts between steps.
    pub async fn run(&self, mut plan: Plan) -> AppResult<PlanReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::validation("another plan is already running"));
        }
        let running = RunningGuard(&self.running);

        let token = {
            let mut current = self.token();
            *current = CancellationToken::new();
            current.clone()
        };
        self.skip_requested.store(false, Ordering::SeqCst);
        self.paused.send_replace(false);

        plan.status = PlanStatus::Running;
        self.publish(&plan);
        info!(plan_id = %plan.id, steps = plan.steps.len(), "plan started");

        let mut previous: Option<String> = None;
        let mut cancelled = false;

        for index in 0..plan.steps.len() {
            match self.interrupts.poll_interrupt() {
                InterruptSignal::Cancel => token.cancel(),
                InterruptSignal::Skip => self.skip_requested.store(true, Ordering::SeqCst),
                InterruptSignal::None => {}
            }
            if token.is_cancelled() || !self.wait_while_paused(&token).await {
                cancelled = true;
                break;
            }

            if self.skip_requested.swap(false, Ordering::SeqCst) {
                info!(plan_id = %plan.id, step = index, "step skipped on request");
                plan.set_step_status(index, StepStatus::Skipped)?;
                self.publish(&plan);
                continue;
            }

            plan.set_step_status(index, StepStatus::Running)?;
            self.publish(&plan);

            let outcome = self
                .executor
                .execute(&plan.steps[index], previous.as_deref())
                .await;
            match outcome {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    plan.complete_step(index, text.clone())?;
                    previous = Some(text);
                    self.publish(&plan);
                }
                Ok(_) => {
                    warn!(plan_id = %plan.id, step = index, "step returned no result");
                    plan.fail_step(index, "no result")?;
                    break;
                }
                Err(e) => {
                    warn!(plan_id = %plan.id, step = index, error = %e, "step failed");
                    plan.fail_step(index, e.to_string())?;
                    break;
                }
            }
        }

        plan.skip_remaining();
        plan.status = if cancelled {
            PlanStatus::Cancelled
        } else if plan.count(StepStatus::Completed) == 0 {
            PlanStatus::Failed
        } else {
            PlanStatus::Completed
        };
        info!(
            plan_id = %plan.id,
            status = %plan.status,
            completed = plan.count(StepStatus::Completed),
            "plan finished"
        );

        self.state().active = None;
        self.paused.send_replace(false);
        drop(running);
        self.settle_queue(&plan);

        let text = synthesis::synthesize(self.model.as_ref(), &plan).await;
        Ok(PlanReport { plan, text })
    }
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("capabilities", &self.manifest.len())
            .field("max_steps", &self.config.max_steps)
            .field("active", &self.is_active())
            .field("paused", &self.is_paused())
            .finish()
    }
}
