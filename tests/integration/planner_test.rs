//! Planner Integration Tests
//!
//! Decomposition, the confirmation gate, failure propagation and
//! between-step interrupts.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley::config::PlannerConfig;
use parley::services::planner::{
    Confirmation, InterruptSignal, InterruptSource, Plan, PlanOutcome, PlanStatus, Planner,
    StepStatus,
};
use parley::services::{Collaborators, SkillDispatcher};
use parley_core::CapabilityManifest;

use crate::support::{
    capabilities, shared, text, GatedSkills, MockLlmProvider, RecordingSkills,
};

fn manifest() -> CapabilityManifest {
    CapabilityManifest::new(capabilities()).unwrap()
}

fn planner(model: Arc<MockLlmProvider>, skills: Arc<dyn SkillDispatcher>) -> Planner {
    Planner::new(
        model,
        manifest(),
        PlannerConfig::default(),
        &Collaborators::new().with_skills(skills),
    )
}

fn three_step_plan() -> Plan {
    Plan::new(
        "find my resume then email it then text Sam",
        vec![
            ("file_search".to_string(), "find my resume".to_string()),
            ("email".to_string(), "email it".to_string()),
            ("sms".to_string(), "text Sam".to_string()),
        ],
    )
}

/// Replays a fixed sequence of interrupt polls
struct ScriptedInterrupts(Mutex<VecDeque<InterruptSignal>>);

impl ScriptedInterrupts {
    fn new(signals: &[InterruptSignal]) -> Arc<Self> {
        Arc::new(Self(Mutex::new(signals.iter().copied().collect())))
    }
}

impl InterruptSource for ScriptedInterrupts {
    fn poll_interrupt(&self) -> InterruptSignal {
        self.0
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(InterruptSignal::None)
    }
}

// ============================================================================
// Decomposition
// ============================================================================

#[tokio::test]
async fn test_single_step_token_declines() {
    let model = shared(MockLlmProvider::new().with_responses(vec![text("SINGLE")]));
    let skills = shared(RecordingSkills::new());
    let planner = planner(model.clone(), skills);

    let command = "find my resume and then email it";
    assert!(planner.should_decompose(command));
    assert_eq!(planner.plan_command(command).await, PlanOutcome::Single);
    assert_eq!(model.request_count(), 1);
    assert!(!planner.has_pending_confirmation());
}

#[tokio::test]
async fn test_decomposition_produces_ready_plan() {
    let reply = r#"[{"capability": "file_search", "input": "find my resume"},
                    {"capability": "email", "input": "email the resume"}]"#;
    let model = shared(MockLlmProvider::new().with_responses(vec![text(reply)]));
    let planner = planner(model.clone(), shared(RecordingSkills::new()));

    match planner.plan_command("find my resume and then email it").await {
        PlanOutcome::Ready(plan) => {
            assert_eq!(plan.steps.len(), 2);
            assert_eq!(plan.status, PlanStatus::Pending);
        }
        other => panic!("expected a ready plan, got {:?}", other),
    }

    // the prompt carries the manifest block verbatim
    let prompt = model.request(0)[0].text_content();
    assert!(prompt.contains(&manifest().manifest_text()));
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_failed_step_skips_the_rest() {
    let model = shared(MockLlmProvider::new().with_responses(vec![text(
        "I found your resume, but sending the email failed, so I didn't text Sam.",
    )]));
    let skills = shared(
        RecordingSkills::new()
            .with("file_search", Some("Found resume.pdf"))
            .with("email", None)
            .with("sms", Some("Sent")),
    );
    let planner = planner(model.clone(), skills.clone());

    let report = planner.run(three_step_plan()).await.unwrap();

    assert_eq!(skills.called(), vec!["file_search", "email"]);
    assert_eq!(report.plan.steps[0].status, StepStatus::Completed);
    assert_eq!(report.plan.steps[1].status, StepStatus::Failed);
    assert_eq!(report.plan.steps[2].status, StepStatus::Skipped);
    assert_eq!(report.plan.status, PlanStatus::Completed);
    assert!(report.text.contains("didn't text Sam"));
    assert!(!planner.is_active());
}

#[tokio::test]
async fn test_plan_fails_when_nothing_completes() {
    let model = shared(MockLlmProvider::new());
    let skills = shared(RecordingSkills::new().with("file_search", Some("   ")));
    let planner = planner(model.clone(), skills.clone());

    let report = planner.run(three_step_plan()).await.unwrap();

    assert_eq!(skills.called(), vec!["file_search"]);
    assert_eq!(report.plan.status, PlanStatus::Failed);
    assert_eq!(report.plan.count(StepStatus::Skipped), 2);
    assert!(report.text.starts_with("Sorry"));
    assert_eq!(model.request_count(), 0);
}

#[tokio::test]
async fn test_previous_result_is_passed_along() {
    let model = shared(MockLlmProvider::new().with_responses(vec![text("All done.")]));
    let skills = shared(
        RecordingSkills::new()
            .with("file_search", Some("Found resume.pdf"))
            .with("email", Some("Email sent")),
    );
    let planner = planner(model, skills.clone());
    let plan = Plan::new(
        "find my resume and then email it",
        vec![
            ("file_search".to_string(), "find my resume".to_string()),
            ("email".to_string(), "email it".to_string()),
        ],
    );

    let report = planner.run(plan).await.unwrap();
    assert_eq!(report.plan.status, PlanStatus::Completed);
    assert!(skills.inputs()[1].contains("Found resume.pdf"));
    assert_eq!(report.text, "All done.");
}

// ============================================================================
// Confirmation gate
// ============================================================================

fn shell_plan_reply() -> String {
    r#"[{"capability": "file_search", "input": "find old logs"},
        {"capability": "shell", "input": "rm the old logs"}]"#
        .to_string()
}

#[tokio::test]
async fn test_denied_plan_never_runs() {
    let model = shared(MockLlmProvider::new().with_responses(vec![text(&shell_plan_reply())]));
    let skills = shared(
        RecordingSkills::new()
            .with("file_search", Some("3 files"))
            .with("shell", Some("removed")),
    );
    let planner = planner(model, skills.clone());

    let outcome = planner.plan_command("find old logs and then delete them").await;
    assert!(matches!(outcome, PlanOutcome::NeedsConfirmation { .. }));
    assert!(planner.has_pending_confirmation());
    assert!(skills.called().is_empty());

    match planner.resolve_confirmation(false) {
        Confirmation::Denied(plan) => {
            assert_eq!(plan.status, PlanStatus::Cancelled);
            assert!(plan.steps.iter().all(|s| s.status == StepStatus::Skipped));
        }
        other => panic!("expected denial, got {:?}", other),
    }
    assert!(!planner.has_pending_confirmation());
    assert!(skills.called().is_empty());
    assert_eq!(planner.resolve_confirmation(true), Confirmation::NothingPending);
}

#[tokio::test]
async fn test_confirmed_plan_runs() {
    let model = shared(MockLlmProvider::new().with_responses(vec![
        text(&shell_plan_reply()),
        text("Found three log files and removed them."),
    ]));
    let skills = shared(
        RecordingSkills::new()
            .with("file_search", Some("3 files"))
            .with("shell", Some("removed")),
    );
    let planner = planner(model, skills.clone());

    planner.plan_command("find old logs and then delete them").await;
    let plan = match planner.resolve_confirmation(true) {
        Confirmation::Confirmed(plan) => plan,
        other => panic!("expected confirmation, got {:?}", other),
    };
    assert!(skills.called().is_empty());

    let report = planner.run(plan).await.unwrap();
    assert_eq!(skills.called(), vec!["file_search", "shell"]);
    assert_eq!(report.plan.status, PlanStatus::Completed);
}

// ============================================================================
// Interrupts
// ============================================================================

#[tokio::test]
async fn test_cancel_between_steps() {
    let model = shared(MockLlmProvider::new().with_responses(vec![text(
        "I found your resume, then stopped as you asked.",
    )]));
    let skills = shared(
        RecordingSkills::new()
            .with("file_search", Some("Found resume.pdf"))
            .with("email", Some("Email sent"))
            .with("sms", Some("Sent")),
    );
    let planner = planner(model, skills.clone()).with_interrupt_source(ScriptedInterrupts::new(&[
        InterruptSignal::None,
        InterruptSignal::Cancel,
    ]));

    let report = planner.run(three_step_plan()).await.unwrap();

    assert_eq!(skills.called(), vec!["file_search"]);
    assert_eq!(report.plan.status, PlanStatus::Cancelled);
    assert_eq!(report.plan.steps[1].status, StepStatus::Skipped);
    assert_eq!(report.plan.steps[2].status, StepStatus::Skipped);
}

#[tokio::test]
async fn test_skip_signal_skips_one_step() {
    let model = shared(MockLlmProvider::new().with_responses(vec![text("Found it and texted Sam.")]));
    let skills = shared(
        RecordingSkills::new()
            .with("file_search", Some("Found resume.pdf"))
            .with("email", Some("Email sent"))
            .with("sms", Some("Sent")),
    );
    let planner = planner(model, skills.clone()).with_interrupt_source(ScriptedInterrupts::new(&[
        InterruptSignal::None,
        InterruptSignal::Skip,
    ]));

    let report = planner.run(three_step_plan()).await.unwrap();

    assert_eq!(skills.called(), vec!["file_search", "sms"]);
    assert_eq!(report.plan.steps[1].status, StepStatus::Skipped);
    assert_eq!(report.plan.status, PlanStatus::Completed);
}

#[tokio::test]
async fn test_queued_cancel_is_seen_before_next_step() {
    let model = shared(MockLlmProvider::new());
    let skills = shared(RecordingSkills::new().with("file_search", Some("Found resume.pdf")));
    let planner = planner(model, skills.clone());

    planner.signal("what's the weather");
    planner.signal("cancel");
    let report = planner.run(three_step_plan()).await.unwrap();

    assert!(skills.called().is_empty());
    assert_eq!(report.plan.status, PlanStatus::Cancelled);
    assert_eq!(planner.take_unhandled(), vec!["what's the weather".to_string()]);
}

#[tokio::test]
async fn test_pause_holds_next_step_until_resume() {
    let model = shared(MockLlmProvider::new().with_responses(vec![text("Done.")]));
    let skills = shared(GatedSkills::new(
        RecordingSkills::new()
            .with("file_search", Some("Found resume.pdf"))
            .with("email", Some("Email sent")),
        "file_search",
    ));
    let planner = Arc::new(planner(model, skills.clone()));
    let plan = Plan::new(
        "find my resume and then email it",
        vec![
            ("file_search".to_string(), "find my resume".to_string()),
            ("email".to_string(), "email it".to_string()),
        ],
    );

    let runner = {
        let planner = planner.clone();
        tokio::spawn(async move { planner.run(plan).await })
    };
    skills.wait_until_held().await;

    assert!(planner.can_pause());
    assert!(planner.pause());
    assert!(planner.is_paused());
    assert!(!planner.can_pause());

    // one plan at a time
    assert!(planner.run(three_step_plan()).await.is_err());

    skills.release();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(skills.inner.called(), vec!["file_search"]);
    assert_eq!(
        planner.active_plan().unwrap().steps[1].status,
        StepStatus::Pending
    );

    assert!(planner.resume());
    let report = runner.await.unwrap().unwrap();
    assert_eq!(skills.inner.called(), vec!["file_search", "email"]);
    assert_eq!(report.plan.status, PlanStatus::Completed);
    assert!(!planner.is_active());
    assert!(!planner.is_paused());
}

#[tokio::test]
async fn test_signals_during_last_step_do_not_reach_next_plan() {
    let model = shared(
        MockLlmProvider::new().with_responses(vec![text("Found and sent."), text("Sent again.")]),
    );
    let skills = shared(GatedSkills::new(
        RecordingSkills::new()
            .with("file_search", Some("Found resume.pdf"))
            .with("email", Some("Email sent")),
        "email",
    ));
    let planner = Arc::new(planner(model, skills.clone()));
    let two_steps = || {
        Plan::new(
            "find my resume and then email it",
            vec![
                ("file_search".to_string(), "find my resume".to_string()),
                ("email".to_string(), "email it".to_string()),
            ],
        )
    };

    let runner = {
        let planner = planner.clone();
        let plan = two_steps();
        tokio::spawn(async move { planner.run(plan).await })
    };
    skills.wait_until_held().await;

    // no step boundary is left to see these
    planner.signal("stop");
    planner.signal("what time is it");
    skills.release();
    let first = runner.await.unwrap().unwrap();
    assert_eq!(first.plan.status, PlanStatus::Completed);

    let second = planner.run(two_steps()).await.unwrap();
    assert_eq!(second.plan.status, PlanStatus::Completed);
    assert_eq!(second.plan.completed_steps().count(), 2);
    assert_eq!(planner.take_unhandled(), vec!["what time is it".to_string()]);
    assert!(planner.take_unhandled().is_empty());
}
