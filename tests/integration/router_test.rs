//! Router Integration Tests
//!
//! Chain order, noise filtering, the tool-selection guard and fault policy.

use std::sync::Arc;

use parley::config::{FaultPolicy, RouterConfig};
use parley::services::router::handlers::DISMISSAL_VOCABULARY;
use parley::services::{Collaborators, Planner, Router, HANDLER_ORDER};
use parley::{AppConfig, Command, ConversationState};
use parley_core::CapabilityManifest;

use crate::support::{
    app_config, shared, text, BrokenStore, FixedScorer, InMemoryStore, MockLlmProvider,
    RecordingSkills,
};

fn build(
    config: &AppConfig,
    model: Arc<MockLlmProvider>,
    collaborators: &Collaborators,
) -> (Router, Arc<Planner>) {
    let manifest: CapabilityManifest = config.manifest().unwrap();
    let planner = Arc::new(Planner::new(
        model,
        manifest.clone(),
        config.planner.clone(),
        collaborators,
    ));
    let router = Router::new(&config.router, manifest, planner.clone(), collaborators);
    (router, planner)
}

#[test]
fn test_chain_follows_declared_order() {
    let (router, _) = build(
        &app_config(),
        shared(MockLlmProvider::new()),
        &Collaborators::new(),
    );
    assert_eq!(router.handler_names(), HANDLER_ORDER.to_vec());
}

#[tokio::test]
async fn test_dismissals_dropped_inside_window() {
    let (router, _) = build(
        &app_config(),
        shared(MockLlmProvider::new()),
        &Collaborators::new(),
    );
    for phrase in DISMISSAL_VOCABULARY {
        let mut state = ConversationState::default();
        let command = Command::new(phrase.to_uppercase()).in_window(true);
        let decision = router.route(&command, &mut state).await.unwrap();
        assert!(decision.is_dropped(), "'{}' should be dropped", phrase);
    }
}

#[tokio::test]
async fn test_bare_ok_passes_only_after_question() {
    let (router, _) = build(
        &app_config(),
        shared(MockLlmProvider::new()),
        &Collaborators::new(),
    );
    let command = Command::new("ok").in_window(true);

    let mut state = ConversationState::default();
    state.record_response("model_fallback", "The meeting is at noon.");
    let decision = router.route(&command, &mut state).await.unwrap();
    assert!(decision.is_dropped());

    let mut state = ConversationState::default();
    state.record_response("model_fallback", "Should I add it to your calendar?");
    let decision = router.route(&command, &mut state).await.unwrap();
    assert!(!decision.is_dropped());
    assert_eq!(decision.source, "model_fallback");
    assert!(decision.is_deferred());
}

#[tokio::test]
async fn test_pending_confirmation_beats_general_intent() {
    let reply = r#"[{"capability": "file_search", "input": "find old logs"},
                    {"capability": "shell", "input": "delete them"}]"#;
    let model = shared(MockLlmProvider::new().with_responses(vec![text(reply)]));
    let skills = shared(RecordingSkills::new());
    let collaborators = Collaborators::new().with_skills(skills.clone());
    let (router, planner) = build(&app_config(), model, &collaborators);

    let mut state = ConversationState::default();
    let question = router
        .route(&Command::new("find old logs and then delete them"), &mut state)
        .await
        .unwrap();
    assert_eq!(question.source, "plan");
    assert!(question.text.unwrap().ends_with('?'));
    assert!(planner.has_pending_confirmation());

    // "stop" is also a general intent; the pending plan claims it first
    let decision = router
        .route(&Command::new("stop").in_window(true), &mut state)
        .await
        .unwrap();
    assert_eq!(decision.source, "plan");
    assert_eq!(decision.text.as_deref(), Some("Okay, I won't do that."));
    assert!(!planner.has_pending_confirmation());
    assert!(skills.called().is_empty());

    // with nothing pending the same word is a general intent
    let decision = router.route(&Command::new("stop"), &mut state).await.unwrap();
    assert_eq!(decision.source, "stop");
    assert!(decision.effects.close_window);
}

#[tokio::test]
async fn test_single_step_reply_falls_through_to_model() {
    let model = shared(MockLlmProvider::new().with_responses(vec![text("SINGLE")]));
    let (router, _) = build(&app_config(), model.clone(), &Collaborators::new());

    let mut state = ConversationState::default();
    let decision = router
        .route(&Command::new("find my resume and then email it"), &mut state)
        .await
        .unwrap();
    assert_eq!(model.request_count(), 1);
    assert_eq!(decision.source, "model_fallback");
}

#[tokio::test]
async fn test_tool_selection_yields_to_better_legacy_capability() {
    let skills = shared(RecordingSkills::new().with_legacy("Playing jazz."));
    let collaborators = Collaborators::new()
        .with_skills(skills.clone())
        .with_scorer(shared(FixedScorer::new(&[
            ("weather", 0.7),
            ("time_zone", 0.2),
            ("music", 0.9),
        ])));
    let (router, _) = build(&app_config(), shared(MockLlmProvider::new()), &collaborators);

    let mut state = ConversationState::default();
    let decision = router
        .route(&Command::new("play something for a rainy day"), &mut state)
        .await
        .unwrap();
    assert_eq!(decision.source, "skill");
    assert_eq!(decision.text.as_deref(), Some("Playing jazz."));
    assert_eq!(skills.called(), vec!["legacy"]);
}

#[tokio::test]
async fn test_tool_selection_builds_two_message_bundle() {
    let collaborators = Collaborators::new().with_scorer(shared(FixedScorer::new(&[
        ("weather", 0.8),
        ("time_zone", 0.1),
        ("music", 0.2),
    ])));
    let (router, _) = build(&app_config(), shared(MockLlmProvider::new()), &collaborators);

    let mut state = ConversationState::default();
    state.record_response("model_fallback", "It's sunny in Paris.");
    let command = Command::new("and in Oslo?").in_window(true);
    let decision = router.route(&command, &mut state).await.unwrap();

    let bundle = decision.defer.unwrap();
    assert_eq!(bundle.messages.len(), 2);
    let user = bundle.messages[1].text_content();
    assert!(user.contains("It's sunny in Paris."));
    assert!(user.ends_with("and in Oslo?"));
    let names: Vec<&str> = bundle.tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["weather", "web_search"]);
}

#[tokio::test]
async fn test_lenient_policy_continues_past_faulty_handler() {
    let collaborators = Collaborators::new().with_memory(shared(BrokenStore));
    let (router, _) = build(&app_config(), shared(MockLlmProvider::new()), &collaborators);

    let mut state = ConversationState::default();
    let decision = router
        .route(&Command::new("what do you know about cats"), &mut state)
        .await
        .unwrap();
    assert_eq!(decision.source, "model_fallback");
}

#[tokio::test]
async fn test_strict_policy_returns_fault() {
    let mut config = app_config();
    config.router = RouterConfig {
        fault_policy: FaultPolicy::Strict,
        ..RouterConfig::default()
    };
    let collaborators = Collaborators::new().with_memory(shared(BrokenStore));
    let (router, _) = build(&config, shared(MockLlmProvider::new()), &collaborators);

    let mut state = ConversationState::default();
    let result = router
        .route(&Command::new("what do you know about cats"), &mut state)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_forget_needs_confirmation() {
    let memory = shared(InMemoryStore::default());
    let collaborators = Collaborators::new().with_memory(memory.clone());
    let (router, _) = build(&app_config(), shared(MockLlmProvider::new()), &collaborators);
    let mut state = ConversationState::default();

    router
        .route(&Command::new("Remember that my sister's name is Ana."), &mut state)
        .await
        .unwrap();
    assert_eq!(memory.facts.lock().unwrap().clone(), vec!["my sister's name is Ana".to_string()]);

    let recall = router
        .route(&Command::new("what do you know about my sister"), &mut state)
        .await
        .unwrap();
    assert_eq!(recall.text.as_deref(), Some("my sister's name is Ana."));

    let question = router
        .route(&Command::new("forget my sister"), &mut state)
        .await
        .unwrap();
    assert_eq!(
        question.text.as_deref(),
        Some("Should I forget everything about my sister?")
    );
    assert_eq!(memory.facts.lock().unwrap().len(), 1);

    let done = router
        .route(&Command::new("yes").in_window(true), &mut state)
        .await
        .unwrap();
    assert_eq!(done.source, "memory");
    assert!(memory.facts.lock().unwrap().is_empty());
    assert!(state.pending_forget.is_none());
}

#[tokio::test]
async fn test_confirmed_plan_is_handed_back_to_run() {
    let reply = r#"[{"capability": "file_search", "input": "find old logs"},
                    {"capability": "shell", "input": "delete them"}]"#;
    let model = shared(MockLlmProvider::new().with_responses(vec![text(reply)]));
    let skills = shared(RecordingSkills::new());
    let collaborators = Collaborators::new().with_skills(skills.clone());
    let (router, planner) = build(&app_config(), model, &collaborators);

    let mut state = ConversationState::default();
    router
        .route(&Command::new("find old logs and then delete them"), &mut state)
        .await
        .unwrap();

    let decision = router
        .route(&Command::new("go ahead").in_window(true), &mut state)
        .await
        .unwrap();
    assert_eq!(decision.source, "plan");
    assert!(decision.runs_plan());
    assert_eq!(decision.plan.unwrap().capabilities(), vec!["file_search", "shell"]);
    // routing never runs the plan itself
    assert!(skills.called().is_empty());
    assert!(!planner.is_active());
}
