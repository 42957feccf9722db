//! Conversation Integration Tests
//!
//! End-to-end turns through routing, tool calls, the chat ladder and the
//! follow-up window.

use std::sync::Arc;

use parley::models::ResearchResult;
use parley::services::tool_protocol::GENERIC_FALLBACK_REPLY;
use parley::services::MAX_TOOL_ROUNDS;
use parley::{Collaborators, Command, Conversation};
use parley_llm::provider::LlmProvider;
use parley_llm::types::MessageRole;
use tokio::sync::mpsc;

use crate::support::{
    app_config, overflow, shared, sse_text, sse_tool_call, text, tool_result_content, FixedScorer,
    GatedSkills, MockLlmProvider, RecordingSkills, StaticResearch,
};

fn conversation(
    local: Arc<MockLlmProvider>,
    remote: Option<Arc<MockLlmProvider>>,
    collaborators: Collaborators,
) -> Conversation {
    Conversation::new(
        &app_config(),
        local,
        remote.map(|r| r as Arc<dyn LlmProvider>),
        collaborators,
    )
    .unwrap()
}

fn weather_scorer() -> Arc<FixedScorer> {
    shared(FixedScorer::new(&[
        ("weather", 0.9),
        ("time_zone", 0.6),
        ("music", 0.1),
    ]))
}

async fn drain(mut rx: mpsc::Receiver<String>) -> Vec<String> {
    let mut tokens = Vec::new();
    while let Some(token) = rx.recv().await {
        tokens.push(token);
    }
    tokens
}

#[tokio::test]
async fn test_fragmented_tool_call_is_executed_and_answered() {
    let model = shared(MockLlmProvider::new().with_streams(vec![
        Ok(sse_tool_call("call_1", "weather", &["{\"loc", "ation\": \"Os", "lo\"}"])),
        Ok(sse_text(&["It's 4 degrees", " and raining in Oslo."])),
    ]));
    let skills = shared(RecordingSkills::new().with("weather", Some("4C, light rain")));
    let collaborators = Collaborators::new()
        .with_skills(skills.clone())
        .with_scorer(weather_scorer());
    let conversation = conversation(model.clone(), None, collaborators);

    let (tx, rx) = mpsc::channel(32);
    let reply = conversation
        .respond_streaming(Command::new("what's the weather in Oslo"), tx)
        .await;
    let tokens = drain(rx).await;

    assert_eq!(reply.text, "It's 4 degrees and raining in Oslo.");
    assert_eq!(reply.source, "tool_selection");
    assert!(!reply.degraded);
    assert_eq!(tokens, vec!["It's 4 degrees", " and raining in Oslo."]);

    assert_eq!(skills.called(), vec!["weather"]);
    assert_eq!(skills.inputs(), vec!["Oslo"]);

    assert_eq!(model.request_count(), 2);
    assert_eq!(model.request(0).len(), 2);
    let continuation = model.request(1);
    assert_eq!(continuation.len(), 5);
    assert_eq!(continuation[3].role, MessageRole::Tool);
    assert_eq!(
        tool_result_content(&continuation[3]).as_deref(),
        Some("4C, light rain")
    );
    assert_eq!(
        model.tool_requests.lock().unwrap()[0],
        vec!["weather", "time_zone", "web_search"]
    );
}

#[tokio::test]
async fn test_chained_tool_calls() {
    let model = shared(MockLlmProvider::new().with_streams(vec![
        Ok(sse_tool_call("call_1", "weather", &[r#"{"location": "Tokyo"}"#])),
        Ok(sse_tool_call("call_2", "time_zone", &[r#"{"city": "Tokyo"}"#])),
        Ok(sse_text(&["It's 9 PM and clear in Tokyo."])),
    ]));
    let skills = shared(
        RecordingSkills::new()
            .with("weather", Some("clear, 18C"))
            .with("time_zone", Some("21:00")),
    );
    let collaborators = Collaborators::new()
        .with_skills(skills.clone())
        .with_scorer(weather_scorer());
    let conversation = conversation(model.clone(), None, collaborators);

    let reply = conversation
        .respond(Command::new("what's the weather and time in Tokyo"))
        .await;

    assert_eq!(reply.text, "It's 9 PM and clear in Tokyo.");
    assert_eq!(skills.called(), vec!["weather", "time_zone"]);
    assert_eq!(model.request_count(), 3);
    assert_eq!(model.request(2).len(), 8);
}

#[tokio::test]
async fn test_last_tool_round_offers_no_tools() {
    let mut streams: Vec<_> = (0..MAX_TOOL_ROUNDS)
        .map(|i| {
            Ok(sse_tool_call(
                &format!("call_{}", i),
                "weather",
                &[r#"{"location": "Oslo"}"#],
            ))
        })
        .collect();
    streams.push(Ok(sse_text(&["Still raining in Oslo."])));
    let model = shared(MockLlmProvider::new().with_streams(streams));
    let skills = shared(RecordingSkills::new().with("weather", Some("rain")));
    let collaborators = Collaborators::new()
        .with_skills(skills.clone())
        .with_scorer(weather_scorer());
    let conversation = conversation(model.clone(), None, collaborators);

    let reply = conversation
        .respond(Command::new("is it raining in Oslo"))
        .await;

    assert_eq!(reply.text, "Still raining in Oslo.");
    assert_eq!(skills.called().len(), MAX_TOOL_ROUNDS);
    let tool_requests = model.tool_requests.lock().unwrap().clone();
    assert_eq!(tool_requests.len(), MAX_TOOL_ROUNDS + 1);
    assert!(tool_requests[..MAX_TOOL_ROUNDS].iter().all(|t| !t.is_empty()));
    assert!(tool_requests[MAX_TOOL_ROUNDS].is_empty());
}

#[tokio::test]
async fn test_overflowing_tool_request_falls_back_to_chat() {
    let model = shared(
        MockLlmProvider::new()
            .with_streams(vec![Err(overflow()), Err(overflow())])
            .with_responses(vec![text("I can't check the weather right now.")]),
    );
    let collaborators = Collaborators::new()
        .with_skills(shared(RecordingSkills::new()))
        .with_scorer(weather_scorer());
    let conversation = conversation(model.clone(), None, collaborators);

    let reply = conversation
        .respond(Command::new("what's the weather in Oslo"))
        .await;

    assert_eq!(reply.text, "I can't check the weather right now.");
    assert!(!reply.degraded);
    // two stream attempts, then one plain chat request without tools
    assert_eq!(model.request_count(), 3);
    assert!(model.tool_requests.lock().unwrap()[2].is_empty());
    let chat = model.request(2);
    assert_eq!(chat.len(), 2);
    assert_eq!(chat[1].text_content(), "what's the weather in Oslo");
}

#[tokio::test]
async fn test_echo_without_remote_degrades_to_generic_reply() {
    let model = shared(MockLlmProvider::new().with_responses(vec![
        text("Turn on the porch light."),
        text("turn on the porch light"),
    ]));
    let conversation = conversation(model.clone(), None, Collaborators::new());

    let reply = conversation
        .respond(Command::new("turn on the porch light"))
        .await;

    assert_eq!(reply.source, "model_fallback");
    assert_eq!(reply.text, GENERIC_FALLBACK_REPLY);
    assert!(reply.degraded);
    assert_eq!(model.request_count(), 2);
}

#[tokio::test]
async fn test_echo_escalates_to_remote() {
    let local = shared(MockLlmProvider::new().with_responses(vec![
        text("Turn on the porch light."),
        text("turn on the porch light"),
    ]));
    let remote = shared(MockLlmProvider::new().with_responses(vec![text(
        "I can't control lights, but your smart home app can.",
    )]));
    let conversation = conversation(local.clone(), Some(remote.clone()), Collaborators::new());

    let reply = conversation
        .respond(Command::new("turn on the porch light"))
        .await;

    assert_eq!(reply.text, "I can't control lights, but your smart home app can.");
    assert!(!reply.degraded);
    assert_eq!(local.request_count(), 2);
    assert_eq!(remote.request_count(), 1);
}

#[tokio::test]
async fn test_question_opens_window_and_dismissal_clears_state() {
    let model = shared(
        MockLlmProvider::new().with_responses(vec![text("Which city do you mean?")]),
    );
    let conversation = conversation(model, None, Collaborators::new());

    let reply = conversation.respond(Command::new("how far is it to the coast")).await;
    assert_eq!(reply.open_window_secs, Some(8));
    let state = conversation.state().await;
    assert!(state.last_ended_with_question);

    let reply = conversation
        .respond(Command::new("Never mind.").in_window(true))
        .await;
    assert!(reply.dropped);
    assert!(reply.text.is_empty());
    assert!(conversation.state().await.last_response.is_none());
}

#[tokio::test]
async fn test_statement_keeps_window_closed() {
    let model = shared(
        MockLlmProvider::new().with_responses(vec![text("The coast is about forty minutes away.")]),
    );
    let conversation = conversation(model, None, Collaborators::new());

    let reply = conversation.respond(Command::new("how far is it to the coast")).await;
    assert_eq!(reply.open_window_secs, None);
    assert!(!reply.close_window);
    assert_eq!(
        conversation.state().await.last_response.as_deref(),
        Some("The coast is about forty minutes away.")
    );
}

#[tokio::test]
async fn test_search_results_feed_follow_ups() {
    let model = shared(MockLlmProvider::new().with_streams(vec![
        Ok(sse_tool_call(
            "call_1",
            "web_search",
            &[r#"{"query": "best hiking near Bergen"}"#],
        )),
        Ok(sse_text(&["Stoltzekleiven and Ulriken are both popular."])),
    ]));
    let research = shared(StaticResearch(vec![
        ResearchResult {
            title: "Stoltzekleiven".to_string(),
            snippet: "A steep stone staircase up Sandviksfjellet".to_string(),
            source: Some("visitbergen.com".to_string()),
        },
        ResearchResult {
            title: "Ulriken".to_string(),
            snippet: "The highest of the seven mountains".to_string(),
            source: None,
        },
    ]));
    let collaborators = Collaborators::new()
        .with_research(research)
        .with_scorer(weather_scorer());
    let conversation = conversation(model.clone(), None, collaborators);

    let reply = conversation
        .respond(Command::new("what are the best hikes near Bergen"))
        .await;
    assert_eq!(reply.text, "Stoltzekleiven and Ulriken are both popular.");
    let rendered = tool_result_content(&model.request(1)[3]).unwrap();
    assert!(rendered.starts_with("1. Stoltzekleiven: A steep stone staircase"));
    assert!(rendered.contains("(visitbergen.com)"));
    assert_eq!(conversation.state().await.research.len(), 2);

    let more = conversation
        .respond(Command::new("tell me more").in_window(true))
        .await;
    assert_eq!(more.source, "research");
    assert_eq!(
        more.text,
        "Stoltzekleiven. A steep stone staircase up Sandviksfjellet"
    );

    let source = conversation
        .respond(Command::new("where did you get that").in_window(true))
        .await;
    assert_eq!(source.text, "That came from visitbergen.com.");

    let second = conversation
        .respond(Command::new("what about the second one").in_window(true))
        .await;
    assert_eq!(second.text, "Ulriken. The highest of the seven mountains");

    let missing = conversation
        .respond(Command::new("more about the fifth").in_window(true))
        .await;
    assert_eq!(missing.text, "I only found 2 results.");
}

#[tokio::test]
async fn test_interrupt_without_running_plan() {
    let conversation = conversation(shared(MockLlmProvider::new()), None, Collaborators::new());
    assert!(!conversation.interrupt("stop"));
}

#[tokio::test]
async fn test_stream_failure_after_tokens_keeps_partial_reply() {
    let model = shared(
        MockLlmProvider::new()
            .with_streams(vec![Ok(vec![
                r#"data: {"choices":[{"delta":{"content":"It is sunny "}}]}"#.to_string(),
                r#"data: {"error":{"message":"upstream connection reset"}}"#.to_string(),
            ])])
            .with_responses(vec![text("It will be rainy in Oslo tomorrow.")]),
    );
    let collaborators = Collaborators::new().with_scorer(weather_scorer());
    let conversation = conversation(model.clone(), None, collaborators);

    let (tx, rx) = mpsc::channel(32);
    let reply = conversation
        .respond_streaming(Command::new("what's the weather in Oslo"), tx)
        .await;
    let spoken = drain(rx).await.concat();

    assert_eq!(spoken, "It is sunny ");
    assert_eq!(reply.text, spoken);
    assert!(reply.degraded);
    // no second answer from plain chat
    assert_eq!(model.request_count(), 1);
}

#[tokio::test]
async fn test_tool_call_after_last_round_is_ignored() {
    let streams: Vec<_> = (0..=MAX_TOOL_ROUNDS)
        .map(|i| {
            Ok(sse_tool_call(
                &format!("call_{}", i),
                "weather",
                &[r#"{"location": "Oslo"}"#],
            ))
        })
        .collect();
    let model = shared(
        MockLlmProvider::new()
            .with_streams(streams)
            .with_responses(vec![text("It's raining in Oslo.")]),
    );
    let skills = shared(RecordingSkills::new().with("weather", Some("rain")));
    let collaborators = Collaborators::new()
        .with_skills(skills.clone())
        .with_scorer(weather_scorer());
    let conversation = conversation(model.clone(), None, collaborators);

    let reply = conversation.respond(Command::new("is it raining in Oslo")).await;

    assert_eq!(skills.called().len(), MAX_TOOL_ROUNDS);
    // every stream was opened once, then plain chat answered
    assert_eq!(model.request_count(), MAX_TOOL_ROUNDS + 2);
    assert_eq!(reply.text, "It's raining in Oslo.");
}

fn resume_plan_reply() -> &'static str {
    r#"[{"capability": "file_search", "input": "find my resume"},
        {"capability": "email", "input": "email the resume"}]"#
}

#[tokio::test]
async fn test_cancel_reaches_running_plan_through_respond() {
    let model = shared(MockLlmProvider::new().with_responses(vec![
        text(resume_plan_reply()),
        text("I found your resume but stopped before emailing it."),
    ]));
    let skills = shared(GatedSkills::new(
        RecordingSkills::new()
            .with("file_search", Some("Found resume.pdf"))
            .with("email", Some("Email sent")),
        "file_search",
    ));
    let conversation = Arc::new(conversation(
        model,
        None,
        Collaborators::new().with_skills(skills.clone()),
    ));

    let running = {
        let conversation = conversation.clone();
        tokio::spawn(async move {
            conversation
                .respond(Command::new("find my resume and then email it"))
                .await
        })
    };
    skills.wait_until_held().await;
    assert!(conversation.planner().is_active());

    let cancel = conversation.respond(Command::new("cancel")).await;
    assert_eq!(cancel.source, "plan_control");
    assert_eq!(cancel.text, "Okay, stopping.");

    skills.release();
    let reply = running.await.unwrap();
    assert_eq!(reply.source, "plan");
    assert_eq!(reply.text, "I found your resume but stopped before emailing it.");
    assert_eq!(skills.inner.called(), vec!["file_search"]);
    assert!(!conversation.planner().is_active());
}

#[tokio::test]
async fn test_unrelated_interrupts_come_back_with_plan_reply() {
    let model = shared(MockLlmProvider::new().with_responses(vec![
        text(resume_plan_reply()),
        text("I found your resume and emailed it."),
    ]));
    let skills = shared(GatedSkills::new(
        RecordingSkills::new()
            .with("file_search", Some("Found resume.pdf"))
            .with("email", Some("Email sent")),
        "email",
    ));
    let conversation = Arc::new(conversation(
        model,
        None,
        Collaborators::new().with_skills(skills.clone()),
    ));

    let running = {
        let conversation = conversation.clone();
        tokio::spawn(async move {
            conversation
                .respond(Command::new("find my resume and then email it"))
                .await
        })
    };
    skills.wait_until_held().await;

    assert!(conversation.interrupt("what time is it"));
    assert!(conversation.interrupt("stop"));
    skills.release();

    let reply = running.await.unwrap();
    assert_eq!(reply.text, "I found your resume and emailed it.");
    assert_eq!(reply.unhandled, vec!["what time is it".to_string()]);
    assert!(conversation.planner().take_unhandled().is_empty());
    assert!(!conversation.interrupt("what time is it"));
}
