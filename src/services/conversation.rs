//! Conversation
//!
//! Top-level entry point for one conversation. Routes each command, runs
//! ready plans and deferred bundles, applies side effects to the
//! conversation state and always returns something to say.

use std::sync::Arc;

use futures_util::StreamExt;
use parley_llm::provider::LlmProvider;
use parley_llm::types::{Message, MessageRole, ToolCall};
use parley_llm::OpenAICompatibleProvider;
use parley_quality_gates::QualityGatePipeline;
use parley_tools::{argument_text, ToolResult, WEB_SEARCH_TOOL};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::models::{Command, ConversationState, Decision, DeferBundle, ResearchResult};
use crate::services::collaborators::Collaborators;
use crate::services::planner::interrupt::{PAUSE_VOCABULARY, RESUME_VOCABULARY};
use crate::services::planner::{Plan, Planner};
use crate::services::prompts::ASSISTANT_SYSTEM_PROMPT;
use crate::services::router::Router;
use crate::services::tool_protocol::{StreamItem, ToolProtocolClient, GENERIC_FALLBACK_REPLY};
use crate::utils::error::AppResult;
use crate::utils::text::{ends_with_question, is_one_of};

/// Tool calls honoured for one command before the model must answer
pub const MAX_TOOL_ROUNDS: usize = 3;

/// Search hits rendered into a tool result
const MAX_SEARCH_RESULTS: usize = 5;

/// What the caller should do with one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Text to speak; empty only when `dropped`
    pub text: String,
    /// Handler or capability that produced the reply
    pub source: String,
    /// Keep listening without a wake trigger for this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_window_secs: Option<u64>,
    pub close_window: bool,
    /// Nothing should be said
    pub dropped: bool,
    /// The text is a fallback rather than an accepted model reply
    pub degraded: bool,
    /// Utterances heard during a plan that were not plan controls; each
    /// still needs its own turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unhandled: Vec<String>,
}

pub struct Conversation {
    router: Router,
    planner: Arc<Planner>,
    client: Arc<ToolProtocolClient>,
    collaborators: Collaborators,
    follow_up_window_secs: u64,
    state: Mutex<ConversationState>,
}

impl Conversation {
    /// Assemble a conversation around already-built providers
    pub fn new(
        config: &AppConfig,
        local: Arc<dyn LlmProvider>,
        remote: Option<Arc<dyn LlmProvider>>,
        collaborators: Collaborators,
    ) -> AppResult<Self> {
        config.validate()?;
        let manifest = config.manifest()?;
        let client = Arc::new(ToolProtocolClient::new(
            local.clone(),
            remote,
            QualityGatePipeline::new(config.quality.clone()),
        ));
        let planner = Arc::new(Planner::new(
            local,
            manifest.clone(),
            config.planner.clone(),
            &collaborators,
        ));
        let router = Router::new(&config.router, manifest, planner.clone(), &collaborators);

        info!(
            collaborators = ?collaborators.present(),
            remote = client.has_remote(),
            "conversation ready"
        );
        Ok(Self {
            router,
            planner,
            client,
            collaborators,
            follow_up_window_secs: config.router.follow_up_window_secs,
            state: Mutex::new(ConversationState::default()),
        })
    }

    /// Build providers from configuration and assemble a conversation
    pub fn from_config(config: &AppConfig, collaborators: Collaborators) -> AppResult<Self> {
        let local: Arc<dyn LlmProvider> =
            Arc::new(OpenAICompatibleProvider::new(config.local.clone())?);
        let remote = match &config.remote {
            Some(remote) => Some(
                Arc::new(OpenAICompatibleProvider::new(remote.clone())?) as Arc<dyn LlmProvider>
            ),
            None => None,
        };
        Self::new(config, local, remote, collaborators)
    }

    pub fn planner(&self) -> &Arc<Planner> {
        &self.planner
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Snapshot of the conversation state
    pub async fn state(&self) -> ConversationState {
        self.state.lock().await.clone()
    }

    /// Handle one command
    pub async fn respond(&self, command: Command) -> Reply {
        self.handle(command, None).await
    }

    /// Handle one command, forwarding text to `tokens` in arrival order
    pub async fn respond_streaming(&self, command: Command, tokens: mpsc::Sender<String>) -> Reply {
        self.handle(command, Some(&tokens)).await
    }

    /// Deliver an utterance heard while a plan is running.
    ///
    /// Pause and resume act right away; anything else is queued for the
    /// plan's next interrupt check. Queued text that is not a cancel or skip
    /// comes back in `Reply::unhandled` of the turn that ran the plan.
    /// Returns false when no plan is running.
    pub fn interrupt(&self, text: &str) -> bool {
        if !self.planner.is_active() {
            return false;
        }
        if is_one_of(text, PAUSE_VOCABULARY) {
            self.planner.pause();
        } else if is_one_of(text, RESUME_VOCABULARY) {
            self.planner.resume();
        } else {
            self.planner.signal(text);
        }
        true
    }

    async fn handle(&self, command: Command, tokens: Option<&mpsc::Sender<String>>) -> Reply {
        let decision = {
            let mut state = self.state.lock().await;
            match self.router.route(&command, &mut state).await {
                Ok(decision) => decision,
                Err(e) => {
                    error!(error = %e, "routing failed");
                    Decision::resolved("error", GENERIC_FALLBACK_REPLY)
                }
            }
        };

        if decision.is_dropped() {
            info!(source = %decision.source, "command dropped");
            self.state.lock().await.clear();
            return Reply {
                text: String::new(),
                source: decision.source,
                open_window_secs: None,
                close_window: true,
                dropped: true,
                degraded: false,
                unhandled: Vec::new(),
            };
        }

        // the state lock is free while a plan runs so cancel, skip, pause
        // and resume can be routed from another task
        let (text, degraded) = if let Some(plan) = &decision.plan {
            self.run_plan(plan.clone(), tokens).await
        } else if let Some(bundle) = &decision.defer {
            let mut state = self.state.lock().await;
            self.execute(bundle, &mut state, tokens).await
        } else {
            let text = decision.text.clone().unwrap_or_default();
            forward(tokens, &text).await;
            (text, false)
        };

        let text = if text.trim().is_empty() {
            forward(tokens, GENERIC_FALLBACK_REPLY).await;
            GENERIC_FALLBACK_REPLY.to_string()
        } else {
            text
        };

        let mut state = self.state.lock().await;
        let close_window = decision.effects.close_window;
        let open_window_secs = if close_window {
            state.clear();
            None
        } else {
            state.record_response(&decision.source, &text);
            decision
                .effects
                .open_window_secs
                .or_else(|| ends_with_question(&text).then_some(self.follow_up_window_secs))
        };

        Reply {
            text,
            source: decision.source,
            open_window_secs,
            close_window,
            dropped: false,
            degraded,
            unhandled: self.planner.take_unhandled(),
        }
    }

    async fn run_plan(
        &self,
        plan: Plan,
        tokens: Option<&mpsc::Sender<String>>,
    ) -> (String, bool) {
        match self.planner.run(plan).await {
            Ok(report) => {
                forward(tokens, &report.text).await;
                (report.text, false)
            }
            Err(e) => {
                warn!(error = %e, "plan did not run");
                (String::new(), true)
            }
        }
    }

    /// Answer a deferred command. Returns the text and whether it degraded.
    async fn execute(
        &self,
        bundle: &DeferBundle,
        state: &mut ConversationState,
        tokens: Option<&mpsc::Sender<String>>,
    ) -> (String, bool) {
        if bundle.uses_tools() {
            let mut spoken = String::new();
            match self.run_tools(bundle, state, tokens, &mut spoken).await {
                Ok(()) if !spoken.trim().is_empty() => return (spoken, false),
                Ok(()) => warn!("tool conversation produced no text; falling back to chat"),
                // the caller already heard part of an answer
                Err(e) if !spoken.is_empty() => {
                    warn!(error = %e, "tool conversation failed mid-reply; keeping partial text");
                    return (spoken, true);
                }
                Err(e) => warn!(error = %e, "tool conversation failed; falling back to chat"),
            }
        }

        let messages = if bundle.uses_tools() {
            plain_chat_messages(&bundle.messages)
        } else {
            bundle.messages.clone()
        };
        let outcome = self
            .client
            .chat(messages, &bundle.command, bundle.options.clone())
            .await;
        forward(tokens, &outcome.text).await;
        let degraded = outcome.is_degraded();
        (outcome.text, degraded)
    }

    /// Stream with tools, executing each requested call and continuing until
    /// the model answers in text. Streamed text accumulates in `spoken`.
    async fn run_tools(
        &self,
        bundle: &DeferBundle,
        state: &mut ConversationState,
        tokens: Option<&mpsc::Sender<String>>,
        spoken: &mut String,
    ) -> AppResult<()> {
        let mut history = bundle.messages.clone();
        let mut stream = self
            .client
            .stream_with_tools(history.clone(), bundle.tools.clone(), bundle.options.clone())
            .await?;
        let mut rounds = 0;

        loop {
            let mut requested: Option<ToolCall> = None;
            while let Some(item) = stream.next().await {
                match item? {
                    StreamItem::Token(token) => {
                        spoken.push_str(&token);
                        forward(tokens, &token).await;
                    }
                    StreamItem::ToolCall(call) => {
                        requested = Some(call);
                        break;
                    }
                }
            }

            let Some(call) = requested else {
                return Ok(());
            };
            if rounds >= MAX_TOOL_ROUNDS {
                warn!(tool = %call.name, rounds, "tool call after the last round; ignoring");
                return Ok(());
            }
            rounds += 1;
            info!(tool = %call.name, round = rounds, "model requested tool");
            let result = self.dispatch_tool(&call, state).await;

            // the last round gets no tools so the model has to answer
            let next_tools = if rounds < MAX_TOOL_ROUNDS {
                bundle.tools.clone()
            } else {
                Vec::new()
            };
            stream = self
                .client
                .continue_after_tool(
                    &mut history,
                    &call,
                    &result.to_content(),
                    next_tools,
                    bundle.options.clone(),
                )
                .await?;
        }
    }

    async fn dispatch_tool(&self, call: &ToolCall, state: &mut ConversationState) -> ToolResult {
        if call.name == WEB_SEARCH_TOOL {
            let query = call
                .argument_str("query")
                .map(str::to_string)
                .unwrap_or_else(|| argument_text(call));
            return match &self.collaborators.research {
                Some(research) => match research.search(&query).await {
                    Ok(results) if results.is_empty() => ToolResult::err("no results found"),
                    Ok(results) => {
                        let content = render_results(&results);
                        state.cache_research(results);
                        ToolResult::ok(content)
                    }
                    Err(e) => ToolResult::err(e.to_string()),
                },
                None => ToolResult::err("web search is not available"),
            };
        }

        let Some(skills) = &self.collaborators.skills else {
            return ToolResult::err(format!("{} is not available", call.name));
        };
        match skills.execute_named(&call.name, &argument_text(call)).await {
            Ok(output) => ToolResult::from_dispatch(output, &call.name),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool dispatch failed");
                ToolResult::err(e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("router", &self.router)
            .field("planner", &self.planner)
            .field("collaborators", &self.collaborators)
            .finish()
    }
}

async fn forward(tokens: Option<&mpsc::Sender<String>>, text: &str) {
    let Some(tx) = tokens else {
        return;
    };
    if text.is_empty() {
        return;
    }
    if tx.send(text.to_string()).await.is_err() {
        warn!("token receiver dropped");
    }
}

/// Turn a tool request into a plain chat request with the same user turn
fn plain_chat_messages(messages: &[Message]) -> Vec<Message> {
    let mut out = vec![Message::system(ASSISTANT_SYSTEM_PROMPT)];
    out.extend(
        messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .take(1)
            .cloned(),
    );
    out
}

fn render_results(results: &[ResearchResult]) -> String {
    results
        .iter()
        .take(MAX_SEARCH_RESULTS)
        .enumerate()
        .map(|(i, r)| match &r.source {
            Some(source) => format!("{}. {}: {} ({})", i + 1, r.title, r.snippet, source),
            None => format!("{}. {}: {}", i + 1, r.title, r.snippet),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
