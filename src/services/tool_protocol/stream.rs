//! Tool stream
//!
//! Turns raw SSE lines into a lazy, single-pass sequence of items. Text tokens
//! are yielded as they arrive. Once the model starts a tool call, text is
//! suppressed, and the sequence ends right after the reassembled call.

use std::collections::VecDeque;

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use tracing::{debug, warn};

use parley_core::streaming::{StreamAdapter, UnifiedStreamEvent};
use parley_llm::provider::LineStream;
use parley_llm::streaming_adapters::OpenAIAdapter;
use parley_llm::types::{LlmError, LlmResult, ToolCall, ToolDefinition};
use parley_tools::parse_tool_call;

/// One item of a streamed reply
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// A plain text token, in arrival order
    Token(String),
    /// A fully reassembled tool call; always the last item
    ToolCall(ToolCall),
}

/// Lazy, non-restartable stream of reply items
pub type ToolStream = BoxStream<'static, LlmResult<StreamItem>>;

struct StreamState {
    lines: LineStream,
    adapter: OpenAIAdapter,
    tools: Vec<ToolDefinition>,
    ready: VecDeque<LlmResult<StreamItem>>,
    tool_started: bool,
    finished: bool,
}

impl StreamState {
    fn absorb(&mut self, events: Vec<UnifiedStreamEvent>) {
        for event in events {
            if self.finished {
                break;
            }
            match event {
                UnifiedStreamEvent::TextDelta { content } => {
                    if !self.tool_started {
                        self.ready.push_back(Ok(StreamItem::Token(content)));
                    }
                }
                UnifiedStreamEvent::ToolStart { tool_name, .. } => {
                    debug!(tool = %tool_name, "model started a tool call");
                    self.tool_started = true;
                }
                UnifiedStreamEvent::ToolComplete {
                    tool_id,
                    tool_name,
                    arguments,
                } => {
                    let call = parse_tool_call(&tool_id, &tool_name, &arguments, &self.tools);
                    self.ready.push_back(Ok(StreamItem::ToolCall(call)));
                    self.finished = true;
                }
                UnifiedStreamEvent::Usage {
                    input_tokens,
                    output_tokens,
                } => {
                    debug!(input_tokens, output_tokens, "stream usage");
                }
                UnifiedStreamEvent::Error { message, code } => {
                    warn!(code = ?code, "error event in stream: {}", message);
                    self.ready.push_back(Err(LlmError::ServerError {
                        message,
                        status: None,
                    }));
                    self.finished = true;
                }
                UnifiedStreamEvent::Complete { .. } => {
                    self.finished = true;
                }
            }
        }
    }
}

/// Wrap a provider's raw line stream as a `ToolStream`.
///
/// `tools` supplies the fallback argument key when a call's arguments are not
/// a JSON object.
pub fn tool_stream(lines: LineStream, model: &str, tools: Vec<ToolDefinition>) -> ToolStream {
    let state = StreamState {
        lines,
        adapter: OpenAIAdapter::new(model),
        tools,
        ready: VecDeque::new(),
        tool_started: false,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.ready.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.lines.next().await {
                Some(Ok(line)) => match st.adapter.adapt(&line) {
                    Ok(events) => st.absorb(events),
                    Err(e) => warn!("skipping unparseable stream line: {}", e),
                },
                Some(Err(e)) => {
                    st.ready.push_back(Err(e));
                    st.finished = true;
                }
                None => {
                    let events = st.adapter.finish();
                    st.absorb(events);
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// Drain a stream, returning the concatenated text and the tool call, if any.
///
/// `on_token` sees every token in arrival order.
pub async fn collect_stream<F>(
    mut stream: ToolStream,
    mut on_token: F,
) -> LlmResult<(String, Option<ToolCall>)>
where
    F: FnMut(&str),
{
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        match item? {
            StreamItem::Token(token) => {
                on_token(&token);
                text.push_str(&token);
            }
            StreamItem::ToolCall(call) => return Ok((text, Some(call))),
        }
    }
    Ok((text, None))
}
