use crate::ai::{
    error::AiError, provider::AiProvider, Content, ContentBlock, ConversationRequest, Message,
    MessageRole, StreamEvent, TokenUsage, ToolUseData,
};
use crate::chat::events::{ChatEvent, ChatMessage, EventSender};
use crate::chat::retry::{send_with_retry, RetryError};
use crate::context::build_project_context;
use crate::file::store::VirtualFilesystem;
use crate::settings::Settings;
use crate::tools::definitions::tool_definitions;
use crate::tools::executor::apply_batch;
use thiserror::Error;
use tokio_stream::StreamExt;
use tracing::{debug, error, info};

use super::actor::ActorState;

#[derive(Error, Debug)]
pub enum TurnError {
    #[error(transparent)]
    Backend(RetryError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Stopped after {limit} tool iterations without a final answer")]
    IterationLimit { limit: u32 },
}

impl From<RetryError> for TurnError {
    fn from(error: RetryError) -> Self {
        match error {
            RetryError::Cancelled => TurnError::Cancelled,
            other => TurnError::Backend(other),
        }
    }
}

/// Text and calls gathered from one response, streamed or not.
#[derive(Debug, Default)]
struct TurnResponse {
    text: String,
    tool_calls: Vec<ToolUseData>,
    usage: TokenUsage,
}

impl TurnResponse {
    fn absorb(&mut self, content: Content, usage: &TokenUsage) {
        for block in content {
            match block {
                ContentBlock::Text(text) => self.text.push_str(&text),
                ContentBlock::ToolUse(tool_use) => self.tool_calls.push(tool_use),
                ContentBlock::ToolResult(_) => {}
            }
        }
        self.usage.add(usage);
    }
}

/// Runs one user turn to completion and turns its outcome into chat events.
/// Backend failures become a single error entry; cancellation is reported
/// without one.
pub async fn send_ai_request(state: &mut ActorState) {
    match run_turn(state).await {
        Ok(()) => {}
        Err(TurnError::Cancelled) => {
            info!("Turn cancelled");
            state.event_sender.send(ChatEvent::OperationCancelled {
                message: "Operation cancelled by user".to_string(),
            });
        }
        Err(e) => {
            error!(error = %e, "Turn failed");
            state
                .event_sender
                .send_message(ChatMessage::error(format!("Error: {e}")));
        }
    }
}

async fn run_turn(state: &mut ActorState) -> Result<(), TurnError> {
    let settings = state.settings.settings();
    let cancel = state.cancel.clone();

    for iteration in 0..settings.max_tool_iterations {
        cancel.check()?;

        let request = build_request(&state.conversation, &state.filesystem, &settings);
        debug!(iteration, messages = request.messages.len(), "AI request");

        let provider = state.provider.as_ref();
        let events = &state.event_sender;
        let streaming = !settings.disable_streaming;
        let request = &request;

        let response = send_with_retry(
            &settings.retry,
            &cancel,
            move || request_once(provider, request, streaming, events),
            |notice| {
                if streaming {
                    events.send(ChatEvent::StreamReset);
                }
                events.send(ChatEvent::RetryAttempt {
                    attempt: notice.attempt,
                    max_retries: notice.max_retries,
                    error: notice.error.clone(),
                    backoff_ms: notice.backoff_ms,
                })
            },
        )
        .await?;

        let tool_calls = process_ai_response(state, response);
        if tool_calls.is_empty() {
            return Ok(());
        }

        execute_tool_calls(state, &tool_calls);
    }

    Err(TurnError::IterationLimit {
        limit: settings.max_tool_iterations,
    })
}

/// Assembles the outgoing request. In coder mode with a linked project the
/// serialized project is inserted just before the latest user prompt and
/// the project tools are declared. The injected turn never enters the
/// stored conversation.
pub fn build_request(
    conversation: &[Message],
    filesystem: &VirtualFilesystem,
    settings: &Settings,
) -> ConversationRequest {
    let mut messages = conversation.to_vec();

    if settings.coder_mode {
        if let Some(context) = build_project_context(filesystem) {
            let position = latest_prompt_index(&messages).unwrap_or(messages.len());
            messages.insert(
                position,
                Message::new(
                    MessageRole::User,
                    Content::new(vec![ContentBlock::Text(context)]),
                ),
            );
        }
    }

    let tools = if settings.coder_mode {
        tool_definitions()
    } else {
        vec![]
    };

    ConversationRequest {
        messages,
        model: settings.model.clone(),
        system_prompt: settings.system_prompt.clone(),
        tools,
    }
}

/// Index of the last user message that is a prompt rather than a batch of
/// tool results. Inserting there keeps each call/result pair adjacent.
fn latest_prompt_index(messages: &[Message]) -> Option<usize> {
    messages
        .iter()
        .rposition(|m| m.role == MessageRole::User && m.content.tool_results().is_empty())
}

async fn request_once(
    provider: &dyn AiProvider,
    request: &ConversationRequest,
    streaming: bool,
    events: &EventSender,
) -> Result<TurnResponse, AiError> {
    let mut turn = TurnResponse::default();

    if !streaming {
        let response = provider.converse(request.clone()).await?;
        turn.absorb(response.content, &response.usage);
        return Ok(turn);
    }

    let mut stream = provider.converse_stream(request.clone()).await?;
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::TextDelta { text } => {
                events.send(ChatEvent::StreamDelta { text: text.clone() });
                turn.text.push_str(&text);
            }
            StreamEvent::ToolUse(tool_use) => turn.tool_calls.push(tool_use),
            StreamEvent::Usage(usage) => turn.usage.add(&usage),
            StreamEvent::MessageComplete { response } => {
                turn.absorb(response.content, &response.usage);
            }
        }
    }
    Ok(turn)
}

fn process_ai_response(state: &mut ActorState, response: TurnResponse) -> Vec<ToolUseData> {
    info!(
        text_len = response.text.len(),
        tool_calls = response.tool_calls.len(),
        "AI response"
    );

    state.session_token_usage.add(&response.usage);

    state.event_sender.send_message(ChatMessage::assistant(
        response.text.clone(),
        response.tool_calls.clone(),
        response.usage,
    ));

    let mut blocks = Vec::new();
    if !response.text.is_empty() {
        blocks.push(ContentBlock::Text(response.text));
    }
    blocks.extend(response.tool_calls.iter().cloned().map(ContentBlock::ToolUse));
    state
        .conversation
        .push(Message::new(MessageRole::Assistant, Content::new(blocks)));

    response.tool_calls
}

/// Applies the batch to the store in one commit and answers every call in a
/// single tool-result turn.
fn execute_tool_calls(state: &mut ActorState, tool_calls: &[ToolUseData]) {
    let records = apply_batch(&mut state.filesystem, tool_calls);

    for record in &records {
        let (message, error) = match &record.result {
            Ok(message) => (Some(message.clone()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        state.event_sender.send(ChatEvent::ToolExecutionCompleted {
            tool_call_id: record.tool_use_id.clone(),
            tool_name: record.name.clone(),
            success: record.success(),
            message,
            error,
        });
    }

    if records.iter().any(|r| r.success()) {
        state.event_sender.send(ChatEvent::FilesystemChanged);
    }

    let results = records
        .iter()
        .map(|r| ContentBlock::ToolResult(r.to_tool_result()))
        .collect();
    state
        .conversation
        .push(Message::new(MessageRole::User, Content::new(results)));
}
