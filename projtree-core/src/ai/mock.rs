use crate::ai::{
    error::AiError,
    provider::{AiProvider, ResponseStream},
    types::*,
};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

fn validate_tool_use_results(messages: &[Message]) -> Result<(), AiError> {
    for (i, message) in messages.iter().enumerate() {
        if message.role != MessageRole::Assistant {
            continue;
        }

        let tool_uses = message.content.tool_uses();
        if tool_uses.is_empty() {
            continue;
        }

        let tool_use_ids: HashSet<&str> = tool_uses.iter().map(|tu| tu.id.as_str()).collect();

        let Some(next_message) = messages.get(i + 1) else {
            continue;
        };

        let result_ids: HashSet<&str> = next_message
            .content
            .tool_results()
            .iter()
            .map(|tr| tr.tool_use_id.as_str())
            .collect();

        let mut missing_ids: Vec<&str> = tool_use_ids
            .iter()
            .filter(|id| !result_ids.contains(*id))
            .copied()
            .collect();
        missing_ids.sort_unstable();

        if next_message.role != MessageRole::User || !missing_ids.is_empty() {
            return Err(AiError::status(
                400,
                format!(
                    "messages.{i}: function calls were found without a matching function response immediately after: {}",
                    missing_ids.join(", ")
                ),
            ));
        }
    }

    Ok(())
}

/// Mock behavior for the mock provider
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MockBehavior {
    /// Return successful responses
    #[default]
    Success,
    /// Return an error with a structured status N times, then succeed
    StatusErrorThenSuccess { code: u16, remaining_errors: usize },
    /// Return an error whose status must be parsed from the message N times,
    /// then succeed
    MessageErrorThenSuccess {
        message: String,
        remaining_errors: usize,
    },
    /// Always return an error with the given status
    AlwaysStatusError { code: u16 },
    /// Return the given text, streamed as one delta per chunk
    StreamedText { chunks: Vec<String> },
    /// Stream the first `fail_after` chunks and then fail with `code`, N
    /// times, then stream every chunk
    InterruptedStream {
        chunks: Vec<String>,
        fail_after: usize,
        code: u16,
        remaining_errors: usize,
    },
    /// Return a tool use on every call
    ToolUse {
        tool_name: String,
        tool_arguments: String,
    },
    /// Return a tool use response once, then success
    ToolUseThenSuccess {
        tool_name: String,
        tool_arguments: String,
    },
    /// Return multiple tool uses in a single response, then success
    MultipleToolUses { tool_uses: Vec<(String, String)> },
    /// Sequential multi-turn testing: each call pops the next behavior
    BehaviorQueue { behaviors: Vec<MockBehavior> },
}

/// Mock AI provider for testing
#[derive(Clone)]
pub struct MockProvider {
    behavior: Arc<Mutex<MockBehavior>>,
    call_count: Arc<Mutex<usize>>,
    captured_requests: Arc<Mutex<Vec<ConversationRequest>>>,
}

impl MockProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            call_count: Arc::new(Mutex::new(0)),
            captured_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn pop_behavior_from_queue(behavior: &mut MockBehavior) -> MockBehavior {
        if let MockBehavior::BehaviorQueue { behaviors } = behavior {
            if behaviors.is_empty() {
                return MockBehavior::Success;
            }
            return behaviors.remove(0);
        }
        behavior.clone()
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn get_captured_requests(&self) -> Vec<ConversationRequest> {
        self.captured_requests.lock().unwrap().clone()
    }

    pub fn get_last_captured_request(&self) -> Option<ConversationRequest> {
        self.captured_requests.lock().unwrap().last().cloned()
    }

    /// Only rewrites the stored behavior when it is not a queue, so stateful
    /// behaviors inside a queue do not clobber the remaining entries.
    fn advance(&self, next: MockBehavior) {
        let mut behavior = self.behavior.lock().unwrap();
        if !matches!(*behavior, MockBehavior::BehaviorQueue { .. }) {
            *behavior = next;
        }
    }

    fn tool_use(id: String, name: &str, arguments: &str) -> ToolUseData {
        ToolUseData {
            id,
            name: name.to_string(),
            arguments: serde_json::from_str(arguments).ok(),
        }
    }

    fn respond(&self, request: &ConversationRequest) -> Result<ConversationResponse, AiError> {
        validate_tool_use_results(&request.messages)?;

        self.captured_requests.lock().unwrap().push(request.clone());
        *self.call_count.lock().unwrap() += 1;

        let effective = {
            let mut behavior = self.behavior.lock().unwrap();
            Self::pop_behavior_from_queue(&mut behavior)
        };

        match effective {
            MockBehavior::Success => Ok(text_response("Mock response")),
            MockBehavior::StatusErrorThenSuccess {
                code,
                remaining_errors,
            } => {
                if remaining_errors > 0 {
                    self.advance(MockBehavior::StatusErrorThenSuccess {
                        code,
                        remaining_errors: remaining_errors - 1,
                    });
                    Err(AiError::status(
                        code,
                        format!("Mock status error (remaining: {})", remaining_errors - 1),
                    ))
                } else {
                    Ok(text_response("Success after retries"))
                }
            }
            MockBehavior::MessageErrorThenSuccess {
                message,
                remaining_errors,
            } => {
                if remaining_errors > 0 {
                    let error = AiError::other(&message);
                    self.advance(MockBehavior::MessageErrorThenSuccess {
                        message,
                        remaining_errors: remaining_errors - 1,
                    });
                    Err(error)
                } else {
                    Ok(text_response("Success after retries"))
                }
            }
            MockBehavior::AlwaysStatusError { code } => Err(AiError::status(
                code,
                "Mock status error (always fails)",
            )),
            MockBehavior::StreamedText { chunks } => Ok(text_response(&chunks.concat())),
            MockBehavior::InterruptedStream {
                chunks,
                fail_after,
                code,
                remaining_errors,
            } => {
                if remaining_errors > 0 {
                    self.advance(MockBehavior::InterruptedStream {
                        chunks,
                        fail_after,
                        code,
                        remaining_errors: remaining_errors - 1,
                    });
                    Err(AiError::status(code, "Mock stream interrupted"))
                } else {
                    Ok(text_response(&chunks.concat()))
                }
            }
            MockBehavior::ToolUse {
                tool_name,
                tool_arguments,
            } => {
                let count = self.get_call_count();
                Ok(tool_response(vec![Self::tool_use(
                    format!("tool_{tool_name}_{count}"),
                    &tool_name,
                    &tool_arguments,
                )]))
            }
            MockBehavior::ToolUseThenSuccess {
                tool_name,
                tool_arguments,
            } => {
                self.advance(MockBehavior::Success);
                Ok(tool_response(vec![Self::tool_use(
                    format!("tool_{tool_name}"),
                    &tool_name,
                    &tool_arguments,
                )]))
            }
            MockBehavior::MultipleToolUses { tool_uses } => {
                self.advance(MockBehavior::Success);
                let calls = tool_uses
                    .iter()
                    .enumerate()
                    .map(|(index, (name, arguments))| {
                        Self::tool_use(format!("tool_{name}_{index}"), name, arguments)
                    })
                    .collect();
                Ok(tool_response(calls))
            }
            MockBehavior::BehaviorQueue { .. } => {
                panic!("Bug: nested BehaviorQueue detected. Test setup error - BehaviorQueues cannot contain other BehaviorQueues")
            }
        }
    }

    fn stream_chunks(&self) -> Option<Vec<String>> {
        let behavior = self.behavior.lock().unwrap();
        let current = match &*behavior {
            MockBehavior::BehaviorQueue { behaviors } => behaviors.first(),
            other => Some(other),
        };
        match current {
            Some(MockBehavior::StreamedText { chunks })
            | Some(MockBehavior::InterruptedStream { chunks, .. }) => Some(chunks.clone()),
            _ => None,
        }
    }

    /// The chunks delivered before the stream breaks, when the next call is
    /// an interrupted one.
    fn interrupted_prefix(&self) -> Option<Vec<String>> {
        let behavior = self.behavior.lock().unwrap();
        let current = match &*behavior {
            MockBehavior::BehaviorQueue { behaviors } => behaviors.first(),
            other => Some(other),
        };
        match current {
            Some(MockBehavior::InterruptedStream {
                chunks,
                fail_after,
                remaining_errors,
                ..
            }) if *remaining_errors > 0 => {
                Some(chunks.iter().take(*fail_after).cloned().collect())
            }
            _ => None,
        }
    }
}

fn text_response(text: &str) -> ConversationResponse {
    ConversationResponse {
        content: Content::new(vec![ContentBlock::Text(text.to_string())]),
        usage: TokenUsage::new(10, 10),
        stop_reason: StopReason::EndTurn,
    }
}

fn tool_response(calls: Vec<ToolUseData>) -> ConversationResponse {
    let mut blocks = vec![ContentBlock::Text(
        "I'll update the project files.".to_string(),
    )];
    blocks.extend(calls.into_iter().map(ContentBlock::ToolUse));
    ConversationResponse {
        content: Content::new(blocks),
        usage: TokenUsage::new(10, 10),
        stop_reason: StopReason::ToolUse,
    }
}

#[async_trait::async_trait]
impl AiProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn converse(
        &self,
        request: ConversationRequest,
    ) -> Result<ConversationResponse, AiError> {
        self.respond(&request)
    }

    /// Splits the response into one event per text fragment or function call.
    async fn converse_stream(&self, request: ConversationRequest) -> Result<ResponseStream, AiError> {
        let chunks = self.stream_chunks();
        let prefix = self.interrupted_prefix();
        let response = match (self.respond(&request), prefix) {
            (Ok(response), _) => response,
            (Err(error), Some(prefix)) => {
                let events: Vec<Result<StreamEvent, AiError>> = prefix
                    .into_iter()
                    .map(|text| Ok(StreamEvent::TextDelta { text }))
                    .chain(std::iter::once(Err(error)))
                    .collect();
                return Ok(Box::pin(tokio_stream::iter(events)));
            }
            (Err(error), None) => return Err(error),
        };

        let mut events = Vec::new();
        for block in response.content {
            match block {
                ContentBlock::Text(text) => match &chunks {
                    Some(chunks) => events.extend(
                        chunks
                            .iter()
                            .map(|chunk| StreamEvent::TextDelta { text: chunk.clone() }),
                    ),
                    None => events.push(StreamEvent::TextDelta { text }),
                },
                ContentBlock::ToolUse(tool_use) => events.push(StreamEvent::ToolUse(tool_use)),
                ContentBlock::ToolResult(_) => {}
            }
        }
        events.push(StreamEvent::Usage(response.usage));

        Ok(Box::pin(tokio_stream::iter(events.into_iter().map(Ok))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ConversationRequest {
        ConversationRequest {
            messages: vec![Message::user("Test")],
            model: "mock".to_string(),
            system_prompt: None,
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_mock_provider_success() {
        let provider = MockProvider::new(MockBehavior::Success);
        let response = provider.converse(request()).await.unwrap();
        assert_eq!(response.content.text(), "Mock response");
        assert_eq!(provider.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_status_then_success() {
        let provider = MockProvider::new(MockBehavior::StatusErrorThenSuccess {
            code: 503,
            remaining_errors: 2,
        });

        for _ in 0..2 {
            let error = provider.converse(request()).await.unwrap_err();
            assert_eq!(error.status_code(), Some(503));
        }

        let response = provider.converse(request()).await.unwrap();
        assert_eq!(response.content.text(), "Success after retries");
        assert_eq!(provider.get_call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_provider_streams_chunks() {
        use tokio_stream::StreamExt;

        let provider = MockProvider::new(MockBehavior::StreamedText {
            chunks: vec!["Hel".to_string(), "lo".to_string()],
        });
        let mut stream = provider.converse_stream(request()).await.unwrap();

        let mut deltas = Vec::new();
        while let Some(event) = stream.next().await {
            if let StreamEvent::TextDelta { text } = event.unwrap() {
                deltas.push(text);
            }
        }
        assert_eq!(deltas, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_mock_provider_interrupted_stream() {
        use tokio_stream::StreamExt;

        let provider = MockProvider::new(MockBehavior::InterruptedStream {
            chunks: vec!["Hel".to_string(), "lo".to_string()],
            fail_after: 1,
            code: 503,
            remaining_errors: 1,
        });

        let mut stream = provider.converse_stream(request()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first, StreamEvent::TextDelta { ref text } if text == "Hel"));
        let error = stream.next().await.unwrap().unwrap_err();
        assert_eq!(error.status_code(), Some(503));
        assert!(stream.next().await.is_none());

        let response = provider.converse(request()).await.unwrap();
        assert_eq!(response.content.text(), "Hello");
    }

    #[tokio::test]
    async fn test_unanswered_tool_use_is_rejected() {
        let provider = MockProvider::new(MockBehavior::Success);
        let mut bad = request();
        bad.messages.push(Message::assistant(Content::new(vec![
            ContentBlock::ToolUse(ToolUseData {
                id: "call_1".to_string(),
                name: "writeFile".to_string(),
                arguments: None,
            }),
        ])));
        bad.messages.push(Message::user("no results"));

        let error = provider.converse(bad).await.unwrap_err();
        assert_eq!(error.status_code(), Some(400));
    }
}
