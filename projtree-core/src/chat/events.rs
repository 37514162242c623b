use crate::ai::{TokenUsage, ToolUseData};
use crate::file::status::PathChange;
use crate::file::tree::PathTree;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio::sync::mpsc;

/// `ChatEvent`s are the output of the actor.
///
/// Requests go in through the actor's input channel and each may produce any
/// number of events on the output channel. Front ends (the CLI, tests)
/// render or inspect these; they hold no state of their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum ChatEvent {
    MessageAdded(ChatMessage),
    /// A fragment of assistant text received while a response streams in.
    StreamDelta {
        text: String,
    },
    /// Deltas received so far belong to an attempt that failed and is being
    /// retried; drop them.
    StreamReset,
    TypingStatusChanged(bool),
    ToolExecutionCompleted {
        tool_call_id: String,
        tool_name: String,
        success: bool,
        message: Option<String>,
        error: Option<String>,
    },
    /// The project tree, tombstones or exclusions changed.
    FilesystemChanged,
    FilesystemSnapshot(FilesystemSnapshot),
    RetryAttempt {
        attempt: u32,
        /// `None` on the unavailable path, which has no attempt limit.
        max_retries: Option<u32>,
        error: String,
        backoff_ms: u64,
    },
    OperationCancelled {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub timestamp: u64,
    pub sender: MessageSender,
    pub content: String,
    pub tool_calls: Vec<ToolUseData>,
    pub token_usage: Option<TokenUsage>,
}

impl ChatMessage {
    fn new(sender: MessageSender, content: String) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis() as u64,
            sender,
            content,
            tool_calls: vec![],
            token_usage: None,
        }
    }

    pub fn user(content: String) -> Self {
        Self::new(MessageSender::User, content)
    }

    pub fn assistant(content: String, tool_calls: Vec<ToolUseData>, token_usage: TokenUsage) -> Self {
        Self {
            tool_calls,
            token_usage: Some(token_usage),
            ..Self::new(MessageSender::Assistant, content)
        }
    }

    pub fn system(content: String) -> Self {
        Self::new(MessageSender::System, content)
    }

    pub fn error(content: String) -> Self {
        Self::new(MessageSender::Error, content)
    }
}

/// What a file tree widget needs to render the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemSnapshot {
    pub linked: bool,
    pub display_tree: PathTree,
    pub changes: Vec<PathChange>,
    pub excluded_paths: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageSender {
    User,
    Assistant,
    System,
    Error,
}

/// A small wrapper over the event channel. Sends after the receiver is gone
/// are dropped.
#[derive(Clone)]
pub struct EventSender {
    event_tx: mpsc::UnboundedSender<ChatEvent>,
}

impl EventSender {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (event_tx, rx) = mpsc::unbounded_channel();
        (Self { event_tx }, rx)
    }

    pub fn send(&self, event: ChatEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn send_message(&self, message: ChatMessage) {
        self.send(ChatEvent::MessageAdded(message));
    }

    pub fn set_typing(&self, typing: bool) {
        self.send(ChatEvent::TypingStatusChanged(typing));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_forwarded_in_order() {
        let (sender, mut rx) = EventSender::new();
        sender.set_typing(true);
        sender.send(ChatEvent::StreamReset);

        assert!(matches!(rx.try_recv(), Ok(ChatEvent::TypingStatusChanged(true))));
        assert!(matches!(rx.try_recv(), Ok(ChatEvent::StreamReset)));
        assert!(rx.try_recv().is_err());

        drop(rx);
        sender.send(ChatEvent::FilesystemChanged);
    }
}
