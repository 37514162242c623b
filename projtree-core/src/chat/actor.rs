use crate::{
    ai::{provider::AiProvider, Message, TokenUsage},
    chat::{
        ai,
        events::{ChatEvent, ChatMessage, EventSender, FilesystemSnapshot},
        retry::CancellationFlag,
    },
    file::{
        disk::{reconcile, sync_from, LocalDirectory},
        import::{import_entries, ImportEntry},
        store::VirtualFilesystem,
    },
    settings::SettingsManager,
};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Input messages to the `ChatActor`.
///
/// These derive serde so a front end in another process can send them as
/// json. Filesystem commands are the user-facing ones: they are validated
/// and rejected with an error message instead of overwriting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatActorMessage {
    /// A prompt for the model. Runs a full turn, tool calls included.
    UserInput(String),

    /// Links the project from an uploaded list of files.
    Sync { entries: Vec<ImportEntry> },

    /// Links the project from a directory on disk. Later `ApplyToDisk`
    /// commands write back to it.
    SyncDirectory { path: PathBuf },

    CreateFile { path: String, content: String },
    CreateFolder { path: String },
    UpdateFile { path: String, content: String },

    /// Deletes a path. Confirmation is the sender's job.
    DeletePath { path: String },

    MovePath { old_path: String, new_path: String },
    Revert,
    ToggleExclusion { path: String },
    SetCoderMode(bool),
    Unlink,
    ApplyToDisk,

    /// Emits a `FilesystemSnapshot` event.
    GetSnapshot,
}

/// The `ChatActor` owns the project and the conversation.
///
/// Everything that mutates either goes through the actor's input channel and
/// is processed one message at a time, so the store has a single writer.
/// Events come back on the receiver returned by `launch`. Cancellation is
/// out of band: it flips a flag that the running turn checks before each
/// request and while backing off.
pub struct ChatActor {
    pub tx: mpsc::UnboundedSender<ChatActorMessage>,
    cancel: CancellationFlag,
}

impl ChatActor {
    /// Spawns the actor on the current `LocalSet`.
    pub fn launch(
        settings: SettingsManager,
        provider: Arc<dyn AiProvider>,
    ) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (event_sender, event_rx) = EventSender::new();
        let cancel = CancellationFlag::new();

        let state = ActorState {
            event_sender,
            provider,
            settings,
            filesystem: VirtualFilesystem::new(),
            project_root: None,
            conversation: Vec::new(),
            cancel: cancel.clone(),
            session_token_usage: TokenUsage::empty(),
        };

        tokio::task::spawn_local(run_actor(state, rx));

        (ChatActor { tx, cancel }, event_rx)
    }

    pub fn send(&self, message: ChatActorMessage) -> Result<()> {
        self.tx.send(message)?;
        Ok(())
    }

    pub fn send_message(&self, message: String) -> Result<()> {
        self.send(ChatActorMessage::UserInput(message))
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

pub struct ActorState {
    pub event_sender: EventSender,
    pub provider: Arc<dyn AiProvider>,
    pub settings: SettingsManager,
    pub filesystem: VirtualFilesystem,
    pub project_root: Option<PathBuf>,
    pub conversation: Vec<Message>,
    pub cancel: CancellationFlag,
    pub session_token_usage: TokenUsage,
}

async fn run_actor(mut state: ActorState, mut rx: mpsc::UnboundedReceiver<ChatActorMessage>) {
    info!("ChatActor started");

    while let Some(message) = rx.recv().await {
        state.event_sender.set_typing(true);

        if let Err(e) = process_message(&mut state, message).await {
            error!(?e, "Error processing message");
            state
                .event_sender
                .send_message(ChatMessage::error(format!("Error: {e:#}")));
        }

        state.event_sender.set_typing(false);
    }

    info!("ChatActor stopped");
}

async fn process_message(state: &mut ActorState, message: ChatActorMessage) -> Result<()> {
    match message {
        ChatActorMessage::UserInput(input) => {
            handle_user_input(state, input).await;
            return Ok(());
        }
        ChatActorMessage::Sync { entries } => {
            let tree = import_entries(entries)?;
            state.filesystem.sync(tree);
            state.project_root = None;
        }
        ChatActorMessage::SyncDirectory { path } => {
            let handle = LocalDirectory::new(&path);
            sync_from(&mut state.filesystem, &handle).await?;
            state.project_root = Some(path);
        }
        ChatActorMessage::CreateFile { path, content } => {
            state.filesystem.create_file(&path, &content)?;
        }
        ChatActorMessage::CreateFolder { path } => {
            state.filesystem.create_folder(&path)?;
        }
        ChatActorMessage::UpdateFile { path, content } => {
            state.filesystem.update_file(&path, &content)?;
        }
        ChatActorMessage::DeletePath { path } => {
            state.filesystem.delete_path(&path)?;
        }
        ChatActorMessage::MovePath { old_path, new_path } => {
            state.filesystem.move_path(&old_path, &new_path)?;
        }
        ChatActorMessage::Revert => state.filesystem.revert(),
        ChatActorMessage::ToggleExclusion { path } => state.filesystem.toggle_exclusion(&path),
        ChatActorMessage::SetCoderMode(enabled) => {
            state.settings.update_setting(|s| s.coder_mode = enabled);
            state.event_sender.send_message(ChatMessage::system(format!(
                "Coder mode {}",
                if enabled { "enabled" } else { "disabled" }
            )));
            return Ok(());
        }
        ChatActorMessage::Unlink => {
            state.filesystem.unlink();
            state.project_root = None;
        }
        ChatActorMessage::ApplyToDisk => {
            let Some(root) = state.project_root.clone() else {
                bail!("No project directory is linked; sync from a directory first")
            };
            let handle = LocalDirectory::new(root);
            let report = reconcile(&mut state.filesystem, &handle).await?;
            state.event_sender.send_message(ChatMessage::system(format!(
                "Applied to disk: {} deleted, {} folders created, {} files written",
                report.deleted.len(),
                report.created_dirs.len(),
                report.written.len()
            )));
        }
        ChatActorMessage::GetSnapshot => {
            state
                .event_sender
                .send(ChatEvent::FilesystemSnapshot(snapshot(&state.filesystem)));
            return Ok(());
        }
    }

    state.event_sender.send(ChatEvent::FilesystemChanged);
    Ok(())
}

pub fn snapshot(filesystem: &VirtualFilesystem) -> FilesystemSnapshot {
    FilesystemSnapshot {
        linked: filesystem.is_linked(),
        display_tree: filesystem.display_tree(),
        changes: filesystem.changes(),
        excluded_paths: filesystem.excluded_paths().clone(),
    }
}

async fn handle_user_input(state: &mut ActorState, input: String) {
    if input.trim().is_empty() {
        return;
    }

    state.cancel.reset();
    state
        .event_sender
        .send_message(ChatMessage::user(input.clone()));
    state.conversation.push(Message::user(input));

    ai::send_ai_request(state).await
}
