pub mod ai;
pub mod chat;
pub mod context;
pub mod file;
pub mod settings;
pub mod tools;

pub use ai::provider::AiProvider;
pub use chat::{ChatActor, ChatActorMessage, ChatEvent, ChatMessage};
pub use file::{PathTree, VirtualFilesystem};
pub use settings::{Settings, SettingsManager};
