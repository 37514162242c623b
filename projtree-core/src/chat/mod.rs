pub mod actor;
pub mod ai;
pub mod events;
pub mod retry;

pub use actor::{ChatActor, ChatActorMessage};
pub use events::{ChatEvent, ChatMessage, MessageSender};
pub use retry::{CancellationFlag, RetryError};
