pub mod error;
pub mod mock;
pub mod provider;
pub mod types;

pub use error::AiError;
pub use provider::AiProvider;
pub use types::*;
