use std::pin::Pin;

use tokio_stream::Stream;

use crate::ai::{error::AiError, types::*};

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, AiError>> + Send>>;

/// The backend contract. Transport, authentication and wire formats live in
/// implementations; the engine only sees requests, responses and errors.
#[async_trait::async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn converse(&self, request: ConversationRequest)
        -> Result<ConversationResponse, AiError>;

    /// Incremental variant of `converse`. Providers without native streaming
    /// get a single `MessageComplete` event.
    async fn converse_stream(&self, request: ConversationRequest) -> Result<ResponseStream, AiError> {
        let response = self.converse(request).await?;
        Ok(Box::pin(tokio_stream::once(Ok(
            StreamEvent::MessageComplete { response },
        ))))
    }
}
