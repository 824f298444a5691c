use std::future::Future;

use async_trait::async_trait;
use vcm_types::VectorCommMessage;

use crate::error::TransportError;

/// Callback invoked by the inbound loop for messages of a registered intent.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &VectorCommMessage) -> Result<(), TransportError>;
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap `f` as a handler.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(VectorCommMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TransportError>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(VectorCommMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TransportError>> + Send,
{
    async fn handle(&self, message: &VectorCommMessage) -> Result<(), TransportError> {
        (self.f)(message.clone()).await
    }
}
