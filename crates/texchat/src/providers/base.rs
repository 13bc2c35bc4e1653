use async_trait::async_trait;

use crate::errors::ChatResult;
use crate::models::message::Message;
use crate::stream::FragmentStream;

/// Base trait for chat completion backends
#[async_trait]
pub trait Provider: Send + Sync {
    /// Start a streamed reply to `history`.
    ///
    /// Errors returned here happen before any fragment is produced (missing
    /// settings, rejected request). Errors after that arrive inside the stream.
    async fn stream_reply<'a>(&'a self, history: &'a [Message]) -> ChatResult<FragmentStream<'a>>;
}
