use async_trait::async_trait;
use futures::stream;
use std::sync::Mutex;

use crate::errors::{ChatError, ChatResult};
use crate::models::message::Message;
use crate::providers::base::Provider;
use crate::stream::FragmentStream;

/// One scripted turn
pub enum MockReply {
    Fragments(Vec<String>),
    /// Fragments followed by a stream interruption
    Interrupted(Vec<String>, String),
    /// Rejected before streaming starts
    Refused(ChatError),
}

/// A mock provider that plays back pre-configured replies for testing
pub struct MockProvider {
    replies: Mutex<Vec<MockReply>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// The history passed on every call so far
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn stream_reply<'a>(&'a self, history: &'a [Message]) -> ChatResult<FragmentStream<'a>> {
        self.seen.lock().unwrap().push(history.to_vec());
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                MockReply::Fragments(vec![])
            } else {
                replies.remove(0)
            }
        };

        let items: Vec<ChatResult<String>> = match reply {
            MockReply::Fragments(fragments) => fragments.into_iter().map(Ok).collect(),
            MockReply::Interrupted(fragments, reason) => fragments
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(ChatError::Stream(reason))))
                .collect(),
            MockReply::Refused(err) => return Err(err),
        };
        Ok(Box::pin(stream::iter(items)))
    }
}
