//! One chat conversation: the history, prompt composition and the turn loop
//! that feeds streamed fragments to a view.
use futures::StreamExt;

use crate::errors::ChatResult;
use crate::markdown::MarkdownRenderer;
use crate::models::message::Message;
use crate::models::role::Role;
use crate::providers::base::Provider;

pub const SYSTEM_PROMPT: &str = "You are a LaTeX expert.";

/// Where a conversation is shown
pub trait ChatView {
    /// Append a new message
    fn display(&mut self, role: Role, text: &str, html: &str);

    /// Replace the contents of the assistant message being streamed
    fn update(&mut self, text: &str, html: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Replied(String),
    /// The turn ended with the given `Error: ...` system message
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    history: Vec<Message>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            history: vec![Message::system(SYSTEM_PROMPT)],
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Drop everything but the system prompt
    pub fn reset(&mut self) {
        self.history.clear();
        self.history.push(Message::system(SYSTEM_PROMPT));
    }

    /// Build the user message from typed text and the editor selection.
    ///
    /// Returns `None` when there is nothing to send.
    pub fn compose_prompt(message: &str, selection: Option<&str>) -> Option<String> {
        let message = message.trim();
        let selection = selection.filter(|s| !s.is_empty());

        match (message.is_empty(), selection) {
            (true, None) => None,
            (true, Some(selection)) => Some(selection.to_string()),
            (false, Some(selection)) => Some(format!(
                "Context:\n```latex\n\"{}\"```\n\nMessage:\n{}",
                selection, message
            )),
            (false, None) => Some(message.to_string()),
        }
    }

    /// Send `prompt` and stream the reply into `view`.
    ///
    /// Failures are shown as a system message and leave the session usable;
    /// only a completed reply is added to the history.
    pub async fn send<P, V>(
        &mut self,
        provider: &P,
        renderer: &MarkdownRenderer,
        prompt: &str,
        view: &mut V,
    ) -> TurnOutcome
    where
        P: Provider + ?Sized,
        V: ChatView + ?Sized,
    {
        view.display(Role::User, prompt, &renderer.render(prompt));
        self.history.push(Message::user(prompt));

        match self.stream_turn(provider, renderer, view).await {
            Ok(reply) => {
                self.history.push(Message::assistant(reply.clone()));
                TurnOutcome::Replied(reply)
            }
            Err(e) => {
                tracing::error!("Chat error: {}", e);
                let text = format!("Error: {}", e);
                view.display(Role::System, &text, &renderer.render(&text));
                TurnOutcome::Failed(text)
            }
        }
    }

    async fn stream_turn<P, V>(
        &self,
        provider: &P,
        renderer: &MarkdownRenderer,
        view: &mut V,
    ) -> ChatResult<String>
    where
        P: Provider + ?Sized,
        V: ChatView + ?Sized,
    {
        view.display(Role::Assistant, "", "");
        let mut fragments = provider.stream_reply(&self.history).await?;

        let mut reply = String::new();
        while let Some(fragment) = fragments.next().await {
            reply.push_str(&fragment?);
            view.update(&reply, &renderer.render(&reply));
        }
        Ok(reply)
    }
}
