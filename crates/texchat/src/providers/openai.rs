use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use super::base::Provider;
use super::utils::{api_error_message, create_request};
use crate::errors::{ChatError, ChatResult};
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::settings::SettingsStore;
use crate::stream::{decode, FragmentStream};
use crate::tools::{tool_descriptors, ToolResolver};

/// Streams replies from an OpenAI-compatible chat completions endpoint
pub struct OpenAiProvider {
    client: Client,
    settings: Arc<dyn SettingsStore>,
    resolver: Arc<dyn ToolResolver>,
    tools: Vec<Tool>,
}

impl OpenAiProvider {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        resolver: Arc<dyn ToolResolver>,
    ) -> ChatResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self {
            client,
            settings,
            resolver,
            tools: tool_descriptors(),
        })
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn stream_reply<'a>(&'a self, history: &'a [Message]) -> ChatResult<FragmentStream<'a>> {
        // Settings can change between turns, so they are read fresh each time
        let settings = self.settings.load()?;
        settings.validate()?;

        let payload = create_request(&settings, history, &self.tools)?;
        tracing::debug!(
            endpoint = %settings.api_endpoint,
            model = %settings.model,
            messages = history.len(),
            "sending chat request"
        );

        let response = self
            .client
            .post(&settings.api_endpoint)
            .header("Authorization", format!("Bearer {}", settings.api_key))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(%status, "chat request rejected");
            return Err(ChatError::Transport(api_error_message(&body)));
        }

        Ok(decode(response.bytes_stream(), self.resolver.as_ref(), history))
    }
}
