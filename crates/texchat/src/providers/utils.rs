use serde_json::{json, Value};
use std::collections::HashSet;

use crate::errors::{ChatError, ChatResult};
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::settings::Settings;

pub const TEMPERATURE: f32 = 0.7;

const FALLBACK_ERROR: &str = "API request failed";

/// Convert the conversation history to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            json!({
                "role": message.role,
                "content": message.content,
            })
        })
        .collect()
}

/// Convert tool descriptors to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> ChatResult<Vec<Value>> {
    let mut tool_names = HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(ChatError::Tool(format!("Duplicate tool name: {}", tool.name)));
        }
        result.push(tool.to_openai_spec());
    }

    Ok(result)
}

/// Streaming chat completion request body
pub fn create_request(settings: &Settings, history: &[Message], tools: &[Tool]) -> ChatResult<Value> {
    let mut payload = json!({
        "model": settings.model,
        "messages": messages_to_openai_spec(history),
        "temperature": TEMPERATURE,
        "stream": true,
    });

    let tools_spec = tools_to_openai_spec(tools)?;
    if !tools_spec.is_empty() {
        if let Some(object) = payload.as_object_mut() {
            object.insert("tools".to_string(), json!(tools_spec));
            object.insert("tool_choice".to_string(), json!("auto"));
        }
    }

    Ok(payload)
}

/// The server's `error.message` from a failed response body, if there is one
pub fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error")?.get("message")?.as_str().map(str::to_string))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| FALLBACK_ERROR.to_string())
}
