use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::tool::ToolCall;
use crate::tools::ToolKind;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// One `data:` payload of a streamed chat completion
#[derive(Debug, Default, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// What a single event line means to the decoder
#[derive(Debug)]
pub enum LineEvent {
    /// Keep-alive, comment, terminator or anything without the data marker
    Ignored,
    Chunk(ChatChunk),
    Malformed(serde_json::Error),
}

pub fn parse_line(line: &str) -> LineEvent {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return LineEvent::Ignored;
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload.trim() == DONE_SENTINEL {
        return LineEvent::Ignored;
    }
    match serde_json::from_str::<ChatChunk>(payload) {
        Ok(chunk) => LineEvent::Chunk(chunk),
        Err(e) => LineEvent::Malformed(e),
    }
}

impl ChatChunk {
    /// Non-empty text carried by the first choice
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()?
            .delta
            .content
            .as_deref()
            .filter(|s| !s.is_empty())
    }

    pub fn tool_calls(&self) -> &[ToolCallDelta] {
        self.choices
            .first()
            .and_then(|c| c.delta.tool_calls.as_deref())
            .unwrap_or_default()
    }
}

/// The single tool call assembled from index-0 fragments.
///
/// Only one concurrent tool call is supported per response: fragments for any
/// other index are dropped on purpose. A non-empty name fragment replaces the
/// current name, unless the fragments seen so far only spell a known tool
/// name when joined.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    call: Option<AccumulatedToolCall>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AccumulatedToolCall {
    /// Latest non-empty name fragment
    pub name: String,
    /// Every name fragment, concatenated
    pub joined_name: String,
    pub arguments: String,
}

impl AccumulatedToolCall {
    pub fn resolved_name(&self) -> &str {
        if ToolKind::from_name(&self.joined_name).is_ok() {
            &self.joined_name
        } else {
            &self.name
        }
    }
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, fragments: &[ToolCallDelta]) {
        for fragment in fragments.iter().filter(|f| f.index == Some(0)) {
            let call = self.call.get_or_insert_with(AccumulatedToolCall::default);
            let Some(function) = &fragment.function else {
                continue;
            };
            if let Some(name) = function.name.as_deref().filter(|n| !n.is_empty()) {
                call.name = name.to_string();
                call.joined_name.push_str(name);
            }
            if let Some(arguments) = &function.arguments {
                call.arguments.push_str(arguments);
            }
        }
    }

    pub fn pending(&self) -> Option<&AccumulatedToolCall> {
        self.call.as_ref()
    }

    /// Consume the accumulator; `None` when no named call was seen.
    ///
    /// Empty arguments parse as `{}`; malformed arguments are returned as the error.
    pub fn finish(self) -> Option<Result<ToolCall, serde_json::Error>> {
        let call = self.call.filter(|c| !c.name.is_empty())?;
        let arguments = if call.arguments.trim().is_empty() {
            Ok(json!({}))
        } else {
            serde_json::from_str::<Value>(&call.arguments)
        };
        Some(arguments.map(|args| ToolCall::new(call.resolved_name(), args)))
    }
}
