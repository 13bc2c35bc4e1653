//! The two lookup tools the model may call, and the dispatch from a streamed
//! tool call to the resolver that answers it.
//!
//! Tool output is plain text that ends up in the assistant's reply, so every
//! failure below this boundary is turned into an `Error: ...` string instead of
//! being propagated.
pub mod pubmed;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, EnumIter, EnumString};

use crate::errors::{ChatError, ChatResult};
use crate::models::message::{last_user_content, Message};
use crate::models::tool::{Tool, ToolCall};

pub use pubmed::PubMedResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, AsRefStr)]
pub enum ToolKind {
    #[strum(to_string = "fetchPubMedCitation")]
    Citation,
    #[strum(to_string = "fetchPubMedAbstract")]
    Abstract,
}

impl ToolKind {
    pub fn from_name(name: &str) -> ChatResult<Self> {
        ToolKind::from_str(name).map_err(|_| ChatError::UnknownTool(name.to_string()))
    }

    pub fn name(&self) -> &str {
        self.as_ref()
    }

    pub fn descriptor(&self) -> Tool {
        match self {
            ToolKind::Citation => Tool::new(
                self.name(),
                "Search PubMed for an article by title and return a BibTeX citation in LaTeX format.",
                json!({
                    "type": "object",
                    "properties": { "title": { "type": "string" } },
                    "required": ["title"]
                }),
            ),
            ToolKind::Abstract => Tool::new(
                self.name(),
                "Fetch the abstract of a PubMed article given its citation key or title.",
                json!({
                    "type": "object",
                    "properties": { "citationKeyOrTitle": { "type": "string" } },
                    "required": ["citationKeyOrTitle"]
                }),
            ),
        }
    }
}

/// Descriptors for every tool offered to the model
pub fn tool_descriptors() -> Vec<Tool> {
    ToolKind::iter().map(|kind| kind.descriptor()).collect()
}

/// Side-effecting lookups behind the two tools
#[async_trait]
pub trait ToolResolver: Send + Sync {
    /// BibTeX citation plus a source link for an article title
    async fn fetch_citation(&self, title: &str) -> ChatResult<String>;

    /// Abstract text plus a source link. `history` lets a citation key from an
    /// earlier answer be mapped back to its title.
    async fn fetch_abstract(&self, key_or_title: &str, history: &[Message]) -> ChatResult<String>;
}

lazy_static! {
    // Selected editor text is sent as ```latex\n"<selection>"``` by the session
    static ref LATEX_QUOTE: Regex = Regex::new(r#"```latex\n"([^"]+)"```"#).unwrap();
}

/// Run a completed tool call and return the text to show as the final fragment.
///
/// `None` means the name matched no known tool; that call is dropped.
pub async fn resolve_tool_call(
    resolver: &dyn ToolResolver,
    call: &ToolCall,
    history: &[Message],
) -> Option<String> {
    let kind = match ToolKind::from_name(&call.name) {
        Ok(kind) => kind,
        Err(e) => {
            tracing::warn!("Ignoring tool call: {}", e);
            return None;
        }
    };
    let last_user = last_user_content(history);

    let output = match kind {
        ToolKind::Citation => {
            // Fallback when the model omits the title: the quoted LaTeX selection,
            // then the whole last user message.
            let title = call
                .str_arg("title")
                .or_else(|| {
                    LATEX_QUOTE
                        .captures(last_user)
                        .and_then(|c| c.get(1))
                        .map(|m| m.as_str())
                })
                .unwrap_or(last_user);
            if title.trim().is_empty() {
                Err(ChatError::Tool("No article title provided.".into()))
            } else {
                resolver.fetch_citation(title).await
            }
        }
        ToolKind::Abstract => {
            let key = call.str_arg("citationKeyOrTitle").unwrap_or(last_user);
            if key.trim().is_empty() {
                Err(ChatError::Tool("No citation key or title provided.".into()))
            } else {
                resolver.fetch_abstract(key, history).await
            }
        }
    };

    Some(output.unwrap_or_else(|e| format!("Error: {}", e)))
}
