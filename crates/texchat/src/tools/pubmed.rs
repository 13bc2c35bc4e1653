use async_trait::async_trait;
use lazy_static::lazy_static;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::errors::{ChatError, ChatResult};
use crate::models::message::Message;

use super::ToolResolver;

pub const EUTILS_HOST: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const PUBMED_ARTICLE_URL: &str = "https://pubmed.ncbi.nlm.nih.gov";
const ABSTRACT_TEXT: &[u8] = b"AbstractText";

lazy_static! {
    static ref BIBTEX_TITLE: Regex = Regex::new(r"title = \{([^}]+)\}").unwrap();
}

/// Looks articles up through the NCBI E-utilities API
pub struct PubMedResolver {
    client: Client,
    host: String,
}

impl PubMedResolver {
    pub fn new() -> ChatResult<Self> {
        Self::with_host(EUTILS_HOST)
    }

    pub fn with_host<S: Into<String>>(host: S) -> ChatResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> ChatResult<reqwest::Response> {
        let url = format!("{}/{}", self.host, endpoint);
        tracing::debug!(%url, "querying PubMed");
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Tool(format!("PubMed request failed: {}", status)));
        }
        Ok(response)
    }

    /// First PubMed id matching the search term
    async fn search(&self, term: &str) -> ChatResult<Option<String>> {
        let data: Value = self
            .get(
                "esearch.fcgi",
                &[("db", "pubmed"), ("term", term), ("retmode", "json"), ("retmax", "1")],
            )
            .await?
            .json()
            .await?;

        Ok(data["esearchresult"]["idlist"]
            .get(0)
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

#[async_trait]
impl ToolResolver for PubMedResolver {
    async fn fetch_citation(&self, title: &str) -> ChatResult<String> {
        let Some(pmid) = self.search(title).await? else {
            return Ok("No articles found on PubMed for this title.".to_string());
        };

        let data: Value = self
            .get(
                "esummary.fcgi",
                &[("db", "pubmed"), ("id", pmid.as_str()), ("retmode", "json")],
            )
            .await?
            .json()
            .await?;

        match data["result"].get(&pmid).filter(|a| a.is_object()) {
            Some(article) => Ok(format_citation(&pmid, article)),
            None => Ok("Failed to retrieve article details.".to_string()),
        }
    }

    async fn fetch_abstract(&self, key_or_title: &str, history: &[Message]) -> ChatResult<String> {
        let title = title_for_key(key_or_title, history).unwrap_or(key_or_title);

        let Some(pmid) = self.search(title).await? else {
            return Ok("No articles found on PubMed for this title or citation key.".to_string());
        };

        let xml = self
            .get(
                "efetch.fcgi",
                &[("db", "pubmed"), ("id", pmid.as_str()), ("retmode", "xml")],
            )
            .await?
            .text()
            .await?;

        match extract_abstract(&xml) {
            Some(text) => Ok(format!("{}\n{}", text, pubmed_link(&pmid))),
            None => Ok("No abstract available.".to_string()),
        }
    }
}

/// Title of the newest BibTeX entry in an assistant answer that mentions `key`
fn title_for_key<'a>(key: &str, history: &'a [Message]) -> Option<&'a str> {
    history
        .iter()
        .rev()
        .find(|m| m.is_assistant() && m.content.contains(key))
        .and_then(|m| BIBTEX_TITLE.captures(&m.content))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn pubmed_link(pmid: &str) -> String {
    format!("[View on PubMed]({}/{}/)", PUBMED_ARTICLE_URL, pmid)
}

fn summary_field<'a>(article: &'a Value, key: &str) -> &'a str {
    article.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// BibTeX entry for an esummary record, fenced as LaTeX and followed by the source link
fn format_citation(pmid: &str, article: &Value) -> String {
    let authors: Vec<&str> = article["authors"]
        .as_array()
        .map(|list| list.iter().filter_map(|a| a["name"].as_str()).collect())
        .unwrap_or_default();
    let year = summary_field(article, "pubdate")
        .split_whitespace()
        .next()
        .unwrap_or_default();
    let surname = authors
        .first()
        .and_then(|name| name.split_whitespace().next())
        .unwrap_or("unknown")
        .to_lowercase();

    let mut fields = vec![
        format!("    author = {{{}}}", authors.join(", ")),
        format!("    title = {{{}}}", summary_field(article, "title")),
        format!("    journal = {{{}}}", summary_field(article, "source")),
        format!("    year = {{{}}}", year),
        format!("    volume = {{{}}}", summary_field(article, "volume")),
    ];
    let issue = summary_field(article, "issue");
    if !issue.is_empty() {
        fields.push(format!("    number = {{({})}}", issue));
    }
    fields.push(format!("    pages = {{{}}}", summary_field(article, "pages")));

    format!(
        "```latex\n@article{{{}{},\n{}\n}}\n```\n{}",
        surname,
        year,
        fields.join(",\n"),
        pubmed_link(pmid)
    )
}

/// Text content of the first `<AbstractText>` element, markup dropped and
/// character references resolved
fn extract_abstract(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    // nesting depth below the first AbstractText; None until it is found
    let mut depth: Option<usize> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("malformed efetch XML: {}", e);
                break;
            }
        };
        match (event, depth) {
            (Event::Start(start), None) if start.local_name().as_ref() == ABSTRACT_TEXT => {
                depth = Some(0);
            }
            (Event::Start(_), Some(d)) => depth = Some(d + 1),
            (Event::End(_), Some(0)) => break,
            (Event::End(_), Some(d)) => depth = Some(d - 1),
            (Event::Text(t), Some(_)) => match t.unescape() {
                Ok(unescaped) => text.push_str(&unescaped),
                Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
            },
            (Event::CData(c), Some(_)) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
            (Event::Eof, _) => break,
            _ => {}
        }
    }

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
