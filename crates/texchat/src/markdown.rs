//! Markdown subset to HTML, safe to set as element contents.
//!
//! The renderer is stateless: a streaming reply is re-rendered in full after
//! every delta. Code is pulled out first and swapped for placeholders so the
//! escaping and the line-oriented rules never see it, then put back last.
//!
//! Supported: `#`/`##`/`###` headings, `**bold**`, `*italic*`, `[label](url)`,
//! `-` list items, line breaks, fenced and inline code.
pub mod highlight;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

pub use highlight::{Highlighter, SyntectHighlighter};

const FALLBACK_LANGUAGE: &str = "text";

// Private-use delimiters: never produced by escaping or by any rule below
const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

lazy_static! {
    static ref CODE_BLOCK: Regex = Regex::new(r"(?s)```(?:(\w+)\n)?(.*?)```").unwrap();
    static ref INLINE_CODE: Regex = Regex::new(r"`([^`\n]+)`").unwrap();
    static ref H3: Regex = Regex::new(r"(?m)^### (.*)$").unwrap();
    static ref H2: Regex = Regex::new(r"(?m)^## (.*)$").unwrap();
    static ref H1: Regex = Regex::new(r"(?m)^# (.*)$").unwrap();
    static ref BOLD: Regex = Regex::new(r"\*\*(.*?)\*\*").unwrap();
    static ref ITALIC: Regex = Regex::new(r"\*(.*?)\*").unwrap();
    static ref LINK: Regex = Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap();
    static ref LIST_ITEM: Regex = Regex::new(r"(?m)^[ \t]*-[ \t]*(.*)$").unwrap();
    static ref LIST_RUN: Regex = Regex::new(r"(?:<li>.*?</li>\s*)+").unwrap();
    static ref ITEM_GAP: Regex = Regex::new(r"</li>\s+").unwrap();
}

/// Escape `& < > " '` for use in element content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

fn placeholder(kind: &str, index: usize) -> String {
    format!("{}{}{}{}", PLACEHOLDER_OPEN, kind, index, PLACEHOLDER_CLOSE)
}

/// Text with code swapped out, plus the rendered code in extraction order
struct Extracted {
    text: String,
    code_blocks: Vec<String>,
    inline_codes: Vec<String>,
}

pub struct MarkdownRenderer {
    highlighter: Option<Box<dyn Highlighter>>,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(SyntectHighlighter::new())
    }
}

impl MarkdownRenderer {
    pub fn new<H: Highlighter + 'static>(highlighter: H) -> Self {
        Self {
            highlighter: Some(Box::new(highlighter)),
        }
    }

    /// No highlighting: every block is labelled `text` and only escaped
    pub fn plain() -> Self {
        Self { highlighter: None }
    }

    pub fn render(&self, text: &str) -> String {
        let Extracted {
            text,
            code_blocks,
            inline_codes,
        } = self.extract_code(text);

        let mut html = escape_html(&text);
        html = H3.replace_all(&html, "<h3>${1}</h3>").into_owned();
        html = H2.replace_all(&html, "<h2>${1}</h2>").into_owned();
        html = H1.replace_all(&html, "<h1>${1}</h1>").into_owned();
        html = BOLD.replace_all(&html, "<strong>${1}</strong>").into_owned();
        html = ITALIC.replace_all(&html, "<em>${1}</em>").into_owned();
        html = LINK.replace_all(&html, render_link).into_owned();
        html = LIST_ITEM.replace_all(&html, "<li>${1}</li>").into_owned();
        html = LIST_RUN
            .replace_all(&html, |caps: &Captures| {
                format!("<ul>{}</ul>", ITEM_GAP.replace_all(caps[0].trim_end(), "</li>"))
            })
            .into_owned();
        html = html.replace('\n', "<br>");

        for (i, block) in code_blocks.iter().enumerate() {
            html = html.replacen(&placeholder("CODEBLOCK", i), block, 1);
        }
        for (i, inline) in inline_codes.iter().enumerate() {
            html = html.replacen(&placeholder("INLINECODE", i), inline, 1);
        }
        html
    }

    fn extract_code(&self, text: &str) -> Extracted {
        let mut code_blocks = Vec::new();
        let text = CODE_BLOCK.replace_all(text, |caps: &Captures| {
            let lang = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            code_blocks.push(self.render_code_block(lang, caps[2].trim()));
            placeholder("CODEBLOCK", code_blocks.len() - 1)
        });

        let mut inline_codes = Vec::new();
        let text = INLINE_CODE.replace_all(&text, |caps: &Captures| {
            inline_codes.push(format!(
                "<code class=\"inline-code\">{}</code>",
                escape_html(&caps[1])
            ));
            placeholder("INLINECODE", inline_codes.len() - 1)
        });

        Extracted {
            text: text.into_owned(),
            code_blocks,
            inline_codes,
        }
    }

    fn display_language(&self, tag: &str) -> String {
        let lang = tag.to_lowercase();
        match &self.highlighter {
            Some(h) if !lang.is_empty() && h.supports(&lang) => lang,
            _ => FALLBACK_LANGUAGE.to_string(),
        }
    }

    fn render_code_block(&self, tag: &str, code: &str) -> String {
        let lang = self.display_language(tag);
        let escaped = escape_html(code);
        let body = self
            .highlighter
            .as_ref()
            .filter(|_| lang != FALLBACK_LANGUAGE)
            .and_then(|h| h.highlight(&lang, code))
            .unwrap_or_else(|| escaped.clone());

        format!(
            concat!(
                "<div class=\"code-block\">",
                "<div class=\"code-header\">",
                "<span class=\"code-language\">{lang}</span>",
                "<button class=\"copy-button\" data-code=\"{raw}\">Copy</button>",
                "</div>",
                "<pre class=\"language-{lang}\"><code class=\"language-{lang}\">{body}</code></pre>",
                "</div>"
            ),
            lang = lang,
            raw = escaped,
            body = body
        )
    }
}

/// Anchor for safe targets; anything else (e.g. `javascript:`) stays as text
fn render_link(caps: &Captures) -> String {
    let label = &caps[1];
    let url = restore_emphasis(&caps[2]);
    if url.contains('<') {
        return caps[0].to_string();
    }
    let scheme = url
        .split_once(':')
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .filter(|scheme| !scheme.contains('/'));
    match scheme.as_deref() {
        None | Some("http") | Some("https") | Some("mailto") => format!(
            "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a>",
            url, label
        ),
        Some(_) => caps[0].to_string(),
    }
}

/// Undo the emphasis passes inside a URL; by this point the only tags in the
/// text are the ones they inserted
fn restore_emphasis(url: &str) -> String {
    url.replace("<strong>", "**")
        .replace("</strong>", "**")
        .replace("<em>", "*")
        .replace("</em>", "*")
}
