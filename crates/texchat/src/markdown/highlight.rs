use lazy_static::lazy_static;
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

/// Syntax highlighting for fenced code blocks
pub trait Highlighter: Send + Sync {
    /// Whether `lang` (already lowercased) names a grammar this highlighter knows
    fn supports(&self, lang: &str) -> bool;

    /// Highlighted HTML for `code`, or `None` to fall back to escaped text
    fn highlight(&self, lang: &str, code: &str) -> Option<String>;
}

lazy_static! {
    static ref SYNTAX_SET: SyntaxSet = SyntaxSet::load_defaults_newlines();
}

/// Classed `<span>` output from syntect's bundled grammars; styling is left to CSS
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntectHighlighter;

impl SyntectHighlighter {
    pub fn new() -> Self {
        Self
    }

    fn syntax(&self, lang: &str) -> Option<&'static SyntaxReference> {
        SYNTAX_SET.find_syntax_by_token(lang)
    }
}

impl Highlighter for SyntectHighlighter {
    fn supports(&self, lang: &str) -> bool {
        self.syntax(lang).is_some()
    }

    fn highlight(&self, lang: &str, code: &str) -> Option<String> {
        let syntax = self.syntax(lang)?;
        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAX_SET, ClassStyle::Spaced);
        for line in LinesWithEndings::from(code) {
            if let Err(e) = generator.parse_html_for_line_which_includes_newline(line) {
                tracing::debug!("highlighting {} failed: {}", lang, e);
                return None;
            }
        }
        Some(generator.finalize())
    }
}
