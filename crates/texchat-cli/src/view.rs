use console::style;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use texchat::models::role::Role;
use texchat::session::ChatView;

const TRANSCRIPT_HEAD: &str = concat!(
    "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>texchat</title></head>\n",
    "<body><div class=\"chat-messages\">\n"
);
const TRANSCRIPT_TAIL: &str = "</div></body></html>\n";

/// Prints streamed text as it arrives and optionally mirrors the rendered
/// conversation to an HTML file.
pub struct TerminalView {
    printed: usize,
    transcript: Option<Transcript>,
}

struct Transcript {
    path: PathBuf,
    messages: Vec<(Role, String)>,
}

impl Transcript {
    fn write(&self) -> io::Result<()> {
        let mut html = String::from(TRANSCRIPT_HEAD);
        for (role, body) in &self.messages {
            html.push_str(&format!(
                "<div class=\"message {}-message\">{}</div>\n",
                role, body
            ));
        }
        html.push_str(TRANSCRIPT_TAIL);
        fs::write(&self.path, html)
    }
}

impl TerminalView {
    pub fn new(transcript: Option<PathBuf>) -> Self {
        Self {
            printed: 0,
            transcript: transcript.map(|path| Transcript {
                path,
                messages: Vec::new(),
            }),
        }
    }

    /// Start a fresh transcript, e.g. after the conversation is cleared
    pub fn clear(&mut self) {
        if let Some(transcript) = &mut self.transcript {
            transcript.messages.clear();
            self.flush_transcript();
        }
    }

    fn flush_transcript(&self) {
        if let Some(transcript) = &self.transcript {
            if let Err(e) = transcript.write() {
                tracing::warn!("Failed to write transcript {}: {}", transcript.path.display(), e);
            }
        }
    }
}

impl ChatView for TerminalView {
    fn display(&mut self, role: Role, text: &str, html: &str) {
        match role {
            // the user just typed it
            Role::User => {}
            Role::Assistant => {
                print!("{} ", style("assistant>").cyan().bold());
                self.printed = 0;
                self.print_suffix(text);
            }
            Role::System => {
                println!();
                println!("{}", style(text).red());
            }
        }

        if let Some(transcript) = &mut self.transcript {
            transcript.messages.push((role, html.to_string()));
        }
        self.flush_transcript();
    }

    fn update(&mut self, text: &str, html: &str) {
        self.print_suffix(text);

        if let Some(transcript) = &mut self.transcript {
            if let Some((_, body)) = transcript.messages.last_mut() {
                *body = html.to_string();
            }
        }
        self.flush_transcript();
    }
}

impl TerminalView {
    fn print_suffix(&mut self, text: &str) {
        // Replies only ever grow, so everything up to `printed` is on screen already
        if let Some(suffix) = text.get(self.printed..) {
            print!("{}", suffix);
            let _ = io::stdout().flush();
            self.printed = text.len();
        }
    }
}
