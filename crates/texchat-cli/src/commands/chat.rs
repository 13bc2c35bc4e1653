use anyhow::{Context, Result};
use console::style;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use texchat::markdown::MarkdownRenderer;
use texchat::providers::openai::OpenAiProvider;
use texchat::session::ChatSession;
use texchat::tools::PubMedResolver;

use super::configure::settings_store;
use crate::view::TerminalView;

const PROMPT: &str = "\x1b[1m\x1b[38;5;30mtex> \x1b[0m";

enum Input {
    Message(String),
    Clear,
    Exit,
}

fn read_input(editor: &mut DefaultEditor) -> Result<Input> {
    match editor.readline(PROMPT) {
        Ok(line) => {
            let _ = editor.add_history_entry(line.as_str());
            Ok(match line.trim() {
                "exit" => Input::Exit,
                "/clear" => Input::Clear,
                _ => Input::Message(line),
            })
        }
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(Input::Exit),
        Err(e) => Err(e.into()),
    }
}

pub async fn handle_chat(
    settings: Option<PathBuf>,
    selection: Option<PathBuf>,
    transcript: Option<PathBuf>,
) -> Result<()> {
    let mut selection = match selection {
        Some(path) => Some(
            fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => None,
    };

    let provider = OpenAiProvider::new(
        Arc::new(settings_store(settings)?),
        Arc::new(PubMedResolver::new()?),
    )?;
    let renderer = MarkdownRenderer::default();
    let mut session = ChatSession::new();
    let mut view = TerminalView::new(transcript);
    let mut editor = DefaultEditor::new()?;

    println!(
        "LaTeX assistant {}",
        style("- type \"exit\" to end the session, \"/clear\" to start over").dim()
    );

    loop {
        let message = match read_input(&mut editor)? {
            Input::Exit => break,
            Input::Clear => {
                session.reset();
                view.clear();
                println!("{}", style("Conversation cleared.").dim());
                continue;
            }
            Input::Message(message) => message,
        };

        // the selection is offered once, with the first message that is sent
        let Some(prompt) = ChatSession::compose_prompt(&message, selection.as_deref()) else {
            continue;
        };
        selection = None;

        session.send(&provider, &renderer, &prompt, &mut view).await;
        println!("\n");
    }
    Ok(())
}
