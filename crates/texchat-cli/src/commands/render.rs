use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use texchat::markdown::MarkdownRenderer;

pub fn handle_render(file: Option<PathBuf>, plain: bool) -> Result<()> {
    let text = match file {
        Some(path) => fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            text
        }
    };

    let renderer = if plain {
        MarkdownRenderer::plain()
    } else {
        MarkdownRenderer::default()
    };
    println!("{}", renderer.render(&text));
    Ok(())
}
