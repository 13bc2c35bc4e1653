use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod view;

use commands::chat::handle_chat;
use commands::configure::handle_configure;
use commands::lookup::{handle_abstract, handle_cite};
use commands::render::handle_render;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to <config dir>/texchat/settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Set the API key, endpoint and model
    Configure,

    /// Chat with the LaTeX assistant
    Chat {
        /// File whose contents are sent as LaTeX context with the first message
        #[arg(long)]
        selection: Option<PathBuf>,

        /// Keep an HTML transcript of the conversation in this file
        #[arg(long)]
        transcript: Option<PathBuf>,
    },

    /// Render Markdown from a file (or stdin) to HTML
    Render {
        file: Option<PathBuf>,

        /// Skip syntax highlighting
        #[arg(long)]
        plain: bool,
    },

    /// Look up a BibTeX citation on PubMed by article title
    Cite { title: String },

    /// Look up an article abstract on PubMed by title
    Abstract { title: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Configure => handle_configure(cli.settings)?,
        Command::Chat {
            selection,
            transcript,
        } => handle_chat(cli.settings, selection, transcript).await?,
        Command::Render { file, plain } => handle_render(file, plain)?,
        Command::Cite { title } => handle_cite(&title).await?,
        Command::Abstract { title } => handle_abstract(&title).await?,
    }
    Ok(())
}
