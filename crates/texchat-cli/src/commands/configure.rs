use anyhow::Result;
use console::style;
use std::path::PathBuf;

use texchat::settings::{FileSettingsStore, Settings, SettingsStore};

pub fn settings_store(path: Option<PathBuf>) -> Result<FileSettingsStore> {
    let path = match path {
        Some(path) => path,
        None => FileSettingsStore::default_path()?,
    };
    Ok(FileSettingsStore::new(path))
}

pub fn handle_configure(path: Option<PathBuf>) -> Result<()> {
    cliclack::intro(style(" configure-texchat ").on_cyan().black())?;

    let store = settings_store(path)?;
    let existing = store.load()?;

    let api_key = if existing.api_key.is_empty()
        || cliclack::confirm("An API key is already saved. Would you like to replace it?")
            .initial_value(false)
            .interact()?
    {
        cliclack::password("Enter your API key").mask('▪').interact()?
    } else {
        existing.api_key.clone()
    };

    let api_endpoint: String = cliclack::input("Chat completions endpoint:")
        .default_input(&existing.api_endpoint)
        .interact()?;

    let model: String = cliclack::input("Model:")
        .default_input(&existing.model)
        .interact()?;

    let settings = Settings::new(api_key, api_endpoint, model);
    if let Err(e) = settings.validate() {
        cliclack::outro_cancel(e.to_string())?;
        return Ok(());
    }

    store.save(&settings)?;
    cliclack::outro(format!(
        "Saved to {}",
        style(store.path().display()).green()
    ))?;
    Ok(())
}
