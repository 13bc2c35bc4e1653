use anyhow::Result;
use cliclack::spinner;

use texchat::tools::{PubMedResolver, ToolResolver};

pub async fn handle_cite(title: &str) -> Result<()> {
    let resolver = PubMedResolver::new()?;
    let spin = spinner();
    spin.start("Searching PubMed...");
    let result = resolver.fetch_citation(title).await;
    spin.stop("");
    println!("{}", result?);
    Ok(())
}

pub async fn handle_abstract(title: &str) -> Result<()> {
    let resolver = PubMedResolver::new()?;
    let spin = spinner();
    spin.start("Searching PubMed...");
    // no conversation here, so citation keys cannot be mapped back to titles
    let result = resolver.fetch_abstract(title, &[]).await;
    spin.stop("");
    println!("{}", result?);
    Ok(())
}
