//! Per-book CLI commands: `get`, `exists`, `delete`, `convert`, `fetch`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::app::App;
use crate::config::Config;
use crate::library::Library;
use crate::models::BookRecord;

pub async fn run_get(config: &Config, hash: &str, json: bool) -> Result<()> {
    let library = App::open(config).await?.library();
    let Some(record) = library.get(hash).await? else {
        bail!("book not found: {}", hash);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record);
    }
    Ok(())
}

fn print_record(record: &BookRecord) {
    println!("--- Book ---");
    println!("hash:        {}", record.identity_hash);
    println!("title:       {}", record.title);
    println!("author:      {}", record.author);
    println!("language:    {}", record.language);
    println!("added_at:    {}", record.added_at.to_rfc3339());
    println!("converted:   {}", record.converted);
    for (tag, location) in &record.locations {
        println!("{:<12} {}", format!("{}:", tag), location);
    }
    if !record.description.is_empty() {
        println!();
        println!("--- Description ---");
        println!("{}", record.description);
    }
}

/// Prints the identity hash and whether it is cataloged. Exits with status 1
/// when the book is absent.
pub async fn run_exists(config: &Config, author: &str, title: &str) -> Result<()> {
    let library = App::open(config).await?.library();
    let hash = Library::identity_for(author, title);
    if library.exists(author, title).await? {
        println!("present  {}", hash);
        Ok(())
    } else {
        println!("absent   {}", hash);
        std::process::exit(1);
    }
}

pub async fn run_delete(config: &Config, hash: &str) -> Result<()> {
    let library = App::open(config).await?.library();
    if !library.delete(hash).await? {
        bail!("book not found: {}", hash);
    }
    println!("deleted {}", hash);
    Ok(())
}

pub async fn run_convert(config: &Config, hash: &str) -> Result<()> {
    let library = App::open(config).await?.library();
    let location = library.convert(hash).await?;
    println!("converted {} -> {}", hash, location);
    Ok(())
}

pub async fn run_fetch(
    config: &Config,
    hash: &str,
    tag: &str,
    output: Option<&Path>,
) -> Result<()> {
    let library = App::open(config).await?.library();
    let Some(record) = library.get(hash).await? else {
        bail!("book not found: {}", hash);
    };
    let dest: PathBuf = match output {
        Some(path) => path.to_path_buf(),
        None => Library::default_fetch_name(&record, tag),
    };

    let written = library.fetch(hash, tag, &dest).await?;
    println!("wrote {} bytes to {}", written, dest.display());
    Ok(())
}
