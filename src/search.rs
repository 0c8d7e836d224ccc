//! `booksing search` output.

use anyhow::Result;

use crate::app::App;
use crate::config::Config;
use crate::models::SearchPage;

pub async fn run_search(config: &Config, query: &str, limit: usize, offset: usize, json: bool) -> Result<()> {
    let app = App::open(config).await?;
    let page = app.library().search(query, limit, offset).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }
    print_page(&page, offset);
    Ok(())
}

fn print_page(page: &SearchPage, offset: usize) {
    if page.items.is_empty() {
        println!("No results.");
        return;
    }

    println!(
        "  {:<32} {:<24} {:<4} {}",
        "TITLE", "AUTHOR", "LANG", "HASH"
    );
    println!("  {}", "-".repeat(90));
    for record in &page.items {
        println!(
            "  {:<32} {:<24} {:<4} {}",
            truncate(&record.title, 32),
            truncate(&record.author, 24),
            record.language,
            record.identity_hash
        );
    }
    println!();
    println!(
        "  {}-{} of {}",
        offset + 1,
        offset + page.items.len(),
        page.total
    );
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('~');
        out
    }
}
