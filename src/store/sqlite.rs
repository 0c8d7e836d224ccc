//! SQLite-backed [`SearchBackend`].
//!
//! Phonetic keys and search tokens live in space-joined text columns; a
//! conjunctive match is one `LIKE '% key %'` clause per query term. Location
//! maps are stored as JSON and timestamps as Unix seconds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, BTreeSet};

use crate::fingerprint::query_terms;
use crate::models::{BookRecord, Location, RefreshResult, SearchPage};
use crate::traits::SearchBackend;

const BOOK_COLUMNS: &str = "identity_hash, title, author, language, description, \
    phonetic_keys, search_tokens, added_at, locations_json, converted";

pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn join_keys(keys: &BTreeSet<String>) -> String {
    keys.iter().cloned().collect::<Vec<_>>().join(" ")
}

fn split_keys(joined: &str) -> BTreeSet<String> {
    joined.split_whitespace().map(|s| s.to_string()).collect()
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn row_to_record(row: &SqliteRow) -> Result<BookRecord> {
    let locations_json: String = row.get("locations_json");
    let locations: BTreeMap<String, Location> = serde_json::from_str(&locations_json)
        .with_context(|| format!("corrupt locations for {}", row.get::<String, _>("identity_hash")))?;
    let phonetic: String = row.get("phonetic_keys");
    let tokens: String = row.get("search_tokens");
    let converted: i64 = row.get("converted");

    Ok(BookRecord {
        identity_hash: row.get("identity_hash"),
        title: row.get("title"),
        author: row.get("author"),
        language: row.get("language"),
        description: row.get("description"),
        phonetic_keys: split_keys(&phonetic),
        search_tokens: split_keys(&tokens),
        added_at: from_ts(row.get("added_at")),
        locations,
        converted: converted != 0,
    })
}

fn row_to_refresh(row: &SqliteRow) -> Result<RefreshResult> {
    let id: String = row.get("id");
    let count = |col: &str| row.get::<i64, _>(col).max(0) as u64;
    Ok(RefreshResult {
        id: id.parse().with_context(|| format!("corrupt refresh id {}", id))?,
        started_at: from_ts(row.get("started_at")),
        stopped_at: from_ts(row.get("stopped_at")),
        already_present: count("already_present"),
        added: count("added"),
        duplicate: count("duplicate"),
        invalid: count("invalid"),
        rejected: count("rejected"),
        failed: count("failed"),
        cancelled: count("cancelled"),
    })
}

/// `WHERE` clause and LIKE patterns for a conjunctive lexical-or-phonetic match.
fn match_clause(query: &str) -> (String, Vec<String>) {
    let (tokens, codes) = query_terms(query);
    let mut branches = Vec::new();
    let mut binds = Vec::new();

    for (column, terms) in [("search_tokens", &tokens), ("phonetic_keys", &codes)] {
        if terms.is_empty() {
            continue;
        }
        let clauses: Vec<String> = terms
            .iter()
            .map(|_| format!("(' ' || {} || ' ') LIKE ?", column))
            .collect();
        branches.push(format!("({})", clauses.join(" AND ")));
        binds.extend(terms.iter().map(|t| format!("% {} %", t)));
    }

    if branches.is_empty() {
        (String::new(), binds)
    } else {
        (format!("WHERE {}", branches.join(" OR ")), binds)
    }
}

#[async_trait]
impl SearchBackend for SqliteBackend {
    async fn add_batch(&self, records: &[BookRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            let locations_json = serde_json::to_string(&record.locations)?;
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO books (identity_hash, title, author, language, description,
                                             phonetic_keys, search_tokens, added_at,
                                             locations_json, converted)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.identity_hash)
            .bind(&record.title)
            .bind(&record.author)
            .bind(&record.language)
            .bind(&record.description)
            .bind(join_keys(&record.phonetic_keys))
            .bind(join_keys(&record.search_tokens))
            .bind(record.added_at.timestamp())
            .bind(&locations_json)
            .bind(record.converted as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_hash(&self, hash: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM books WHERE identity_hash = ?")
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_by_hash(&self, hash: &str) -> Result<Option<BookRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM books WHERE identity_hash = ?",
            BOOK_COLUMNS
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<SearchPage> {
        let (where_clause, binds) = match_clause(query);

        let count_sql = format!("SELECT COUNT(*) FROM books {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for b in &binds {
            count_query = count_query.bind(b);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let select_sql = format!(
            "SELECT {} FROM books {} ORDER BY added_at DESC, identity_hash ASC LIMIT ? OFFSET ?",
            BOOK_COLUMNS, where_clause
        );
        let mut select = sqlx::query(&select_sql);
        for b in &binds {
            select = select.bind(b);
        }
        let rows = select
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;

        let items = rows.iter().map(row_to_record).collect::<Result<Vec<_>>>()?;
        Ok(SearchPage {
            items,
            total: total.max(0) as u64,
        })
    }

    async fn set_location(&self, hash: &str, tag: &str, location: &Location) -> Result<bool> {
        let Some(mut record) = self.get_by_hash(hash).await? else {
            return Ok(false);
        };
        record.locations.insert(tag.to_string(), location.clone());
        let locations_json = serde_json::to_string(&record.locations)?;

        let result = sqlx::query("UPDATE books SET locations_json = ? WHERE identity_hash = ?")
            .bind(&locations_json)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_converted(&self, hash: &str, converted: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE books SET converted = ? WHERE identity_hash = ?")
            .bind(converted as i64)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_refresh(&self, result: &RefreshResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refreshes (id, started_at, stopped_at, already_present, added,
                                   duplicate, invalid, rejected, failed, cancelled)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.id.to_string())
        .bind(result.started_at.timestamp())
        .bind(result.stopped_at.timestamp())
        .bind(result.already_present as i64)
        .bind(result.added as i64)
        .bind(result.duplicate as i64)
        .bind(result.invalid as i64)
        .bind(result.rejected as i64)
        .bind(result.failed as i64)
        .bind(result.cancelled as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn refreshes(&self, limit: usize) -> Result<Vec<RefreshResult>> {
        let rows = sqlx::query(
            r#"
            SELECT id, started_at, stopped_at, already_present, added, duplicate,
                   invalid, rejected, failed, cancelled
            FROM refreshes
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_refresh).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{compute_identity_hash, compute_phonetic_keys, compute_search_tokens};
    use crate::models::EPUB_TAG;
    use chrono::Duration;

    async fn backend() -> (tempfile::TempDir, SqliteBackend) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::connect_path(&dir.path().join("books.sqlite"))
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        (dir, SqliteBackend::new(pool))
    }

    fn record(author: &str, title: &str, age_secs: i64) -> BookRecord {
        let text = format!("{} {}", title, author);
        BookRecord {
            identity_hash: compute_identity_hash(author, title),
            title: title.to_string(),
            author: author.to_string(),
            language: "en".to_string(),
            description: "A book.".to_string(),
            phonetic_keys: compute_phonetic_keys(&text),
            search_tokens: compute_search_tokens(&text),
            added_at: Utc::now() - Duration::seconds(age_secs),
            locations: BTreeMap::from([(
                EPUB_TAG.to_string(),
                Location::file(format!("/books/{}.epub", title)),
            )]),
            converted: false,
        }
    }

    #[tokio::test]
    async fn round_trips_records_and_ignores_known_hashes() {
        let (_dir, backend) = backend().await;
        let r = record("Cormac McCarthy", "The Road", 0);
        backend.add_batch(&[r.clone()]).await.unwrap();
        backend.add_batch(&[r.clone()]).await.unwrap();

        assert_eq!(backend.count().await.unwrap(), 1);
        let stored = backend.get_by_hash(&r.identity_hash).await.unwrap().unwrap();
        assert_eq!(stored.title, r.title);
        assert_eq!(stored.phonetic_keys, r.phonetic_keys);
        assert_eq!(stored.search_tokens, r.search_tokens);
        assert_eq!(stored.locations, r.locations);
        assert_eq!(stored.added_at.timestamp(), r.added_at.timestamp());
    }

    #[tokio::test]
    async fn conjunctive_search_newest_first() {
        let (_dir, backend) = backend().await;
        backend
            .add_batch(&[
                record("Cormac McCarthy", "The Road", 30),
                record("Cormac McCarthy", "Blood Meridian", 10),
                record("Jack Kerouac", "On the Road", 20),
            ])
            .await
            .unwrap();

        let page = backend.search("road", 10, 0).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].title, "On the Road");

        let page = backend.search("road mccarthy", 10, 0).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].title, "The Road");

        let page = backend.search("", 2, 2).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "The Road");

        assert_eq!(backend.search("zebra", 10, 0).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn updates_and_delete() {
        let (_dir, backend) = backend().await;
        let r = record("Jack Kerouac", "On the Road", 0);
        let hash = r.identity_hash.clone();
        backend.add_batch(&[r]).await.unwrap();

        assert!(backend
            .set_location(&hash, "mobi", &Location::file("/books/road.mobi"))
            .await
            .unwrap());
        assert!(backend.set_converted(&hash, true).await.unwrap());
        let stored = backend.get_by_hash(&hash).await.unwrap().unwrap();
        assert!(stored.converted);
        assert_eq!(stored.locations.len(), 2);

        assert!(backend.delete_by_hash(&hash).await.unwrap());
        assert!(backend.get_by_hash(&hash).await.unwrap().is_none());
        assert!(!backend
            .set_location(&hash, "mobi", &Location::file("/x"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn refresh_history_newest_first() {
        let (_dir, backend) = backend().await;
        let now = Utc::now();
        let mut first = RefreshResult::started(now - Duration::seconds(60));
        first.added = 3;
        let mut second = RefreshResult::started(now);
        second.duplicate = 2;
        backend.record_refresh(&first).await.unwrap();
        backend.record_refresh(&second).await.unwrap();

        let history = backend.refreshes(10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[0].duplicate, 2);
        assert_eq!(history[1].added, 3);
        assert_eq!(backend.refreshes(1).await.unwrap().len(), 1);
    }
}
