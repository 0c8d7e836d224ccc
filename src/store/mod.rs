//! Search backend implementations.
//!
//! Both backends implement [`SearchBackend`](crate::traits::SearchBackend)
//! with the same semantics: records are keyed by identity hash, re-adding a
//! known hash is a no-op, and search is a conjunctive lexical-or-phonetic
//! match returned newest first.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
