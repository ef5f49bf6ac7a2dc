//! Document storage.
//!
//! The study engine only needs three capabilities from storage: fetch a
//! document with its revision, write a document against a revision (rejecting
//! stale revisions), and range-query one of a few fixed indices. [`DocStore`]
//! captures those; [`memory::MemoryStore`] and [`sqlite::SqliteStore`]
//! implement them.

pub mod memory;
pub mod merge;
pub mod schema;
pub mod sqlite;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::domain::card::CARD_PREFIX;
use crate::domain::{sibling_key_range, Card, Document};
use crate::error::{Error, Result};

pub use memory::MemoryStore;
pub use merge::{get_doc, save_doc, SaveOutcome};
pub use schema::run_migrations;
pub use sqlite::SqliteStore;

/// A stored body and the revision it was stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDoc {
    pub rev: String,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub id: String,
    pub key: String,
    pub doc: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    /// Unreviewed, unscheduled, unsuspended cards, keyed by `buriedUntil`
    NewCards,
    /// Scheduled, unsuspended cards, keyed by `due`
    OldCards,
    /// Every document, keyed by id
    AllDocs,
}

impl Index {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewCards => "new_cards",
            Self::OldCards => "old_cards",
            Self::AllDocs => "all_docs",
        }
    }
}

/// Range, offset and limit for an index query. Both keys are inclusive.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub limit: Option<usize>,
    /// Rows to pass over before the first one returned
    pub skip: usize,
    pub start_key: Option<String>,
    pub end_key: Option<String>,
}

impl QueryOptions {
    pub fn limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn range(start_key: impl Into<String>, end_key: impl Into<String>) -> Self {
        Self {
            start_key: Some(start_key.into()),
            end_key: Some(end_key.into()),
            ..Self::default()
        }
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.start_key.as_deref().is_none_or(|start| key >= start)
            && self.end_key.as_deref().is_none_or(|end| key <= end)
    }
}

/// Storage with per-document optimistic concurrency.
///
/// `put` must reject with [`Error::Conflict`] when `rev` is not the current
/// revision (or is given for a document that doesn't exist, or is missing for
/// one that does). At most one writer wins per (id, revision).
pub trait DocStore: Send + Sync {
    /// Fetch a document, or [`Error::NotFound`].
    fn get(&self, id: &str) -> Result<StoredDoc>;

    /// Write a document and return its new revision.
    fn put(&self, id: &str, body: &Value, rev: Option<&str>) -> Result<String>;

    /// Rows of `index` ordered by key, then id.
    fn query(&self, index: Index, opts: &QueryOptions, cancel: &CancellationToken) -> Result<Vec<QueryRow>>;
}

impl<S: DocStore + ?Sized> DocStore for &S {
    fn get(&self, id: &str) -> Result<StoredDoc> {
        (**self).get(id)
    }

    fn put(&self, id: &str, body: &Value, rev: Option<&str>) -> Result<String> {
        (**self).put(id, body, rev)
    }

    fn query(&self, index: Index, opts: &QueryOptions, cancel: &CancellationToken) -> Result<Vec<QueryRow>> {
        (**self).query(index, opts, cancel)
    }
}

impl<S: DocStore + ?Sized> DocStore for std::sync::Arc<S> {
    fn get(&self, id: &str) -> Result<StoredDoc> {
        (**self).get(id)
    }

    fn put(&self, id: &str, body: &Value, rev: Option<&str>) -> Result<String> {
        (**self).put(id, body, rev)
    }

    fn query(&self, index: Index, opts: &QueryOptions, cancel: &CancellationToken) -> Result<Vec<QueryRow>> {
        (**self).query(index, opts, cancel)
    }
}

fn is_card(id: &str) -> bool {
    id.starts_with(CARD_PREFIX)
}

fn is_suspended(body: &Value) -> bool {
    body.get("suspended").and_then(Value::as_bool).unwrap_or(false)
}

fn string_field<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get(field).and_then(Value::as_str)
}

/// The key a document has in `index`, or None if the index excludes it.
pub fn index_key(index: Index, id: &str, body: &Value) -> Option<String> {
    match index {
        Index::AllDocs => Some(id.to_string()),
        Index::NewCards => {
            if !is_card(id) || is_suspended(body) || string_field(body, "due").is_some() {
                return None;
            }
            let review_count = body.get("reviewCount").and_then(Value::as_u64).unwrap_or(0);
            if review_count != 0 {
                return None;
            }
            Some(string_field(body, "buriedUntil").unwrap_or_default().to_string())
        }
        Index::OldCards => {
            if !is_card(id) || is_suspended(body) {
                return None;
            }
            string_field(body, "due").map(str::to_string)
        }
    }
}

/// Revision token: `<generation>-<digest of the body>`.
pub fn revision(generation: u64, body: &Value) -> String {
    let digest = Sha256::digest(body.to_string().as_bytes());
    let hex = hex::encode(digest);
    format!("{}-{}", generation, &hex[..32])
}

pub fn generation(rev: &str) -> u64 {
    rev.split_once('-')
        .and_then(|(g, _)| g.parse().ok())
        .unwrap_or(0)
}

/// Decide the outcome of a put against the currently stored revision.
///
/// Returns `Ok(None)` when the body is unchanged (no write needed), or the
/// revision to write under.
pub(crate) fn check_put(
    id: &str,
    current: Option<&StoredDoc>,
    body: &Value,
    rev: Option<&str>,
) -> Result<Option<String>> {
    match (current, rev) {
        (None, None) => Ok(Some(revision(1, body))),
        (None, Some(_)) | (Some(_), None) => Err(Error::Conflict(id.to_string())),
        (Some(stored), Some(rev)) if stored.rev != rev => Err(Error::Conflict(id.to_string())),
        (Some(stored), Some(_)) if &stored.body == body => Ok(None),
        (Some(stored), Some(_)) => Ok(Some(revision(generation(&stored.rev) + 1, body))),
    }
}

/// Every other card of the same note as `card_id`.
pub fn fetch_siblings<S: DocStore + ?Sized>(store: &S, card_id: &str, cancel: &CancellationToken) -> Result<Vec<Card>> {
    let (start, end) = sibling_key_range(card_id);
    let rows = store.query(Index::AllDocs, &QueryOptions::range(start, end), cancel)?;
    let mut cards = Vec::with_capacity(rows.len());
    for row in rows {
        if row.id == card_id {
            continue;
        }
        let stored = store.get(&row.id)?;
        let mut card: Card = serde_json::from_value(stored.body)?;
        card.set_rev(stored.rev);
        card.validate()?;
        cards.push(card);
    }
    Ok(cards)
}

/// Extension trait for logging errors before discarding them
pub trait LogOnError<T> {
    /// Log the error at warn level and return None
    fn log_warn(self, context: &str) -> Option<T>;
}

impl<T, E: std::fmt::Display> LogOnError<T> for std::result::Result<T, E> {
    fn log_warn(self, context: &str) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("{}: {}", context, e);
                None
            }
        }
    }
}
