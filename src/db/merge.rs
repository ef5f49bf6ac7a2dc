//! Saving documents with import-aware conflict resolution.
//!
//! A write that loses an optimistic-concurrency race is merged only when both
//! sides came from an import and nobody has edited the stored copy since it
//! was imported. Anything else surfaces as [`Error::Conflict`], so a human
//! edit is never silently overwritten.

use super::DocStore;
use crate::domain::Document;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new revision was stored
    Written,
    /// Conflict resolved in favour of this document; a new revision was stored
    Merged,
    /// Nothing was stored. The document now mirrors the stored copy.
    Unchanged,
}

impl SaveOutcome {
    pub fn wrote(&self) -> bool {
        matches!(self, Self::Written | Self::Merged)
    }
}

/// Fetch and validate a typed document, carrying its revision.
pub fn get_doc<D: Document, S: DocStore + ?Sized>(store: &S, id: &str) -> Result<D> {
    let stored = store.get(id)?;
    let mut doc: D = serde_json::from_value(stored.body)?;
    doc.set_rev(stored.rev);
    doc.validate()?;
    Ok(doc)
}

/// Store `doc`, merging with the stored copy if both are unedited imports.
///
/// On success `doc` carries the current revision.
pub fn save_doc<D: Document, S: DocStore + ?Sized>(store: &S, doc: &mut D) -> Result<SaveOutcome> {
    doc.validate()?;
    let id = doc.doc_id().to_string();
    let prior = doc.rev().map(str::to_string);
    let body = serde_json::to_value(&*doc)?;

    let err = match store.put(&id, &body, prior.as_deref()) {
        Ok(rev) => {
            let outcome = if prior.as_deref() == Some(rev.as_str()) {
                SaveOutcome::Unchanged
            } else {
                SaveOutcome::Written
            };
            doc.set_rev(rev);
            return Ok(outcome);
        }
        Err(err) if err.is_conflict() => err,
        Err(err) => return Err(err),
    };

    if doc.imported().is_none() {
        return Err(err);
    }

    let existing: D = get_doc(store, &id)?;
    if existing.stamps().edited_since_import() {
        tracing::debug!("Not merging {}: edited since import", id);
        return Err(Error::Conflict(id));
    }

    if !doc.merge_import(existing)? {
        tracing::debug!("Kept stored copy of {}", id);
        return Ok(SaveOutcome::Unchanged);
    }

    // One retry only. Losing again means someone else is writing this document.
    let body = serde_json::to_value(&*doc)?;
    let rev = store.put(&id, &body, doc.rev())?;
    tracing::debug!("Merged import of {} at {}", id, rev);
    doc.set_rev(rev);
    Ok(SaveOutcome::Merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Index, MemoryStore, QueryOptions, QueryRow, StoredDoc};
    use crate::domain::{Deck, Timestamps};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::Value;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Writes `pending` behind the reader's back on the next `get`.
    #[derive(Default)]
    struct RacingStore {
        inner: MemoryStore,
        pending: Mutex<Option<Value>>,
    }

    impl DocStore for RacingStore {
        fn get(&self, id: &str) -> Result<StoredDoc> {
            let stored = self.inner.get(id)?;
            if let Some(body) = self.pending.lock().unwrap().take() {
                self.inner.put(id, &body, Some(&stored.rev))?;
            }
            Ok(stored)
        }

        fn put(&self, id: &str, body: &Value, rev: Option<&str>) -> Result<String> {
            self.inner.put(id, body, rev)
        }

        fn query(&self, index: Index, opts: &QueryOptions, cancel: &CancellationToken) -> Result<Vec<QueryRow>> {
            self.inner.query(index, opts, cancel)
        }
    }

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 1, day, 0, 0, 0).unwrap()
    }

    fn imported_deck(modified: DateTime<Utc>, imported: DateTime<Utc>) -> Deck {
        let mut deck = Deck::new("deck-d", "Korean", t(1)).unwrap();
        deck.stamps = Timestamps::imported_at(t(1), modified, imported);
        deck
    }

    #[test]
    fn test_save_new_document() {
        let store = MemoryStore::new();
        let mut deck = Deck::new("deck-d", "Korean", t(1)).unwrap();
        assert_eq!(save_doc(&store, &mut deck).unwrap(), SaveOutcome::Written);
        assert!(deck.rev.is_some());
        let loaded: Deck = get_doc(&store, "deck-d").unwrap();
        assert_eq!(loaded, deck);
    }

    #[test]
    fn test_resave_unchanged_is_idempotent() {
        let store = MemoryStore::new();
        let mut deck = imported_deck(t(1), t(2));
        save_doc(&store, &mut deck).unwrap();
        let rev = deck.rev.clone();

        assert_eq!(save_doc(&store, &mut deck).unwrap(), SaveOutcome::Unchanged);
        assert_eq!(deck.rev, rev);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_reimport_same_document_writes_once() {
        let store = MemoryStore::new();
        let mut first = imported_deck(t(1), t(2));
        save_doc(&store, &mut first).unwrap();

        // A fresh copy from a second import has no revision
        let mut second = imported_deck(t(1), t(3));
        assert_eq!(save_doc(&store, &mut second).unwrap(), SaveOutcome::Unchanged);
        assert_eq!(second.rev, first.rev);
        assert_eq!(second.stamps.imported, Some(t(2)));
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_non_import_conflict_propagates() {
        let store = MemoryStore::new();
        let mut stored = Deck::new("deck-d", "Korean", t(1)).unwrap();
        save_doc(&store, &mut stored).unwrap();

        let mut other = Deck::new("deck-d", "Other", t(1)).unwrap();
        other.touch(t(5));
        let err = save_doc(&store, &mut other).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_newer_import_merges() {
        let store = MemoryStore::new();
        let mut stored = imported_deck(t(1), t(2));
        save_doc(&store, &mut stored).unwrap();

        let mut newer = imported_deck(t(4), t(5));
        newer.name = "Korean 2".into();
        assert_eq!(save_doc(&store, &mut newer).unwrap(), SaveOutcome::Merged);

        let loaded: Deck = get_doc(&store, "deck-d").unwrap();
        assert_eq!(loaded.name, "Korean 2");
        assert_eq!(loaded.rev, newer.rev);
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_older_import_adopts_stored_fields() {
        let store = MemoryStore::new();
        let mut stored = imported_deck(t(4), t(5));
        stored.name = "Current".into();
        save_doc(&store, &mut stored).unwrap();

        let mut older = imported_deck(t(2), t(6));
        older.name = "Stale".into();
        assert_eq!(save_doc(&store, &mut older).unwrap(), SaveOutcome::Unchanged);
        assert_eq!(older.name, "Current");
        assert_eq!(older.stamps.modified, t(4));
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_human_edit_after_import_is_protected() {
        let store = MemoryStore::new();
        let mut stored = imported_deck(t(1), t(2));
        save_doc(&store, &mut stored).unwrap();

        // Edited locally after the import
        stored.name = "Mine".into();
        stored.touch(t(2) + Duration::hours(1));
        save_doc(&store, &mut stored).unwrap();

        let mut incoming = imported_deck(t(8), t(9));
        let err = save_doc(&store, &mut incoming).unwrap_err();
        assert!(err.is_conflict());
        let loaded: Deck = get_doc(&store, "deck-d").unwrap();
        assert_eq!(loaded.name, "Mine");
    }

    #[test]
    fn test_merge_retries_only_once() {
        let store = RacingStore::default();
        let mut stored = imported_deck(t(1), t(2));
        save_doc(&store, &mut stored).unwrap();

        let mut racer = imported_deck(t(3), t(3));
        racer.name = "Racer".into();
        *store.pending.lock().unwrap() = Some(serde_json::to_value(&racer).unwrap());

        let mut newer = imported_deck(t(4), t(5));
        newer.name = "Korean 2".into();
        let err = save_doc(&store, &mut newer).unwrap_err();
        assert!(err.is_conflict());

        let loaded: Deck = get_doc(&store.inner, "deck-d").unwrap();
        assert_eq!(loaded.name, "Racer");
        assert_eq!(store.inner.write_count(), 2);
    }

    #[test]
    fn test_mismatched_created_is_invalid() {
        let store = MemoryStore::new();
        let mut stored = imported_deck(t(1), t(2));
        save_doc(&store, &mut stored).unwrap();

        let mut incoming = imported_deck(t(4), t(5));
        incoming.stamps.created = t(3);
        let err = save_doc(&store, &mut incoming).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
