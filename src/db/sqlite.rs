//! SQLite-backed document store.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::{check_put, generation, index_key, schema, DocStore, Index, QueryOptions, QueryRow, StoredDoc};
use crate::error::{Error, Result};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::info!("Opened document store at {}", path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::StorageUnavailable("database mutex poisoned".into()))
    }
}

fn key_column(index: Index) -> &'static str {
    match index {
        Index::NewCards => "new_key",
        Index::OldCards => "old_key",
        Index::AllDocs => "id",
    }
}

impl DocStore for SqliteStore {
    fn get(&self, id: &str) -> Result<StoredDoc> {
        let conn = self.lock()?;
        let row: Option<(String, String)> = conn
            .query_row("SELECT rev, body FROM docs WHERE id = ?1", [id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        match row {
            Some((rev, body)) => Ok(StoredDoc {
                rev,
                body: serde_json::from_str(&body)?,
            }),
            None => Err(Error::NotFound(id.to_string())),
        }
    }

    fn put(&self, id: &str, body: &Value, rev: Option<&str>) -> Result<String> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current: Option<(String, String)> = tx
            .query_row("SELECT rev, body FROM docs WHERE id = ?1", [id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        let current = match current {
            Some((rev, body)) => Some(StoredDoc {
                rev,
                body: serde_json::from_str(&body)?,
            }),
            None => None,
        };

        let new_rev = match check_put(id, current.as_ref(), body, rev)? {
            Some(new_rev) => new_rev,
            None => return Ok(rev.unwrap_or_default().to_string()),
        };

        tx.execute(
            r#"INSERT INTO docs (id, rev, generation, body, new_key, old_key)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(id) DO UPDATE SET
                 rev = excluded.rev,
                 generation = excluded.generation,
                 body = excluded.body,
                 new_key = excluded.new_key,
                 old_key = excluded.old_key"#,
            params![
                id,
                new_rev,
                generation(&new_rev) as i64,
                body.to_string(),
                index_key(Index::NewCards, id, body),
                index_key(Index::OldCards, id, body),
            ],
        )?;
        tx.commit()?;

        Ok(new_rev)
    }

    fn query(&self, index: Index, opts: &QueryOptions, cancel: &CancellationToken) -> Result<Vec<QueryRow>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let conn = self.lock()?;
        let column = key_column(index);
        let sql = format!(
            "SELECT id, {col}, body FROM docs
             WHERE {col} IS NOT NULL
               AND (?1 IS NULL OR {col} >= ?1)
               AND (?2 IS NULL OR {col} <= ?2)
             ORDER BY {col}, id
             LIMIT ?3 OFFSET ?4",
            col = column
        );
        let limit = opts.limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![opts.start_key, opts.end_key, limit, opts.skip as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let (id, key, body) = row?;
            out.push(QueryRow {
                id,
                key,
                doc: serde_json::from_str(&body)?,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("flashback.db");
        let store = SqliteStore::open(&path).unwrap();
        store.put("note-a", &json!({"v": 1}), None).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_put_get_and_conflict() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rev1 = store.put("note-a", &json!({"v": 1}), None).unwrap();
        assert_eq!(store.get("note-a").unwrap().rev, rev1);

        let rev2 = store.put("note-a", &json!({"v": 2}), Some(&rev1)).unwrap();
        assert_ne!(rev1, rev2);
        assert_eq!(generation(&rev2), 2);

        assert!(store.put("note-a", &json!({"v": 3}), Some(&rev1)).unwrap_err().is_conflict());
        assert!(store.put("note-b", &json!({}), Some(&rev1)).unwrap_err().is_conflict());
        assert!(store.get("note-b").unwrap_err().is_not_found());
        assert_eq!(store.get("note-a").unwrap().body, json!({"v": 2}));
    }

    #[test]
    fn test_identical_put_keeps_revision() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rev = store.put("note-a", &json!({"v": 1}), None).unwrap();
        let again = store.put("note-a", &json!({"v": 1}), Some(&rev)).unwrap();
        assert_eq!(rev, again);
    }

    #[test]
    fn test_new_cards_index_tracks_updates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        let rev = store.put("card-b.n.0", &json!({"reviewCount": 0}), None).unwrap();
        store.put("card-b.n.1", &json!({"reviewCount": 0}), None).unwrap();

        let rows = store.query(Index::NewCards, &QueryOptions::default(), &cancel).unwrap();
        assert_eq!(rows.len(), 2);

        // Scheduling a card moves it from the new index to the old one
        store
            .put("card-b.n.0", &json!({"reviewCount": 1, "due": "2017-01-02"}), Some(&rev))
            .unwrap();
        let new_rows = store.query(Index::NewCards, &QueryOptions::default(), &cancel).unwrap();
        let old_rows = store.query(Index::OldCards, &QueryOptions::default(), &cancel).unwrap();
        assert_eq!(new_rows.len(), 1);
        assert_eq!(new_rows[0].id, "card-b.n.1");
        assert_eq!(old_rows.len(), 1);
        assert_eq!(old_rows[0].key, "2017-01-02");
    }

    #[test]
    fn test_all_docs_key_range() {
        let store = SqliteStore::open_in_memory().unwrap();
        for id in ["card-b.n.0", "card-b.n.1", "card-b.n2.0", "card-b.m.0", "note-n"] {
            store.put(id, &json!({}), None).unwrap();
        }
        let (start, end) = crate::domain::sibling_key_range("card-b.n.0");
        let rows = store
            .query(Index::AllDocs, &QueryOptions::range(start, end), &CancellationToken::new())
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["card-b.n.0", "card-b.n.1"]);
    }

    #[test]
    fn test_query_limit_and_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("card-b.n.0", &json!({"due": "2017-01-03"}), None).unwrap();
        store.put("card-b.n.1", &json!({"due": "2017-01-01"}), None).unwrap();
        store.put("card-b.n.2", &json!({"due": "2017-01-02"}), None).unwrap();
        let rows = store
            .query(Index::OldCards, &QueryOptions::limit(2), &CancellationToken::new())
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["card-b.n.1", "card-b.n.2"]);
    }

    #[test]
    fn test_query_skip() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (id, due) in [("card-b.n.0", "2017-01-03"), ("card-b.n.1", "2017-01-01"), ("card-b.n.2", "2017-01-02")] {
            store.put(id, &json!({ "due": due }), None).unwrap();
        }
        let opts = QueryOptions {
            skip: 1,
            ..QueryOptions::default()
        };
        let rows = store.query(Index::OldCards, &opts, &CancellationToken::new()).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["card-b.n.2", "card-b.n.0"]);
    }

    #[test]
    fn test_cancelled_query() {
        let store = SqliteStore::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = store.query(Index::OldCards, &QueryOptions::default(), &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
