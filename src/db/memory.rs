//! In-process document store.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::{check_put, index_key, DocStore, Index, QueryOptions, QueryRow, StoredDoc};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    docs: BTreeMap<String, StoredDoc>,
    writes: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::StorageUnavailable("memory store mutex poisoned".into()))
    }

    /// Number of puts that actually changed a stored body.
    pub fn write_count(&self) -> usize {
        self.lock().map(|inner| inner.writes).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocStore for MemoryStore {
    fn get(&self, id: &str) -> Result<StoredDoc> {
        self.lock()?
            .docs
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn put(&self, id: &str, body: &Value, rev: Option<&str>) -> Result<String> {
        let mut inner = self.lock()?;
        match check_put(id, inner.docs.get(id), body, rev)? {
            None => Ok(rev.unwrap_or_default().to_string()),
            Some(new_rev) => {
                inner.docs.insert(
                    id.to_string(),
                    StoredDoc {
                        rev: new_rev.clone(),
                        body: body.clone(),
                    },
                );
                inner.writes += 1;
                Ok(new_rev)
            }
        }
    }

    fn query(&self, index: Index, opts: &QueryOptions, cancel: &CancellationToken) -> Result<Vec<QueryRow>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let inner = self.lock()?;
        let mut rows = Vec::new();
        for (id, stored) in &inner.docs {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if let Some(key) = index_key(index, id, &stored.body) {
                if opts.contains(&key) {
                    rows.push(QueryRow {
                        id: id.clone(),
                        key,
                        doc: stored.body.clone(),
                    });
                }
            }
        }
        rows.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.id.cmp(&b.id)));
        rows.drain(..opts.skip.min(rows.len()));
        if let Some(limit) = opts.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}
