//! The lifecycle shared by every stored document type.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Creation, modification and import timestamps.
///
/// `imported` is only ever set on documents that arrived through an import
/// or sync. Organically created documents never carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timestamps {
  pub created: DateTime<Utc>,
  pub modified: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub imported: Option<DateTime<Utc>>,
}

impl Timestamps {
  pub fn new(now: DateTime<Utc>) -> Self {
    Self {
      created: now,
      modified: now,
      imported: None,
    }
  }

  pub fn imported_at(created: DateTime<Utc>, modified: DateTime<Utc>, imported: DateTime<Utc>) -> Self {
    Self {
      created,
      modified,
      imported: Some(imported),
    }
  }

  /// True if a human touched the document after it was imported.
  pub fn edited_since_import(&self) -> bool {
    match self.imported {
      Some(imported) => self.modified > imported,
      None => true,
    }
  }

  pub(crate) fn validate(&self) -> Result<()> {
    if self.created == DateTime::<Utc>::UNIX_EPOCH {
      return Err(Error::InvalidInput("created time required".into()));
    }
    if self.modified == DateTime::<Utc>::UNIX_EPOCH {
      return Err(Error::InvalidInput("modified time required".into()));
    }
    Ok(())
  }
}

/// A document persisted through the merge store.
///
/// The revision token belongs to storage and is never part of the serialized
/// body.
pub trait Document: Serialize + DeserializeOwned + Clone {
  /// Id prefix, e.g. `"card-"`
  const PREFIX: &'static str;

  fn doc_id(&self) -> &str;
  fn rev(&self) -> Option<&str>;
  fn set_rev(&mut self, rev: String);
  fn stamps(&self) -> &Timestamps;
  fn stamps_mut(&mut self) -> &mut Timestamps;

  /// Reconcile with the stored copy of an imported document.
  ///
  /// Returns `Ok(true)` if `self` is strictly newer and should be written
  /// over `existing`. Returns `Ok(false)` after adopting `existing`'s fields.
  fn merge_import(&mut self, existing: Self) -> Result<bool>;

  fn validate(&self) -> Result<()> {
    validate_id(self.doc_id(), Self::PREFIX)?;
    self.stamps().validate()
  }

  fn modified(&self) -> DateTime<Utc> {
    self.stamps().modified
  }

  fn imported(&self) -> Option<DateTime<Utc>> {
    self.stamps().imported
  }

  /// Record a user edit.
  fn touch(&mut self, now: DateTime<Utc>) {
    self.stamps_mut().modified = now;
  }
}

pub(crate) fn validate_id(id: &str, prefix: &str) -> Result<()> {
  match id.strip_prefix(prefix) {
    Some(rest) if !rest.is_empty() => Ok(()),
    Some(_) => Err(Error::InvalidInput(format!("empty id after '{}'", prefix))),
    None if id.is_empty() => Err(Error::InvalidInput("id required".into())),
    None => Err(Error::InvalidInput(format!(
      "invalid id type '{}', expected prefix '{}'",
      id, prefix
    ))),
  }
}

/// Shared preconditions of every `merge_import`.
///
/// Adopts the stored revision and reports whether `doc` is strictly newer.
pub(crate) fn begin_merge<D: Document>(doc: &mut D, existing: &D) -> Result<bool> {
  if doc.doc_id() != existing.doc_id() {
    return Err(Error::InvalidInput("IDs don't match".into()));
  }
  if doc.imported().is_none() || existing.imported().is_none() {
    return Err(Error::InvalidInput("not an import".into()));
  }
  if doc.stamps().created != existing.stamps().created {
    return Err(Error::InvalidInput("created timestamps don't match".into()));
  }
  if let Some(rev) = existing.rev() {
    doc.set_rev(rev.to_string());
  }
  if doc.modified() > existing.modified() {
    return Ok(true);
  }
  let stamps = doc.stamps_mut();
  stamps.modified = existing.modified();
  stamps.imported = existing.imported();
  Ok(false)
}
