use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::doc::{begin_merge, Document, Timestamps};
use crate::error::{Error, Result};

pub const BUNDLE_PREFIX: &str = "bundle-";

/// Unit of ownership that themes, notes and decks belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(skip)]
  pub rev: Option<String>,
  #[serde(flatten)]
  pub stamps: Timestamps,
  #[serde(default)]
  pub owner: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,
}

impl Bundle {
  pub fn new(id: impl Into<String>, owner: impl Into<String>, now: DateTime<Utc>) -> Result<Self> {
    let bundle = Self {
      id: id.into(),
      rev: None,
      stamps: Timestamps::new(now),
      owner: owner.into(),
      name: String::new(),
      description: String::new(),
    };
    bundle.validate()?;
    Ok(bundle)
  }
}

impl Document for Bundle {
  const PREFIX: &'static str = BUNDLE_PREFIX;

  fn doc_id(&self) -> &str {
    &self.id
  }

  fn rev(&self) -> Option<&str> {
    self.rev.as_deref()
  }

  fn set_rev(&mut self, rev: String) {
    self.rev = Some(rev);
  }

  fn stamps(&self) -> &Timestamps {
    &self.stamps
  }

  fn stamps_mut(&mut self) -> &mut Timestamps {
    &mut self.stamps
  }

  fn merge_import(&mut self, existing: Self) -> Result<bool> {
    if self.owner != existing.owner {
      return Err(Error::InvalidInput(format!(
        "cannot change owner of {} from {} to {}",
        self.id, existing.owner, self.owner
      )));
    }
    if begin_merge(self, &existing)? {
      return Ok(true);
    }
    self.owner = existing.owner;
    self.name = existing.name;
    self.description = existing.description;
    Ok(false)
  }
}
