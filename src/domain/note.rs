use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::doc::{begin_merge, Document, Timestamps};
use crate::error::Result;

pub const NOTE_PREFIX: &str = "note-";

/// The data used to populate one model of a theme. Every template of the
/// model yields one card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(skip)]
  pub rev: Option<String>,
  #[serde(flatten)]
  pub stamps: Timestamps,
  #[serde(rename = "theme")]
  pub theme_id: String,
  #[serde(rename = "model")]
  pub model_id: u32,
  #[serde(default)]
  pub field_values: Vec<String>,
}

impl Note {
  pub fn new(id: impl Into<String>, theme_id: impl Into<String>, model_id: u32, now: DateTime<Utc>) -> Result<Self> {
    let note = Self {
      id: id.into(),
      rev: None,
      stamps: Timestamps::new(now),
      theme_id: theme_id.into(),
      model_id,
      field_values: Vec::new(),
    };
    note.validate()?;
    Ok(note)
  }
}

impl Document for Note {
  const PREFIX: &'static str = NOTE_PREFIX;

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
    if begin_merge(self, &existing)? {
      return Ok(true);
    }
    self.theme_id = existing.theme_id;
    self.model_id = existing.model_id;
    self.field_values = existing.field_values;
    Ok(false)
  }
}
