use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::doc::{begin_merge, Document, Timestamps};
use crate::error::Result;

/// A card type definition within a theme. `model_type` selects the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
  pub id: u32,
  #[serde(rename = "type")]
  pub model_type: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub name: String,
}

/// A collection of models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(skip)]
  pub rev: Option<String>,
  #[serde(flatten)]
  pub stamps: Timestamps,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,
  #[serde(default)]
  pub models: Vec<Model>,
}

impl Theme {
  pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Result<Self> {
    let theme = Self {
      id: id.into(),
      rev: None,
      stamps: Timestamps::new(now),
      name: String::new(),
      description: String::new(),
      models: Vec::new(),
    };
    theme.validate()?;
    Ok(theme)
  }

  pub fn add_model(&mut self, model_type: impl Into<String>) -> u32 {
    let id = self.models.len() as u32;
    self.models.push(Model {
      id,
      model_type: model_type.into(),
      name: String::new(),
    });
    id
  }

  pub fn model(&self, id: u32) -> Option<&Model> {
    self.models.iter().find(|m| m.id == id)
  }
}

impl Document for Theme {
  const PREFIX: &'static str = super::card::THEME_PREFIX;

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
    self.name = existing.name;
    self.description = existing.description;
    self.models = existing.models;
    Ok(false)
  }
}
