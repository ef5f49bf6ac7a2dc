use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::doc::{begin_merge, Document, Timestamps};
use crate::error::Result;

pub const DECK_PREFIX: &str = "deck-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(skip)]
  pub rev: Option<String>,
  #[serde(flatten)]
  pub stamps: Timestamps,
  #[serde(default)]
  pub name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,
  /// Card ids in the deck
  #[serde(default)]
  pub cards: Vec<String>,
}

impl Deck {
  pub fn new(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Result<Self> {
    let deck = Self {
      id: id.into(),
      rev: None,
      stamps: Timestamps::new(now),
      name: name.into(),
      description: String::new(),
      cards: Vec::new(),
    };
    deck.validate()?;
    Ok(deck)
  }

  pub fn contains(&self, card_id: &str) -> bool {
    self.cards.iter().any(|id| id == card_id)
  }

  pub fn add_card(&mut self, card_id: impl Into<String>) {
    let card_id = card_id.into();
    if !self.cards.contains(&card_id) {
      self.cards.push(card_id);
    }
  }
}

impl Document for Deck {
  const PREFIX: &'static str = DECK_PREFIX;

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
    self.cards = existing.cards;
    Ok(false)
  }
}
