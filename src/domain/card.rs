use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::doc::{begin_merge, Document, Timestamps};
use super::due::{Due, Interval};
use crate::error::{Error, Result};

pub const CARD_PREFIX: &str = "card-";
pub const THEME_PREFIX: &str = "theme-";

/// Per-user review state of one template of one note.
///
/// The id is a compound key, `card-<bundle>.<note>.<template>`. Two cards are
/// siblings when they share bundle and note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(skip)]
  pub rev: Option<String>,
  #[serde(flatten)]
  pub stamps: Timestamps,
  /// `theme-<theme>/<model index>`
  #[serde(rename = "model")]
  pub model_id: String,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub suspended: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub due: Option<Due>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub buried_until: Option<Due>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub interval: Option<Interval>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ease_factor: Option<f64>,
  #[serde(default)]
  pub review_count: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_review: Option<DateTime<Utc>>,
  /// Opaque per-answer state held by the study UI
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub context: Option<serde_json::Value>,
}

/// Split `card-<bundle>.<note>.<template>` into its parts.
pub fn parse_card_id(id: &str) -> Result<(&str, &str, u32)> {
  let rest = id
    .strip_prefix(CARD_PREFIX)
    .ok_or_else(|| Error::InvalidInput(format!("invalid card id type: {}", id)))?;
  let parts: Vec<&str> = rest.split('.').collect();
  let [bundle, note, template] = parts.as_slice() else {
    return Err(Error::InvalidInput(format!("invalid card id format: {}", id)));
  };
  if bundle.is_empty() || note.is_empty() {
    return Err(Error::InvalidInput(format!("invalid card id format: {}", id)));
  }
  let template = template
    .parse::<u32>()
    .map_err(|_| Error::InvalidInput(format!("invalid template id in {}", id)))?;
  Ok((bundle, note, template))
}

fn parse_model_id(model_id: &str) -> Result<(&str, u32)> {
  let rest = model_id
    .strip_prefix(THEME_PREFIX)
    .ok_or_else(|| Error::InvalidInput(format!("invalid theme id type: {}", model_id)))?;
  let (theme, model) = rest
    .split_once('/')
    .ok_or_else(|| Error::InvalidInput(format!("invalid theme id format: {}", model_id)))?;
  let model = model
    .parse::<u32>()
    .map_err(|_| Error::InvalidInput(format!("invalid model index in {}", model_id)))?;
  Ok((theme, model))
}

/// Key range covering every card of the same note as `card_id`.
pub fn sibling_key_range(card_id: &str) -> (String, String) {
  let start = card_id.trim_end_matches(|c: char| c.is_ascii_digit()).to_string();
  let end = format!("{}{}", start, char::MAX);
  (start, end)
}

impl Card {
  pub fn new(id: impl Into<String>, model_id: impl Into<String>, now: DateTime<Utc>) -> Result<Self> {
    let card = Self {
      id: id.into(),
      rev: None,
      stamps: Timestamps::new(now),
      model_id: model_id.into(),
      suspended: false,
      due: None,
      buried_until: None,
      interval: None,
      ease_factor: None,
      review_count: 0,
      last_review: None,
      context: None,
    };
    card.validate()?;
    Ok(card)
  }

  /// The id without its `card-` prefix.
  pub fn identity(&self) -> &str {
    self.id.strip_prefix(CARD_PREFIX).unwrap_or(&self.id)
  }

  pub fn bundle_id(&self) -> String {
    match parse_card_id(&self.id) {
      Ok((bundle, _, _)) => format!("bundle-{}", bundle),
      Err(_) => String::new(),
    }
  }

  pub fn note_id(&self) -> String {
    match parse_card_id(&self.id) {
      Ok((_, note, _)) => format!("note-{}", note),
      Err(_) => String::new(),
    }
  }

  pub fn template_id(&self) -> u32 {
    parse_card_id(&self.id).map(|(_, _, t)| t).unwrap_or(0)
  }

  pub fn theme_id(&self) -> String {
    match parse_model_id(&self.model_id) {
      Ok((theme, _)) => format!("{}{}", THEME_PREFIX, theme),
      Err(_) => String::new(),
    }
  }

  pub fn theme_model_id(&self) -> u32 {
    parse_model_id(&self.model_id).map(|(_, m)| m).unwrap_or(0)
  }

  /// Never successfully reviewed (or lapsed back to zero).
  pub fn is_new(&self) -> bool {
    self.review_count == 0
  }

  pub fn is_sibling_of(&self, other: &Card) -> bool {
    self.id != other.id && self.note_id() == other.note_id() && self.bundle_id() == other.bundle_id()
  }

  /// Move `buried_until` forward. Returns false if it was already at least as late.
  pub fn bury_until(&mut self, until: Due) -> bool {
    match self.buried_until {
      Some(current) if !until.is_after(&current) => false,
      _ => {
        self.buried_until = Some(until);
        true
      }
    }
  }

  pub fn is_buried_at(&self, now: DateTime<Utc>) -> bool {
    self
      .buried_until
      .is_some_and(|until| until.is_after(&Due::at(now)))
  }
}

impl Document for Card {
  const PREFIX: &'static str = CARD_PREFIX;

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

  fn validate(&self) -> Result<()> {
    parse_card_id(&self.id)?;
    self.stamps.validate()?;
    parse_model_id(&self.model_id)?;
    Ok(())
  }

  fn merge_import(&mut self, existing: Self) -> Result<bool> {
    if begin_merge(self, &existing)? {
      return Ok(true);
    }
    self.model_id = existing.model_id;
    self.suspended = existing.suspended;
    self.due = existing.due;
    self.buried_until = existing.buried_until;
    self.interval = existing.interval;
    self.ease_factor = existing.ease_factor;
    self.review_count = existing.review_count;
    self.last_review = existing.last_review;
    self.context = existing.context;
    Ok(false)
  }
}
