use serde::{Deserialize, Serialize};

use super::{Bundle, Card, Deck, Note, Theme};

/// An already-decoded import package: one bundle and everything in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
  pub bundle: Bundle,
  #[serde(default)]
  pub themes: Vec<Theme>,
  #[serde(default)]
  pub notes: Vec<Note>,
  #[serde(default)]
  pub decks: Vec<Deck>,
  #[serde(default)]
  pub cards: Vec<Card>,
}
