//! Sibling burial.
//!
//! When a card is answered, the other cards of the same note are hidden for a
//! while so the answer to one doesn't give away the others:
//!
//! 1. New siblings (no successful review yet) are buried for `NEW_BURY_TIME`.
//! 2. Every other sibling is buried for at least `MIN_BURY_TIME`.
//! 3. The target burial is the answered card's interval divided by the number
//!    of siblings, capped at `MAX_BURY_RATIO` of the sibling's own interval.
//!
//! A burial only ever moves a card's `buried_until` forward.

use chrono::{DateTime, Utc};

use crate::domain::{Card, Due, Interval};
use crate::error::Result;

pub const NEW_BURY_TIME: Interval = Interval::from_days(7);
pub const MIN_BURY_TIME: Interval = Interval::from_days(1);
/// Maximum burial time as a fraction of the buried card's interval
pub const MAX_BURY_RATIO: f64 = 0.20;

/// Burial duration for one card.
pub fn bury_interval(target: Interval, card_interval: Interval, is_new: bool) -> Interval {
  if is_new {
    return NEW_BURY_TIME;
  }
  let max_bury = if card_interval > Interval::default() {
    card_interval.mul_f64(MAX_BURY_RATIO)
  } else {
    Interval::default()
  };
  // The floor wins when the cap falls below it
  target.min(max_bury).max(MIN_BURY_TIME)
}

/// Bury `siblings` after a card with `interval` was answered.
///
/// Returns the siblings whose `buried_until` moved, for the caller to persist.
pub fn set_burials(interval: Interval, siblings: Vec<Card>, now: DateTime<Utc>) -> Result<Vec<Card>> {
  if siblings.is_empty() {
    return Ok(siblings);
  }
  let target = interval.div(siblings.len());
  let mut changed = Vec::with_capacity(siblings.len());
  for mut card in siblings {
    let duration = bury_interval(target, card.interval.unwrap_or_default(), card.is_new());
    let until = Due::at(now).add(duration)?;
    if card.bury_until(until) {
      tracing::debug!("Burying {} until {}", card.id, until);
      changed.push(card);
    }
  }
  Ok(changed)
}

/// Bury a freshly scheduled card against itself.
///
/// Day-or-longer intervals use the single-sibling formula. Shorter intervals
/// bury exactly until the new due time.
pub fn bury_answered(card: &mut Card, now: DateTime<Utc>) -> Result<bool> {
  let interval = card.interval.unwrap_or_default();
  let until = if interval >= Interval::DAY {
    Due::at(now).add(bury_interval(interval, interval, false))?
  } else {
    match card.due {
      Some(due) => due,
      None => return Ok(false),
    }
  };
  Ok(card.bury_until(until))
}
