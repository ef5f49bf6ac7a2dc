//! Weighted random selection of the next card to study.
//!
//! Each batch mixes a few new cards with a larger share of scheduled ones.
//! Within the batch, a card's chance of being drawn grows with how overdue it
//! is relative to its own interval. Selection draws from every card, or from
//! the cards of a single deck.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::db::{DocStore, Index, QueryOptions};
use crate::domain::{Deck, Due, Interval};
use crate::error::Result;

/// Fixed priority for cards that have never been scheduled
pub const NEW_PRIORITY: f64 = 0.5;
/// Share of a batch reserved for new cards
pub const NEW_CARD_RATIO: f64 = 0.1;
/// Rows fetched per wanted card, to leave room for dropping buried ones
pub const OVERFETCH_FACTOR: f64 = 1.5;
/// Upper bound on index pages read for one candidate fetch
pub const MAX_PAGES: usize = 100;

/// The scheduling fields a selection needs, read straight from an index row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSchedule {
  #[serde(rename = "_id", default)]
  pub id: String,
  #[serde(default)]
  pub due: Option<Due>,
  #[serde(default)]
  pub interval: Option<Interval>,
  #[serde(default)]
  pub buried_until: Option<Due>,
}

/// Represents a card with its calculated selection weight
#[derive(Debug, Clone)]
pub struct CardWeight {
  pub card_id: String,
  pub weight: f64,
}

/// `((now - due) / interval + 1)^3`, never negative.
///
/// A card due right now scores 1. Unscheduled cards score [`NEW_PRIORITY`].
pub fn card_priority(due: Option<Due>, interval: Option<Interval>, now: DateTime<Utc>) -> f64 {
  let (due, interval) = match (due, interval) {
    (Some(due), Some(interval)) if !interval.is_zero() => (due, interval),
    _ => return NEW_PRIORITY,
  };
  let overdue = (now - due.time()).num_milliseconds() as f64 / 1000.0;
  let ratio = overdue / interval.num_seconds() as f64;
  (ratio + 1.0).powi(3).max(0.0)
}

/// Up to `limit` unburied cards from `index`, restricted to `deck` if given.
///
/// Reads the index a page at a time until enough cards pass the filters or
/// the index runs out.
pub fn fetch_candidates<S: DocStore + ?Sized>(
  store: &S,
  index: Index,
  deck: Option<&Deck>,
  limit: usize,
  now: DateTime<Utc>,
  cancel: &CancellationToken,
) -> Result<Vec<CardSchedule>> {
  if limit == 0 {
    return Ok(Vec::new());
  }
  let page = (limit as f64 * OVERFETCH_FACTOR).ceil() as usize;
  let mut opts = QueryOptions::limit(page);
  let mut cards = Vec::with_capacity(limit);
  for _ in 0..MAX_PAGES {
    tracing::debug!("Trying to fetch {} ({}) {} cards", limit, opts.skip, index.as_str());
    let rows = store.query(index, &opts, cancel)?;
    let read = rows.len();
    for row in rows {
      if deck.is_some_and(|d| !d.contains(&row.id)) {
        continue;
      }
      let mut card: CardSchedule = serde_json::from_value(row.doc)?;
      if card.buried_until.is_some_and(|until| until.is_after(&Due::at(now))) {
        continue;
      }
      card.id = row.id;
      cards.push(card);
      if cards.len() == limit {
        return Ok(cards);
      }
    }
    if read < page {
      break;
    }
    opts.skip += read;
  }
  Ok(cards)
}

/// A batch of `limit` candidates: new cards first, then scheduled ones.
pub fn compute_batch<S: DocStore + ?Sized>(
  store: &S,
  deck: Option<&Deck>,
  limit: usize,
  now: DateTime<Utc>,
  cancel: &CancellationToken,
) -> Result<Vec<CardSchedule>> {
  let new_limit = ((limit as f64 * NEW_CARD_RATIO).floor() as usize).max(1);
  let old_limit = limit.saturating_sub(new_limit);

  let mut cards = fetch_candidates(store, Index::NewCards, deck, new_limit, now, cancel)?;
  cards.extend(fetch_candidates(store, Index::OldCards, deck, old_limit, now, cancel)?);
  Ok(cards)
}

pub fn calculate_all_weights(cards: &[CardSchedule], now: DateTime<Utc>) -> Vec<CardWeight> {
  cards
    .iter()
    .map(|card| CardWeight {
      card_id: card.id.clone(),
      weight: card_priority(card.due, card.interval, now),
    })
    .collect()
}

/// Select a card using weighted random selection
/// Higher weight = more likely to be selected
pub fn weighted_random_select<R: Rng + ?Sized>(weights: &[CardWeight], rng: &mut R) -> Option<String> {
  match weights {
    [] => return None,
    [only] => return Some(only.card_id.clone()),
    _ => {}
  }

  let total_weight: f64 = weights.iter().map(|w| w.weight).sum();
  if total_weight <= 0.0 {
    // Nothing is due yet; take the earliest in list order
    return Some(weights[0].card_id.clone());
  }

  let mut target = rng.random::<f64>() * total_weight;
  tracing::debug!("Selected r={} of {}", target, total_weight);
  for (i, w) in weights.iter().enumerate() {
    target -= w.weight;
    if target < 0.0 {
      tracing::debug!(
        "Selected card {}: {} (prio: {}, {:.2}% chance)",
        i,
        w.card_id,
        w.weight,
        w.weight / total_weight * 100.0
      );
      return Some(w.card_id.clone());
    }
  }

  // Float rounding can leave target at exactly zero
  weights.last().map(|w| w.card_id.clone())
}

/// Main entry point: id of the next card to study, or None if nothing is available.
pub fn select_next_card<S: DocStore + ?Sized, R: Rng + ?Sized>(
  store: &S,
  deck: Option<&Deck>,
  batch_size: usize,
  now: DateTime<Utc>,
  rng: &mut R,
  cancel: &CancellationToken,
) -> Result<Option<String>> {
  let batch = compute_batch(store, deck, batch_size, now, cancel)?;
  let weights = calculate_all_weights(&batch, now);
  Ok(weighted_random_select(&weights, rng))
}
