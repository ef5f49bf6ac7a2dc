use chrono::{DateTime, Duration, Utc};

use super::bury;
use crate::domain::{AnswerQuality, Card, Due, Interval};
use crate::error::Result;

pub const INITIAL_EASE: f64 = 2.5;
pub const MIN_EASE: f64 = 1.3;
pub const MAX_EASE: f64 = 2.5;

/// Interval after the first successful review
pub const INITIAL_INTERVAL: Interval = Interval::from_days(1);
/// Graduation interval after the second successful review
pub const SECOND_INTERVAL: Interval = Interval::from_days(6);
/// Relearning interval after a lapse
pub const LAPSE_INTERVAL: Interval = Interval::from_minutes(10);

pub struct Sm2Result {
  pub ease_factor: f64,
  pub interval: Interval,
  pub review_count: u32,
  pub due: Due,
}

/// Turns an answer into the card's next review state.
pub trait Scheduler: Send + Sync {
  fn schedule(
    &self,
    card: &mut Card,
    answer_delay: Duration,
    quality: AnswerQuality,
    now: DateTime<Utc>,
  ) -> Result<Sm2Result>;
}

/// Default SM-2 scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sm2Scheduler;

impl Scheduler for Sm2Scheduler {
  fn schedule(
    &self,
    card: &mut Card,
    answer_delay: Duration,
    quality: AnswerQuality,
    now: DateTime<Utc>,
  ) -> Result<Sm2Result> {
    tracing::debug!(
      "Old schedule for {}: due {:?}, interval {:?}, ease {:?}, reviews {} (answered in {}ms)",
      card.id,
      card.due.map(|d| d.to_string()),
      card.interval.map(|i| i.to_string()),
      card.ease_factor,
      card.review_count,
      answer_delay.num_milliseconds()
    );
    let result = calculate_sm2(card, quality, now)?;
    apply(card, &result, quality, now)?;
    tracing::debug!(
      "New schedule for {}: due {}, interval {}, ease {:.2}, reviews {}",
      card.id,
      result.due,
      result.interval,
      result.ease_factor,
      result.review_count
    );
    Ok(result)
  }
}

/// Validate a raw quality and schedule with the default scheduler.
pub fn schedule_review(card: &mut Card, quality: u8, answer_delay: Duration, now: DateTime<Utc>) -> Result<Sm2Result> {
  let quality = AnswerQuality::from_u8(quality)?;
  Sm2Scheduler.schedule(card, answer_delay, quality, now)
}

/// EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02)), kept within [MIN_EASE, MAX_EASE]
pub fn adjust_ease(ease: f64, quality: AnswerQuality) -> f64 {
  let q = quality.as_u8() as f64;
  let ease_delta = 0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02);
  (ease + ease_delta).clamp(MIN_EASE, MAX_EASE)
}

/// Compute the next state without touching the card.
pub fn calculate_sm2(card: &Card, quality: AnswerQuality, now: DateTime<Utc>) -> Result<Sm2Result> {
  let ease = match card.ease_factor {
    Some(e) if e > 0.0 => e,
    _ => INITIAL_EASE,
  };

  let (interval, ease_factor, review_count) = if quality.is_lapse() {
    // Any lapse is scored as a blackout for ease purposes
    (LAPSE_INTERVAL, adjust_ease(ease, AnswerQuality::Blackout), 0)
  } else if card.review_count == 0 {
    (INITIAL_INTERVAL, adjust_ease(ease, quality), 1)
  } else {
    let new_ease = adjust_ease(ease, quality);
    let current = card.interval.unwrap_or_default();
    let last_scheduled = match card.due {
      Some(due) => due.add(Interval::from_secs(-current.num_seconds()))?,
      None => Due::at(now),
    };
    let observed = Due::at(now).sub(last_scheduled).mul_f64(new_ease);
    let interval = if card.review_count == 1 && observed < SECOND_INTERVAL {
      SECOND_INTERVAL
    } else {
      current.max(observed)
    };
    (interval, new_ease, card.review_count + 1)
  };

  Ok(Sm2Result {
    ease_factor,
    interval,
    review_count,
    due: Due::at(now).add(interval)?,
  })
}

fn apply(card: &mut Card, result: &Sm2Result, quality: AnswerQuality, now: DateTime<Utc>) -> Result<()> {
  card.interval = Some(result.interval);
  card.ease_factor = Some(result.ease_factor);
  card.review_count = result.review_count;
  card.due = Some(result.due);
  if !quality.is_lapse() {
    card.last_review = Some(now);
  }
  bury::bury_answered(card, now)?;
  Ok(())
}
