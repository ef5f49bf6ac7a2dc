//! Due dates and review intervals, with their persisted formats.
//!
//! Intervals of a day or more are day-granular: they round up when converted
//! to days, and a due date computed from them always lands on a UTC midnight.
//! Shorter intervals keep second precision.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{Error, Result};

const SECS_PER_MINUTE: i64 = 60;
const SECS_PER_HOUR: i64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: i64 = 24 * SECS_PER_HOUR;

/// Longest interval, in days, that is accepted or computed
pub const MAX_INTERVAL_DAYS: i64 = 100_000;
const MAX_INTERVAL_SECS: i64 = MAX_INTERVAL_DAYS * SECS_PER_DAY;

fn out_of_range(what: impl fmt::Display) -> Error {
  Error::InvalidInput(format!("interval {} out of range", what))
}

/// Format used for due dates that fall exactly on midnight
pub const DUE_DAYS_FORMAT: &str = "%Y-%m-%d";
/// Format used for every other due time
pub const DUE_SECONDS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Time between reviews, in seconds.
///
/// Values parsed, decoded or computed are kept within
/// `MAX_INTERVAL_DAYS` either side of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Interval(i64);

impl Interval {
  pub const SECOND: Interval = Interval(1);
  pub const MINUTE: Interval = Interval(SECS_PER_MINUTE);
  pub const HOUR: Interval = Interval(SECS_PER_HOUR);
  pub const DAY: Interval = Interval(SECS_PER_DAY);

  pub const fn from_secs(secs: i64) -> Self {
    Self(secs)
  }

  pub const fn from_minutes(minutes: i64) -> Self {
    Self(minutes * SECS_PER_MINUTE)
  }

  pub const fn from_hours(hours: i64) -> Self {
    Self(hours * SECS_PER_HOUR)
  }

  pub const fn from_days(days: i64) -> Self {
    Self(days * SECS_PER_DAY)
  }

  pub fn from_duration(d: Duration) -> Self {
    Self::saturating(d.num_seconds())
  }

  fn saturating(secs: i64) -> Self {
    Self(secs.clamp(-MAX_INTERVAL_SECS, MAX_INTERVAL_SECS))
  }

  fn checked(secs: Option<i64>) -> Option<Self> {
    secs
      .filter(|s| (-MAX_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(s))
      .map(Self)
  }

  pub const fn num_seconds(&self) -> i64 {
    self.0
  }

  pub fn to_duration(self) -> Option<Duration> {
    Duration::try_seconds(self.0)
  }

  pub fn is_zero(&self) -> bool {
    self.0 == 0
  }

  /// Whole days in the interval, rounding up. Sub-day intervals return 0.
  pub fn as_days(&self) -> i64 {
    if self.0 >= SECS_PER_DAY {
      self.0 / SECS_PER_DAY + i64::from(self.0 % SECS_PER_DAY != 0)
    } else {
      0
    }
  }

  /// Scale by a float factor, truncating to whole seconds.
  pub fn mul_f64(self, factor: f64) -> Self {
    Self::saturating((self.0 as f64 * factor) as i64)
  }

  pub fn div(self, n: usize) -> Self {
    if n == 0 {
      return self;
    }
    Self(self.0 / n as i64)
  }

  /// Parse a string such as `"300s"` or `"15d"`.
  pub fn parse(s: &str) -> Result<Self> {
    let Some(unit) = s.chars().last() else {
      return Err(Error::InvalidInput("empty interval".into()));
    };
    let quantity: i64 = s[..s.len() - unit.len_utf8()]
      .parse()
      .map_err(|_| Error::InvalidInput(format!("invalid interval '{}'", s)))?;
    let scale = match unit {
      's' => 1,
      'm' => SECS_PER_MINUTE,
      'h' => SECS_PER_HOUR,
      'd' => SECS_PER_DAY,
      _ => return Err(Error::InvalidInput(format!("unknown unit in '{}'", s))),
    };
    Self::checked(quantity.checked_mul(scale)).ok_or_else(|| out_of_range(s))
  }

  /// Persisted form: positive whole days, or negated seconds for sub-day values.
  pub fn to_wire(&self) -> i64 {
    match self.as_days() {
      0 => -self.0,
      days => days,
    }
  }

  pub fn from_wire(n: i64) -> Result<Self> {
    let secs = if n < 0 { n.checked_neg() } else { n.checked_mul(SECS_PER_DAY) };
    Self::checked(secs).ok_or_else(|| out_of_range(n))
  }
}

impl fmt::Display for Interval {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let days = self.as_days();
    if days > 0 {
      write!(f, "{}d", days)
    } else if self.0 % SECS_PER_HOUR == 0 {
      write!(f, "{}h", self.0 / SECS_PER_HOUR)
    } else if self.0 % SECS_PER_MINUTE == 0 {
      write!(f, "{}m", self.0 / SECS_PER_MINUTE)
    } else {
      write!(f, "{}s", self.0)
    }
  }
}

impl Serialize for Interval {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_i64(self.to_wire())
  }
}

impl<'de> Deserialize<'de> for Interval {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    let n = i64::deserialize(deserializer)?;
    Self::from_wire(n).map_err(serde::de::Error::custom)
  }
}

/// The point in time a card becomes eligible, or stops being buried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Due(DateTime<Utc>);

fn midnight(t: DateTime<Utc>) -> DateTime<Utc> {
  t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

impl Due {
  pub fn at(t: DateTime<Utc>) -> Self {
    Self(t)
  }

  /// The day `t` falls on.
  pub fn on(t: DateTime<Utc>) -> Self {
    Self(midnight(t))
  }

  pub fn time(&self) -> DateTime<Utc> {
    self.0
  }

  /// Add an interval. Intervals of a day or more round up to the next midnight.
  ///
  /// Fails with [`Error::InvalidInput`] when the result is not representable.
  pub fn add(&self, ivl: Interval) -> Result<Self> {
    let shifted = if ivl < Interval::DAY {
      ivl.to_duration().and_then(|d| self.0.checked_add_signed(d))
    } else {
      ivl
        .num_seconds()
        .checked_add(SECS_PER_DAY - 1)
        .and_then(Duration::try_seconds)
        .and_then(|d| midnight(self.0).checked_add_signed(d))
        .map(midnight)
    };
    shifted
      .map(Self)
      .ok_or_else(|| Error::InvalidInput(format!("{} + {} is out of range", self, ivl)))
  }

  pub fn sub(&self, other: Due) -> Interval {
    Interval::from_duration(self.0 - other.0)
  }

  pub fn is_after(&self, other: &Due) -> bool {
    self.0 > other.0
  }

  /// Parse either persisted form.
  pub fn parse(src: &str) -> Result<Self> {
    if let Ok(date) = NaiveDate::parse_from_str(src, DUE_DAYS_FORMAT) {
      return Ok(Self(date.and_time(NaiveTime::MIN).and_utc()));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(src, DUE_SECONDS_FORMAT) {
      return Ok(Self(dt.and_utc()));
    }
    Err(Error::InvalidInput(format!("unrecognized due time: {}", src)))
  }
}

impl From<DateTime<Utc>> for Due {
  fn from(t: DateTime<Utc>) -> Self {
    Self(t)
  }
}

impl fmt::Display for Due {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if midnight(self.0) == self.0 {
      write!(f, "{}", self.0.format(DUE_DAYS_FORMAT))
    } else {
      write!(f, "{}", self.0.format(DUE_SECONDS_FORMAT))
    }
  }
}

impl Serialize for Due {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for Due {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Due::parse(&raw).map_err(serde::de::Error::custom)
  }
}
