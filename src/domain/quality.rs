use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// SM-2 answer quality, 0 (blackout) through 5 (perfect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AnswerQuality {
  /// Complete blackout
  Blackout = 0,
  /// Incorrect, but the correct answer was remembered on seeing it
  IncorrectRemembered = 1,
  /// Incorrect, even though the correct answer seemed easy to recall
  IncorrectEasy = 2,
  /// Correct, recalled with serious difficulty
  CorrectDifficult = 3,
  /// Correct after a hesitation
  Correct = 4,
  Perfect = 5,
}

impl AnswerQuality {
  pub fn from_u8(q: u8) -> Result<Self> {
    match q {
      0 => Ok(Self::Blackout),
      1 => Ok(Self::IncorrectRemembered),
      2 => Ok(Self::IncorrectEasy),
      3 => Ok(Self::CorrectDifficult),
      4 => Ok(Self::Correct),
      5 => Ok(Self::Perfect),
      _ => Err(Error::InvalidInput(format!(
        "answer quality {} outside 0..=5",
        q
      ))),
    }
  }

  pub fn as_u8(&self) -> u8 {
    *self as u8
  }

  /// Quality 2 and below count as a lapse.
  pub fn is_lapse(&self) -> bool {
    *self <= Self::IncorrectEasy
  }
}

impl TryFrom<u8> for AnswerQuality {
  type Error = Error;

  fn try_from(q: u8) -> Result<Self> {
    Self::from_u8(q)
  }
}

impl From<AnswerQuality> for u8 {
  fn from(q: AnswerQuality) -> u8 {
    q.as_u8()
  }
}
