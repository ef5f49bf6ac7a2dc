//! Model type to scheduler lookup.

use std::collections::HashMap;
use std::sync::Arc;

use super::sm2::{Scheduler, Sm2Scheduler};
use crate::error::{Error, Result};

pub const ANKI_BASIC: &str = "anki-basic";
pub const ANKI_CLOZE: &str = "anki-cloze";

/// Schedulers keyed by the theme model `type` they handle.
///
/// Built once at startup and handed to whatever needs the lookup.
#[derive(Clone, Default)]
pub struct SchedulerRegistry {
  schedulers: HashMap<String, Arc<dyn Scheduler>>,
  types: Vec<String>,
}

impl SchedulerRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// SM-2 for the built-in Anki model types.
  pub fn with_defaults() -> Self {
    let mut registry = Self::new();
    let sm2: Arc<dyn Scheduler> = Arc::new(Sm2Scheduler);
    for model_type in [ANKI_BASIC, ANKI_CLOZE] {
      registry.types.push(model_type.to_string());
      registry.schedulers.insert(model_type.to_string(), Arc::clone(&sm2));
    }
    registry
  }

  /// Register `scheduler` for `model_type`. Each type may be registered once.
  pub fn register(&mut self, model_type: impl Into<String>, scheduler: Arc<dyn Scheduler>) -> Result<()> {
    let model_type = model_type.into();
    if self.schedulers.contains_key(&model_type) {
      return Err(Error::InvalidInput(format!(
        "a scheduler for '{}' is already registered",
        model_type
      )));
    }
    self.types.push(model_type.clone());
    self.schedulers.insert(model_type, scheduler);
    Ok(())
  }

  pub fn get(&self, model_type: &str) -> Result<&dyn Scheduler> {
    self
      .schedulers
      .get(model_type)
      .map(|s| s.as_ref())
      .ok_or_else(|| Error::InvalidInput(format!("no scheduler registered for '{}'", model_type)))
  }

  /// Registered types, in registration order.
  pub fn types(&self) -> &[String] {
    &self.types
  }
}

impl std::fmt::Debug for SchedulerRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SchedulerRegistry").field("types", &self.types).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_registered() {
    let registry = SchedulerRegistry::with_defaults();
    assert_eq!(registry.types(), &["anki-basic".to_string(), "anki-cloze".to_string()]);
    assert!(registry.get(ANKI_BASIC).is_ok());
    assert!(registry.get(ANKI_CLOZE).is_ok());
  }

  #[test]
  fn test_unknown_type() {
    let registry = SchedulerRegistry::with_defaults();
    let err = registry.get("mystery").err().unwrap();
    assert!(matches!(err, Error::InvalidInput(_)));
  }

  #[test]
  fn test_duplicate_registration_rejected() {
    let mut registry = SchedulerRegistry::new();
    registry.register("basic", Arc::new(Sm2Scheduler)).unwrap();
    assert!(registry.register("basic", Arc::new(Sm2Scheduler)).is_err());
    assert_eq!(registry.types().len(), 1);
  }
}
