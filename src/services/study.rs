//! The study loop: pick a card, schedule the answer, bury its siblings.

use chrono::Duration;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::StudyConfig;
use crate::db::{fetch_siblings, get_doc, save_doc, DocStore, LogOnError};
use crate::domain::{AnswerQuality, Card, Deck, Document, Theme};
use crate::error::{Error, Result};
use crate::srs::{bury, card_selector, SchedulerRegistry};

/// What to show the user next.
#[derive(Debug, Clone, PartialEq)]
pub enum StudyCard {
    Card(Box<Card>),
    /// Nothing is due. Poll again later.
    Done,
}

impl StudyCard {
    pub fn card(&self) -> Option<&Card> {
        match self {
            Self::Card(card) => Some(card),
            Self::Done => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

pub struct StudyService<S, C, R> {
    store: S,
    clock: C,
    rng: R,
    registry: SchedulerRegistry,
    config: StudyConfig,
}

impl<S: DocStore, C: Clock, R: Rng> StudyService<S, C, R> {
    pub fn new(store: S, clock: C, rng: R, registry: SchedulerRegistry, config: StudyConfig) -> Self {
        Self {
            store,
            clock,
            rng,
            registry,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Draw the next card to study from a fresh candidate batch.
    ///
    /// With `deck_id`, only cards listed in that deck are considered.
    pub fn next_card(&mut self, deck_id: Option<&str>, cancel: &CancellationToken) -> Result<StudyCard> {
        let deck: Option<Deck> = deck_id.map(|id| get_doc(&self.store, id)).transpose()?;
        let now = self.clock.now();
        let picked = card_selector::select_next_card(
            &self.store,
            deck.as_ref(),
            self.config.batch_size,
            now,
            &mut self.rng,
            cancel,
        )?;
        match picked {
            Some(id) => {
                let card: Card = get_doc(&self.store, &id)?;
                Ok(StudyCard::Card(Box::new(card)))
            }
            None => {
                tracing::debug!("{}", Error::NoCardAvailable);
                Ok(StudyCard::Done)
            }
        }
    }

    /// Record an answer for `card_id` and return the rescheduled card.
    ///
    /// Sibling burial is best effort: failures are logged, never returned.
    pub fn answer(&self, card_id: &str, quality: u8, answer_delay: Duration) -> Result<Card> {
        let quality = AnswerQuality::from_u8(quality)?;
        let mut card: Card = get_doc(&self.store, card_id)?;
        let theme: Theme = get_doc(&self.store, &card.theme_id())?;
        let model = theme.model(card.theme_model_id()).ok_or_else(|| {
            Error::InvalidInput(format!("{} has no model {}", theme.id, card.theme_model_id()))
        })?;
        let scheduler = self.registry.get(&model.model_type)?;

        let now = self.clock.now();
        scheduler.schedule(&mut card, answer_delay, quality, now)?;
        card.context = None;
        card.touch(now);
        save_doc(&self.store, &mut card)?;
        tracing::info!(
            "Answered {} with {}: next due {}",
            card.id,
            quality.as_u8(),
            card.due.map(|d| d.to_string()).unwrap_or_default()
        );

        self.bury_siblings(&card);
        Ok(card)
    }

    fn bury_siblings(&self, card: &Card) {
        let cancel = CancellationToken::new();
        let Some(siblings) = fetch_siblings(&self.store, &card.id, &cancel)
            .log_warn(&format!("Failed to fetch siblings of {}", card.id))
        else {
            return;
        };
        let now = self.clock.now();
        let interval = card.interval.unwrap_or_default();
        let Some(buried) = bury::set_burials(interval, siblings, now)
            .log_warn(&format!("Failed to compute burials for siblings of {}", card.id))
        else {
            return;
        };
        for mut sibling in buried {
            let _ = save_doc(&self.store, &mut sibling)
                .log_warn(&format!("Failed to bury {}", sibling.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Due, Interval};
    use crate::testing::{t0, StudyEnv};

    #[test]
    fn test_next_card_done_when_empty() {
        let mut env = StudyEnv::new(1);
        let next = env.service.next_card(None, &CancellationToken::new()).unwrap();
        assert!(next.is_done());
    }

    #[test]
    fn test_next_card_returns_stored_card() {
        let mut env = StudyEnv::new(1);
        env.add_note("n", 1);
        let next = env.service.next_card(None, &CancellationToken::new()).unwrap();
        let card = next.card().unwrap();
        assert_eq!(card.id, "card-b.n.0");
        assert!(card.rev.is_some());
    }

    #[test]
    fn test_next_card_cancelled() {
        let mut env = StudyEnv::new(1);
        env.add_note("n", 1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(env.service.next_card(None, &cancel), Err(Error::Cancelled)));
    }

    #[test]
    fn test_answer_schedules_and_persists() {
        let env = StudyEnv::new(1);
        env.add_note("n", 1);

        let card = env.service.answer("card-b.n.0", 5, Duration::seconds(2)).unwrap();
        assert_eq!(card.review_count, 1);
        assert_eq!(card.interval, Some(Interval::DAY));
        assert_eq!(card.stamps.modified, t0());

        let stored: Card = get_doc(env.service.store(), "card-b.n.0").unwrap();
        assert_eq!(stored, card);
        assert_eq!(stored.due, Some(Due::at(t0()).add(Interval::DAY).unwrap()));
    }

    #[test]
    fn test_answer_clears_context() {
        let env = StudyEnv::new(1);
        env.add_note("n", 1);
        let mut card: Card = get_doc(env.service.store(), "card-b.n.0").unwrap();
        card.context = Some(serde_json::json!({"face": 1}));
        save_doc(env.service.store(), &mut card).unwrap();

        let card = env.service.answer("card-b.n.0", 4, Duration::zero()).unwrap();
        assert!(card.context.is_none());
    }

    #[test]
    fn test_answer_buries_new_siblings() {
        let env = StudyEnv::new(1);
        env.add_note("n", 3);
        env.add_note("other", 1);

        env.service.answer("card-b.n.0", 5, Duration::zero()).unwrap();

        let week = Some(Due::at(t0()).add(Interval::from_days(7)).unwrap());
        for id in ["card-b.n.1", "card-b.n.2"] {
            let sibling: Card = get_doc(env.service.store(), id).unwrap();
            assert_eq!(sibling.buried_until, week, "{}", id);
        }
        let unrelated: Card = get_doc(env.service.store(), "card-b.other.0").unwrap();
        assert_eq!(unrelated.buried_until, None);
    }

    #[test]
    fn test_answered_card_not_offered_again_today() {
        let mut env = StudyEnv::new(1);
        env.add_note("n", 1);
        env.service.answer("card-b.n.0", 0, Duration::zero()).unwrap();
        let next = env.service.next_card(None, &CancellationToken::new()).unwrap();
        assert!(next.is_done());

        env.clock.advance(chrono::Duration::minutes(11));
        let next = env.service.next_card(None, &CancellationToken::new()).unwrap();
        assert_eq!(next.card().map(|c| c.id.as_str()), Some("card-b.n.0"));
    }

    #[test]
    fn test_answer_invalid_quality_leaves_card_untouched() {
        let env = StudyEnv::new(1);
        env.add_note("n", 1);
        let before: Card = get_doc(env.service.store(), "card-b.n.0").unwrap();

        let err = env.service.answer("card-b.n.0", 9, Duration::zero()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        let after: Card = get_doc(env.service.store(), "card-b.n.0").unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_answer_unknown_model_type() {
        let env = StudyEnv::new(1);
        let mut theme = Theme::new("theme-odd", t0()).unwrap();
        theme.add_model("mystery");
        save_doc(env.service.store(), &mut theme).unwrap();
        let mut card = Card::new("card-b.x.0", "theme-odd/0", t0()).unwrap();
        save_doc(env.service.store(), &mut card).unwrap();

        let err = env.service.answer("card-b.x.0", 4, Duration::zero()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_study_over_sqlite() {
        use crate::clock::FixedClock;
        use crate::services::import_package;
        use crate::testing::{sample_package, SqliteEnv};
        use rand::SeedableRng;

        let env = SqliteEnv::new().unwrap();
        import_package(&env.store, sample_package(t0()), t0()).unwrap();

        let mut service = StudyService::new(
            &env.store,
            FixedClock::new(t0()),
            rand::rngs::StdRng::seed_from_u64(9),
            SchedulerRegistry::with_defaults(),
            StudyConfig::default(),
        );
        let next = service.next_card(None, &CancellationToken::new()).unwrap();
        let id = next.card().unwrap().id.clone();
        service.answer(&id, 3, Duration::zero()).unwrap();

        // The sibling is buried for a week, the answered card until tomorrow
        let next = service.next_card(None, &CancellationToken::new()).unwrap();
        assert!(next.is_done());
        assert!(env.path().join("flashback.db").exists());
    }

    /// Rejects every put for one document id.
    struct FailingPuts {
        inner: crate::db::MemoryStore,
        fail_id: &'static str,
    }

    impl DocStore for FailingPuts {
        fn get(&self, id: &str) -> Result<crate::db::StoredDoc> {
            self.inner.get(id)
        }

        fn put(&self, id: &str, body: &serde_json::Value, rev: Option<&str>) -> Result<String> {
            if id == self.fail_id {
                return Err(Error::StorageUnavailable(format!("write to {} refused", id)));
            }
            self.inner.put(id, body, rev)
        }

        fn query(
            &self,
            index: crate::db::Index,
            opts: &crate::db::QueryOptions,
            cancel: &CancellationToken,
        ) -> Result<Vec<crate::db::QueryRow>> {
            self.inner.query(index, opts, cancel)
        }
    }

    #[test]
    fn test_failed_sibling_burial_does_not_fail_answer() {
        use crate::clock::FixedClock;
        use crate::testing::{basic_theme, note_with_cards};
        use rand::SeedableRng;

        let inner = crate::db::MemoryStore::new();
        save_doc(&inner, &mut basic_theme(t0())).unwrap();
        let (mut note, mut cards) = note_with_cards("n", 3, t0());
        save_doc(&inner, &mut note).unwrap();
        for card in &mut cards {
            save_doc(&inner, card).unwrap();
        }
        let store = FailingPuts {
            inner,
            fail_id: "card-b.n.1",
        };
        let service = StudyService::new(
            store,
            FixedClock::new(t0()),
            rand::rngs::StdRng::seed_from_u64(1),
            SchedulerRegistry::with_defaults(),
            StudyConfig::default(),
        );

        let card = service.answer("card-b.n.0", 5, Duration::zero()).unwrap();
        let stored: Card = get_doc(service.store(), "card-b.n.0").unwrap();
        assert_eq!(stored, card);
        assert_eq!(stored.review_count, 1);

        // The refused sibling is untouched, the other one is still buried
        let refused: Card = get_doc(service.store(), "card-b.n.1").unwrap();
        assert_eq!(refused.buried_until, None);
        let buried: Card = get_doc(service.store(), "card-b.n.2").unwrap();
        assert!(buried.buried_until.is_some());
    }

    #[test]
    fn test_answer_rejects_out_of_range_stored_interval() {
        let env = StudyEnv::new(1);
        env.add_note("n", 1);
        let stored = env.store.get("card-b.n.0").unwrap();
        let mut body = stored.body.clone();
        body["interval"] = serde_json::json!(100_000_000);
        body["reviewCount"] = serde_json::json!(3);
        body["due"] = serde_json::json!("2017-01-01");
        env.store.put("card-b.n.0", &body, Some(&stored.rev)).unwrap();

        assert!(env.service.answer("card-b.n.0", 4, Duration::zero()).is_err());
        assert_eq!(env.store.get("card-b.n.0").unwrap().body, body);
    }

    #[test]
    fn test_answer_longest_interval() {
        let env = StudyEnv::new(1);
        env.add_note("n", 1);
        let max = Interval::from_wire(crate::domain::due::MAX_INTERVAL_DAYS).unwrap();
        let mut card: Card = get_doc(env.service.store(), "card-b.n.0").unwrap();
        card.review_count = 3;
        card.interval = Some(max);
        card.ease_factor = Some(2.5);
        card.due = Some(Due::at(t0()));
        save_doc(env.service.store(), &mut card).unwrap();

        let card = env.service.answer("card-b.n.0", 4, Duration::zero()).unwrap();
        assert_eq!(card.interval, Some(max));
        let stored: Card = get_doc(env.service.store(), "card-b.n.0").unwrap();
        assert_eq!(stored.interval, Some(max));
    }

    #[test]
    fn test_next_card_in_deck() {
        use crate::domain::Deck;

        let mut env = StudyEnv::new(1);
        env.add_note("a", 1);
        env.add_note("b", 1);
        let mut deck = Deck::new("deck-d", "Only b", t0()).unwrap();
        deck.add_card("card-b.b.0");
        save_doc(env.service.store(), &mut deck).unwrap();

        for _ in 0..10 {
            let next = env.service.next_card(Some("deck-d"), &CancellationToken::new()).unwrap();
            assert_eq!(next.card().map(|c| c.id.as_str()), Some("card-b.b.0"));
        }

        let mut empty = Deck::new("deck-e", "Empty", t0()).unwrap();
        save_doc(env.service.store(), &mut empty).unwrap();
        let next = env.service.next_card(Some("deck-e"), &CancellationToken::new()).unwrap();
        assert!(next.is_done());

        let err = env.service.next_card(Some("deck-missing"), &CancellationToken::new()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_answer_missing_card() {
        let env = StudyEnv::new(1);
        let err = env.service.answer("card-b.none.0", 4, Duration::zero()).unwrap_err();
        assert!(err.is_not_found());
    }
}
