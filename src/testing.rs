//! Test utilities: fixed-time fixtures and ready-made study environments.

use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use crate::clock::FixedClock;
use crate::config::StudyConfig;
use crate::db::{save_doc, MemoryStore, SqliteStore};
use crate::domain::{Bundle, Card, Deck, Note, Package, Theme};
use crate::services::StudyService;
use crate::srs::registry::ANKI_BASIC;
use crate::srs::SchedulerRegistry;

pub const BUNDLE_ID: &str = "bundle-b";
pub const THEME_ID: &str = "theme-t";
/// Model 0 of [`THEME_ID`], an Anki basic model
pub const MODEL_ID: &str = "theme-t/0";

/// 2017-01-01T00:00:00Z
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap()
}

pub fn basic_theme(now: DateTime<Utc>) -> Theme {
    let mut theme = Theme::new(THEME_ID, now).unwrap();
    theme.name = "Basic".into();
    theme.add_model(ANKI_BASIC);
    theme
}

/// Note `note-<note>` and its cards `card-b.<note>.0..cards`.
pub fn note_with_cards(note: &str, cards: u32, now: DateTime<Utc>) -> (Note, Vec<Card>) {
    let mut n = Note::new(format!("note-{}", note), THEME_ID, 0, now).unwrap();
    n.field_values = vec!["front".into(), "back".into()];
    let cards = (0..cards)
        .map(|i| Card::new(format!("card-b.{}.{}", note, i), MODEL_ID, now).unwrap())
        .collect();
    (n, cards)
}

/// One bundle, theme, note and deck, with two cards.
pub fn sample_package(now: DateTime<Utc>) -> Package {
    let bundle = Bundle::new(BUNDLE_ID, "user-u", now).unwrap();
    let (note, cards) = note_with_cards("n", 2, now);
    let mut deck = Deck::new("deck-d", "Sample", now).unwrap();
    for card in &cards {
        deck.add_card(card.id.clone());
    }
    Package {
        bundle,
        themes: vec![basic_theme(now)],
        notes: vec![note],
        decks: vec![deck],
        cards,
    }
}

pub type MemoryStudyService = StudyService<Arc<MemoryStore>, Arc<FixedClock>, StdRng>;

/// A study service over an in-memory store, a fixed clock at [`t0`] and a
/// seeded RNG. The basic theme is already stored.
pub struct StudyEnv {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub service: MemoryStudyService,
}

impl StudyEnv {
    pub fn new(seed: u64) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(t0()));
        let mut theme = basic_theme(t0());
        save_doc(store.as_ref(), &mut theme).unwrap();

        let service = StudyService::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            StdRng::seed_from_u64(seed),
            SchedulerRegistry::with_defaults(),
            StudyConfig::default(),
        );
        Self {
            store,
            clock,
            service,
        }
    }

    /// Store a note with `cards` new cards.
    pub fn add_note(&self, note: &str, cards: u32) -> Vec<Card> {
        let (mut n, mut cards) = note_with_cards(note, cards, t0());
        save_doc(self.store.as_ref(), &mut n).unwrap();
        for card in &mut cards {
            save_doc(self.store.as_ref(), card).unwrap();
        }
        cards
    }
}

/// A SQLite store in a temporary directory, removed on drop.
pub struct SqliteEnv {
    /// Kept alive for the database file
    pub temp: TempDir,
    pub store: SqliteStore,
}

impl SqliteEnv {
    pub fn new() -> crate::error::Result<Self> {
        let temp = TempDir::new()?;
        let store = SqliteStore::open(temp.path().join("flashback.db"))?;
        Ok(Self { temp, store })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }
}
