pub mod bundle;
pub mod card;
pub mod deck;
pub mod doc;
pub mod due;
pub mod note;
pub mod package;
pub mod quality;
pub mod theme;

pub use bundle::Bundle;
pub use card::{parse_card_id, sibling_key_range, Card};
pub use deck::Deck;
pub use doc::{Document, Timestamps};
pub use due::{Due, Interval};
pub use note::Note;
pub use package::Package;
pub use quality::AnswerQuality;
pub use theme::{Model, Theme};
