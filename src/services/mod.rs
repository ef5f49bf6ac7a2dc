//! Application services.
//!
//! Orchestration over the scheduling core and the document store.

pub mod import;
pub mod study;

pub use import::{import_package, ImportReport};
pub use study::{StudyCard, StudyService};
