//! Import of decoded content packages through the merge store.

use chrono::{DateTime, Utc};

use crate::db::{save_doc, DocStore, SaveOutcome};
use crate::domain::{Document, Package};
use crate::error::Result;

/// Per-document results of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub written: usize,
    pub merged: usize,
    pub unchanged: usize,
    /// Ids left alone because they were edited locally since the last import
    pub conflicts: Vec<String>,
}

impl ImportReport {
    pub fn total(&self) -> usize {
        self.written + self.merged + self.unchanged + self.conflicts.len()
    }

    fn record(&mut self, outcome: SaveOutcome) {
        match outcome {
            SaveOutcome::Written => self.written += 1,
            SaveOutcome::Merged => self.merged += 1,
            SaveOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

fn save_all<S, D>(store: &S, docs: Vec<D>, now: DateTime<Utc>, report: &mut ImportReport) -> Result<()>
where
    S: DocStore + ?Sized,
    D: Document,
{
    for mut doc in docs {
        let stamps = doc.stamps_mut();
        if stamps.imported.is_none() {
            stamps.imported = Some(now);
        }
        match save_doc(store, &mut doc) {
            Ok(outcome) => report.record(outcome),
            Err(e) if e.is_conflict() => {
                tracing::warn!("Skipping {}: edited since last import", doc.doc_id());
                report.conflicts.push(doc.doc_id().to_string());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Store every document of `package`, parents before children.
pub fn import_package<S: DocStore + ?Sized>(store: &S, package: Package, now: DateTime<Utc>) -> Result<ImportReport> {
    let Package {
        bundle,
        themes,
        notes,
        decks,
        cards,
    } = package;
    let bundle_id = bundle.id.clone();

    let mut report = ImportReport::default();
    save_all(store, vec![bundle], now, &mut report)?;
    save_all(store, themes, now, &mut report)?;
    save_all(store, notes, now, &mut report)?;
    save_all(store, decks, now, &mut report)?;
    save_all(store, cards, now, &mut report)?;

    tracing::info!(
        "Imported {}: {} written, {} merged, {} unchanged, {} conflicts",
        bundle_id,
        report.written,
        report.merged,
        report.unchanged,
        report.conflicts.len()
    );
    Ok(report)
}
