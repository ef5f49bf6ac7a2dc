use rusqlite::{Connection, Result};

pub fn run_migrations(conn: &Connection) -> Result<()> {
  // Bodies are stored verbatim; index keys are extracted on write so the
  // study queries never have to parse JSON.
  conn.execute_batch(
    r#"
    CREATE TABLE IF NOT EXISTS docs (
      id TEXT PRIMARY KEY,
      rev TEXT NOT NULL,
      generation INTEGER NOT NULL,
      body TEXT NOT NULL,
      new_key TEXT,
      old_key TEXT
    );

    -- Indexes
    CREATE INDEX IF NOT EXISTS idx_docs_new_key ON docs(new_key, id) WHERE new_key IS NOT NULL;
    CREATE INDEX IF NOT EXISTS idx_docs_old_key ON docs(old_key, id) WHERE old_key IS NOT NULL;
    "#,
  )?;

  Ok(())
}
