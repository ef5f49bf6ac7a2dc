use chrono::Duration;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flashback_core::clock::{Clock, SystemClock};
use flashback_core::config;
use flashback_core::db::{DocStore, SqliteStore};
use flashback_core::domain::Package;
use flashback_core::error::Result;
use flashback_core::services::{import_package, StudyCard, StudyService};
use flashback_core::srs::SchedulerRegistry;

#[derive(Parser, Debug)]
#[command(name = "flashback")]
#[command(about = "Study flashcards with spaced repetition", long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,

  /// Path to config.toml
  #[arg(short, long, global = true, default_value = config::CONFIG_FILE)]
  config: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Show the next card to study
  Next {
    /// Only study cards in this deck
    #[arg(long)]
    deck: Option<String>,
  },

  /// Record an answer
  Answer {
    card_id: String,

    /// 0 (blackout) to 5 (perfect)
    quality: u8,

    /// Time spent before answering
    #[arg(long, default_value_t = 0)]
    delay_ms: i64,
  },

  /// Print a stored document
  Show { id: String },

  /// Import a package file (JSON)
  Import { path: PathBuf },
}

fn main() -> ExitCode {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "flashback_core=info,flashback=info".into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();

  let cli = Cli::parse();
  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      tracing::error!("{}", e);
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<()> {
  let config = config::load_from(&cli.config)?;
  let store = SqliteStore::open(&config.database.path)?;

  match cli.command {
    Commands::Next { deck } => {
      let mut service = StudyService::new(
        store,
        SystemClock,
        StdRng::from_os_rng(),
        SchedulerRegistry::with_defaults(),
        config.study,
      );
      match service.next_card(deck.as_deref(), &CancellationToken::new())? {
        StudyCard::Card(card) => println!("{}", serde_json::to_string_pretty(&card)?),
        StudyCard::Done => println!("Nothing to study right now. Check back later."),
      }
    }
    Commands::Answer {
      card_id,
      quality,
      delay_ms,
    } => {
      let service = StudyService::new(
        store,
        SystemClock,
        StdRng::from_os_rng(),
        SchedulerRegistry::with_defaults(),
        config.study,
      );
      let card = service.answer(&card_id, quality, Duration::milliseconds(delay_ms))?;
      println!("{}", serde_json::to_string_pretty(&card)?);
    }
    Commands::Show { id } => {
      let doc = store.get(&id)?;
      println!("_rev: {}", doc.rev);
      println!("{}", serde_json::to_string_pretty(&doc.body)?);
    }
    Commands::Import { path } => {
      let contents = std::fs::read_to_string(&path)?;
      let package: Package = serde_json::from_str(&contents)?;
      let report = import_package(&store, package, SystemClock.now())?;
      println!(
        "{} written, {} merged, {} unchanged",
        report.written, report.merged, report.unchanged
      );
      for id in &report.conflicts {
        println!("kept local edits: {}", id);
      }
    }
  }
  Ok(())
}
