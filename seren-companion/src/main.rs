//! seren: personal wellness check-in companion
//!
//! # Subcommands
//! - `check-in`                    : interactive daily session (the default)
//! - `analyze --transcript <text>` : score one turn, optionally with `--audio <wav>`
//! - `history [--days <n>]`        : print recent daily log entries
//! - `profile`                     : print the learned personality profile
//! - `helpline [--location <loc>]` : print crisis helpline resources
//! - `health`                      : storage and credential self-check

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use seren_core::config::LanguageConfig;
use seren_core::speech::SilentTranscriber;
use seren_core::{crisis, language, LanguageModel, SerenConfig, SessionStore};

use seren_companion::capture::{TurnRecorder, WavFileFeed};
use seren_companion::session::{run_checkin, SessionContext};
use seren_companion::subsystems::{Analyst, Companion, Guardian, Provenance};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "seren",
    version,
    about = "Personal wellness check-in companion"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "seren.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the interactive daily check-in (the default)
    CheckIn,

    /// Analyze one transcript and log the result
    Analyze {
        /// Transcript text for the turn
        #[arg(long)]
        transcript: String,

        /// WAV recording of the turn, for vocal biomarkers
        #[arg(long)]
        audio: Option<PathBuf>,
    },

    /// Print recent daily log entries
    History {
        /// Window in days
        #[arg(long, default_value_t = 7)]
        days: i64,
    },

    /// Print the learned personality profile
    Profile,

    /// Print crisis helpline resources
    Helpline {
        /// Location to look up resources for
        #[arg(long, default_value = "global")]
        location: String,
    },

    /// Storage and credential self-check
    Health,
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match SerenConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    match cli.command.unwrap_or(Command::CheckIn) {
        Command::CheckIn => check_in(config).await,
        Command::Analyze { transcript, audio } => analyze(config, &transcript, audio).await,
        Command::History { days } => history(config, days).await,
        Command::Profile => profile(config).await,
        Command::Helpline { location } => {
            println!("{}", crisis::helpline(&location));
            Ok(())
        }
        Command::Health => health(config).await,
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn check_in(config: SerenConfig) -> anyhow::Result<()> {
    let store = SessionStore::new(&config.storage);

    let scoring = model_or_exit(&config.language, &config.language.scoring_model);
    let traits = model_or_exit(&config.language, &config.language.trait_model);
    let reply = model_or_exit(&config.language, &config.language.reply_model);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        signal_token.cancel();
    });

    let ctx = SessionContext {
        analyst: Analyst::new(store.clone(), scoring, traits),
        guardian: Guardian::new(store.clone(), config.guardian.clone()),
        companion: Companion::new(store.clone(), reply, config.session.clone()),
        transcriber: Arc::new(SilentTranscriber),
        recorder: TurnRecorder::new(config.capture.clone()),
        voice: None,
        shutdown,
        store,
    };

    run_checkin(&ctx).await
}

async fn analyze(
    config: SerenConfig,
    transcript: &str,
    audio: Option<PathBuf>,
) -> anyhow::Result<()> {
    let store = SessionStore::new(&config.storage);
    store.initialize().await?;

    let scoring = model_or_exit(&config.language, &config.language.scoring_model);
    let traits = model_or_exit(&config.language, &config.language.trait_model);
    let analyst = Analyst::new(store, scoring, traits);

    let audio_path = match audio {
        Some(path) => normalize_recording(&config, &path).await,
        None => None,
    };

    let report = analyst
        .analyze_and_log(transcript, audio_path.as_deref())
        .await;

    println!("{}", serde_json::to_string_pretty(&report.entry)?);
    println!(
        "scores: {}  vocal: {}  persisted: {}",
        provenance_label(report.scores),
        provenance_label(report.vocal),
        report.persisted
    );
    Ok(())
}

async fn history(config: SerenConfig, days: i64) -> anyhow::Result<()> {
    let store = SessionStore::new(&config.storage);
    store.initialize().await?;

    let logs = store.recent_logs(days).await?;
    if logs.is_empty() {
        println!("No check-ins in the last {days} days.");
        return Ok(());
    }

    for entry in logs {
        println!(
            "{}  mood {:>4.1}  anxiety {:>4.1}  risk {}  {}",
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.mood_score,
            entry.anxiety_score,
            entry.risk_level,
            entry.transcript_summary
        );
    }
    Ok(())
}

async fn profile(config: SerenConfig) -> anyhow::Result<()> {
    let store = SessionStore::new(&config.storage);
    store.initialize().await?;

    let traits = store.profile().await?;
    if traits.is_empty() {
        println!("No personality profile established yet.");
        return Ok(());
    }
    for (key, value) in traits {
        println!("- {key}: {value}");
    }
    Ok(())
}

async fn health(config: SerenConfig) -> anyhow::Result<()> {
    let mut healthy = true;

    let store = SessionStore::new(&config.storage);
    match store.initialize().await {
        Ok(()) => {
            let count = store.log_count().await.unwrap_or(0);
            println!(
                "✅ Storage ready: {} ({} log entries)",
                store.db_path().display(),
                count
            );
        }
        Err(e) => {
            println!("❌ Storage failed: {}", e);
            healthy = false;
        }
    }

    match std::env::var("GOOGLE_API_KEY") {
        Ok(key) if !key.is_empty() => println!("✅ GOOGLE_API_KEY is set"),
        _ => {
            println!("❌ GOOGLE_API_KEY is not set (language capabilities unavailable)");
            healthy = false;
        }
    }

    println!(
        "   models: scoring={} traits={} reply={}",
        config.language.scoring_model, config.language.trait_model, config.language.reply_model
    );

    if !healthy {
        std::process::exit(1);
    }
    println!("✅ Seren health check passed");
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn model_or_exit(settings: &LanguageConfig, model: &str) -> Arc<dyn LanguageModel> {
    match language::create_model(settings, model) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("Language capability unavailable: {}", e);
            eprintln!("Set GOOGLE_API_KEY in the environment or a .env file.");
            std::process::exit(1);
        }
    }
}

/// Re-encode an arbitrary WAV through the capture path so analysis sees
/// the same normalized mono audio a live session produces.
async fn normalize_recording(config: &SerenConfig, path: &Path) -> Option<PathBuf> {
    let recorder = TurnRecorder::new(config.capture.clone());
    let mut feed = WavFileFeed::new(path);
    match recorder.record(&mut feed, CancellationToken::new()).await {
        Ok(Some(turn)) => Some(turn.path),
        Ok(None) => {
            eprintln!("No audio could be read from {}", path.display());
            None
        }
        Err(e) => {
            eprintln!("Could not read {}: {}", path.display(), e);
            None
        }
    }
}

fn provenance_label(provenance: Provenance) -> &'static str {
    match provenance {
        Provenance::Measured => "measured",
        Provenance::Fallback => "fallback",
    }
}
