//! Core library for the Seren wellness companion
//!
//! Shared infrastructure used by the companion binary: configuration,
//! the SQLite session store, the Gemini language-model client, vocal
//! biomarker extraction, speech seams, and crisis resources.

pub mod config;
pub mod crisis;
pub mod error;
pub mod language;
pub mod models;
pub mod speech;
pub mod store;
pub mod vocal;

pub use config::SerenConfig;
pub use error::SerenError;
pub use language::{GeminiClient, LanguageError, LanguageModel, ModelConfig};
pub use models::DailyLogEntry;
pub use speech::{SpeechError, SpeechSynthesizer, Transcriber};
pub use store::SessionStore;
pub use vocal::{BiomarkerExtractor, Biomarkers};
