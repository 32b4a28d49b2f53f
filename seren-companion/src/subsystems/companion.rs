//! Companion: the empathetic reply for each turn
//!
//! Builds the persona prompt from the user's recent history and trait
//! profile, then asks the reply model for a short response ending in an
//! open question. Context lookups and the model call all degrade rather
//! than fail, so the session always gets something to say.

use std::collections::BTreeMap;
use std::sync::Arc;

use seren_core::config::SessionConfig;
use seren_core::{DailyLogEntry, LanguageModel, SessionStore};

/// Canned reply when generation fails. The underlying error is logged,
/// never spoken to the user.
pub const FALLBACK_REPLY: &str = "Oops, I had a little trouble. Tell me more.";

pub struct Companion {
    store: SessionStore,
    model: Arc<dyn LanguageModel>,
    config: SessionConfig,
}

impl Companion {
    pub fn new(store: SessionStore, model: Arc<dyn LanguageModel>, config: SessionConfig) -> Self {
        Self {
            store,
            model,
            config,
        }
    }

    /// Produce the empathetic reply for one user turn.
    ///
    /// History and profile lookups degrade to empty context; a capability
    /// failure degrades to the canned fallback.
    pub async fn reply(&self, transcript: &str) -> String {
        let history = match self.store.recent_logs(self.config.history_days).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load history for reply context");
                Vec::new()
            }
        };

        let profile = match self.store.profile().await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load profile for reply context");
                BTreeMap::new()
            }
        };

        let prompt = companion_prompt(&self.config.language, transcript, &history, &profile);

        match self.model.generate_text(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Reply generation failed, using fallback");
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

fn companion_prompt(
    language: &str,
    transcript: &str,
    history: &[DailyLogEntry],
    profile: &BTreeMap<String, String>,
) -> String {
    let history_lines = history
        .iter()
        .map(|entry| {
            format!(
                "- {}: {}",
                entry.timestamp.format("%Y-%m-%d"),
                entry.transcript_summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let history_block = if history_lines.is_empty() {
        "No recent history available.".to_string()
    } else {
        history_lines
    };

    let profile_lines = profile
        .iter()
        .map(|(key, value)| format!("- {key}: {value}"))
        .collect::<Vec<_>>()
        .join("\n");
    let profile_block = if profile_lines.is_empty() {
        "No personality profile established yet.".to_string()
    } else {
        profile_lines
    };

    format!(
        "Language: {language}\n\
         You are Seren, the user's empathetic best friend and daily wellness companion.\n\
         Behavior Constraints:\n\
         1. Tone: Be warm, casual, and supportive.\n\
         2. Length: Keep responses concise (2-4 sentences max).\n\
         3. Goal: Always end with an open-ended follow-up question.\n\
         Context to Use:\n\
         User's Recent History (Last 7 Days):\n{history_block}\n\
         User's Personality Profile:\n{profile_block}\n\
         User just said: \"{transcript}\"\n\
         Based on the context, give your empathetic response and thoughtful follow-up question."
    )
}

// ============================================================================
// TESTS
// ============================================================================
