//! Analyst: objective post-turn analysis
//!
//! Scores each completed turn (mood, anxiety, conservative risk) from the
//! transcript plus vocal biomarkers, persists the resulting daily log
//! entry, and fires a best-effort profile-trait update. The whole pass is
//! non-fatal: capability failures degrade to defaulted scores and store
//! failures are logged and swallowed, so the caller always gets an entry.

use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use seren_core::vocal::{BiomarkerExtractor, Biomarkers};
use seren_core::{DailyLogEntry, LanguageModel, SessionStore};

// ============================================================================
// PUBLIC API
// ============================================================================

/// Where a report's scores or vocal features came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Produced by the live capability.
    Measured,
    /// Defaulted after a capability failure.
    Fallback,
}

/// Outcome of one analysis pass: the entry in its persisted shape, plus
/// where each part of it came from and whether the append succeeded.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub entry: DailyLogEntry,
    pub scores: Provenance,
    pub vocal: Provenance,
    pub persisted: bool,
}

pub struct Analyst {
    store: SessionStore,
    extractor: BiomarkerExtractor,
    scoring_model: Arc<dyn LanguageModel>,
    trait_model: Arc<dyn LanguageModel>,
}

impl Analyst {
    pub fn new(
        store: SessionStore,
        scoring_model: Arc<dyn LanguageModel>,
        trait_model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            store,
            extractor: BiomarkerExtractor::new(),
            scoring_model,
            trait_model,
        }
    }

    /// Analyze one completed turn and persist the resulting log entry.
    pub async fn analyze_and_log(
        &self,
        transcript: &str,
        audio: Option<&Path>,
    ) -> AnalysisReport {
        let biomarkers = match audio {
            Some(path) => self.extractor.extract(path),
            None => Biomarkers::degraded("no audio sample for this turn"),
        };
        let vocal = if biomarkers.is_degraded() {
            Provenance::Fallback
        } else {
            Provenance::Measured
        };

        let (scored, scores) = self.score_transcript(transcript, &biomarkers).await;

        let entry = DailyLogEntry {
            timestamp: Utc::now(),
            session_id: Uuid::new_v4(),
            transcript_summary: scored
                .sentiment_summary
                .unwrap_or_else(|| fallback_summary(transcript)),
            mood_score: scored.mood_score,
            anxiety_score: scored.anxiety_score,
            risk_level: scored.risk_level as i64,
            jitter_score: biomarkers.jitter_local(),
            loudness_mean: biomarkers.loudness_mean(),
        };

        let persisted = match self.store.append_log(&entry).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Failed to persist daily log entry");
                false
            }
        };

        self.update_profile_trait(transcript).await;

        AnalysisReport {
            entry,
            scores,
            vocal,
            persisted,
        }
    }

    async fn score_transcript(
        &self,
        transcript: &str,
        biomarkers: &Biomarkers,
    ) -> (ScoredAnalysis, Provenance) {
        let prompt = scoring_prompt(transcript, biomarkers);

        let value = match self.scoring_model.generate_json(&prompt).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Scoring call failed, using default scores");
                return (ScoredAnalysis::default(), Provenance::Fallback);
            }
        };

        match serde_json::from_value::<ScoredAnalysis>(value) {
            Ok(scored) => {
                tracing::debug!(topics = ?scored.topics_discussed, "Scored session transcript");
                (scored, Provenance::Measured)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Scoring response did not match the expected record");
                (ScoredAnalysis::default(), Provenance::Fallback)
            }
        }
    }

    /// Best-effort profile learning: ask for one `{key, value}` trait and
    /// upsert it. Any failure skips the update without touching the entry.
    async fn update_profile_trait(&self, transcript: &str) {
        let profile = match self.store.profile().await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load profile for trait update");
                return;
            }
        };

        let prompt = trait_prompt(transcript, &profile);

        let value = match self.trait_model.generate_json(&prompt).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Trait extraction failed, skipping profile update");
                return;
            }
        };

        let update = match serde_json::from_value::<TraitUpdate>(value) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(error = %e, "Trait response missing key/value, skipping update");
                return;
            }
        };

        if update.key.trim().is_empty() || update.value.trim().is_empty() {
            tracing::warn!("Trait response had a blank key or value, skipping update");
            return;
        }

        match self.store.upsert_trait(&update.key, &update.value).await {
            Ok(()) => tracing::info!(trait_key = %update.key, "Learned profile trait"),
            Err(e) => tracing::warn!(error = %e, "Failed to persist profile trait"),
        }
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

/// Flat record the scoring capability is asked to return. Absent fields
/// fall back to their defaults individually.
#[derive(Debug, Default, Deserialize)]
struct ScoredAnalysis {
    #[serde(default)]
    mood_score: f64,
    #[serde(default)]
    anxiety_score: f64,
    #[serde(default)]
    risk_level: f64,
    #[serde(default)]
    topics_discussed: Vec<String>,
    #[serde(default)]
    sentiment_summary: Option<String>,
}

/// Trait updates require both keys; anything else is discarded.
#[derive(Debug, Deserialize)]
struct TraitUpdate {
    key: String,
    value: String,
}

fn scoring_prompt(transcript: &str, biomarkers: &Biomarkers) -> String {
    let biomarker_json = serde_json::to_string_pretty(&biomarkers.to_json()).unwrap_or_default();
    format!(
        "You are the Analyst Agent for a mental wellness companion. Your task is to objectively analyze the user's conversation and vocal data.\n\
         Conversation Transcript:\n---\n{transcript}\n---\n\
         Vocal Biomarkers:\n---\n{biomarker_json}\n---\n\
         Based ONLY on the content and the vocal data, provide the following structured analysis in a single JSON block. Do not include any other text.\n\
         1. mood_score: A score from 1 (Very Negative/Distressed) to 10 (Very Positive/Optimistic) reflecting the overall emotional tone.\n\
         2. anxiety_score: A score from 1 (Very Calm) to 10 (High Distress/Anxiety). Pay special attention to 'jitter_local' and pitch variation.\n\
         3. risk_level: An INTEGER score from 0 (No Risk) to 3 (Immediate Concern). Keep this conservative; the Guardian Agent will handle extremes.\n\
         4. topics_discussed: A list of the top 3 main topics discussed (e.g., ['Work Stress', 'Weekend Plans', 'Hobby']).\n\
         5. sentiment_summary: A brief, objective 2-sentence summary of the overall sentiment and vocal characteristics."
    )
}

fn trait_prompt(transcript: &str, profile: &BTreeMap<String, String>) -> String {
    let profile_json = serde_json::to_string_pretty(profile).unwrap_or_default();
    format!(
        "Based on the latest conversation: '{transcript}'\n\
         And the user's current known profile: {profile_json}\n\
         Identify ONE new hobby, interest, or personality trait that emerged or was reinforced.\n\
         Output a single JSON object with two keys: 'key' and 'value'.\n\
         Example: {{\"key\": \"Coping Mechanism\", \"value\": \"Uses humor to deflect.\"}}"
    )
}

/// Summary fallback when the capability gives none: the first 100
/// characters of the transcript with a trailing ellipsis.
fn fallback_summary(transcript: &str) -> String {
    let prefix: String = transcript.chars().take(100).collect();
    format!("{prefix}...")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // TEST 1: Fallback summary truncates at 100 characters
    #[test]
    fn test_fallback_summary_truncates() {
        let long = "a".repeat(250);
        let summary = fallback_summary(&long);
        assert_eq!(summary.len(), 103);
        assert!(summary.ends_with("..."));
    }

    // TEST 2: Short transcripts still get the ellipsis marker
    #[test]
    fn test_fallback_summary_short_input() {
        assert_eq!(fallback_summary("rough day"), "rough day...");
    }

    // TEST 3: Truncation is character-based, safe on multibyte input
    #[test]
    fn test_fallback_summary_multibyte() {
        let transcript = "é".repeat(150);
        let summary = fallback_summary(&transcript);
        assert_eq!(summary.chars().count(), 103);
    }

    // TEST 4: The scoring prompt embeds transcript and biomarker JSON
    #[test]
    fn test_scoring_prompt_contents() {
        let biomarkers = Biomarkers::degraded("no mic");
        let prompt = scoring_prompt("I feel okay today", &biomarkers);

        assert!(prompt.contains("Conversation Transcript:\n---\nI feel okay today\n---"));
        assert!(prompt.contains("jitter_local"));
        assert!(prompt.contains("sentiment_summary"));
    }

    // TEST 5: The trait prompt embeds the current profile
    #[test]
    fn test_trait_prompt_contents() {
        let mut profile = BTreeMap::new();
        profile.insert("Hobby".to_string(), "Enjoys hiking".to_string());
        let prompt = trait_prompt("We talked about trails", &profile);

        assert!(prompt.contains("We talked about trails"));
        assert!(prompt.contains("Enjoys hiking"));
        assert!(prompt.contains("'key' and 'value'"));
    }

    // TEST 6: A scored record tolerates absent fields
    #[test]
    fn test_scored_analysis_defaults_missing_fields() {
        let value = serde_json::json!({ "mood_score": 7 });
        let scored: ScoredAnalysis =
            serde_json::from_value(value).expect("Partial record must parse");

        assert!((scored.mood_score - 7.0).abs() < f64::EPSILON);
        assert_eq!(scored.anxiety_score, 0.0);
        assert!(scored.sentiment_summary.is_none());
        assert!(scored.topics_discussed.is_empty());
    }

    // TEST 7: Trait updates reject records missing either key
    #[test]
    fn test_trait_update_requires_both_keys() {
        let missing_value = serde_json::json!({ "key": "Hobby" });
        assert!(serde_json::from_value::<TraitUpdate>(missing_value).is_err());

        let complete = serde_json::json!({ "key": "Hobby", "value": "Climbs" });
        let update: TraitUpdate =
            serde_json::from_value(complete).expect("Complete record must parse");
        assert_eq!(update.key, "Hobby");
        assert_eq!(update.value, "Climbs");
    }
}
