//! Guardian: safety monitor over the current turn and recent history
//!
//! Two independent layers merged by severity, immediate over trend:
//! a transcript-local scan for crisis phrases, then a history scan for
//! sustained low mood or elevated anxiety across the trend window.

use seren_core::config::GuardianConfig;
use seren_core::{crisis, DailyLogEntry, SessionStore};

// ============================================================================
// PUBLIC API
// ============================================================================

/// Phrases that trigger an immediate-danger alert when the transcript
/// contains them, matched case-insensitively.
pub const IMMEDIATE_RISK_PHRASES: [&str; 7] = [
    "kill myself",
    "end it all",
    "not worth living",
    "take my life",
    "suicide",
    "self-harm",
    "harm myself",
];

const LOW_MOOD_MESSAGE: &str = "INTERVENTION SUGGESTION:\n\
    Mood has been low for several consecutive days. Consider scheduling a professional check-in or exploring coping resources.";

const ANXIETY_MESSAGE: &str = "ANXIETY CHECK:\n\
    Anxiety and vocal tremor metrics have been elevated this past week. Consider focusing the next session on relaxation techniques.";

/// A safety escalation, highest severity first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Escalation {
    /// Crisis phrases in the current transcript.
    Immediate(String),
    /// A concerning pattern across the recent history.
    Trend(String),
}

impl Escalation {
    pub fn message(&self) -> &str {
        match self {
            Escalation::Immediate(message) | Escalation::Trend(message) => message,
        }
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, Escalation::Immediate(_))
    }
}

pub struct Guardian {
    store: SessionStore,
    config: GuardianConfig,
}

impl Guardian {
    pub fn new(store: SessionStore, config: GuardianConfig) -> Self {
        Self { store, config }
    }

    /// Evaluate both safety layers for the current turn.
    ///
    /// A store failure downgrades to "no trend data" rather than blocking
    /// the turn; the immediate scan needs no history and always runs.
    pub async fn check(&self, transcript: &str) -> Option<Escalation> {
        if let Some(alert) = scan_immediate(transcript, &crisis::helpline("global")) {
            tracing::warn!("Immediate-risk phrase detected in transcript");
            return Some(alert);
        }

        let logs = match self.store.recent_logs(self.config.trend_window_days).await {
            Ok(logs) => logs,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load history for trend scan");
                return None;
            }
        };

        scan_trend(&logs, &self.config)
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

fn scan_immediate(transcript: &str, helpline: &str) -> Option<Escalation> {
    let lowered = transcript.to_lowercase();
    if IMMEDIATE_RISK_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
    {
        let message = format!(
            "IMMEDIATE DANGER ALERT:\n\
             I am an AI and your safety is my top priority. Based on what you said, please reach out to a human professional right now.\n\
             HELPLINE: {helpline}\n\
             Please talk to them immediately."
        );
        return Some(Escalation::Immediate(message));
    }
    None
}

/// Entries arrive most recent first. Any run of consecutive low-mood
/// entries reaching the streak threshold triggers the suggestion; the
/// anxiety mean is only consulted when no streak fired.
fn scan_trend(logs: &[DailyLogEntry], config: &GuardianConfig) -> Option<Escalation> {
    if logs.is_empty() {
        return None;
    }

    let mut streak = 0usize;
    for entry in logs {
        if entry.mood_score < config.low_mood_threshold {
            streak += 1;
            if streak >= config.low_mood_streak {
                return Some(Escalation::Trend(LOW_MOOD_MESSAGE.to_string()));
            }
        } else {
            streak = 0;
        }
    }

    if logs.len() >= config.anxiety_min_entries {
        let mean = logs.iter().map(|e| e.anxiety_score).sum::<f64>() / logs.len() as f64;
        if mean >= config.anxiety_mean_threshold {
            return Some(Escalation::Trend(ANXIETY_MESSAGE.to_string()));
        }
    }

    None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn entry(mood: f64, anxiety: f64) -> DailyLogEntry {
        DailyLogEntry {
            timestamp: Utc::now(),
            session_id: Uuid::new_v4(),
            transcript_summary: String::new(),
            mood_score: mood,
            anxiety_score: anxiety,
            risk_level: 0,
            jitter_score: 0.0,
            loudness_mean: 0.0,
        }
    }

    fn entries(moods_and_anxiety: &[(f64, f64)]) -> Vec<DailyLogEntry> {
        moods_and_anxiety
            .iter()
            .map(|(mood, anxiety)| entry(*mood, *anxiety))
            .collect()
    }

    fn test_config() -> GuardianConfig {
        GuardianConfig::default()
    }

    // TEST 1: Crisis phrases trigger regardless of case
    #[test]
    fn test_immediate_scan_is_case_insensitive() {
        let alert = scan_immediate("I just want to END IT ALL tonight", "988");

        let alert = alert.expect("Expected an immediate alert");
        assert!(alert.is_immediate());
        assert!(alert.message().starts_with("IMMEDIATE DANGER ALERT:"));
        assert!(alert.message().contains("HELPLINE: 988"));
    }

    // TEST 2: Every configured phrase is detected
    #[test]
    fn test_all_phrases_are_detected() {
        for phrase in IMMEDIATE_RISK_PHRASES {
            let transcript = format!("earlier today I said {phrase} out loud");
            assert!(
                scan_immediate(&transcript, "988").is_some(),
                "Phrase not detected: {phrase}"
            );
        }
    }

    // TEST 3: Benign transcripts produce no immediate alert
    #[test]
    fn test_benign_transcript_passes() {
        assert!(scan_immediate("I had a lovely walk and a good lunch", "988").is_none());
    }

    // TEST 4: Three consecutive low-mood days trigger the suggestion
    #[test]
    fn test_low_mood_streak_triggers() {
        let logs = entries(&[(2.0, 3.0), (3.0, 3.0), (1.0, 3.0)]);

        let alert = scan_trend(&logs, &test_config()).expect("Expected a trend alert");
        assert!(!alert.is_immediate());
        assert!(alert.message().starts_with("INTERVENTION SUGGESTION:"));
    }

    // TEST 5: A streak buried behind a good day still triggers
    #[test]
    fn test_older_streak_still_triggers() {
        let logs = entries(&[(2.0, 3.0), (6.0, 3.0), (2.0, 3.0), (3.0, 3.0), (1.0, 3.0)]);

        let alert = scan_trend(&logs, &test_config());
        assert!(alert.is_some(), "A three-day run anywhere in the window counts");
    }

    // TEST 6: Two low days are not enough
    #[test]
    fn test_short_streak_does_not_trigger() {
        let logs = entries(&[(2.0, 3.0), (3.0, 3.0), (6.0, 3.0)]);
        assert!(scan_trend(&logs, &test_config()).is_none());
    }

    // TEST 7: A mood of exactly 4 resets the streak
    #[test]
    fn test_threshold_mood_resets_streak() {
        let logs = entries(&[(3.0, 3.0), (4.0, 3.0), (3.0, 3.0), (3.0, 3.0)]);
        assert!(scan_trend(&logs, &test_config()).is_none());
    }

    // TEST 8: Elevated mean anxiety over five entries triggers
    #[test]
    fn test_elevated_anxiety_triggers() {
        let logs = entries(&[(6.0, 8.0), (6.0, 9.0), (6.0, 7.0), (6.0, 8.0), (6.0, 9.0)]);

        let alert = scan_trend(&logs, &test_config()).expect("Expected an anxiety alert");
        assert!(alert.message().starts_with("ANXIETY CHECK:"));
    }

    // TEST 9: High anxiety with too few entries stays quiet
    #[test]
    fn test_anxiety_needs_minimum_entries() {
        let logs = entries(&[(6.0, 9.0), (6.0, 9.0), (6.0, 9.0), (6.0, 9.0)]);
        assert!(scan_trend(&logs, &test_config()).is_none());
    }

    // TEST 10: The low-mood streak outranks the anxiety check
    #[test]
    fn test_low_mood_outranks_anxiety() {
        let logs = entries(&[(1.0, 9.0), (1.0, 9.0), (1.0, 9.0), (1.0, 9.0), (1.0, 9.0)]);

        let alert = scan_trend(&logs, &test_config()).expect("Expected an alert");
        assert!(alert.message().starts_with("INTERVENTION SUGGESTION:"));
    }

    // TEST 11: An empty window produces no alert
    #[test]
    fn test_empty_history_is_quiet() {
        assert!(scan_trend(&[], &test_config()).is_none());
    }
}
