//! Integration tests for the Guardian over persisted history
//!
//! These tests verify:
//! 1. A low-mood streak in the stored history raises a trend alert
//! 2. An immediate-risk transcript outranks any trend in the history
//! 3. Healthy history stays quiet
//! 4. Entries outside the trend window are ignored

use chrono::{DateTime, Duration, Utc};
use seren_core::config::GuardianConfig;
use seren_core::{DailyLogEntry, SessionStore};
use seren_companion::subsystems::Guardian;
use uuid::Uuid;

async fn seeded_store(moods_by_age_days: &[(i64, f64)]) -> (tempfile::TempDir, SessionStore) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = SessionStore::with_path(dir.path().join("test.db"));
    store.initialize().await.expect("Failed to initialize store");

    let now = Utc::now();
    for (age_days, mood) in moods_by_age_days {
        store
            .append_log(&entry_at(now - Duration::days(*age_days), *mood, 3.0))
            .await
            .expect("Failed to seed entry");
    }

    (dir, store)
}

fn entry_at(timestamp: DateTime<Utc>, mood: f64, anxiety: f64) -> DailyLogEntry {
    DailyLogEntry {
        timestamp,
        session_id: Uuid::new_v4(),
        transcript_summary: "seeded entry".to_string(),
        mood_score: mood,
        anxiety_score: anxiety,
        risk_level: 0,
        jitter_score: 0.0,
        loudness_mean: 0.0,
    }
}

#[tokio::test]
async fn test_low_mood_streak_in_history_raises_trend_alert() {
    let (_dir, store) = seeded_store(&[(2, 2.0), (1, 3.0), (0, 1.0)]).await;
    let guardian = Guardian::new(store, GuardianConfig::default());

    let alert = guardian
        .check("just checking in, nothing new")
        .await
        .expect("Expected a trend alert");

    assert!(!alert.is_immediate());
    assert!(alert.message().starts_with("INTERVENTION SUGGESTION:"));
}

#[tokio::test]
async fn test_immediate_risk_outranks_history_trend() {
    let (_dir, store) = seeded_store(&[(2, 2.0), (1, 3.0), (0, 1.0)]).await;
    let guardian = Guardian::new(store, GuardianConfig::default());

    let alert = guardian
        .check("honestly I just want to end it all")
        .await
        .expect("Expected an immediate alert");

    assert!(alert.is_immediate());
    assert!(alert.message().starts_with("IMMEDIATE DANGER ALERT:"));
    assert!(alert.message().contains("HELPLINE:"));
}

#[tokio::test]
async fn test_healthy_history_stays_quiet() {
    let (_dir, store) = seeded_store(&[(2, 6.0), (1, 7.0), (0, 8.0)]).await;
    let guardian = Guardian::new(store, GuardianConfig::default());

    assert!(guardian.check("today went really well").await.is_none());
}

#[tokio::test]
async fn test_entries_outside_window_are_ignored() {
    let (_dir, store) = seeded_store(&[(10, 1.0), (9, 1.0), (8, 1.0)]).await;
    let guardian = Guardian::new(store, GuardianConfig::default());

    assert!(
        guardian.check("feeling fine this week").await.is_none(),
        "A streak older than the window must not alert"
    );
}
