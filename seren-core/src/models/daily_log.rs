use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per analyzed check-in session. Append-only: rows are never
/// updated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyLogEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    pub transcript_summary: String,
    /// 1 (very negative) to 10 (very positive); 0 when analysis fell back.
    pub mood_score: f64,
    /// 1 (calm) to 10 (high distress); 0 when analysis fell back.
    pub anxiety_score: f64,
    /// 0 (no risk) to 3 (immediate concern), scored conservatively.
    pub risk_level: i64,
    pub jitter_score: f64,
    pub loudness_mean: f64,
}
