//! Session store: SQLite persistence for daily logs and the trait profile
//!
//! Every operation opens and releases its own connection. Call volume is
//! one handful of queries per user turn, so per-call connections keep
//! independent callers from sharing mutable handles.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::SerenError;
use crate::models::DailyLogEntry;

const CREATE_DAILY_LOGS: &str = "
CREATE TABLE IF NOT EXISTS daily_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    session_id TEXT NOT NULL,
    transcript_summary TEXT,
    mood_score REAL,
    anxiety_score REAL,
    risk_level INTEGER,
    jitter_score REAL,
    loudness_mean REAL
)";

const CREATE_USER_PROFILE: &str = "
CREATE TABLE IF NOT EXISTS user_profile (
    trait_key TEXT PRIMARY KEY,
    trait_value TEXT,
    last_updated TEXT
)";

/// File-backed store for check-in history and learned user traits.
#[derive(Debug, Clone)]
pub struct SessionStore {
    db_path: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at the configured data directory.
    pub fn new(config: &StorageConfig) -> Self {
        let data_dir = PathBuf::from(shellexpand::tilde(&config.data_dir).into_owned());
        Self {
            db_path: data_dir.join(&config.database_file),
        }
    }

    /// Create a store at an explicit database path.
    pub fn with_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Idempotently ensure both tables exist.
    ///
    /// An existing file that cannot be read as a database is renamed aside
    /// as a timestamped backup and a fresh store is created in its place,
    /// so corruption never prevents startup.
    pub async fn initialize(&self) -> Result<(), SerenError> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if self.db_path.exists() && !self.is_valid_store().await {
            self.quarantine_corrupt_file()?;
        }

        let mut conn = self.connect().await?;
        sqlx::query(CREATE_DAILY_LOGS).execute(&mut conn).await?;
        sqlx::query(CREATE_USER_PROFILE).execute(&mut conn).await?;
        conn.close().await?;

        tracing::info!(path = %self.db_path.display(), "Session store ready");
        Ok(())
    }

    /// Insert one immutable log row.
    pub async fn append_log(&self, entry: &DailyLogEntry) -> Result<(), SerenError> {
        let mut conn = self.connect().await?;

        sqlx::query(
            "INSERT INTO daily_logs \
             (timestamp, session_id, transcript_summary, mood_score, anxiety_score, \
              risk_level, jitter_score, loudness_mean) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(entry.timestamp)
        .bind(entry.session_id.to_string())
        .bind(&entry.transcript_summary)
        .bind(entry.mood_score)
        .bind(entry.anxiety_score)
        .bind(entry.risk_level)
        .bind(entry.jitter_score)
        .bind(entry.loudness_mean)
        .execute(&mut conn)
        .await?;

        conn.close().await?;
        tracing::debug!(session_id = %entry.session_id, "Appended daily log entry");
        Ok(())
    }

    /// Replace-or-insert one profile trait, stamping `last_updated`.
    pub async fn upsert_trait(&self, key: &str, value: &str) -> Result<(), SerenError> {
        let mut conn = self.connect().await?;

        sqlx::query(
            "REPLACE INTO user_profile (trait_key, trait_value, last_updated) \
             VALUES (?1, ?2, ?3)",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&mut conn)
        .await?;

        conn.close().await?;
        tracing::debug!(trait_key = key, "Upserted profile trait");
        Ok(())
    }

    /// All entries with `timestamp >= now - days`, most recent first.
    pub async fn recent_logs(&self, days: i64) -> Result<Vec<DailyLogEntry>, SerenError> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let mut conn = self.connect().await?;

        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT timestamp, session_id, transcript_summary, mood_score, anxiety_score, \
             risk_level, jitter_score, loudness_mean \
             FROM daily_logs WHERE timestamp >= ?1 ORDER BY timestamp DESC",
        )
        .bind(cutoff)
        .fetch_all(&mut conn)
        .await?;

        conn.close().await?;
        Ok(rows.into_iter().map(DailyLogEntry::from).collect())
    }

    /// The full current trait profile.
    pub async fn profile(&self) -> Result<BTreeMap<String, String>, SerenError> {
        let mut conn = self.connect().await?;

        let rows: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT trait_key, trait_value FROM user_profile ORDER BY trait_key")
                .fetch_all(&mut conn)
                .await?;

        conn.close().await?;
        Ok(rows
            .into_iter()
            .map(|(key, value)| (key, value.unwrap_or_default()))
            .collect())
    }

    /// Total number of persisted log rows.
    pub async fn log_count(&self) -> Result<i64, SerenError> {
        let mut conn = self.connect().await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM daily_logs")
            .fetch_one(&mut conn)
            .await?;

        conn.close().await?;
        Ok(count)
    }

    async fn connect(&self) -> Result<SqliteConnection, SerenError> {
        let options = SqliteConnectOptions::new()
            .filename(&self.db_path)
            .create_if_missing(true);
        let conn = SqliteConnection::connect_with(&options).await?;
        Ok(conn)
    }

    async fn is_valid_store(&self) -> bool {
        let Ok(mut conn) = self.connect().await else {
            return false;
        };
        let probe = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' LIMIT 1")
            .fetch_optional(&mut conn)
            .await;
        let _ = conn.close().await;
        probe.is_ok()
    }

    fn quarantine_corrupt_file(&self) -> Result<(), SerenError> {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let backup = PathBuf::from(format!("{}.corrupt.{}", self.db_path.display(), stamp));
        std::fs::rename(&self.db_path, &backup)?;
        tracing::warn!(
            backup = %backup.display(),
            "Existing database was unreadable, moved aside and starting fresh"
        );
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct LogRow {
    timestamp: DateTime<Utc>,
    session_id: String,
    transcript_summary: Option<String>,
    mood_score: Option<f64>,
    anxiety_score: Option<f64>,
    risk_level: Option<i64>,
    jitter_score: Option<f64>,
    loudness_mean: Option<f64>,
}

impl From<LogRow> for DailyLogEntry {
    fn from(row: LogRow) -> Self {
        DailyLogEntry {
            timestamp: row.timestamp,
            session_id: Uuid::parse_str(&row.session_id).unwrap_or_default(),
            transcript_summary: row.transcript_summary.unwrap_or_default(),
            mood_score: row.mood_score.unwrap_or_default(),
            anxiety_score: row.anxiety_score.unwrap_or_default(),
            risk_level: row.risk_level.unwrap_or_default(),
            jitter_score: row.jitter_score.unwrap_or_default(),
            loudness_mean: row.loudness_mean.unwrap_or_default(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
