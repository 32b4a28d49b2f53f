use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SerenConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub language: LanguageConfig,
    #[serde(default)]
    pub guardian: GuardianConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: String,
    pub database_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            database_file: "user_history.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LanguageConfig {
    pub scoring_model: String,
    pub trait_model: String,
    pub reply_model: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            scoring_model: "gemini-2.5-flash".to_string(),
            trait_model: "gemini-2.5-pro".to_string(),
            reply_model: "gemini-2.5-flash".to_string(),
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GuardianConfig {
    pub trend_window_days: i64,
    pub low_mood_threshold: f64,
    pub low_mood_streak: usize,
    pub anxiety_mean_threshold: f64,
    pub anxiety_min_entries: usize,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            trend_window_days: 7,
            low_mood_threshold: 4.0,
            low_mood_streak: 3,
            anxiety_mean_threshold: 7.0,
            anxiety_min_entries: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub max_turn_seconds: u64,
    pub temp_dir: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            max_turn_seconds: 600,
            temp_dir: "data/temp_audio".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub language: String,
    pub history_days: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            history_days: 7,
        }
    }
}

impl SerenConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}
