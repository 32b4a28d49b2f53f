pub mod daily_log;

pub use daily_log::DailyLogEntry;
