//! The three cooperating agents behind a check-in session.

pub mod analyst;
pub mod companion;
pub mod guardian;

pub use analyst::{AnalysisReport, Analyst, Provenance};
pub use companion::Companion;
pub use guardian::{Escalation, Guardian};
