//! Seren companion: session orchestration over the core library
//!
//! The binary wires these pieces together: audio capture, the three
//! subsystem agents (Analyst, Guardian, Companion), and the interactive
//! check-in loop.

pub mod capture;
pub mod session;
pub mod subsystems;
