//! State module for tracking harvest progress
//!
//! - `RunPhase`: the phase machine of a single harvest invocation

mod run_phase;

pub use run_phase::RunPhase;
