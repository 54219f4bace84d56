//! Turns inbound email into tickets.
//!
//! [`TicketIntake`] dedups, analyzes, persists and confirms an email that is
//! already in hand; the manual REST path uses it directly. [`EmailPipeline`]
//! adds the message fetch in front and is what the dispatcher workers run.

pub mod error;
pub mod intake;
pub mod runner;

pub use error::PipelineError;
pub use intake::{AnalysisMode, IntakeOutcome, TicketIntake};
pub use runner::{EmailPipeline, RunOutcome};
