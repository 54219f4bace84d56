//! Shared test utilities for mailticket integration tests.
//!
//! This module provides:
//! - In-memory stand-ins for the mailbox provider, the analysis service and
//!   the confirmation mailer
//! - `TestApp`, a fully assembled service driven through its router

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::TestApp;
