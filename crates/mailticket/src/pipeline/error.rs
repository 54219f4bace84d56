use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::db::DatabaseError;
use crate::graph::FetchError;

/// Errors that end a pipeline run without a ticket.
///
/// Confirmation delivery failures are not listed: a ticket that exists is a
/// successful run whether or not its confirmation went out.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to fetch message: {0}")]
    Fetch(#[from] FetchError),

    /// Only raised by strict intake; the webhook path degrades instead.
    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Ticket store error: {0}")]
    Storage(#[from] DatabaseError),
}
