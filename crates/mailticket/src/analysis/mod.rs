//! Email analysis: summary, key points, category, priority, sentiment and a
//! suggested reply.

use async_trait::async_trait;
use thiserror::Error;

use crate::tickets::{Analysis, InboundEmail};

pub mod gemini;
pub mod parse;

pub use gemini::{GeminiAnalyzer, GeminiConfig};

/// Errors from the analysis service.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The service could not be reached or timed out.
    #[error("Analysis service unreachable: {0}")]
    Transport(String),

    /// The service refused the request.
    #[error("Analysis request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The service answered without any generated text.
    #[error("Analysis service returned no content")]
    EmptyResponse,

    /// The generated text is not the expected JSON document.
    #[error("Failed to parse analysis response: {0}")]
    ResponseParse(String),
}

/// Produces an [`Analysis`] for an email.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, email: &InboundEmail) -> Result<Analysis, AnalysisError>;
}
