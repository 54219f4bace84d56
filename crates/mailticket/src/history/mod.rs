//! Analysis history: emails analysed on request, outside the ticket flow.

pub mod store;
pub mod summarize;

pub use store::{AnalysisHistory, AnalysisRecord, AnalyzedText, HistoryPage, HistoryQuery};
pub use summarize::{Summarizer, Summary, SummaryMetadata, SummaryRequest};
