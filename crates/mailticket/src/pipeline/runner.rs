//! Webhook-driven pipeline run: fetch the message, then hand it to intake.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info_span, warn, Instrument};

use super::{AnalysisMode, IntakeOutcome, PipelineError, TicketIntake};
use crate::dispatch::MessageProcessor;
use crate::graph::MessageSource;
use crate::sanitize;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Created {
        ticket_number: String,
        confirmation_sent: bool,
    },
    Duplicate {
        ticket_number: String,
    },
    /// The message was deleted or moved before it could be read.
    MessageGone,
}

/// Fetch + intake for one message id.
pub struct EmailPipeline {
    source: Arc<dyn MessageSource>,
    intake: Arc<TicketIntake>,
}

impl EmailPipeline {
    pub fn new(source: Arc<dyn MessageSource>, intake: Arc<TicketIntake>) -> Self {
        Self { source, intake }
    }

    pub async fn run(&self, message_id: &str) -> Result<RunOutcome, PipelineError> {
        let span = info_span!("pipeline", message_id = %sanitize::short_id(message_id));
        async {
            let email = match self
                .source
                .fetch_message(message_id)
                .instrument(info_span!("fetch"))
                .await
            {
                Ok(email) => email,
                Err(e) if e.is_gone() => {
                    warn!("Message no longer exists, dropping notification");
                    return Ok(RunOutcome::MessageGone);
                }
                Err(e) => return Err(e.into()),
            };

            let outcome = match self.intake.submit(email, AnalysisMode::Degrade).await? {
                IntakeOutcome::Created {
                    ticket,
                    confirmation_sent,
                } => RunOutcome::Created {
                    ticket_number: ticket.ticket_number,
                    confirmation_sent,
                },
                IntakeOutcome::Duplicate { ticket_number, .. } => {
                    RunOutcome::Duplicate { ticket_number }
                }
            };
            Ok(outcome)
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl MessageProcessor for EmailPipeline {
    async fn process(&self, message_id: &str) -> Result<(), PipelineError> {
        self.run(message_id).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisError, Analyzer};
    use crate::db::Database;
    use crate::graph::FetchError;
    use crate::notify::DisabledSender;
    use crate::tickets::{Analysis, InboundEmail, TicketStore};

    struct Mailbox;

    #[async_trait]
    impl MessageSource for Mailbox {
        async fn fetch_message(&self, message_id: &str) -> Result<InboundEmail, FetchError> {
            match message_id {
                "gone" => Err(FetchError::Gone {
                    message_id: message_id.to_string(),
                }),
                "broken" => Err(FetchError::Transport("reset".into())),
                _ => Ok(InboundEmail {
                    message_id: Some(message_id.to_string()),
                    sender_email: "alice@example.com".into(),
                    sender_name: None,
                    subject: format!("Subject {message_id}"),
                    body: "Body".into(),
                }),
            }
        }
    }

    struct DownAnalyzer;

    #[async_trait]
    impl Analyzer for DownAnalyzer {
        async fn analyze(&self, _email: &InboundEmail) -> Result<Analysis, AnalysisError> {
            Err(AnalysisError::EmptyResponse)
        }
    }

    fn pipeline() -> EmailPipeline {
        let intake = TicketIntake::new(
            TicketStore::new(Database::open_in_memory().unwrap()),
            Arc::new(DownAnalyzer),
            Arc::new(DisabledSender),
        );
        EmailPipeline::new(Arc::new(Mailbox), Arc::new(intake))
    }

    #[tokio::test]
    async fn test_run_creates_then_dedups() {
        let pipeline = pipeline();
        assert_eq!(
            pipeline.run("m-1").await.unwrap(),
            RunOutcome::Created {
                ticket_number: "TKT-000001".into(),
                confirmation_sent: false
            }
        );
        assert_eq!(
            pipeline.run("m-1").await.unwrap(),
            RunOutcome::Duplicate {
                ticket_number: "TKT-000001".into()
            }
        );
    }

    #[tokio::test]
    async fn test_gone_message_is_terminal() {
        assert_eq!(pipeline().run("gone").await.unwrap(), RunOutcome::MessageGone);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_error() {
        let err = pipeline().run("broken").await.unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(_)));
    }
}
