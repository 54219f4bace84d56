//! Dedup, analysis, persistence and confirmation for one email.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, info_span, warn, Instrument};

use super::PipelineError;
use crate::analysis::Analyzer;
use crate::notify::{ConfirmationSender, DeliveryError};
use crate::sanitize;
use crate::tickets::{Analysis, CreateOutcome, InboundEmail, Ticket, TicketStore};

/// What to do when analysis fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Create a ticket with placeholder analysis.
    Degrade,
    /// Fail without storing anything, so the caller can retry.
    Strict,
}

/// Result of submitting an email.
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    Created {
        ticket: Ticket,
        confirmation_sent: bool,
    },
    /// The email already has a ticket. `ticket` is `None` if it was deleted.
    Duplicate {
        ticket_number: String,
        ticket: Option<Ticket>,
    },
}

impl IntakeOutcome {
    pub fn ticket_number(&self) -> &str {
        match self {
            IntakeOutcome::Created { ticket, .. } => &ticket.ticket_number,
            IntakeOutcome::Duplicate { ticket_number, .. } => ticket_number,
        }
    }

    fn duplicate(outcome: CreateOutcome) -> Self {
        match outcome {
            CreateOutcome::Duplicate {
                ticket_number,
                ticket,
            } => IntakeOutcome::Duplicate {
                ticket_number,
                ticket,
            },
            CreateOutcome::Created(ticket) => IntakeOutcome::Duplicate {
                ticket_number: ticket.ticket_number.clone(),
                ticket: Some(ticket),
            },
        }
    }
}

/// Ticket creation from an email in hand.
pub struct TicketIntake {
    store: TicketStore,
    analyzer: Arc<dyn Analyzer>,
    confirmations: Arc<dyn ConfirmationSender>,
}

impl TicketIntake {
    pub fn new(
        store: TicketStore,
        analyzer: Arc<dyn Analyzer>,
        confirmations: Arc<dyn ConfirmationSender>,
    ) -> Self {
        Self {
            store,
            analyzer,
            confirmations,
        }
    }

    pub fn store(&self) -> &TicketStore {
        &self.store
    }

    /// Creates at most one ticket for `email`.
    pub async fn submit(
        &self,
        email: InboundEmail,
        mode: AnalysisMode,
    ) -> Result<IntakeOutcome, PipelineError> {
        if let Some(existing) = self.store.find_existing(&email, Utc::now())? {
            let outcome = IntakeOutcome::duplicate(existing);
            info!(ticket = %outcome.ticket_number(), "Email already ticketed");
            return Ok(outcome);
        }

        let analysis = match self
            .analyzer
            .analyze(&email)
            .instrument(info_span!("analyze"))
            .await
        {
            Ok(analysis) => analysis,
            Err(e) if mode == AnalysisMode::Degrade => {
                warn!(error = %e, "Analysis failed, creating ticket without it");
                Analysis::degraded()
            }
            Err(e) => return Err(e.into()),
        };

        let mut ticket = match self.store.create(&email, &analysis, Utc::now())? {
            CreateOutcome::Created(ticket) => ticket,
            duplicate => {
                let outcome = IntakeOutcome::duplicate(duplicate);
                info!(ticket = %outcome.ticket_number(), "Email ticketed concurrently");
                return Ok(outcome);
            }
        };
        info!(
            ticket = %ticket.ticket_number,
            sender = %sanitize::redact_email(&ticket.sender_email),
            priority = %ticket.priority,
            degraded = ticket.analysis_degraded,
            "Ticket created"
        );

        let confirmation_sent = self
            .confirm(&mut ticket)
            .instrument(info_span!("confirm"))
            .await;

        Ok(IntakeOutcome::Created {
            ticket,
            confirmation_sent,
        })
    }

    /// Best-effort confirmation; never undoes the ticket.
    async fn confirm(&self, ticket: &mut Ticket) -> bool {
        match self.confirmations.send_confirmation(ticket).await {
            Ok(()) => {
                let now = Utc::now();
                match self.store.mark_confirmation_sent(&ticket.ticket_number, now) {
                    Ok(_) => ticket.confirmation_sent_at = Some(now),
                    Err(e) => warn!(error = %e, "Could not record confirmation time"),
                }
                true
            }
            Err(DeliveryError::Disabled) => {
                debug!("Confirmation delivery disabled");
                false
            }
            Err(e) => {
                warn!(error = %e, "Confirmation not sent");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisError;
    use crate::db::Database;
    use crate::notify::DisabledSender;
    use crate::tickets::{Category, Priority};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedAnalyzer {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Analyzer for FixedAnalyzer {
        async fn analyze(&self, _email: &InboundEmail) -> Result<Analysis, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AnalysisError::Transport("timeout".into()));
            }
            Ok(Analysis {
                summary: Some("• Wants a quote".into()),
                key_points: vec!["50 seats".into()],
                category: Some(Category::Sales),
                priority: Priority::High,
                sentiment: None,
                suggested_reply: None,
                degraded: false,
            })
        }
    }

    struct RecordingSender {
        fail: bool,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl ConfirmationSender for RecordingSender {
        async fn send_confirmation(&self, _ticket: &Ticket) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Connection("refused".into()));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn email() -> InboundEmail {
        InboundEmail {
            message_id: Some("AAMk-1".into()),
            sender_email: "buyer@example.com".into(),
            sender_name: Some("Buyer".into()),
            subject: "Quote".into(),
            body: "Please send a quote for 50 seats.".into(),
        }
    }

    fn intake(fail_analysis: bool, sender: Arc<dyn ConfirmationSender>) -> TicketIntake {
        TicketIntake::new(
            TicketStore::new(Database::open_in_memory().unwrap()),
            Arc::new(FixedAnalyzer {
                fail: fail_analysis,
                calls: AtomicUsize::new(0),
            }),
            sender,
        )
    }

    #[tokio::test]
    async fn test_creates_and_confirms() {
        let sender = Arc::new(RecordingSender {
            fail: false,
            sent: AtomicUsize::new(0),
        });
        let intake = intake(false, sender.clone());

        let outcome = intake.submit(email(), AnalysisMode::Degrade).await.unwrap();
        let IntakeOutcome::Created {
            ticket,
            confirmation_sent,
        } = outcome
        else {
            panic!("expected a new ticket");
        };
        assert_eq!(ticket.ticket_number, "TKT-000001");
        assert_eq!(ticket.category, Some(Category::Sales));
        assert!(confirmation_sent);
        assert!(ticket.confirmation_sent_at.is_some());
        assert_eq!(sender.sent.load(Ordering::SeqCst), 1);

        let stored = intake.store().get("TKT-000001").unwrap().unwrap();
        assert!(stored.confirmation_sent_at.is_some());
    }

    #[tokio::test]
    async fn test_second_submit_is_duplicate() {
        let intake = intake(false, Arc::new(DisabledSender));
        intake.submit(email(), AnalysisMode::Degrade).await.unwrap();
        let again = intake.submit(email(), AnalysisMode::Degrade).await.unwrap();
        assert!(matches!(again, IntakeOutcome::Duplicate { ref ticket_number, .. } if ticket_number == "TKT-000001"));
    }

    #[tokio::test]
    async fn test_degrade_mode_creates_placeholder_ticket() {
        let intake = intake(true, Arc::new(DisabledSender));
        let outcome = intake.submit(email(), AnalysisMode::Degrade).await.unwrap();
        let IntakeOutcome::Created {
            ticket,
            confirmation_sent,
        } = outcome
        else {
            panic!("expected a new ticket");
        };
        assert!(ticket.analysis_degraded);
        assert_eq!(ticket.priority, Priority::Medium);
        assert_eq!(ticket.summary, None);
        assert_eq!(ticket.subject, "Quote");
        assert!(!confirmation_sent);
    }

    #[tokio::test]
    async fn test_strict_mode_stores_nothing() {
        let intake = intake(true, Arc::new(DisabledSender));
        let err = intake.submit(email(), AnalysisMode::Strict).await.unwrap_err();
        assert!(matches!(err, PipelineError::Analysis(_)));
        assert!(intake.store().get("TKT-000001").unwrap().is_none());
        assert!(!intake.store().is_processed("AAMk-1").unwrap());
    }

    #[tokio::test]
    async fn test_failed_confirmation_keeps_ticket() {
        let intake = intake(
            false,
            Arc::new(RecordingSender {
                fail: true,
                sent: AtomicUsize::new(0),
            }),
        );
        let outcome = intake.submit(email(), AnalysisMode::Degrade).await.unwrap();
        assert!(matches!(
            outcome,
            IntakeOutcome::Created {
                confirmation_sent: false,
                ..
            }
        ));
        assert!(intake.store().get("TKT-000001").unwrap().is_some());
    }
}
