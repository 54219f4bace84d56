pub mod analysis;
pub mod app;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod history;
pub mod http;
pub mod notify;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod subscription;
pub mod telemetry;
pub mod tickets;
pub mod webhook;

pub use app::{assemble, Components, ServiceConfig};
pub use config::Settings;
pub use db::{Database, DatabaseError};
pub use dispatch::{DispatchOutcome, DispatcherConfig, MessageProcessor, NotificationDispatcher};
pub use error::{ConfigError, MailTicketError, Result};
pub use history::{AnalysisHistory, Summarizer};
pub use http::{router, AppState};
pub use pipeline::{AnalysisMode, EmailPipeline, PipelineError, TicketIntake};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use subscription::{RenewalScheduler, Subscription, SubscriptionRegistry, SubscriptionTarget};
pub use tickets::{Ticket, TicketStore};
