//! Service assembly.
//!
//! [`Components`] holds the storage handle and the remote collaborators;
//! [`assemble`] wires them into the registry, intake, pipeline, dispatcher,
//! scheduler and summarizer behind the HTTP state. Production code passes the Graph,
//! Gemini and SMTP clients; tests pass fakes.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::analysis::{Analyzer, GeminiAnalyzer, GeminiConfig};
use crate::config::Settings;
use crate::db::Database;
use crate::dispatch::{DispatcherConfig, NotificationDispatcher};
use crate::error::Result;
use crate::graph::auth::{create_http_client, DEFAULT_LOGIN_BASE_URL};
use crate::graph::client::DEFAULT_GRAPH_BASE_URL;
use crate::graph::{
    ClientCredentialsConfig, ClientCredentialsExchange, CredentialCache, GraphClient, GraphConfig,
    MessageSource, SubscriptionApi,
};
use crate::history::{AnalysisHistory, Summarizer};
use crate::http::AppState;
use crate::notify::{ConfirmationSender, DisabledSender, SmtpConfirmationSender};
use crate::pipeline::{EmailPipeline, TicketIntake};
use crate::subscription::{
    RegistryConfig, RenewalConfig, RenewalScheduler, SubscriptionRegistry, SubscriptionTarget,
};
use crate::tickets::TicketStore;
use crate::webhook::NotificationValidator;

/// Storage and remote collaborators.
pub struct Components {
    pub db: Database,
    pub subscriptions: Arc<dyn SubscriptionApi>,
    pub messages: Arc<dyn MessageSource>,
    pub analyzer: Arc<dyn Analyzer>,
    pub confirmations: Arc<dyn ConfirmationSender>,
}

/// Tunables for the assembled service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub target: SubscriptionTarget,
    pub registry: RegistryConfig,
    pub renewal: RenewalConfig,
    pub dispatcher: DispatcherConfig,
}

impl ServiceConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let target = settings.target();
        Self {
            registry: RegistryConfig {
                lifetime: settings.subscription_lifetime,
                ..RegistryConfig::default()
            },
            renewal: RenewalConfig {
                interval: settings.renewal_interval,
                threshold: settings.renewal_threshold,
                target: settings.auto_subscribe.then(|| target.clone()),
                ..RenewalConfig::default()
            },
            dispatcher: DispatcherConfig {
                workers: settings.workers,
                queue_capacity: settings.queue_capacity,
                run_timeout: settings.pipeline_timeout,
            },
            target,
        }
    }
}

/// Shared Graph client authenticated with the configured application.
pub fn graph_client(settings: &Settings) -> Result<Arc<GraphClient>> {
    let http = create_http_client()?;
    let exchange = ClientCredentialsExchange::new(
        http.clone(),
        ClientCredentialsConfig {
            tenant_id: settings.tenant_id.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            login_base_url: DEFAULT_LOGIN_BASE_URL.to_string(),
        },
    );
    let credentials = Arc::new(CredentialCache::new(Arc::new(exchange)));
    Ok(Arc::new(GraphClient::new(
        http,
        credentials,
        GraphConfig {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            mailbox: settings.mailbox.clone(),
        },
    )))
}

impl Components {
    /// Production collaborators. Consumes the secrets held by `settings`.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let db = Database::open(&settings.database_path)?;
        let graph = graph_client(&settings)?;

        let mut gemini = GeminiConfig::new(settings.gemini_api_key);
        gemini.model = settings.gemini_model;
        let analyzer = Arc::new(GeminiAnalyzer::new(create_http_client()?, gemini));

        let confirmations: Arc<dyn ConfirmationSender> = match settings.smtp {
            Some(smtp) => Arc::new(SmtpConfirmationSender::new(smtp)?),
            None => {
                warn!("SMTP_EMAIL/SMTP_PASSWORD not set, confirmations disabled");
                Arc::new(DisabledSender)
            }
        };

        Ok(Self {
            db,
            subscriptions: graph.clone(),
            messages: graph,
            analyzer,
            confirmations,
        })
    }
}

/// Wires the service and starts the dispatcher workers. The renewal
/// scheduler is created but not started.
pub fn assemble(components: Components, config: ServiceConfig) -> AppState {
    let store = TicketStore::new(components.db.clone());
    let summarizer = Arc::new(Summarizer::new(
        Arc::clone(&components.analyzer),
        AnalysisHistory::new(components.db.clone()),
    ));
    let registry = Arc::new(SubscriptionRegistry::new(
        components.subscriptions,
        components.db,
        config.registry,
    ));
    let intake = Arc::new(TicketIntake::new(
        store.clone(),
        components.analyzer,
        components.confirmations,
    ));
    let pipeline = Arc::new(EmailPipeline::new(components.messages, Arc::clone(&intake)));
    let dispatcher = Arc::new(NotificationDispatcher::start(
        store.clone(),
        pipeline,
        config.dispatcher,
    ));
    let scheduler = Arc::new(RenewalScheduler::new(Arc::clone(&registry), config.renewal));

    AppState {
        validator: Arc::new(NotificationValidator::new(Arc::clone(&registry))),
        registry,
        dispatcher,
        scheduler,
        intake,
        store,
        summarizer,
        target: config.target,
    }
}

/// Serves `state` on an already bound listener until `shutdown` resolves.
///
/// The renewal scheduler starts only here, after the bind, because its first
/// tick may create a subscription whose validation handshake calls back into
/// this listener. On shutdown the scheduler stops first, then queued
/// dispatches drain.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let scheduler = Arc::clone(&state.scheduler);
    let dispatcher = Arc::clone(&state.dispatcher);
    let renewal_task = scheduler.start();

    let served = axum::serve(listener, crate::http::router(state))
        .with_graceful_shutdown(shutdown)
        .await;

    info!("Shutting down");
    scheduler.stop();
    if let Err(e) = renewal_task.await {
        warn!(error = %e, "Renewal task ended abnormally");
    }
    dispatcher.shutdown().await;
    Ok(served?)
}
