use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};

use mailticket::app::{self, Components, ServiceConfig};
use mailticket::subscription::{RenewalScheduler, Subscription, SubscriptionRegistry};
use mailticket::telemetry::{self, LogFormat};
use mailticket::{Database, Result, Settings};

/// Email-to-ticket webhook service.
#[derive(Parser, Debug)]
#[command(name = "mailticket", version, about = "Turns inbound mail into support tickets")]
struct Cli {
    /// Log output format (text or json).
    #[arg(long, global = true, env = "MAILTICKET_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP service (default).
    Serve,
    /// Validate settings and perform a token exchange, then exit.
    Check,
    /// Manage mailbox change subscriptions.
    #[command(subcommand)]
    Subscriptions(SubscriptionCommands),
}

#[derive(Subcommand, Debug)]
enum SubscriptionCommands {
    /// List subscriptions after reconciling with the remote service.
    List,
    /// Create a subscription for the configured mailbox.
    Create,
    /// Renew one subscription, or run a full renewal pass.
    Renew { id: Option<String> },
    /// Delete a subscription.
    Delete { id: String },
    /// Delete every subscription, remote and local.
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format)?;

    let settings = Settings::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(settings).await,
        Commands::Check => check(settings).await,
        Commands::Subscriptions(command) => subscriptions(settings, command).await,
    }
}

async fn serve(settings: Settings) -> Result<()> {
    info!("Starting mailticket v{}", env!("CARGO_PKG_VERSION"));

    let bind = settings.bind;
    let config = ServiceConfig::from_settings(&settings);
    info!(
        resource = %config.target.resource,
        notification_url = %config.target.notification_url,
        workers = config.dispatcher.workers,
        auto_subscribe = config.renewal.target.is_some(),
        "Service configured"
    );

    let components = Components::from_settings(settings)?;
    let state = app::assemble(components, config);

    let listener = TcpListener::bind(bind).await?;
    info!(addr = %bind, "Listening");
    app::serve(listener, state, shutdown_signal()).await?;
    info!("Shutdown complete");
    Ok(())
}

async fn check(settings: Settings) -> Result<()> {
    let graph = app::graph_client(&settings)?;
    let registry = SubscriptionRegistry::new(
        graph,
        Database::open(&settings.database_path)?,
        ServiceConfig::from_settings(&settings).registry,
    );

    let remote = registry.list_remote().await?;
    info!(
        remote_subscriptions = remote.len(),
        local_subscriptions = registry.count()?,
        database = %settings.database_path.display(),
        "Configuration OK"
    );
    Ok(())
}

async fn subscriptions(settings: Settings, command: SubscriptionCommands) -> Result<()> {
    let config = ServiceConfig::from_settings(&settings);
    let registry = Arc::new(SubscriptionRegistry::new(
        app::graph_client(&settings)?,
        Database::open(&settings.database_path)?,
        config.registry,
    ));

    match command {
        SubscriptionCommands::List => {
            let subscriptions = registry.list().await?;
            if subscriptions.is_empty() {
                println!("No subscriptions");
            }
            for subscription in &subscriptions {
                print_subscription(subscription);
            }
        }
        SubscriptionCommands::Create => {
            let subscription = registry.create(&config.target).await?;
            print_subscription(&subscription);
        }
        SubscriptionCommands::Renew { id: Some(id) } => {
            let subscription = registry.renew(&id).await?;
            print_subscription(&subscription);
        }
        SubscriptionCommands::Renew { id: None } => {
            let scheduler = RenewalScheduler::new(registry, config.renewal);
            let report = scheduler.run_once().await;
            println!(
                "created={} renewed={} recreated={} skipped={} failed={}",
                report.created, report.renewed, report.recreated, report.skipped, report.failed
            );
            for alert in &report.alerts {
                error!(alert = true, "{alert}");
            }
        }
        SubscriptionCommands::Delete { id } => {
            if registry.delete(&id).await? {
                println!("Deleted {id}");
            } else {
                println!("Subscription {id} not found");
            }
        }
        SubscriptionCommands::Purge => {
            let purged = registry.purge().await?;
            println!("Deleted {purged} remote subscription(s)");
        }
    }
    Ok(())
}

fn print_subscription(subscription: &Subscription) {
    println!(
        "{}\t{}\t{}\texpires {}",
        subscription.id,
        subscription.resource,
        subscription.change_type,
        subscription.expiration_time.to_rfc3339()
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
