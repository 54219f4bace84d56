//! Periodic subscription renewal.
//!
//! One background task ticks at a fixed interval. Each tick makes sure the
//! monitored resource is covered, renews every subscription that is close to
//! expiring and re-creates the ones the provider has dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::registry::{SubscriptionRegistry, SubscriptionTarget};
use crate::graph::SubscriptionError;

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct RenewalConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Subscriptions expiring sooner than this are renewed.
    pub threshold: chrono::Duration,
    /// Consecutive failures for one resource before an operator alert.
    pub alert_after: u32,
    /// Resource to subscribe when no local record covers it.
    pub target: Option<SubscriptionTarget>,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(12 * 60 * 60),
            threshold: chrono::Duration::hours(24),
            alert_after: 3,
            target: None,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenewalReport {
    /// Subscriptions created because the target had none.
    pub created: usize,
    pub renewed: usize,
    /// Subscriptions re-created after the provider reported them gone.
    pub recreated: usize,
    /// Subscriptions with enough lifetime left.
    pub skipped: usize,
    pub failed: usize,
    /// Resources that reached the alert threshold on this tick.
    pub alerts: Vec<String>,
}

/// Background renewal loop with a manual trigger.
pub struct RenewalScheduler {
    registry: Arc<SubscriptionRegistry>,
    config: RenewalConfig,
    tick_lock: tokio::sync::Mutex<()>,
    failures: Mutex<HashMap<String, u32>>,
    shutdown: watch::Sender<bool>,
}

impl RenewalScheduler {
    pub fn new(registry: Arc<SubscriptionRegistry>, config: RenewalConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            registry,
            config,
            tick_lock: tokio::sync::Mutex::new(()),
            failures: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Starts the loop. The first tick runs immediately.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(scheduler.config.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = scheduler.config.interval.as_secs(),
                "Renewal scheduler started"
            );

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = timer.tick() => {}
                }

                // A started tick always runs to completion.
                let report = scheduler.run_once().await;
                if report.failed > 0 {
                    warn!(?report, "Renewal tick finished with failures");
                } else {
                    debug!(?report, "Renewal tick finished");
                }
            }
            info!("Renewal scheduler stopped");
        })
    }

    /// Stops launching new ticks.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Runs one tick now. Concurrent calls are serialized.
    pub async fn run_once(&self) -> RenewalReport {
        let _tick = self.tick_lock.lock().await;
        let mut report = RenewalReport::default();

        if let Some(target) = &self.config.target {
            self.ensure_coverage(target, &mut report).await;
        }

        let subscriptions = match self.registry.local() {
            Ok(subs) => subs,
            Err(e) => {
                error!(error = %e, "Could not load subscriptions for renewal");
                report.failed += 1;
                return report;
            }
        };

        let now = Utc::now();
        for sub in subscriptions {
            if !sub.needs_renewal(now, self.config.threshold) {
                report.skipped += 1;
                continue;
            }

            let result = match self.registry.renew(&sub.id).await {
                Ok(_) => {
                    report.renewed += 1;
                    Ok(())
                }
                Err(e) if e.is_not_found() => {
                    info!(resource = %sub.resource, "Subscription gone at provider, re-creating");
                    let target = SubscriptionTarget {
                        resource: sub.resource.clone(),
                        notification_url: sub.notification_url.clone(),
                    };
                    self.registry.create(&target).await.map(|_| {
                        report.recreated += 1;
                    })
                }
                Err(e) => Err(e),
            };
            self.record(&sub.resource, result, &mut report);
        }

        report
    }

    async fn ensure_coverage(&self, target: &SubscriptionTarget, report: &mut RenewalReport) {
        let result = match self.registry.find_for_resource(&target.resource) {
            Ok(Some(_)) => return,
            Ok(None) => {
                info!(resource = %target.resource, "No subscription for monitored resource, creating");
                self.registry.create(target).await.map(|_| {
                    report.created += 1;
                })
            }
            Err(e) => Err(e),
        };
        self.record(&target.resource, result, report);
    }

    fn record(&self, resource: &str, result: Result<(), SubscriptionError>, report: &mut RenewalReport) {
        let Ok(mut failures) = self.failures.lock() else {
            return;
        };
        match result {
            Ok(()) => {
                failures.remove(resource);
            }
            Err(e) => {
                report.failed += 1;
                let count = failures.entry(resource.to_string()).or_insert(0);
                *count += 1;
                if *count >= self.config.alert_after {
                    error!(
                        alert = true,
                        resource,
                        consecutive_failures = *count,
                        error = %e,
                        "Subscription renewal keeps failing"
                    );
                    report.alerts.push(resource.to_string());
                } else {
                    warn!(resource, attempt = *count, error = %e, "Subscription renewal failed");
                }
            }
        }
    }
}
