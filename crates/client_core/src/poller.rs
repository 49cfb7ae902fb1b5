use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::{JoinHandle, JoinSet},
    time::MissedTickBehavior,
};
use tracing::{debug, warn};

use crate::{
    store::{ApplyOutcome, EntityStore, FetchTicket, Resource},
    transport::DashboardApi,
    ClientEvent,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub stations: ApplyOutcome,
    pub arrivals: ApplyOutcome,
    pub alerts: ApplyOutcome,
}

#[derive(Clone)]
pub struct Poller {
    api: Arc<dyn DashboardApi>,
    store: Arc<Mutex<EntityStore>>,
    events: broadcast::Sender<ClientEvent>,
}

impl Poller {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        store: Arc<Mutex<EntityStore>>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self { api, store, events }
    }

    /// Refreshes all three resources concurrently. Each one is fetched and
    /// applied on its own, so one failing never holds back the others.
    pub async fn refresh(&self) -> RefreshReport {
        let (stations, arrivals, alerts) = tokio::join!(
            self.refresh_resource(Resource::Stations),
            self.refresh_resource(Resource::Arrivals),
            self.refresh_resource(Resource::Alerts),
        );
        RefreshReport {
            stations,
            arrivals,
            alerts,
        }
    }

    pub async fn refresh_resource(&self, resource: Resource) -> ApplyOutcome {
        let ticket = self.store.lock().await.issue(resource);

        let (outcome, event) = match resource {
            Resource::Stations => match self.api.list_stations().await {
                Ok(stations) => {
                    let count = stations.len();
                    let outcome = self.store.lock().await.apply_stations(ticket, stations);
                    debug!(count, ?outcome, "poller: stations fetched");
                    (outcome, ClientEvent::StationsUpdated)
                }
                Err(err) => {
                    warn!(error = %err, "poller: stations fetch failed");
                    self.fail(ticket, "Failed to fetch stations").await
                }
            },
            Resource::Arrivals => match self.api.list_arrivals().await {
                Ok(arrivals) => {
                    let fetched_at = Utc::now();
                    let count = arrivals.len();
                    let outcome =
                        self.store
                            .lock()
                            .await
                            .apply_arrivals(ticket, arrivals, fetched_at);
                    debug!(count, ?outcome, "poller: arrivals fetched");
                    (outcome, ClientEvent::ArrivalsUpdated { fetched_at })
                }
                Err(err) => {
                    warn!(error = %err, "poller: arrivals fetch failed");
                    self.fail(ticket, "Failed to fetch arrivals").await
                }
            },
            Resource::Alerts => match self.api.list_alerts().await {
                Ok(alerts) => {
                    let count = alerts.len();
                    let outcome = self.store.lock().await.apply_alerts(ticket, alerts);
                    debug!(count, ?outcome, "poller: alerts fetched");
                    (outcome, ClientEvent::AlertsUpdated)
                }
                Err(err) => {
                    // Alerts are auxiliary: logged, never shown as a banner.
                    warn!(error = %err, "poller: alerts fetch failed");
                    self.fail(ticket, "Failed to fetch alerts").await
                }
            },
        };

        if outcome != ApplyOutcome::Stale {
            let _ = self.events.send(event);
        }
        outcome
    }

    async fn fail(&self, ticket: FetchTicket, message: &str) -> (ApplyOutcome, ClientEvent) {
        let outcome = self.store.lock().await.apply_failure(ticket, message);
        (
            outcome,
            ClientEvent::FetchFailed {
                resource: ticket.resource(),
                message: message.to_string(),
            },
        )
    }

    /// Starts polling: one refresh right away, then one per `period`. Each
    /// refresh runs as its own task so a slow backend never stretches the
    /// cadence.
    pub fn spawn(&self, period: Duration) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let poller = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut inflight = JoinSet::new();

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let poller = poller.clone();
                        inflight.spawn(async move { poller.refresh().await });
                    }
                    Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                        match joined {
                            Ok(report) => debug!(?report, "poller: refresh cycle finished"),
                            Err(err) if err.is_cancelled() => {}
                            Err(err) => warn!(error = %err, "poller: refresh task failed"),
                        }
                    }
                }
            }

            let aborted = inflight.len();
            inflight.abort_all();
            debug!(aborted, "poller: stopped");
        });

        PollerHandle {
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }
}

pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/poller_tests.rs"]
mod tests;
