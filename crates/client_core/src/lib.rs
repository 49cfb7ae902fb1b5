use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use shared::{
    domain::{Direction, StationUuid},
    protocol::{AddStationRequest, Alert, AvailableStation, StationArrivals, StationConfig},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info};

pub mod config;
pub mod dispatcher;
pub mod drag;
pub mod error;
pub mod poller;
pub mod projector;
pub mod store;
pub mod transport;

pub use config::{load_settings, DashboardSettings};
pub use dispatcher::CommandDispatcher;
pub use drag::{
    CardLayout, DragCoordinator, DragGrab, LayoutProbe, NoopPointerTracking, Point,
    PointerTracking, Rect, ReorderCommit, Size,
};
pub use error::{CommandError, CommandKind, DragError, TransportError};
pub use poller::{Poller, PollerHandle, RefreshReport};
pub use projector::{AlertSummary, BoardEntry, Projection};
pub use store::{ApplyOutcome, EntityStore, Resource};
pub use transport::{DashboardApi, HttpDashboardApi};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    StationsUpdated,
    ArrivalsUpdated { fetched_at: DateTime<Utc> },
    AlertsUpdated,
    FetchFailed { resource: Resource, message: String },
    StationRemoved(StationUuid),
    DragOrderChanged,
    ReorderCommitted { order: Vec<StationUuid> },
    CommandFailed { kind: CommandKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardView {
    pub main: Option<StationArrivals>,
    pub others: Vec<StationArrivals>,
    pub filter: Direction,
    pub dragging: Option<StationUuid>,
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub loading: bool,
}

impl DashboardView {
    pub fn ordered(&self) -> impl Iterator<Item = &StationArrivals> {
        self.main.iter().chain(self.others.iter())
    }

    pub fn ordered_ids(&self) -> Vec<StationUuid> {
        self.ordered().map(|station| station.uuid.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_none() && self.others.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragPreview {
    pub station: StationUuid,
    pub order: Vec<StationUuid>,
    pub pointer: Point,
    pub translation: Point,
    pub ghost_origin: Point,
    pub card_size: Size,
}

/// Order committed by the last gesture, shown until a newer arrivals list
/// arrives from the backend.
struct PendingOrder {
    order: Vec<StationUuid>,
    revision: u64,
}

struct ViewState {
    filter: Direction,
    drag: DragCoordinator,
    pending: Option<PendingOrder>,
}

// Lock order: `view` before `store`.
pub struct Dashboard {
    store: Arc<Mutex<EntityStore>>,
    poller: Poller,
    dispatcher: CommandDispatcher,
    view: Mutex<ViewState>,
    events: broadcast::Sender<ClientEvent>,
    polling: Mutex<Option<PollerHandle>>,
    poll_interval: Duration,
}

impl Dashboard {
    pub fn new(api: Arc<dyn DashboardApi>, poll_interval: Duration) -> Arc<Self> {
        Self::new_with_pointer_tracking(api, poll_interval, Arc::new(NoopPointerTracking))
    }

    pub fn new_with_pointer_tracking(
        api: Arc<dyn DashboardApi>,
        poll_interval: Duration,
        tracking: Arc<dyn PointerTracking>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let store = Arc::new(Mutex::new(EntityStore::new()));
        let poller = Poller::new(Arc::clone(&api), Arc::clone(&store), events.clone());
        let dispatcher =
            CommandDispatcher::new(api, Arc::clone(&store), poller.clone(), events.clone());

        Arc::new(Self {
            store,
            poller,
            dispatcher,
            view: Mutex::new(ViewState {
                filter: Direction::All,
                drag: DragCoordinator::new(tracking),
                pending: None,
            }),
            events,
            polling: Mutex::new(None),
            poll_interval,
        })
    }

    pub fn connect(settings: &DashboardSettings) -> Result<Arc<Self>, TransportError> {
        let api = HttpDashboardApi::new(&settings.server_url, settings.request_timeout())?;
        Ok(Self::new(Arc::new(api), settings.poll_interval()))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn start(&self) {
        let mut polling = self.polling.lock().await;
        if polling.is_none() {
            info!(interval_secs = self.poll_interval.as_secs(), "dashboard: polling started");
            *polling = Some(self.poller.spawn(self.poll_interval));
        }
    }

    /// Stops polling, aborts in-flight refreshes, ends any gesture and closes
    /// the store to responses that still manage to land.
    pub async fn shutdown(&self) {
        let handle = self.polling.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
        self.view.lock().await.drag.cancel();
        self.store.lock().await.close();
        info!("dashboard: shut down");
    }

    pub async fn refresh(&self) -> RefreshReport {
        self.poller.refresh().await
    }

    pub async fn view(&self) -> DashboardView {
        let mut view = self.view.lock().await;
        let store = self.store.lock().await;

        let revision = store.arrivals_revision();
        if view
            .pending
            .as_ref()
            .is_some_and(|pending| pending.revision != revision)
        {
            debug!("dashboard: backend order confirmed, dropping pending order");
            view.pending = None;
        }

        let order = view.drag.drag_order().or_else(|| {
            view.pending
                .as_ref()
                .map(|pending| pending.order.as_slice())
        });
        let projection = projector::project(store.arrivals(), order, view.filter);

        DashboardView {
            main: projection.main.cloned(),
            others: projection.others.into_iter().cloned().collect(),
            filter: view.filter,
            dragging: view.drag.state().map(|state| state.dragging_id().clone()),
            error: store.error().map(str::to_string),
            updated_at: store.updated_at(),
            loading: store.is_loading(),
        }
    }

    pub async fn direction_filter(&self) -> Direction {
        self.view.lock().await.filter
    }

    pub async fn set_direction_filter(&self, filter: Direction) {
        self.view.lock().await.filter = filter;
    }

    pub async fn stations(&self) -> Vec<StationConfig> {
        self.store.lock().await.stations().to_vec()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        let store = self.store.lock().await;
        let mut alerts = store.alerts().to_vec();
        alerts.sort_by_key(|alert| alert.severity.rank());
        alerts
    }

    pub async fn alert_summary(&self) -> AlertSummary {
        projector::summarize_alerts(self.store.lock().await.alerts())
    }

    pub async fn relevant_alerts(&self) -> Vec<Alert> {
        let view = self.view.lock().await;
        let store = self.store.lock().await;
        let projection = projector::project(store.arrivals(), None, view.filter);
        let lines = projector::lines_served(projection.ordered());
        projector::alerts_for_lines(store.alerts(), &lines)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn departure_board(&self, limit: usize) -> Vec<BoardEntry> {
        let view = self.view.lock().await;
        let store = self.store.lock().await;
        projector::departure_board(store.arrivals(), view.filter, limit)
    }

    pub async fn begin_drag(&self, grab: DragGrab) -> Result<(), DragError> {
        let mut view = self.view.lock().await;
        let (main, order) = {
            let store = self.store.lock().await;
            let main = store
                .arrivals()
                .iter()
                .find(|station| station.is_main)
                .map(|station| station.uuid.clone());
            let mut order = store.reorderable_ids();
            // Start from what is on screen, which may still be an unconfirmed commit.
            let revision = store.arrivals_revision();
            if let Some(pending) = view
                .pending
                .as_ref()
                .filter(|pending| pending.revision == revision)
            {
                order = projector::arrange_ids(order, &pending.order);
            }
            (main, order)
        };
        view.drag.begin(grab, main, order)?;
        view.pending = None;
        Ok(())
    }

    pub async fn drag_moved(&self, pointer: Point, layout: &dyn LayoutProbe) -> bool {
        let changed = self.view.lock().await.drag.pointer_moved(pointer, layout);
        if changed {
            let _ = self.events.send(ClientEvent::DragOrderChanged);
        }
        changed
    }

    pub async fn drag_preview(&self) -> Option<DragPreview> {
        let view = self.view.lock().await;
        view.drag.state().map(|state| DragPreview {
            station: state.dragging_id().clone(),
            order: state.drag_order().to_vec(),
            pointer: state.pointer(),
            translation: state.translation(),
            ghost_origin: state.ghost_origin(),
            card_size: state.card_size(),
        })
    }

    /// A failed commit is surfaced but not rolled back.
    pub async fn end_drag(self: &Arc<Self>) -> Option<JoinHandle<Result<(), CommandError>>> {
        let commit = {
            let mut view = self.view.lock().await;
            let commit = view.drag.release()?;
            let revision = self.store.lock().await.arrivals_revision();
            view.pending = Some(PendingOrder {
                order: commit.order.clone(),
                revision,
            });
            commit
        };

        let dashboard = Arc::clone(self);
        Some(tokio::spawn(async move {
            let result = dashboard.dispatcher.reorder(commit.order).await;
            if let Err(err) = &result {
                dashboard
                    .store
                    .lock()
                    .await
                    .surface_error(err.user_message());
            }
            result
        }))
    }

    pub async fn cancel_drag(&self) -> bool {
        self.view.lock().await.drag.cancel()
    }

    pub async fn search_available(
        &self,
        query: &str,
    ) -> Result<Vec<AvailableStation>, CommandError> {
        self.dispatcher.search_available(query).await
    }

    /// Errors are returned to the caller only; the add dialog shows them.
    pub async fn add_station(&self, request: AddStationRequest) -> Result<(), CommandError> {
        self.dispatcher.add_station(request).await
    }

    pub async fn remove_station(&self, uuid: &StationUuid) -> Result<(), CommandError> {
        let result = self.dispatcher.remove_station(uuid).await;
        self.surface(result).await
    }

    pub async fn set_main(&self, uuid: &StationUuid) -> Result<(), CommandError> {
        let result = self.dispatcher.set_main(uuid).await;
        self.surface(result).await
    }

    pub async fn unset_main(&self, target: Option<StationUuid>) -> Result<(), CommandError> {
        let result = self.dispatcher.unset_main(target).await;
        self.surface(result).await
    }

    pub async fn set_station_direction(
        &self,
        uuid: &StationUuid,
        direction: Direction,
    ) -> Result<(), CommandError> {
        let result = self.dispatcher.set_direction(uuid, direction).await;
        self.surface(result).await
    }

    pub async fn reorder(&self, order: Vec<StationUuid>) -> Result<(), CommandError> {
        let result = self.dispatcher.reorder(order).await;
        self.surface(result).await
    }

    async fn surface(&self, result: Result<(), CommandError>) -> Result<(), CommandError> {
        if let Err(err) = &result {
            self.store.lock().await.surface_error(err.user_message());
        }
        result
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
