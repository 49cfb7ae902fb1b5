use std::sync::Arc;

use shared::{
    domain::{Direction, StationUuid},
    protocol::{AddStationRequest, AvailableStation},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::{CommandError, CommandKind, TransportError},
    poller::Poller,
    store::{EntityStore, Resource},
    transport::DashboardApi,
    ClientEvent,
};

#[derive(Clone)]
pub struct CommandDispatcher {
    api: Arc<dyn DashboardApi>,
    store: Arc<Mutex<EntityStore>>,
    poller: Poller,
    events: broadcast::Sender<ClientEvent>,
}

impl CommandDispatcher {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        store: Arc<Mutex<EntityStore>>,
        poller: Poller,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            api,
            store,
            poller,
            events,
        }
    }

    pub async fn search_available(
        &self,
        query: &str,
    ) -> Result<Vec<AvailableStation>, CommandError> {
        self.api
            .search_available(query)
            .await
            .map_err(|source| self.failed(CommandKind::Search, source))
    }

    /// A 409 from the backend means the station is already configured and is
    /// reported as [`CommandError::AlreadyAdded`].
    pub async fn add_station(&self, request: AddStationRequest) -> Result<(), CommandError> {
        match self.api.add_station(&request).await {
            Ok(()) => {}
            Err(err) if err.is_conflict() => {
                info!(station_id = %request.id, "dispatcher: station already configured");
                let err = CommandError::AlreadyAdded {
                    station_id: request.id,
                };
                self.notify_failure(&err);
                return Err(err);
            }
            Err(source) => return Err(self.failed(CommandKind::AddStation, source)),
        }

        info!(station_id = %request.id, direction = %request.direction, "dispatcher: station added");
        self.refresh_all().await;
        Ok(())
    }

    pub async fn remove_station(&self, uuid: &StationUuid) -> Result<(), CommandError> {
        self.api
            .remove_station(uuid)
            .await
            .map_err(|source| self.failed(CommandKind::RemoveStation, source))?;

        info!(station = %uuid, "dispatcher: station removed");
        if self.store.lock().await.remove_station_locally(uuid) {
            let _ = self.events.send(ClientEvent::StationRemoved(uuid.clone()));
        }
        self.poller.refresh_resource(Resource::Stations).await;
        Ok(())
    }

    pub async fn set_main(&self, uuid: &StationUuid) -> Result<(), CommandError> {
        self.api
            .set_main(uuid)
            .await
            .map_err(|source| self.failed(CommandKind::SetMain, source))?;

        info!(station = %uuid, "dispatcher: main station set");
        self.refresh_all().await;
        Ok(())
    }

    /// Unpins `target`, or whichever station is main right now when no target
    /// is given. Nothing to unpin is not an error.
    pub async fn unset_main(&self, target: Option<StationUuid>) -> Result<(), CommandError> {
        let target = match target {
            Some(uuid) => Some(uuid),
            None => self.store.lock().await.main_station_id().cloned(),
        };
        let Some(uuid) = target else {
            debug!("dispatcher: no main station to unset");
            return Ok(());
        };

        self.api
            .unset_main(&uuid)
            .await
            .map_err(|source| self.failed(CommandKind::UnsetMain, source))?;

        info!(station = %uuid, "dispatcher: main station unset");
        self.refresh_all().await;
        Ok(())
    }

    pub async fn set_direction(
        &self,
        uuid: &StationUuid,
        direction: Direction,
    ) -> Result<(), CommandError> {
        self.api
            .set_direction(uuid, direction)
            .await
            .map_err(|source| self.failed(CommandKind::SetDirection, source))?;

        info!(station = %uuid, %direction, "dispatcher: direction updated");
        self.refresh_all().await;
        Ok(())
    }

    pub async fn reorder(&self, order: Vec<StationUuid>) -> Result<(), CommandError> {
        self.api
            .reorder(&order)
            .await
            .map_err(|source| self.failed(CommandKind::Reorder, source))?;

        info!(count = order.len(), "dispatcher: stations reordered");
        let _ = self.events.send(ClientEvent::ReorderCommitted { order });
        self.refresh_all().await;
        Ok(())
    }

    async fn refresh_all(&self) {
        tokio::join!(
            self.poller.refresh_resource(Resource::Stations),
            self.poller.refresh_resource(Resource::Arrivals),
        );
    }

    fn failed(&self, kind: CommandKind, source: TransportError) -> CommandError {
        warn!(command = %kind, error = %source, "dispatcher: command failed");
        let err = CommandError::failed(kind, source);
        self.notify_failure(&err);
        err
    }

    fn notify_failure(&self, err: &CommandError) {
        let _ = self.events.send(ClientEvent::CommandFailed {
            kind: err.kind(),
            message: err.user_message(),
        });
    }
}
