//! Responses are applied in issue order per resource; anything older than
//! the last applied ticket is discarded.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use shared::{
    domain::StationUuid,
    protocol::{Alert, StationArrivals, StationConfig},
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Stations,
    Arrivals,
    Alerts,
}

impl Resource {
    /// Auxiliary resources never raise the user-visible banner.
    pub fn is_auxiliary(self) -> bool {
        matches!(self, Resource::Alerts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    resource: Resource,
    seq: u64,
}

impl FetchTicket {
    pub fn resource(&self) -> Resource {
        self.resource
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Failed,
    Stale,
}

#[derive(Debug, Default, Clone, Copy)]
struct SequenceClock {
    issued: u64,
    applied: u64,
}

#[derive(Debug)]
pub struct EntityStore {
    stations: Vec<StationConfig>,
    arrivals: Vec<StationArrivals>,
    alerts: Vec<Alert>,
    error: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    loading: bool,
    arrivals_revision: u64,
    clocks: HashMap<Resource, SequenceClock>,
    closed: bool,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self {
            stations: Vec::new(),
            arrivals: Vec::new(),
            alerts: Vec::new(),
            error: None,
            updated_at: None,
            loading: true,
            arrivals_revision: 0,
            clocks: HashMap::new(),
            closed: false,
        }
    }
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stations(&self) -> &[StationConfig] {
        &self.stations
    }

    pub fn arrivals(&self) -> &[StationArrivals] {
        &self.arrivals
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn arrivals_revision(&self) -> u64 {
        self.arrivals_revision
    }

    pub fn issue(&mut self, resource: Resource) -> FetchTicket {
        let clock = self.clocks.entry(resource).or_default();
        clock.issued += 1;
        FetchTicket {
            resource,
            seq: clock.issued,
        }
    }

    fn accept(&mut self, ticket: FetchTicket) -> bool {
        if self.closed {
            debug!(resource = ?ticket.resource, "store: closed, dropping response");
            return false;
        }
        let clock = self.clocks.entry(ticket.resource).or_default();
        if ticket.seq <= clock.applied {
            debug!(
                resource = ?ticket.resource,
                seq = ticket.seq,
                applied = clock.applied,
                "store: discarding out-of-order response"
            );
            return false;
        }
        clock.applied = ticket.seq;
        true
    }

    fn invalidate(&mut self, resource: Resource) {
        let clock = self.clocks.entry(resource).or_default();
        clock.applied = clock.issued;
    }

    pub fn apply_stations(
        &mut self,
        ticket: FetchTicket,
        stations: Vec<StationConfig>,
    ) -> ApplyOutcome {
        if !self.accept(ticket) {
            return ApplyOutcome::Stale;
        }
        self.stations = reconcile_identity(stations, "stations");
        ApplyOutcome::Applied
    }

    pub fn apply_arrivals(
        &mut self,
        ticket: FetchTicket,
        arrivals: Vec<StationArrivals>,
        fetched_at: DateTime<Utc>,
    ) -> ApplyOutcome {
        if !self.accept(ticket) {
            return ApplyOutcome::Stale;
        }
        self.arrivals = reconcile_identity(arrivals, "arrivals");
        self.arrivals_revision += 1;
        self.updated_at = Some(fetched_at);
        self.error = None;
        self.loading = false;
        ApplyOutcome::Applied
    }

    pub fn apply_alerts(&mut self, ticket: FetchTicket, alerts: Vec<Alert>) -> ApplyOutcome {
        if !self.accept(ticket) {
            return ApplyOutcome::Stale;
        }
        self.alerts = alerts;
        ApplyOutcome::Applied
    }

    pub fn apply_failure(&mut self, ticket: FetchTicket, message: &str) -> ApplyOutcome {
        if !self.accept(ticket) {
            return ApplyOutcome::Stale;
        }
        if ticket.resource == Resource::Arrivals {
            self.loading = false;
        }
        if !ticket.resource.is_auxiliary() {
            self.error = Some(message.to_string());
        }
        ApplyOutcome::Failed
    }

    pub fn surface_error(&mut self, message: impl Into<String>) {
        if !self.closed {
            self.error = Some(message.into());
        }
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Drops a deleted station from the arrivals list ahead of the next poll.
    /// Arrivals fetches already in flight predate the deletion and are
    /// discarded when they land.
    pub fn remove_station_locally(&mut self, uuid: &StationUuid) -> bool {
        let before = self.arrivals.len();
        self.arrivals.retain(|station| &station.uuid != uuid);
        self.invalidate(Resource::Arrivals);
        self.arrivals.len() != before
    }

    pub fn main_station_id(&self) -> Option<&StationUuid> {
        self.arrivals
            .iter()
            .find(|station| station.is_main)
            .map(|station| &station.uuid)
            .or_else(|| {
                self.stations
                    .iter()
                    .find(|station| station.is_main)
                    .map(|station| &station.uuid)
            })
    }

    /// Non-main station ids in store order, unfiltered.
    pub fn reorderable_ids(&self) -> Vec<StationUuid> {
        self.arrivals
            .iter()
            .filter(|station| !station.is_main)
            .map(|station| station.uuid.clone())
            .collect()
    }

    pub fn close(&mut self) {
        self.closed = true;
    }
}

trait StationRecord {
    fn uuid(&self) -> &StationUuid;
    fn is_main(&self) -> bool;
    fn demote(&mut self);
}

impl StationRecord for StationConfig {
    fn uuid(&self) -> &StationUuid {
        &self.uuid
    }

    fn is_main(&self) -> bool {
        self.is_main
    }

    fn demote(&mut self) {
        self.is_main = false;
    }
}

impl StationRecord for StationArrivals {
    fn uuid(&self) -> &StationUuid {
        &self.uuid
    }

    fn is_main(&self) -> bool {
        self.is_main
    }

    fn demote(&mut self) {
        self.is_main = false;
    }
}

/// Unique uuids, at most one main station. First occurrence wins.
fn reconcile_identity<T: StationRecord>(records: Vec<T>, listing: &'static str) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut main_seen = false;
    let mut kept = Vec::with_capacity(records.len());

    for mut record in records {
        if !seen.insert(record.uuid().clone()) {
            warn!(listing = listing, station = %record.uuid(), "store: dropping duplicate station uuid");
            continue;
        }
        if record.is_main() {
            if main_seen {
                warn!(listing = listing, station = %record.uuid(), "store: demoting extra main station");
                record.demote();
            }
            main_seen = true;
        }
        kept.push(record);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::Direction;

    fn station(uuid: &str, is_main: bool) -> StationArrivals {
        StationArrivals {
            uuid: StationUuid::from(uuid),
            id: None,
            name: uuid.to_uppercase(),
            direction: Direction::North,
            is_main,
            arrivals: Vec::new(),
        }
    }

    #[test]
    fn applies_responses_in_issue_order_only() {
        let mut store = EntityStore::new();
        let older = store.issue(Resource::Arrivals);
        let newer = store.issue(Resource::Arrivals);

        assert_eq!(
            store.apply_arrivals(newer, vec![station("b", false)], Utc::now()),
            ApplyOutcome::Applied
        );
        assert_eq!(
            store.apply_arrivals(older, vec![station("a", false)], Utc::now()),
            ApplyOutcome::Stale
        );
        assert_eq!(store.arrivals()[0].uuid.as_str(), "b");
        assert_eq!(store.arrivals_revision(), 1);
    }

    #[test]
    fn tickets_are_tracked_per_resource() {
        let mut store = EntityStore::new();
        let alerts = store.issue(Resource::Alerts);
        let arrivals = store.issue(Resource::Arrivals);
        assert_eq!(
            store.apply_arrivals(arrivals, Vec::new(), Utc::now()),
            ApplyOutcome::Applied
        );
        assert_eq!(store.apply_alerts(alerts, Vec::new()), ApplyOutcome::Applied);
    }

    #[test]
    fn arrivals_failure_keeps_previous_data_and_sets_banner() {
        let mut store = EntityStore::new();
        let ok = store.issue(Resource::Arrivals);
        store.apply_arrivals(ok, vec![station("a", false)], Utc::now());

        let failed = store.issue(Resource::Arrivals);
        assert_eq!(
            store.apply_failure(failed, "Failed to fetch arrivals"),
            ApplyOutcome::Failed
        );
        assert_eq!(store.error(), Some("Failed to fetch arrivals"));
        assert_eq!(store.arrivals().len(), 1);

        let recovered = store.issue(Resource::Arrivals);
        store.apply_arrivals(recovered, vec![station("a", false)], Utc::now());
        assert_eq!(store.error(), None);
    }

    #[test]
    fn alert_failures_stay_out_of_the_banner() {
        let mut store = EntityStore::new();
        let ticket = store.issue(Resource::Alerts);
        assert_eq!(store.apply_failure(ticket, "alerts down"), ApplyOutcome::Failed);
        assert_eq!(store.error(), None);
        assert!(store.is_loading());
    }

    #[test]
    fn repairs_duplicate_uuids_and_extra_main_flags() {
        let mut store = EntityStore::new();
        let ticket = store.issue(Resource::Arrivals);
        store.apply_arrivals(
            ticket,
            vec![
                station("a", true),
                station("b", true),
                station("a", false),
                station("c", false),
            ],
            Utc::now(),
        );

        let ids: Vec<_> = store.arrivals().iter().map(|s| s.uuid.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(store.arrivals().iter().filter(|s| s.is_main).count(), 1);
        assert_eq!(store.main_station_id().map(|id| id.as_str()), Some("a"));
    }

    #[test]
    fn local_removal_discards_in_flight_arrivals() {
        let mut store = EntityStore::new();
        let first = store.issue(Resource::Arrivals);
        store.apply_arrivals(first, vec![station("a", false), station("b", false)], Utc::now());

        let in_flight = store.issue(Resource::Arrivals);
        assert!(store.remove_station_locally(&StationUuid::from("a")));
        assert_eq!(
            store.apply_arrivals(
                in_flight,
                vec![station("a", false), station("b", false)],
                Utc::now()
            ),
            ApplyOutcome::Stale
        );
        assert_eq!(store.arrivals().len(), 1);

        let next = store.issue(Resource::Arrivals);
        assert_eq!(
            store.apply_arrivals(next, vec![station("b", false)], Utc::now()),
            ApplyOutcome::Applied
        );
    }

    #[test]
    fn closed_store_ignores_late_responses() {
        let mut store = EntityStore::new();
        let ticket = store.issue(Resource::Stations);
        store.close();
        assert_eq!(store.apply_stations(ticket, Vec::new()), ApplyOutcome::Stale);
        store.surface_error("late");
        assert_eq!(store.error(), None);
    }

    #[test]
    fn reorderable_ids_skip_main_station() {
        let mut store = EntityStore::new();
        let ticket = store.issue(Resource::Arrivals);
        store.apply_arrivals(
            ticket,
            vec![station("a", false), station("m", true), station("b", false)],
            Utc::now(),
        );
        let ids: Vec<_> = store.reorderable_ids().into_iter().map(|id| id.0).collect();
        assert_eq!(ids, ["a", "b"]);
    }
}
