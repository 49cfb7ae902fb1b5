use std::collections::{HashMap, HashSet};

use shared::{
    domain::{AlertSeverity, Direction, StationUuid},
    protocol::{Alert, Arrival, StationArrivals},
};

pub const CARD_ARRIVAL_LIMIT: usize = 6;
pub const MAIN_CARD_ARRIVAL_LIMIT: usize = 9;
pub const BOARD_LIMIT: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection<'a> {
    pub main: Option<&'a StationArrivals>,
    pub others: Vec<&'a StationArrivals>,
}

impl<'a> Projection<'a> {
    pub fn ordered(&self) -> impl Iterator<Item = &'a StationArrivals> + '_ {
        self.main.into_iter().chain(self.others.iter().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_none() && self.others.is_empty()
    }
}

pub fn project<'a>(
    stations: &'a [StationArrivals],
    order_override: Option<&[StationUuid]>,
    filter: Direction,
) -> Projection<'a> {
    let mut main = None;
    let mut others = Vec::new();

    for station in stations.iter().filter(|s| filter.admits(s.direction)) {
        if station.is_main && main.is_none() {
            main = Some(station);
        } else {
            others.push(station);
        }
    }

    if let Some(order) = order_override {
        others = apply_order(others, order);
    }

    Projection { main, others }
}

/// Arranges `stations` by `order`. Ids in `order` that no longer exist are
/// skipped; stations missing from `order` follow in their original order.
fn apply_order<'a>(
    stations: Vec<&'a StationArrivals>,
    order: &[StationUuid],
) -> Vec<&'a StationArrivals> {
    let mut by_id: HashMap<&'a StationUuid, &'a StationArrivals> =
        stations.iter().copied().map(|s| (&s.uuid, s)).collect();

    let mut arranged = Vec::with_capacity(stations.len());
    for id in order {
        if let Some(station) = by_id.remove(id) {
            arranged.push(station);
        }
    }
    arranged.extend(
        stations
            .into_iter()
            .filter(|station| by_id.contains_key(&station.uuid)),
    );
    arranged
}

/// Same rule as the display order override, applied to bare ids.
pub fn arrange_ids(ids: Vec<StationUuid>, order: &[StationUuid]) -> Vec<StationUuid> {
    let mut remaining: HashSet<StationUuid> = ids.iter().cloned().collect();
    let mut arranged = Vec::with_capacity(ids.len());
    for id in order {
        if remaining.remove(id) {
            arranged.push(id.clone());
        }
    }
    arranged.extend(ids.into_iter().filter(|id| remaining.contains(id)));
    arranged
}

pub fn top_arrivals(station: &StationArrivals, limit: usize) -> &[Arrival] {
    let end = station.arrivals.len().min(limit);
    &station.arrivals[..end]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardEntry {
    pub rank: usize,
    pub line: String,
    pub minutes: u32,
    pub destination: Option<String>,
    pub direction: Direction,
    pub station_name: String,
}

/// Every arrival across all stations, soonest first, for the single-line
/// board. Per-arrival directions decide the filter for `all` stations.
pub fn departure_board(
    stations: &[StationArrivals],
    filter: Direction,
    limit: usize,
) -> Vec<BoardEntry> {
    let mut entries: Vec<BoardEntry> = stations
        .iter()
        .flat_map(|station| {
            station.arrivals.iter().map(move |arrival| BoardEntry {
                rank: 0,
                line: arrival.line.clone(),
                minutes: arrival.time,
                destination: arrival.destination.clone(),
                direction: arrival.effective_direction(station.direction),
                station_name: station.name.clone(),
            })
        })
        .filter(|entry| filter.admits(entry.direction))
        .collect();

    entries.sort_by_key(|entry| entry.minutes);
    entries.truncate(limit);
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.rank = index + 1;
    }
    entries
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AlertSummary {
    pub major: usize,
    pub minor: usize,
    pub info: usize,
}

impl AlertSummary {
    pub fn total(&self) -> usize {
        self.major + self.minor + self.info
    }
}

pub fn summarize_alerts(alerts: &[Alert]) -> AlertSummary {
    alerts
        .iter()
        .fold(AlertSummary::default(), |mut summary, alert| {
            match alert.severity {
                AlertSeverity::Major => summary.major += 1,
                AlertSeverity::Minor => summary.minor += 1,
                AlertSeverity::Info | AlertSeverity::Unknown => summary.info += 1,
            }
            summary
        })
}

/// Alerts touching any of `lines`, most severe first.
pub fn alerts_for_lines<'a>(alerts: &'a [Alert], lines: &HashSet<String>) -> Vec<&'a Alert> {
    let mut matching: Vec<&Alert> = alerts
        .iter()
        .filter(|alert| alert.routes.iter().any(|route| lines.contains(route)))
        .collect();
    matching.sort_by_key(|alert| alert.severity.rank());
    matching
}

pub fn lines_served<'a>(stations: impl IntoIterator<Item = &'a StationArrivals>) -> HashSet<String> {
    stations
        .into_iter()
        .flat_map(|station| station.arrivals.iter().map(|a| a.line.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::AlertId;

    fn arrival(line: &str, time: u32, dir: Option<Direction>) -> Arrival {
        Arrival {
            line: line.into(),
            time,
            destination: None,
            dir,
        }
    }

    fn station(uuid: &str, direction: Direction, is_main: bool) -> StationArrivals {
        StationArrivals {
            uuid: StationUuid::from(uuid),
            id: None,
            name: format!("Station {uuid}"),
            direction,
            is_main,
            arrivals: Vec::new(),
        }
    }

    fn ids<'a>(stations: &[&'a StationArrivals]) -> Vec<&'a str> {
        stations.iter().map(|s| s.uuid.as_str()).collect()
    }

    fn order(ids: &[&str]) -> Vec<StationUuid> {
        ids.iter().map(|id| StationUuid::from(*id)).collect()
    }

    #[test]
    fn splits_main_station_from_others() {
        let stations = vec![
            station("a", Direction::North, false),
            station("m", Direction::South, true),
            station("b", Direction::North, false),
        ];
        let view = project(&stations, None, Direction::All);

        assert_eq!(view.main.map(|s| s.uuid.as_str()), Some("m"));
        assert_eq!(ids(&view.others), ["a", "b"]);
        let ordered: Vec<_> = view.ordered().map(|s| s.uuid.as_str()).collect();
        assert_eq!(ordered, ["m", "a", "b"]);
    }

    #[test]
    fn direction_filter_keeps_only_matching_stations() {
        let stations = vec![
            station("n", Direction::North, false),
            station("s", Direction::South, true),
            station("both", Direction::All, false),
        ];

        let north = project(&stations, None, Direction::North);
        assert!(north.main.is_none());
        assert_eq!(ids(&north.others), ["n"]);

        let south = project(&stations, None, Direction::South);
        assert_eq!(south.main.map(|s| s.uuid.as_str()), Some("s"));
        assert!(south.others.is_empty());

        let all = project(&stations, None, Direction::All);
        assert_eq!(all.ordered().count(), stations.len());
    }

    #[test]
    fn filtered_views_only_hold_the_filtered_direction() {
        let stations = vec![
            station("a", Direction::North, false),
            station("b", Direction::South, false),
            station("c", Direction::All, true),
            station("d", Direction::North, false),
            station("e", Direction::South, false),
        ];
        for filter in [Direction::North, Direction::South] {
            let view = project(&stations, None, filter);
            assert!(view.ordered().all(|s| s.direction == filter));
        }
    }

    #[test]
    fn order_override_rearranges_other_stations() {
        let stations = vec![
            station("a", Direction::North, false),
            station("b", Direction::North, false),
            station("c", Direction::North, false),
        ];
        let drag = order(&["c", "a", "b"]);
        let view = project(&stations, Some(&drag), Direction::All);
        assert_eq!(ids(&view.others), ["c", "a", "b"]);
    }

    #[test]
    fn order_override_skips_vanished_ids_and_appends_unknown_ones() {
        let stations = vec![
            station("a", Direction::North, false),
            station("b", Direction::North, false),
            station("new", Direction::North, false),
            station("c", Direction::North, false),
        ];
        let drag = order(&["c", "gone", "b", "a"]);
        let view = project(&stations, Some(&drag), Direction::All);
        assert_eq!(ids(&view.others), ["c", "b", "a", "new"]);
    }

    #[test]
    fn order_override_respects_filter() {
        let stations = vec![
            station("a", Direction::North, false),
            station("b", Direction::South, false),
            station("c", Direction::North, false),
        ];
        let drag = order(&["c", "b", "a"]);
        let view = project(&stations, Some(&drag), Direction::North);
        assert_eq!(ids(&view.others), ["c", "a"]);
    }

    #[test]
    fn arrange_ids_matches_station_ordering() {
        let arranged = arrange_ids(order(&["a", "b", "new", "c"]), &order(&["m", "c", "gone", "a"]));
        assert_eq!(arranged, order(&["c", "a", "b", "new"]));
    }

    #[test]
    fn top_arrivals_is_a_bounded_slice() {
        let mut s = station("a", Direction::North, false);
        s.arrivals = (0..10).map(|t| arrival("1", t, None)).collect();
        assert_eq!(top_arrivals(&s, CARD_ARRIVAL_LIMIT).len(), 6);
        assert_eq!(top_arrivals(&s, MAIN_CARD_ARRIVAL_LIMIT).len(), 9);
        assert_eq!(s.arrivals.len(), 10);

        s.arrivals.truncate(2);
        assert_eq!(top_arrivals(&s, CARD_ARRIVAL_LIMIT).len(), 2);
    }

    #[test]
    fn departure_board_ranks_soonest_trains_across_stations() {
        let mut uptown = station("a", Direction::North, false);
        uptown.arrivals = vec![arrival("1", 3, None), arrival("2", 8, None)];
        let mut both = station("b", Direction::All, false);
        both.arrivals = vec![
            arrival("Q", 1, Some(Direction::South)),
            arrival("N", 5, Some(Direction::North)),
        ];
        let stations = vec![uptown, both];

        let board = departure_board(&stations, Direction::All, BOARD_LIMIT);
        let lines: Vec<_> = board.iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, ["Q", "1", "N", "2"]);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[3].rank, 4);

        let north = departure_board(&stations, Direction::North, 2);
        let lines: Vec<_> = north.iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, ["1", "N"]);
        assert_eq!(north[1].station_name, "Station b");
    }

    #[test]
    fn alert_helpers_count_and_match_routes() {
        let alert = |id: &str, severity, routes: &[&str]| Alert {
            id: AlertId::from(id),
            severity,
            routes: routes.iter().map(|r| r.to_string()).collect(),
            header: format!("alert {id}"),
            description: None,
        };
        let alerts = vec![
            alert("1", AlertSeverity::Info, &["1"]),
            alert("2", AlertSeverity::Major, &["1", "2"]),
            alert("3", AlertSeverity::Unknown, &["L"]),
            alert("4", AlertSeverity::Minor, &["Q"]),
        ];

        let summary = summarize_alerts(&alerts);
        assert_eq!((summary.major, summary.minor, summary.info), (1, 1, 2));
        assert_eq!(summary.total(), 4);

        let lines: HashSet<String> = ["1".to_string(), "Q".to_string()].into();
        let matching: Vec<_> = alerts_for_lines(&alerts, &lines)
            .into_iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(matching, ["2", "4", "1"]);
    }
}
