use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use client_core::{
    config::normalize_server_url,
    load_settings,
    projector::{top_arrivals, CARD_ARRIVAL_LIMIT, MAIN_CARD_ARRIVAL_LIMIT},
    ClientEvent, CommandError, Dashboard, DashboardSettings, DashboardView,
};
use shared::{
    domain::{Direction, StationUuid},
    protocol::{minutes_label, AddStationRequest, StationArrivals},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "transit-dashboard", about = "Live subway arrivals for your stations")]
struct Args {
    /// Backend url, overriding dashboard.toml and the environment.
    #[arg(long, global = true)]
    server_url: Option<String>,
    /// Only show stations for one direction (N, S or all).
    #[arg(long, global = true, default_value = "all")]
    filter: Direction,
    /// Print JSON where the output has a wire form.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch once and print every station.
    Show,
    /// Keep polling and reprint on every update until interrupted.
    Watch {
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Soonest trains across all stations.
    Board {
        #[arg(long)]
        limit: Option<usize>,
    },
    Alerts,
    Search {
        query: String,
    },
    Add {
        /// Stop id from `search`.
        id: String,
        name: String,
        #[arg(long, default_value = "N")]
        direction: Direction,
    },
    Remove {
        uuid: String,
    },
    Main {
        uuid: String,
    },
    /// Unpin the main station; without a uuid the current one is found.
    UnsetMain {
        uuid: Option<String>,
    },
    Direction {
        uuid: String,
        direction: Direction,
    },
    /// Full station order, main station first.
    Reorder {
        #[arg(required = true, num_args = 1..)]
        order: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings()?;
    if let Some(url) = &args.server_url {
        settings.server_url = normalize_server_url(url)?;
    }
    if let Command::Watch {
        interval_secs: Some(secs),
    } = &args.command
    {
        settings.poll_interval_secs = *secs;
    }
    info!(server_url = %settings.server_url, "dashboard: using backend");

    let dashboard = Dashboard::connect(&settings).context("failed to set up backend client")?;
    dashboard.set_direction_filter(args.filter).await;

    run(&dashboard, &settings, args.command, args.json).await
}

async fn run(
    dashboard: &Arc<Dashboard>,
    settings: &DashboardSettings,
    command: Command,
    json: bool,
) -> Result<()> {
    match command {
        Command::Show => {
            dashboard.refresh().await;
            let view = dashboard.view().await;
            if json {
                let stations: Vec<&StationArrivals> = view.ordered().collect();
                println!("{}", serde_json::to_string_pretty(&stations)?);
            } else {
                print_view(&view);
            }
        }
        Command::Watch { .. } => watch(dashboard).await,
        Command::Board { limit } => {
            dashboard.refresh().await;
            let board = dashboard
                .departure_board(limit.unwrap_or(settings.board_limit))
                .await;
            if board.is_empty() {
                println!("No upcoming trains");
            }
            for entry in board {
                println!(
                    "{:>2}. {:<3} {:>7}  {:<28} {}",
                    entry.rank,
                    entry.line,
                    minutes_label(entry.minutes),
                    entry.destination.as_deref().unwrap_or("-"),
                    entry.station_name,
                );
            }
        }
        Command::Alerts => {
            dashboard.refresh().await;
            let alerts = dashboard.alerts().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&alerts)?);
                return Ok(());
            }
            let summary = dashboard.alert_summary().await;
            println!(
                "{} alerts ({} major, {} minor, {} info)",
                summary.total(),
                summary.major,
                summary.minor,
                summary.info
            );
            for alert in alerts {
                println!("[{:?}] {}: {}", alert.severity, alert.routes.join(","), alert.header);
                if let Some(description) = alert.description {
                    println!("    {description}");
                }
            }
        }
        Command::Search { query } => {
            let hits = dashboard.search_available(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                for hit in hits {
                    println!("{:<6} {:<32} {}", hit.id, hit.name, hit.lines.join(" "));
                }
            }
        }
        Command::Add {
            id,
            name,
            direction,
        } => {
            let request = AddStationRequest {
                id,
                direction,
                name,
            };
            match dashboard.add_station(request).await {
                Ok(()) => println!("Station added"),
                Err(err @ CommandError::AlreadyAdded { .. }) => println!("{}", err.user_message()),
                Err(err) => return Err(err.into()),
            }
        }
        Command::Remove { uuid } => {
            dashboard.refresh().await;
            dashboard.remove_station(&StationUuid::new(uuid)).await?;
            print_view(&dashboard.view().await);
        }
        Command::Main { uuid } => {
            dashboard.set_main(&StationUuid::new(uuid)).await?;
            print_view(&dashboard.view().await);
        }
        Command::UnsetMain { uuid } => {
            dashboard.refresh().await;
            dashboard.unset_main(uuid.map(StationUuid::new)).await?;
            print_view(&dashboard.view().await);
        }
        Command::Direction { uuid, direction } => {
            dashboard
                .set_station_direction(&StationUuid::new(uuid), direction)
                .await?;
            print_view(&dashboard.view().await);
        }
        Command::Reorder { order } => {
            dashboard
                .reorder(order.into_iter().map(StationUuid::new).collect())
                .await?;
            print_view(&dashboard.view().await);
        }
    }
    Ok(())
}

async fn watch(dashboard: &Arc<Dashboard>) {
    let mut events = dashboard.subscribe_events();
    dashboard.start().await;
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => break,
            event = events.recv() => match event {
                Ok(ClientEvent::ArrivalsUpdated { .. }) | Ok(ClientEvent::FetchFailed { .. }) => {
                    print!("\x1b[2J\x1b[H");
                    print_view(&dashboard.view().await);
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "dashboard: event consumer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    dashboard.shutdown().await;
}

fn print_view(view: &DashboardView) {
    if let Some(error) = &view.error {
        println!("! {error}");
    }
    if view.loading {
        println!("Loading…");
        return;
    }
    if view.is_empty() {
        println!("No stations configured. Use `transit-dashboard search` and `add`.");
        return;
    }

    if let Some(main) = &view.main {
        print_station(main, MAIN_CARD_ARRIVAL_LIMIT, true);
    }
    for station in &view.others {
        print_station(station, CARD_ARRIVAL_LIMIT, false);
    }
    if let Some(updated_at) = view.updated_at {
        println!(
            "Updated {} · {}",
            updated_at.with_timezone(&Local).format("%H:%M:%S"),
            view.filter.label()
        );
    }
}

fn print_station(station: &StationArrivals, limit: usize, pinned: bool) {
    let marker = if pinned { "★" } else { " " };
    println!(
        "{marker} {} ({}) [{}]",
        station.name,
        station.direction.label(),
        station.uuid
    );
    let arrivals = top_arrivals(station, limit);
    if arrivals.is_empty() {
        println!("    No upcoming trains");
    }
    for arrival in arrivals {
        let direction = arrival.effective_direction(station.direction);
        println!(
            "    {:<3} {:>7}  {} {}",
            arrival.line,
            arrival.minutes_label(),
            arrival.destination.as_deref().unwrap_or("-"),
            if station.direction == Direction::All {
                direction.code()
            } else {
                ""
            }
        );
    }
}
