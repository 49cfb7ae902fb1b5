use std::{fs, path::Path, time::Duration};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use tracing::warn;

pub const SETTINGS_FILE: &str = "dashboard.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardSettings {
    pub server_url: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub board_limit: usize,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5001".into(),
            poll_interval_secs: 10,
            request_timeout_secs: 10,
            board_limit: 7,
        }
    }
}

impl DashboardSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    poll_interval_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    board_limit: Option<usize>,
}

/// Defaults, then `dashboard.toml` in the working directory, then the
/// environment.
pub fn load_settings() -> anyhow::Result<DashboardSettings> {
    let mut settings = DashboardSettings::default();
    overlay_file(&mut settings, Path::new(SETTINGS_FILE))?;
    overlay_env(&mut settings, |key| std::env::var(key).ok());
    settings.server_url = normalize_server_url(&settings.server_url)?;
    Ok(settings)
}

fn overlay_file(settings: &mut DashboardSettings, path: &Path) -> anyhow::Result<()> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };
    let file_cfg: FileSettings =
        toml::from_str(&raw).with_context(|| format!("invalid settings in '{}'", path.display()))?;

    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.poll_interval_secs {
        settings.poll_interval_secs = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.board_limit {
        settings.board_limit = v;
    }
    Ok(())
}

fn overlay_env(settings: &mut DashboardSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("DASHBOARD_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }

    for (key, slot) in [
        ("APP__POLL_INTERVAL_SECS", &mut settings.poll_interval_secs),
        ("APP__REQUEST_TIMEOUT_SECS", &mut settings.request_timeout_secs),
    ] {
        if let Some(v) = var(key) {
            match v.parse::<u64>() {
                Ok(parsed) => *slot = parsed,
                Err(_) => warn!(key = key, value = %v, "config: ignoring non-numeric override"),
            }
        }
    }

    if let Some(v) = var("APP__BOARD_LIMIT") {
        match v.parse::<usize>() {
            Ok(parsed) => settings.board_limit = parsed,
            Err(_) => warn!(key = "APP__BOARD_LIMIT", value = %v, "config: ignoring non-numeric override"),
        }
    }
}

pub fn normalize_server_url(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(DashboardSettings::default().server_url);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(anyhow!(
            "server url must start with http:// or https:// (got '{trimmed}')"
        ));
    }
    Ok(trimmed.to_string())
}
