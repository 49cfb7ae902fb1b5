use std::fmt;

use reqwest::{Method, StatusCode};
use shared::domain::StationUuid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid server url '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("server url '{0}' cannot carry path segments")]
    OpaqueBaseUrl(String),
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("{method} {path} failed: {source}")]
    Request {
        method: Method,
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {path} returned {status}: {message}")]
    Status {
        method: Method,
        path: String,
        status: StatusCode,
        message: String,
    },
    #[error("{method} {path} returned an unreadable body: {source}")]
    Decode {
        method: Method,
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(StatusCode::CONFLICT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    AddStation,
    RemoveStation,
    SetMain,
    UnsetMain,
    SetDirection,
    Reorder,
    Search,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CommandKind::AddStation => "add station",
            CommandKind::RemoveStation => "remove station",
            CommandKind::SetMain => "set main station",
            CommandKind::UnsetMain => "unset main station",
            CommandKind::SetDirection => "update direction",
            CommandKind::Reorder => "reorder stations",
            CommandKind::Search => "search stations",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Station already added")]
    AlreadyAdded { station_id: String },
    #[error("failed to {kind}: {source}")]
    Failed {
        kind: CommandKind,
        #[source]
        source: TransportError,
    },
}

impl CommandError {
    pub fn failed(kind: CommandKind, source: TransportError) -> Self {
        CommandError::Failed { kind, source }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            CommandError::AlreadyAdded { .. } => CommandKind::AddStation,
            CommandError::Failed { kind, .. } => *kind,
        }
    }

    /// Short text for a banner or dialog. Transport details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::AlreadyAdded { .. } => "Station already added".to_string(),
            CommandError::Failed { kind, .. } => format!("Failed to {kind}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DragError {
    #[error("a drag gesture for {0} is already in progress")]
    AlreadyDragging(StationUuid),
    #[error("station {0} cannot be reordered")]
    NotReorderable(StationUuid),
}
