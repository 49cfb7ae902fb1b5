use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Direction, StationUuid},
    error::ApiError,
    protocol::{
        AddStationRequest, Alert, AvailableStation, ReorderRequest, SetDirectionRequest,
        StationArrivals, StationConfig,
    },
};
use tracing::debug;
use url::Url;

use crate::error::TransportError;

/// Searches shorter than this are answered locally with no results.
pub const MIN_SEARCH_QUERY_LEN: usize = 2;

#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn list_stations(&self) -> Result<Vec<StationConfig>, TransportError>;
    async fn list_arrivals(&self) -> Result<Vec<StationArrivals>, TransportError>;
    async fn list_alerts(&self) -> Result<Vec<Alert>, TransportError>;
    async fn search_available(&self, query: &str)
        -> Result<Vec<AvailableStation>, TransportError>;
    async fn add_station(&self, request: &AddStationRequest) -> Result<(), TransportError>;
    async fn remove_station(&self, uuid: &StationUuid) -> Result<(), TransportError>;
    async fn set_main(&self, uuid: &StationUuid) -> Result<(), TransportError>;
    async fn unset_main(&self, uuid: &StationUuid) -> Result<(), TransportError>;
    async fn set_direction(
        &self,
        uuid: &StationUuid,
        direction: Direction,
    ) -> Result<(), TransportError>;
    async fn reorder(&self, order: &[StationUuid]) -> Result<(), TransportError>;
}

pub struct HttpDashboardApi {
    http: Client,
    base: Url,
}

impl HttpDashboardApi {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let base = Url::parse(server_url).map_err(|source| TransportError::InvalidBaseUrl {
            url: server_url.to_string(),
            source,
        })?;
        if base.cannot_be_a_base() {
            return Err(TransportError::OpaqueBaseUrl(server_url.to_string()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::OpaqueBaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn station_endpoint(&self, uuid: &StationUuid, tail: &[&str]) -> Result<Url, TransportError> {
        let mut segments = vec!["api", "stations", uuid.as_str()];
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response, TransportError> {
        let path = url.path().to_string();
        debug!(%method, %path, "transport: sending request");
        let response = build(self.http.request(method.clone(), url))
            .send()
            .await
            .map_err(|source| TransportError::Request {
                method: method.clone(),
                path: path.clone(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&body)
            .map(|err| err.message)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        Err(TransportError::Status {
            method,
            path,
            status,
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, url: Url) -> Result<T, TransportError> {
        let path = url.path().to_string();
        self.send(Method::GET, url, |req| req)
            .await?
            .json()
            .await
            .map_err(|source| TransportError::Decode {
                method: Method::GET,
                path,
                source,
            })
    }
}

#[async_trait]
impl DashboardApi for HttpDashboardApi {
    async fn list_stations(&self) -> Result<Vec<StationConfig>, TransportError> {
        self.fetch(self.endpoint(&["api", "stations"])?).await
    }

    async fn list_arrivals(&self) -> Result<Vec<StationArrivals>, TransportError> {
        self.fetch(self.endpoint(&["api", "arrivals"])?).await
    }

    async fn list_alerts(&self) -> Result<Vec<Alert>, TransportError> {
        self.fetch(self.endpoint(&["api", "alerts"])?).await
    }

    async fn search_available(
        &self,
        query: &str,
    ) -> Result<Vec<AvailableStation>, TransportError> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_QUERY_LEN {
            return Ok(Vec::new());
        }
        let mut url = self.endpoint(&["api", "stations", "available"])?;
        url.query_pairs_mut().append_pair("q", query);
        self.fetch(url).await
    }

    async fn add_station(&self, request: &AddStationRequest) -> Result<(), TransportError> {
        let url = self.endpoint(&["api", "stations"])?;
        self.send(Method::POST, url, |req| req.json(request))
            .await
            .map(drop)
    }

    async fn remove_station(&self, uuid: &StationUuid) -> Result<(), TransportError> {
        let url = self.station_endpoint(uuid, &[])?;
        self.send(Method::DELETE, url, |req| req).await.map(drop)
    }

    async fn set_main(&self, uuid: &StationUuid) -> Result<(), TransportError> {
        let url = self.station_endpoint(uuid, &["main"])?;
        self.send(Method::POST, url, |req| req).await.map(drop)
    }

    async fn unset_main(&self, uuid: &StationUuid) -> Result<(), TransportError> {
        let url = self.station_endpoint(uuid, &["main"])?;
        self.send(Method::DELETE, url, |req| req).await.map(drop)
    }

    async fn set_direction(
        &self,
        uuid: &StationUuid,
        direction: Direction,
    ) -> Result<(), TransportError> {
        let url = self.station_endpoint(uuid, &["direction"])?;
        let body = SetDirectionRequest { direction };
        self.send(Method::POST, url, |req| req.json(&body))
            .await
            .map(drop)
    }

    async fn reorder(&self, order: &[StationUuid]) -> Result<(), TransportError> {
        let url = self.endpoint(&["api", "stations", "reorder"])?;
        let body = ReorderRequest {
            order: order.to_vec(),
        };
        self.send(Method::POST, url, |req| req.json(&body))
            .await
            .map(drop)
    }
}
