//! Retrieval of the upstream traffic feed.
//!
//! The feed is a JSON array of objects; each object is flattened into a
//! [`TrafficRecord`], lifting `geo_point_2d.lat` / `geo_point_2d.lon` to
//! top-level coordinates.

use crate::types::{TrafficRecord, TrafficStatus};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const REQUIRED_KEYS: [&str; 5] = [
    "datetime",
    "trafficstatus",
    "geo_point_2d",
    "averagevehiclespeed",
    "traveltime",
];

#[derive(Debug, Error)]
pub enum DataFetchError {
    #[error("request to traffic feed failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("traffic feed answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("traffic feed body is not a JSON array of records: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("record {index} is missing `{field}`")]
    MissingField { index: usize, field: String },
    #[error("record {index} is malformed: {source}")]
    InvalidRecord {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct GeoPoint {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct RawRecord {
    datetime: String,
    trafficstatus: String,
    geo_point_2d: GeoPoint,
    // only presence is required; null or odd values become `None`
    averagevehiclespeed: Value,
    traveltime: Value,
}

impl From<RawRecord> for TrafficRecord {
    fn from(raw: RawRecord) -> Self {
        TrafficRecord {
            timestamp: raw.datetime,
            traffic: TrafficStatus::from(raw.trafficstatus),
            lat: raw.geo_point_2d.lat,
            lon: raw.geo_point_2d.lon,
            average_vehicle_speed: raw.averagevehiclespeed.as_f64(),
            travel_time: raw.traveltime.as_f64(),
        }
    }
}

pub struct DataFetcher {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl DataFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET the feed and flatten every record. One bad record fails the whole fetch.
    pub async fn fetch(&self) -> Result<Vec<TrafficRecord>, DataFetchError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataFetchError::Status(status));
        }

        let body = response.text().await?;
        parse_records(&body)
    }
}

/// Flatten a feed body into records.
pub fn parse_records(body: &str) -> Result<Vec<TrafficRecord>, DataFetchError> {
    let items: Vec<Value> = serde_json::from_str(body).map_err(DataFetchError::Decode)?;
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| flatten_record(index, item))
        .collect()
}

fn flatten_record(index: usize, item: Value) -> Result<TrafficRecord, DataFetchError> {
    let missing = |field: &str| DataFetchError::MissingField {
        index,
        field: field.to_string(),
    };

    // non-objects fall through to serde for an "invalid type" error
    if let Some(obj) = item.as_object() {
        for key in REQUIRED_KEYS {
            if !obj.contains_key(key) {
                return Err(missing(key));
            }
        }
        let point = &obj["geo_point_2d"];
        for key in ["lat", "lon"] {
            if point.get(key).is_none() {
                return Err(missing(&format!("geo_point_2d.{key}")));
            }
        }
    }

    let raw: RawRecord = serde_json::from_value(item)
        .map_err(|source| DataFetchError::InvalidRecord { index, source })?;
    Ok(raw.into())
}
