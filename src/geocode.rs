use crate::error::{PipelineError, Result};
use crate::records::{Coordinate, RecordStore};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const TENCENT_GEOCODER_URL: &str = "https://apis.map.qq.com/ws/geocoder/v1/";

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Coordinate of a free-form address, `None` when it cannot be resolved
    async fn lookup(&self, location: &str) -> Result<Option<Coordinate>>;
}

/// Tencent Maps geocoding web service
pub struct TencentGeocoder {
    client: Client,
    key: String,
}

#[derive(Debug, Deserialize)]
struct GeocoderResponse {
    status: i64,
    #[serde(default)]
    message: String,
    result: Option<GeocoderResult>,
}

#[derive(Debug, Deserialize)]
struct GeocoderResult {
    location: GeocoderLocation,
}

#[derive(Debug, Deserialize)]
struct GeocoderLocation {
    lng: f64,
    lat: f64,
}

impl TencentGeocoder {
    pub fn new(key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PipelineError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            key: key.to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for TencentGeocoder {
    async fn lookup(&self, location: &str) -> Result<Option<Coordinate>> {
        let response: GeocoderResponse = self
            .client
            .get(TENCENT_GEOCODER_URL)
            .query(&[("address", location), ("key", self.key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(coordinate_from(response, location))
    }
}

fn coordinate_from(response: GeocoderResponse, location: &str) -> Option<Coordinate> {
    match response {
        GeocoderResponse {
            status: 0,
            result: Some(result),
            ..
        } => Some(Coordinate {
            longitude: result.location.lng,
            latitude: result.location.lat,
        }),
        GeocoderResponse {
            status, message, ..
        } => {
            ::log::warn!("Geocoder could not resolve {} ({}: {})", location, status, message);
            None
        }
    }
}

/// Counts from a coordinate pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeocodeReport {
    pub resolved: usize,
    pub unresolved: usize,
}

/// Attach coordinates to every record with a location and no coordinate.
///
/// Lookups are spaced by `delay`. The store is written once at the end, to
/// `output` when given and back over the input otherwise.
pub async fn enrich_coordinates(
    store: &RecordStore,
    geocoder: &dyn Geocoder,
    delay: Duration,
    output: Option<&Path>,
) -> Result<GeocodeReport> {
    let mut records = store.load()?;
    let pending = records
        .iter()
        .filter(|r| r.location.is_some() && r.coordinate.is_none())
        .count();
    ::log::info!("{} of {} records need coordinates", pending, records.len());

    let mut report = GeocodeReport::default();
    let mut done = 0;
    for record in records.iter_mut() {
        let Some(location) = record.location.clone() else {
            continue;
        };
        if record.coordinate.is_some() {
            continue;
        }
        done += 1;
        let label = record.display_name().unwrap_or(location.as_str()).to_string();
        ::log::info!("[{}/{}] Looking up {}", done, pending, label);

        match geocoder.lookup(&location).await {
            Ok(Some(coordinate)) => {
                ::log::debug!(
                    "{}: longitude {}, latitude {}",
                    label,
                    coordinate.longitude,
                    coordinate.latitude
                );
                record.coordinate = Some(coordinate);
                report.resolved += 1;
            }
            Ok(None) => report.unresolved += 1,
            Err(e) => {
                ::log::error!("Lookup failed for {}: {}", label, e);
                report.unresolved += 1;
            }
        }

        tokio::time::sleep(delay).await;
    }

    match output {
        Some(path) => RecordStore::new(path).save(&records)?,
        None => store.save(&records)?,
    }
    Ok(report)
}
