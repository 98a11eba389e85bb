//! UK postcode geocoding against postcodes.io.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::GeoPoint;

/// Outward code (area, district) followed by inward code (sector, unit),
/// with whitespace already removed.
static POSTCODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{1,2}[0-9][A-Z0-9]?[0-9][A-Z]{2}$").expect("valid postcode regex")
});

/// Strips whitespace, uppercases and validates a postcode.
///
/// Returns the compact form used in the postcodes.io URL, e.g. `TF34NT`.
pub fn normalize(raw: &str) -> Result<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if POSTCODE_RE.is_match(&compact) {
        Ok(compact)
    } else {
        Err(Error::InvalidPostcode(raw.trim().to_string()))
    }
}

/// Formats a compact postcode with the usual single space, e.g. `TF3 4NT`.
pub fn display_form(compact: &str) -> String {
    let split = compact.len().saturating_sub(3);
    format!("{} {}", &compact[..split], &compact[split..])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodedPostcode {
    pub postcode: String,
    #[serde(flatten)]
    pub point: GeoPoint,
    pub admin_district: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    result: Option<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    postcode: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    admin_district: Option<String>,
}

impl LookupResult {
    fn into_geocoded(self, query: &str) -> Result<GeocodedPostcode> {
        // Some valid postcodes (e.g. PO boxes) have no location.
        let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) else {
            return Err(Error::PostcodeNotFound(format!("{query} has no coordinates")));
        };

        Ok(GeocodedPostcode {
            postcode: self.postcode,
            point: GeoPoint::try_new(latitude, longitude)?,
            admin_district: self.admin_district,
        })
    }
}

#[derive(Clone)]
pub struct PostcodeClient {
    http: Client,
    base_url: String,
}

impl PostcodeClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            http,
            base_url: config.postcodes_url.trim_end_matches('/').to_string(),
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn geocode(&self, raw: &str) -> Result<GeocodedPostcode> {
        let compact = normalize(raw)?;
        let url = format!("{}/postcodes/{}", self.base_url, compact);

        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(Error::PostcodeNotFound(display_form(&compact)));
        }
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "postcodes.io returned an error response");
            return Err(Error::upstream(
                status.as_u16(),
                status.canonical_reason().unwrap_or("postcode lookup failed"),
            ));
        }

        let body: LookupResponse = response.json().await?;
        let geocoded = body
            .result
            .ok_or_else(|| Error::PostcodeNotFound(display_form(&compact)))?
            .into_geocoded(&display_form(&compact))?;

        tracing::debug!(
            postcode = %geocoded.postcode,
            lat = geocoded.point.latitude,
            lon = geocoded.point.longitude,
            "Geocoded postcode"
        );
        Ok(geocoded)
    }
}
