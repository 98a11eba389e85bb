//! Value types passed between the feed client, the distance engine and the UI.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kilometres in one statute mile.
pub const KM_PER_MILE: f64 = 1.609_344;

/// A geodetic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a point without range checks.
    #[inline]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Creates a point, rejecting latitudes outside [-90, 90] and longitudes
    /// outside [-180, 180]. NaN is rejected too.
    pub fn try_new(latitude: f64, longitude: f64) -> Result<Self> {
        let point = Self::new(latitude, longitude);
        if point.is_valid() {
            Ok(point)
        } else {
            Err(Error::InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Rectangular area the live feed is filtered to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl Default for BoundingBox {
    /// Telford, Shropshire.
    fn default() -> Self {
        Self {
            min_latitude: 52.65,
            max_latitude: 52.75,
            min_longitude: -2.55,
            max_longitude: -2.35,
        }
    }
}

impl BoundingBox {
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_latitude + self.max_latitude) / 2.0,
            (self.min_longitude + self.max_longitude) / 2.0,
        )
    }

    pub fn validate(&self) -> Result<()> {
        let min = GeoPoint::try_new(self.min_latitude, self.min_longitude)?;
        let max = GeoPoint::try_new(self.max_latitude, self.max_longitude)?;
        if min.latitude >= max.latitude || min.longitude >= max.longitude {
            return Err(Error::invalid_argument(format!(
                "bounding box minimum must be below maximum: {self}"
            )));
        }
        Ok(())
    }

    /// Value for the BODS `boundingBox` query parameter.
    pub fn to_query_value(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_latitude, self.max_latitude, self.min_longitude, self.max_longitude
        )
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_value())
    }
}

impl FromStr for BoundingBox {
    type Err = Error;

    /// Parses `min_lat,max_lat,min_lon,max_lon`.
    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::invalid_argument(format!("bounding box '{s}': {e}")))?;

        let [min_latitude, max_latitude, min_longitude, max_longitude] = parts[..] else {
            return Err(Error::invalid_argument(format!(
                "bounding box '{s}' needs four comma-separated numbers"
            )));
        };

        let bbox = Self {
            min_latitude,
            max_latitude,
            min_longitude,
            max_longitude,
        };
        bbox.validate()?;
        Ok(bbox)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceUnit {
    #[default]
    #[serde(rename = "km")]
    Kilometers,
    #[serde(rename = "mi")]
    Miles,
}

impl DistanceUnit {
    #[inline]
    pub fn convert(self, km: f64) -> f64 {
        match self {
            Self::Kilometers => km,
            Self::Miles => km / KM_PER_MILE,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Kilometers => "km",
            Self::Miles => "mi",
        }
    }
}

/// Optional descriptive fields carried alongside a position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleMetadata {
    pub line: Option<String>,
    pub direction: Option<String>,
    pub operator: Option<String>,
    pub speed_kmh: Option<f64>,
    pub bearing: Option<f64>,
    pub next_stop: Option<String>,
    pub expected_arrival: Option<DateTime<Utc>>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
}

/// One bus as reported by a single fetch of the live feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    pub vehicle_ref: String,
    #[serde(flatten)]
    pub point: GeoPoint,
    #[serde(flatten)]
    pub metadata: VehicleMetadata,
}

impl VehiclePosition {
    pub fn new(vehicle_ref: impl Into<String>, point: GeoPoint) -> Self {
        Self {
            vehicle_ref: vehicle_ref.into(),
            point,
            metadata: VehicleMetadata::default(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: VehicleMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A vehicle annotated with its distance from the reference point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedVehicle {
    #[serde(flatten)]
    pub vehicle: VehiclePosition,
    pub distance_km: f64,
}

impl RankedVehicle {
    pub fn distance_in(&self, unit: DistanceUnit) -> f64 {
        unit.convert(self.distance_km)
    }
}
