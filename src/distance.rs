//! Great-circle distance and nearest-first ranking.
//!
//! Inputs are not range checked here: a point outside [-90, 90] / [-180, 180]
//! gives a meaningless (finite) result rather than an error. Points built
//! from user or feed input go through [`GeoPoint::try_new`] first.

use crate::model::{GeoPoint, RankedVehicle, VehiclePosition};

/// Earth's mean radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points, in kilometers.
///
/// ```ignore
/// let london = GeoPoint::new(51.5074, -0.1278);
/// let paris = GeoPoint::new(48.8566, 2.3522);
/// assert!((distance(london, paris) - 343.5).abs() < 1.0);
/// ```
#[inline]
pub fn distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points. clamp keeps NaN.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Annotates every candidate with its distance from `reference` and returns
/// them closest first.
///
/// The sort is stable, so equidistant candidates keep their input order.
/// NaN distances sort after every number.
pub fn rank_by_distance<I>(reference: GeoPoint, candidates: I) -> Vec<RankedVehicle>
where
    I: IntoIterator<Item = VehiclePosition>,
{
    let mut ranked: Vec<RankedVehicle> = candidates
        .into_iter()
        .map(|vehicle| RankedVehicle {
            distance_km: distance(reference, vehicle.point),
            vehicle,
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or_else(|| a.distance_km.is_nan().cmp(&b.distance_km.is_nan()))
    });
    ranked
}
