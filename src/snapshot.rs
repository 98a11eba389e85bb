//! Turns one fetch of raw positions into the ranked list the UI displays.

use crate::distance::rank_by_distance;
use crate::model::{GeoPoint, RankedVehicle, VehiclePosition};

/// Ranks `raw_positions` by distance from `reference`, keeping at most
/// `limit` of the nearest when a limit is given.
///
/// # Arguments
/// * `reference` - Point distances are measured from (usually a geocoded postcode)
/// * `raw_positions` - Vehicles from a single feed fetch
/// * `limit` - Maximum number of results to return (None for all)
pub fn build_snapshot<I>(
    reference: GeoPoint,
    raw_positions: I,
    limit: Option<usize>,
) -> Vec<RankedVehicle>
where
    I: IntoIterator<Item = VehiclePosition>,
{
    let mut ranked = rank_by_distance(reference, raw_positions);

    if let Some(max) = limit {
        ranked.truncate(max);
    }

    ranked
}

/// Keeps vehicles no further than `radius_km` from the reference point.
pub fn within_radius(mut ranked: Vec<RankedVehicle>, radius_km: f64) -> Vec<RankedVehicle> {
    ranked.retain(|r| r.distance_km <= radius_km);
    ranked
}

/// First vehicle whose identifier equals `vehicle_ref`.
pub fn find_vehicle<'a>(
    positions: &'a [VehiclePosition],
    vehicle_ref: &str,
) -> Option<&'a VehiclePosition> {
    positions.iter().find(|p| p.vehicle_ref == vehicle_ref)
}
