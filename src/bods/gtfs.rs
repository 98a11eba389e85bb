//! GTFS-RT (protobuf) decoding.

use chrono::DateTime;
use gtfs_realtime as rt;
use prost::Message;

use crate::error::Result;
use crate::model::{GeoPoint, VehicleMetadata, VehiclePosition};

/// Decodes a GTFS-RT `FeedMessage` and keeps the entities that carry a
/// vehicle position with valid coordinates.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<VehiclePosition>> {
    let feed = rt::FeedMessage::decode(bytes)?;
    let total = feed.entity.len();

    let positions: Vec<VehiclePosition> =
        feed.entity.into_iter().filter_map(convert_entity).collect();

    if positions.len() < total {
        tracing::info!(
            skipped = total - positions.len(),
            kept = positions.len(),
            "Dropped GTFS-RT entities without a usable vehicle position"
        );
    }

    Ok(positions)
}

fn convert_entity(entity: rt::FeedEntity) -> Option<VehiclePosition> {
    let rt::FeedEntity { id: entity_id, vehicle, .. } = entity;
    let vehicle = vehicle?;
    let position = vehicle.position?;

    let point =
        GeoPoint::try_new(f64::from(position.latitude), f64::from(position.longitude)).ok()?;

    let non_empty = |id: &String| !id.is_empty();
    let vehicle_ref = vehicle
        .vehicle
        .and_then(|v| v.id.filter(non_empty).or(v.label.filter(non_empty)))
        .or(Some(entity_id).filter(non_empty))?;

    let (line, direction) = match vehicle.trip {
        Some(trip) => (trip.route_id, trip.direction_id.map(|d| d.to_string())),
        None => (None, None),
    };

    let metadata = VehicleMetadata {
        line,
        direction,
        // GTFS-RT reports metres per second
        speed_kmh: position.speed.map(|s| f64::from(s) * 3.6),
        bearing: position.bearing.map(f64::from),
        recorded_at: vehicle
            .timestamp
            .and_then(|ts| i64::try_from(ts).ok())
            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        ..Default::default()
    };

    Some(VehiclePosition::new(vehicle_ref, point).with_metadata(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn entity(id: &str, vehicle_id: Option<&str>, lat: f32, lon: f32) -> rt::FeedEntity {
        rt::FeedEntity {
            id: id.to_string(),
            vehicle: Some(rt::VehiclePosition {
                trip: Some(rt::TripDescriptor {
                    route_id: Some("4".to_string()),
                    direction_id: Some(1),
                    ..Default::default()
                }),
                vehicle: Some(rt::VehicleDescriptor {
                    id: vehicle_id.map(str::to_string),
                    ..Default::default()
                }),
                position: Some(rt::Position {
                    latitude: lat,
                    longitude: lon,
                    bearing: Some(90.0),
                    speed: Some(10.0),
                    ..Default::default()
                }),
                timestamp: Some(1_714_552_200),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn encode(entities: Vec<rt::FeedEntity>) -> Vec<u8> {
        rt::FeedMessage {
            header: rt::FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                ..Default::default()
            },
            entity: entities,
            ..Default::default()
        }
        .encode_to_vec()
    }

    #[test]
    fn test_decodes_vehicle_positions() {
        let bytes = encode(vec![entity("e1", Some("BUS7"), 52.68, -2.45)]);
        let positions = parse_feed(&bytes).unwrap();

        assert_eq!(positions.len(), 1);
        let bus = &positions[0];
        assert_eq!(bus.vehicle_ref, "BUS7");
        assert_relative_eq!(bus.point.latitude, 52.68, epsilon = 1e-5);
        assert_relative_eq!(bus.point.longitude, -2.45, epsilon = 1e-5);
        assert_eq!(bus.metadata.line.as_deref(), Some("4"));
        assert_eq!(bus.metadata.direction.as_deref(), Some("1"));
        assert_relative_eq!(bus.metadata.speed_kmh.unwrap(), 36.0, epsilon = 1e-6);
        assert_eq!(bus.metadata.bearing, Some(90.0));
        assert_eq!(
            bus.metadata.recorded_at.unwrap().to_rfc3339(),
            "2024-05-01T08:30:00+00:00"
        );
    }

    #[test]
    fn test_falls_back_to_entity_id() {
        let bytes = encode(vec![entity("e2", None, 52.68, -2.45)]);
        let positions = parse_feed(&bytes).unwrap();
        assert_eq!(positions[0].vehicle_ref, "e2");
    }

    #[test]
    fn test_empty_vehicle_id_falls_back_to_label() {
        let mut with_label = entity("ent", Some(""), 52.68, -2.45);
        if let Some(vehicle) = with_label.vehicle.as_mut() {
            vehicle.vehicle = Some(rt::VehicleDescriptor {
                id: Some(String::new()),
                label: Some("LBL".to_string()),
                ..Default::default()
            });
        }
        let blank = entity("ent2", Some(""), 52.68, -2.45);

        let positions = parse_feed(&encode(vec![with_label, blank])).unwrap();
        let ids: Vec<_> = positions.iter().map(|p| p.vehicle_ref.as_str()).collect();
        assert_eq!(ids, ["LBL", "ent2"]);
    }

    #[test]
    fn test_skips_entities_without_position() {
        let no_vehicle = rt::FeedEntity {
            id: "alert".to_string(),
            ..Default::default()
        };
        let bad_coords = entity("e3", Some("BAD"), 120.0, 0.0);
        let bytes = encode(vec![no_vehicle, bad_coords, entity("e4", Some("OK"), 52.7, -2.4)]);

        let positions = parse_feed(&bytes).unwrap();
        let ids: Vec<_> = positions.iter().map(|p| p.vehicle_ref.as_str()).collect();
        assert_eq!(ids, ["OK"]);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(
            parse_feed(&[0xff, 0xff, 0xff]),
            Err(crate::error::Error::Protobuf(_))
        ));
    }
}
