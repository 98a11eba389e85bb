//! SIRI-VM (XML) decoding.

use chrono::{DateTime, Utc};
use roxmltree::{Document, Node};

use crate::error::Result;
use crate::model::{GeoPoint, VehicleMetadata, VehiclePosition};

/// Parses every `VehicleActivity` in a SIRI-VM document.
///
/// Activities without a `VehicleRef` or with missing/out-of-range coordinates
/// are dropped.
pub fn parse_vehicle_activities(xml: &str) -> Result<Vec<VehiclePosition>> {
    let doc = Document::parse(xml)?;

    let mut positions = Vec::new();
    let mut skipped = 0usize;

    for activity in doc.descendants().filter(|n| n.has_tag_name("VehicleActivity")) {
        match parse_activity(activity) {
            Some(position) => positions.push(position),
            None => {
                skipped += 1;
                tracing::debug!(
                    item = ?child_text(activity, "ItemIdentifier"),
                    "Skipping vehicle activity without usable reference or location"
                );
            }
        }
    }

    if skipped > 0 {
        tracing::info!(skipped, kept = positions.len(), "Dropped incomplete SIRI-VM activities");
    }

    Ok(positions)
}

fn parse_activity(activity: Node<'_, '_>) -> Option<VehiclePosition> {
    let journey = child(activity, "MonitoredVehicleJourney")?;

    let vehicle_ref = child_text(journey, "VehicleRef")?;
    let location = child(journey, "VehicleLocation")?;
    let latitude = child_text(location, "Latitude")?.parse().ok()?;
    let longitude = child_text(location, "Longitude")?.parse().ok()?;
    let point = GeoPoint::try_new(latitude, longitude).ok()?;

    let call = child(journey, "MonitoredCall");

    let metadata = VehicleMetadata {
        line: child_text(journey, "PublishedLineName").or_else(|| child_text(journey, "LineRef")),
        direction: child_text(journey, "DirectionRef"),
        operator: child_text(journey, "OperatorRef"),
        speed_kmh: child_number(journey, "Velocity"),
        bearing: child_number(journey, "Bearing"),
        next_stop: call.and_then(|c| child_text(c, "StopPointName")),
        expected_arrival: call.and_then(|c| child_time(c, "ExpectedArrivalTime")),
        origin: child_text(journey, "OriginName"),
        destination: child_text(journey, "DestinationName"),
        recorded_at: child_time(activity, "RecordedAtTime"),
    };

    Some(VehiclePosition::new(vehicle_ref, point).with_metadata(metadata))
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

/// Trimmed text of a direct child element, `None` when absent or blank.
fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    child(node, name)?
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn child_number(node: Node<'_, '_>, name: &str) -> Option<f64> {
    child_text(node, name)?.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn child_time(node: Node<'_, '_>, name: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&child_text(node, name)?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
