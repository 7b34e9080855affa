use crate::models::delivery::Delivery;
use crate::models::location::GeoLocation;
use crate::models::stop::{Stop, StopKind};

const DEFAULT_DONOR_NAME: &str = "Donor";
const UNKNOWN_ADDRESS: &str = "Address not specified";

/// Flattens deliveries into pickup and dropoff stops.
///
/// Each delivery with a donation yields a pickup at the donation's location;
/// a dropoff at the receiver's location follows when a receiver is attached.
/// Deliveries without a donation are skipped.
pub fn extract_stops(deliveries: &[Delivery]) -> Vec<Stop> {
    let mut stops = Vec::with_capacity(deliveries.len() * 2);

    for delivery in deliveries {
        let Some(donation) = &delivery.donation else {
            continue;
        };

        let (lat, lng) = split_coordinates(donation.location.as_ref());
        stops.push(Stop {
            id: format!("pickup-{}", delivery.id),
            kind: StopKind::Pickup,
            donation_title: donation.title.clone(),
            address: donation.pickup_location.clone(),
            lat,
            lng,
            contact_name: delivery
                .donor
                .as_ref()
                .map(|donor| donor.name.clone())
                .unwrap_or_else(|| DEFAULT_DONOR_NAME.to_string()),
            contact_phone: delivery.donor.as_ref().and_then(|donor| donor.phone.clone()),
            delivery_id: delivery.id,
        });

        if let Some(receiver) = &delivery.receiver {
            let (lat, lng) = split_coordinates(receiver.location.as_ref());
            stops.push(Stop {
                id: format!("dropoff-{}", delivery.id),
                kind: StopKind::Dropoff,
                donation_title: donation.title.clone(),
                address: receiver
                    .address
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string()),
                lat,
                lng,
                contact_name: receiver.name.clone(),
                contact_phone: receiver.phone.clone(),
                delivery_id: delivery.id,
            });
        }
    }

    stops
}

fn split_coordinates(location: Option<&GeoLocation>) -> (Option<f64>, Option<f64>) {
    match location {
        Some(location) => {
            let point = location.point();
            (Some(point.lat), Some(point.lng))
        }
        None => (None, None),
    }
}
