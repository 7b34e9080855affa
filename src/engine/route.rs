use std::collections::HashSet;

use uuid::Uuid;

use crate::geo::{haversine_km, round_km};
use crate::models::location::GeoPoint;
use crate::models::stop::{RoutePlan, Stop, StopKind};

const MINUTES_PER_KM: f64 = 3.0;
const MINUTES_PER_STOP: f64 = 5.0;

/// Orders stops greedily by nearest neighbour from `start`.
///
/// A dropoff only becomes a candidate once the pickup with the same
/// delivery id has been placed. Stops without coordinates go last, in input
/// order, and a located dropoff whose pickup has no coordinates follows that
/// pickup there.
pub fn optimize_route(stops: &[Stop], start: GeoPoint) -> Vec<Stop> {
    let unlocated_pickups: HashSet<Uuid> = stops
        .iter()
        .filter(|stop| stop.kind == StopKind::Pickup && stop.point().is_none())
        .map(|stop| stop.delivery_id)
        .collect();

    let (mut remaining, deferred): (Vec<&Stop>, Vec<&Stop>) = stops.iter().partition(|stop| {
        stop.point().is_some()
            && !(stop.kind == StopKind::Dropoff && unlocated_pickups.contains(&stop.delivery_id))
    });

    let mut ordered = Vec::with_capacity(stops.len());
    let mut picked_up: HashSet<Uuid> = HashSet::new();
    let mut current = start;

    while !remaining.is_empty() {
        let mut nearest: Option<(usize, f64)> = None;

        for (index, stop) in remaining.iter().enumerate() {
            if stop.kind == StopKind::Dropoff && !picked_up.contains(&stop.delivery_id) {
                continue;
            }
            let Some(point) = stop.point() else {
                continue;
            };

            let distance = haversine_km(&current, &point);
            if nearest.is_none_or(|(_, best)| distance < best) {
                nearest = Some((index, distance));
            }
        }

        // Only dropoffs whose pickup is missing from the input get here.
        let index = nearest.map_or(0, |(index, _)| index);
        let stop = remaining.remove(index);

        if stop.kind == StopKind::Pickup {
            picked_up.insert(stop.delivery_id);
        }
        if let Some(point) = stop.point() {
            current = point;
        }
        ordered.push(stop.clone());
    }

    ordered.extend(
        order_deferred(&deferred, &unlocated_pickups)
            .into_iter()
            .cloned(),
    );
    ordered
}

/// Keeps input order, except that a dropoff whose pickup is also deferred is
/// held back until right after that pickup.
fn order_deferred<'a>(deferred: &[&'a Stop], unlocated_pickups: &HashSet<Uuid>) -> Vec<&'a Stop> {
    let mut ordered = Vec::with_capacity(deferred.len());
    let mut placed: HashSet<Uuid> = HashSet::new();
    let mut held: Vec<&Stop> = Vec::new();

    for &stop in deferred {
        match stop.kind {
            StopKind::Pickup => {
                placed.insert(stop.delivery_id);
                ordered.push(stop);
                let (ready, waiting): (Vec<&Stop>, Vec<&Stop>) = held
                    .into_iter()
                    .partition(|dropoff| dropoff.delivery_id == stop.delivery_id);
                ordered.extend(ready);
                held = waiting;
            }
            StopKind::Dropoff
                if unlocated_pickups.contains(&stop.delivery_id)
                    && !placed.contains(&stop.delivery_id) =>
            {
                held.push(stop);
            }
            StopKind::Dropoff => ordered.push(stop),
        }
    }

    ordered.extend(held);
    ordered
}

/// Total travelled distance in km from `start` through every stop that has
/// coordinates, unrounded.
pub fn route_distance_km(route: &[Stop], start: GeoPoint) -> f64 {
    route
        .iter()
        .filter_map(Stop::point)
        .fold((0.0, start), |(total, previous), point| {
            (total + haversine_km(&previous, &point), point)
        })
        .0
}

pub fn estimate_minutes(distance_km: f64, stop_count: usize) -> u32 {
    let minutes = distance_km * MINUTES_PER_KM + stop_count as f64 * MINUTES_PER_STOP;
    minutes.round().max(0.0) as u32
}

pub fn plan_route(stops: &[Stop], start: GeoPoint) -> RoutePlan {
    let ordered = optimize_route(stops, start);
    let distance_km = route_distance_km(&ordered, start);

    RoutePlan {
        start,
        estimated_minutes: estimate_minutes(distance_km, ordered.len()),
        total_distance_km: round_km(distance_km),
        stops: ordered,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{estimate_minutes, optimize_route, plan_route};
    use crate::models::location::GeoPoint;
    use crate::models::stop::{Stop, StopKind};

    fn stop(kind: StopKind, delivery: u128, coords: Option<(f64, f64)>) -> Stop {
        let delivery_id = Uuid::from_u128(delivery);
        let prefix = match kind {
            StopKind::Pickup => "pickup",
            StopKind::Dropoff => "dropoff",
        };
        Stop {
            id: format!("{prefix}-{delivery_id}"),
            kind,
            donation_title: format!("donation {delivery}"),
            address: "somewhere".to_string(),
            lat: coords.map(|(lat, _)| lat),
            lng: coords.map(|(_, lng)| lng),
            contact_name: "contact".to_string(),
            contact_phone: None,
            delivery_id,
        }
    }

    fn ids(route: &[Stop]) -> Vec<String> {
        route.iter().map(|s| s.id.clone()).collect()
    }

    fn assert_precedence(route: &[Stop]) {
        for (position, s) in route.iter().enumerate() {
            if s.kind != StopKind::Dropoff {
                continue;
            }
            if let Some(pickup_at) = route
                .iter()
                .position(|p| p.kind == StopKind::Pickup && p.delivery_id == s.delivery_id)
            {
                assert!(pickup_at < position, "dropoff {} before its pickup", s.id);
            }
        }
    }

    #[test]
    fn completes_nearby_dropoff_before_jumping_to_next_pickup() {
        let stops = vec![
            stop(StopKind::Pickup, 1, Some((0.0, 0.0))),
            stop(StopKind::Dropoff, 1, Some((0.0, 1.0))),
            stop(StopKind::Pickup, 2, Some((1.0, 1.0))),
        ];

        let route = optimize_route(&stops, GeoPoint::new(0.0, 0.0));

        assert_eq!(ids(&route), ids(&stops));
    }

    #[test]
    fn dropoff_waits_for_its_pickup_even_when_closer() {
        let stops = vec![
            stop(StopKind::Dropoff, 1, Some((0.0, 0.1))),
            stop(StopKind::Pickup, 1, Some((0.0, 2.0))),
        ];

        let route = optimize_route(&stops, GeoPoint::new(0.0, 0.0));

        assert_eq!(route[0].kind, StopKind::Pickup);
        assert_eq!(route[1].kind, StopKind::Dropoff);
    }

    #[test]
    fn ties_go_to_the_first_stop_in_input_order() {
        let stops = vec![
            stop(StopKind::Pickup, 1, Some((0.0, 1.0))),
            stop(StopKind::Pickup, 2, Some((0.0, -1.0))),
        ];

        let route = optimize_route(&stops, GeoPoint::new(0.0, 0.0));

        assert_eq!(route[0].delivery_id, Uuid::from_u128(1));
    }

    #[test]
    fn stops_without_coordinates_go_last_in_input_order() {
        let stops = vec![
            stop(StopKind::Pickup, 1, None),
            stop(StopKind::Pickup, 2, Some((0.0, 5.0))),
            stop(StopKind::Dropoff, 1, None),
            stop(StopKind::Pickup, 3, Some((0.0, 1.0))),
        ];

        let route = optimize_route(&stops, GeoPoint::new(0.0, 0.0));

        assert_eq!(
            ids(&route),
            vec![
                stops[3].id.clone(),
                stops[1].id.clone(),
                stops[0].id.clone(),
                stops[2].id.clone(),
            ]
        );
    }

    #[test]
    fn located_dropoff_follows_its_unlocated_pickup() {
        let stops = vec![
            stop(StopKind::Pickup, 1, None),
            stop(StopKind::Dropoff, 1, Some((0.0, 1.0))),
        ];

        let route = optimize_route(&stops, GeoPoint::new(0.0, 0.0));

        assert_eq!(ids(&route), ids(&stops));
        assert_precedence(&route);
    }

    #[test]
    fn deferred_dropoff_listed_first_still_waits_for_its_pickup() {
        let stops = vec![
            stop(StopKind::Dropoff, 1, Some((0.0, 0.1))),
            stop(StopKind::Pickup, 2, Some((0.0, 1.0))),
            stop(StopKind::Dropoff, 3, None),
            stop(StopKind::Pickup, 1, None),
            stop(StopKind::Pickup, 3, None),
            stop(StopKind::Dropoff, 2, Some((0.0, 2.0))),
        ];

        let route = optimize_route(&stops, GeoPoint::new(0.0, 0.0));

        assert_eq!(
            ids(&route),
            vec![
                stops[1].id.clone(),
                stops[5].id.clone(),
                stops[3].id.clone(),
                stops[0].id.clone(),
                stops[4].id.clone(),
                stops[2].id.clone(),
            ]
        );
        assert_precedence(&route);
    }

    #[test]
    fn orphan_dropoff_is_forced_in_without_losing_other_stops() {
        let stops = vec![
            stop(StopKind::Dropoff, 9, Some((0.0, 0.5))),
            stop(StopKind::Pickup, 1, Some((0.0, 3.0))),
            stop(StopKind::Dropoff, 1, Some((0.0, 4.0))),
        ];

        let route = optimize_route(&stops, GeoPoint::new(0.0, 0.0));

        assert_eq!(route.len(), 3);
        assert_eq!(route[0].delivery_id, Uuid::from_u128(1));
        assert_eq!(route[1].delivery_id, Uuid::from_u128(1));
        assert_eq!(route[2].delivery_id, Uuid::from_u128(9));
    }

    #[test]
    fn keeps_every_stop_and_respects_precedence_on_a_mixed_batch() {
        let mut stops = Vec::new();
        for delivery in 0..12u128 {
            let offset = delivery as f64 * 0.013;
            stops.push(stop(
                StopKind::Dropoff,
                delivery,
                Some((-1.29 + offset, 36.82 - offset)),
            ));
            stops.push(stop(
                StopKind::Pickup,
                delivery,
                Some((-1.25 - offset, 36.79 + offset * 2.0)),
            ));
        }
        stops.push(stop(StopKind::Pickup, 99, None));
        stops.push(stop(StopKind::Dropoff, 98, Some((-1.27, 36.80))));
        stops.push(stop(StopKind::Pickup, 98, None));

        let route = optimize_route(&stops, GeoPoint::new(-1.2921, 36.8219));

        assert_eq!(route.len(), stops.len());
        let mut expected = ids(&stops);
        let mut actual = ids(&route);
        expected.sort();
        actual.sort();
        assert_eq!(actual, expected);
        assert_precedence(&route);
    }

    #[test]
    fn same_input_gives_same_order() {
        let stops = vec![
            stop(StopKind::Pickup, 1, Some((0.2, 0.2))),
            stop(StopKind::Pickup, 2, Some((0.1, 0.3))),
            stop(StopKind::Dropoff, 2, Some((0.4, 0.0))),
            stop(StopKind::Dropoff, 1, Some((0.3, 0.1))),
        ];
        let start = GeoPoint::new(0.0, 0.0);

        assert_eq!(optimize_route(&stops, start), optimize_route(&stops, start));
    }

    #[test]
    fn empty_input_gives_empty_plan() {
        let plan = plan_route(&[], GeoPoint::new(-1.2921, 36.8219));

        assert!(plan.stops.is_empty());
        assert_eq!(plan.total_distance_km, 0.0);
        assert_eq!(plan.estimated_minutes, 0);
    }

    #[test]
    fn plan_sums_legs_and_adds_per_stop_overhead() {
        let stops = vec![
            stop(StopKind::Pickup, 1, Some((1.0, 0.0))),
            stop(StopKind::Dropoff, 1, Some((2.0, 0.0))),
            stop(StopKind::Pickup, 2, None),
        ];

        let plan = plan_route(&stops, GeoPoint::new(0.0, 0.0));

        // Two degrees of latitude, roughly 222.4 km.
        assert!((plan.total_distance_km - 222.4).abs() < 0.05);
        let expected = (plan.total_distance_km * 3.0 + 15.0).round() as u32;
        assert!(plan.estimated_minutes.abs_diff(expected) <= 1);
        assert_eq!(plan.stops.len(), 3);
    }

    #[test]
    fn estimate_is_rounded_to_whole_minutes() {
        assert_eq!(estimate_minutes(0.0, 0), 0);
        assert_eq!(estimate_minutes(1.2, 1), 9);
        assert_eq!(estimate_minutes(10.0, 4), 50);
    }
}
