use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::delivery::Delivery;
use crate::models::donation::{Donation, DonationChange};
use crate::models::event::MarketEvent;
use crate::models::location::GeoPoint;
use crate::models::request::DonationRequest;
use crate::models::user::User;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub users: DashMap<Uuid, User>,
    /// Lower-cased email to user id.
    pub emails: DashMap<String, Uuid>,
    pub donations: DashMap<Uuid, Donation>,
    pub requests: DashMap<Uuid, DonationRequest>,
    /// (donation, receiver) to request id.
    pub request_keys: DashMap<(Uuid, Uuid), Uuid>,
    pub events_tx: broadcast::Sender<MarketEvent>,
    pub default_location: GeoPoint,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize, default_location: GeoPoint) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            users: DashMap::new(),
            emails: DashMap::new(),
            donations: DashMap::new(),
            requests: DashMap::new(),
            request_keys: DashMap::new(),
            events_tx,
            default_location,
            metrics: Metrics::new(),
        }
    }

    pub fn publish(&self, event: MarketEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("no event subscribers");
        }
    }

    pub fn user(&self, id: &Uuid) -> Option<User> {
        self.users.get(id).map(|entry| entry.value().clone())
    }

    pub fn donation(&self, id: &Uuid) -> Option<Donation> {
        self.donations.get(id).map(|entry| entry.value().clone())
    }

    /// Moves a donation from `change.from` to `change.to` under its entry lock
    /// and notifies subscribers. Fails with a conflict when the donation is no
    /// longer in `change.from`.
    pub fn set_donation_status(&self, id: &Uuid, change: DonationChange) -> Result<(), AppError> {
        let mut donation = self
            .donations
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("donation {} not found", id)))?;

        if donation.status != change.from {
            return Err(AppError::Conflict(format!(
                "donation {} is {:?}, not {:?}",
                id, donation.status, change.from
            )));
        }

        donation.status = change.to;
        donation.updated_at = Utc::now();
        drop(donation);

        self.publish(MarketEvent::DonationStatusChanged {
            id: *id,
            status: change.to,
        });
        Ok(())
    }

    /// Resolves a request's donation, receiver and donor.
    pub fn populate(&self, request: &DonationRequest) -> Delivery {
        Delivery::populate(
            request,
            self.donation(&request.donation),
            self.user(&request.receiver),
            self.user(&request.donor),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::AppState;
    use crate::engine::stops::tests::donation;
    use crate::error::AppError;
    use crate::models::donation::{DonationChange, DonationStatus};
    use crate::models::event::MarketEvent;
    use crate::models::location::GeoPoint;

    const CLAIM: DonationChange =
        DonationChange::new(DonationStatus::Available, DonationStatus::Pending);

    fn available(state: &AppState, title: &str) -> uuid::Uuid {
        let mut d = donation(title, None);
        d.status = DonationStatus::Available;
        let id = d.id;
        state.donations.insert(id, d);
        id
    }

    #[test]
    fn status_change_applies_only_from_the_expected_status() {
        let state = AppState::new(16, GeoPoint::new(0.0, 0.0));
        let mut rx = state.events_tx.subscribe();
        let id = available(&state, "soup");

        assert!(state.set_donation_status(&id, CLAIM).is_ok());
        assert!(matches!(
            state.set_donation_status(&id, CLAIM),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            state.set_donation_status(
                &id,
                DonationChange::new(DonationStatus::Available, DonationStatus::Expired)
            ),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(state.donations.get(&id).unwrap().status, DonationStatus::Pending);

        // Only the applied change is published.
        assert!(matches!(
            rx.try_recv(),
            Ok(MarketEvent::DonationStatusChanged {
                status: DonationStatus::Pending,
                ..
            })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn concurrent_claims_have_a_single_winner() {
        let state = AppState::new(64, GeoPoint::new(0.0, 0.0));
        let id = available(&state, "rice");

        let shared = &state;
        let winners = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(move || shared.set_donation_status(&id, CLAIM).is_ok()))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|won| *won)
                .count()
        });

        assert_eq!(winners, 1);
    }

    #[test]
    fn missing_donation_is_not_found() {
        let state = AppState::new(16, GeoPoint::new(0.0, 0.0));

        assert!(matches!(
            state.set_donation_status(&uuid::Uuid::new_v4(), CLAIM),
            Err(AppError::NotFound(_))
        ));
    }
}
