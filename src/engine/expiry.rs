use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::donation::{DonationChange, DonationStatus};
use crate::state::AppState;

const EXPIRE: DonationChange =
    DonationChange::new(DonationStatus::Available, DonationStatus::Expired);

pub async fn run_expiry_sweeper(state: Arc<AppState>, period: Duration) {
    info!(period_secs = period.as_secs(), "expiry sweeper started");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let expired = expire_overdue(&state, Utc::now());
        if expired > 0 {
            info!(expired, "donations expired");
        } else {
            debug!("no overdue donations");
        }
    }
}

/// Marks every available donation whose best-before has passed as expired.
/// A donation claimed after the scan is left alone. Returns how many changed.
pub fn expire_overdue(state: &AppState, now: DateTime<Utc>) -> usize {
    let overdue: Vec<Uuid> = state
        .donations
        .iter()
        .filter(|entry| {
            let donation = entry.value();
            donation.status == DonationStatus::Available
                && donation.best_before.is_some_and(|best_before| best_before <= now)
        })
        .map(|entry| *entry.key())
        .collect();

    let mut expired = 0;
    for id in overdue {
        match state.set_donation_status(&id, EXPIRE) {
            Ok(()) => {
                state.metrics.donations_expired_total.inc();
                expired += 1;
            }
            Err(err) => debug!(donation_id = %id, error = %err, "skipped expiry"),
        }
    }

    expired
}
