use crate::error::AppError;
use crate::models::donation::{DonationChange, DonationStatus};
use crate::models::request::RequestStatus;

/// Who is moving a request forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Donor,
    Receiver,
    Driver,
}

/// Checks a request status change and returns the donation status move it
/// implies, if any.
pub fn transition(
    actor: Actor,
    from: RequestStatus,
    to: RequestStatus,
) -> Result<Option<DonationChange>, AppError> {
    use DonationStatus as D;
    use RequestStatus::*;

    let donation_change = match (actor, from, to) {
        (Actor::Donor, Pending, Approved) => Some(DonationChange::new(D::Available, D::Pending)),
        (Actor::Donor, Pending, Rejected) => None,
        (Actor::Receiver, Pending, Cancelled) => None,
        (Actor::Receiver, Approved, Cancelled) => {
            Some(DonationChange::new(D::Pending, D::Available))
        }
        (Actor::Driver, Approved, InTransit) => Some(DonationChange::new(D::Pending, D::InTransit)),
        (Actor::Driver, InTransit, Completed) => {
            Some(DonationChange::new(D::InTransit, D::Delivered))
        }
        _ => {
            return Err(AppError::BadRequest(format!(
                "cannot move request from {from:?} to {to:?}"
            )));
        }
    };

    Ok(donation_change)
}

#[cfg(test)]
mod tests {
    use super::{Actor, transition};
    use crate::models::donation::{DonationChange, DonationStatus};
    use crate::models::request::RequestStatus;

    #[test]
    fn approval_holds_the_donation() {
        let next = transition(Actor::Donor, RequestStatus::Pending, RequestStatus::Approved);
        assert_eq!(
            next.ok(),
            Some(Some(DonationChange::new(
                DonationStatus::Available,
                DonationStatus::Pending
            )))
        );
    }

    #[test]
    fn rejection_leaves_the_donation_alone() {
        let next = transition(Actor::Donor, RequestStatus::Pending, RequestStatus::Rejected);
        assert_eq!(next.ok(), Some(None));
    }

    #[test]
    fn driver_progression_syncs_the_donation() {
        assert_eq!(
            transition(Actor::Driver, RequestStatus::Approved, RequestStatus::InTransit).ok(),
            Some(Some(DonationChange::new(
                DonationStatus::Pending,
                DonationStatus::InTransit
            )))
        );
        assert_eq!(
            transition(Actor::Driver, RequestStatus::InTransit, RequestStatus::Completed).ok(),
            Some(Some(DonationChange::new(
                DonationStatus::InTransit,
                DonationStatus::Delivered
            )))
        );
    }

    #[test]
    fn cancelling_an_approved_request_releases_the_donation() {
        let next = transition(
            Actor::Receiver,
            RequestStatus::Approved,
            RequestStatus::Cancelled,
        );
        assert_eq!(
            next.ok(),
            Some(Some(DonationChange::new(
                DonationStatus::Pending,
                DonationStatus::Available
            )))
        );
    }

    #[test]
    fn terminal_states_are_final() {
        for from in [
            RequestStatus::Rejected,
            RequestStatus::Completed,
            RequestStatus::Cancelled,
        ] {
            assert!(from.is_terminal());
            for actor in [Actor::Donor, Actor::Receiver, Actor::Driver] {
                for to in [
                    RequestStatus::Approved,
                    RequestStatus::InTransit,
                    RequestStatus::Completed,
                    RequestStatus::Cancelled,
                ] {
                    assert!(transition(actor, from, to).is_err());
                }
            }
        }
    }

    #[test]
    fn roles_cannot_make_each_others_moves() {
        assert!(transition(Actor::Driver, RequestStatus::Pending, RequestStatus::Approved).is_err());
        assert!(transition(Actor::Donor, RequestStatus::Approved, RequestStatus::InTransit).is_err());
        assert!(transition(Actor::Driver, RequestStatus::Approved, RequestStatus::Completed).is_err());
    }
}
