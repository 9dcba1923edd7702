//! Request lifecycle state machine.
//!
//! ```text
//! pending -> accepted -> picked_up -> on_the_way -> delivered
//!    |          |
//!    +----------+--> cancelled
//! ```
//!
//! Only direct successors are legal. `pending -> accepted` is reserved for the
//! conditional accept; status updates can never produce `accepted`.

use dashdrop_types::models::{NotificationKind, Request, RequestStatus, BROADCAST_USER};

use crate::error::{Result, StoreError};
use crate::notify::NotificationEvent;

use dashdrop_types::models::RequestStatus::*;

pub const ACCEPTED_MESSAGE: &str = "Your request has been accepted by a dasher!";

/// Legal next states of `from`.
pub fn successors(from: RequestStatus) -> &'static [RequestStatus] {
    match from {
        Pending => &[Accepted, Cancelled],
        Accepted => &[PickedUp, Cancelled],
        PickedUp => &[OnTheWay],
        OnTheWay => &[Delivered],
        Delivered | Cancelled => &[],
    }
}

pub fn can_transition(from: RequestStatus, to: RequestStatus) -> bool {
    successors(from).contains(&to)
}

pub fn is_terminal(status: RequestStatus) -> bool {
    successors(status).is_empty()
}

/// Validate a status update (anything except the accept itself).
pub fn check_update(from: RequestStatus, to: RequestStatus) -> Result<()> {
    if to == Accepted || !can_transition(from, to) {
        return Err(StoreError::InvalidTransition { from, to });
    }
    Ok(())
}

/// Validate an accept against the current status.
pub fn check_accept(from: RequestStatus) -> Result<()> {
    if from != Pending {
        return Err(StoreError::InvalidTransition { from, to: Accepted });
    }
    Ok(())
}

/// Preset message for statuses that notify the requester.
pub fn status_message(status: RequestStatus) -> Option<&'static str> {
    match status {
        PickedUp => Some("Your order has been picked up!"),
        OnTheWay => Some("Your dasher is on the way!"),
        Delivered => Some("Your order has been delivered! 🎉"),
        _ => None,
    }
}

pub fn new_request_message(request: &Request) -> String {
    format!("New {} request: ₹{} tip", request.mode, request.tip)
}

/// A committed change, handed to post-commit hooks.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Created(Request),
    Accepted(Request),
    StatusChanged(Request),
}

impl LifecycleEvent {
    pub fn request(&self) -> &Request {
        match self {
            Self::Created(r) | Self::Accepted(r) | Self::StatusChanged(r) => r,
        }
    }

    /// The notification this change produces, if any.
    pub fn notification(&self) -> Option<NotificationEvent> {
        match self {
            Self::Created(r) => Some(NotificationEvent {
                user_id: BROADCAST_USER.to_string(),
                kind: NotificationKind::NewRequest,
                message: new_request_message(r),
                request_id: r.id.clone(),
                status: None,
                urgent: r.mode.is_urgent(),
            }),
            Self::Accepted(r) => Some(NotificationEvent {
                user_id: r.buyer_id.clone(),
                kind: NotificationKind::RequestAccepted,
                message: ACCEPTED_MESSAGE.to_string(),
                request_id: r.id.clone(),
                status: Some(Accepted),
                urgent: false,
            }),
            Self::StatusChanged(r) => status_message(r.status).map(|message| NotificationEvent {
                user_id: r.buyer_id.clone(),
                kind: NotificationKind::StatusUpdate,
                message: message.to_string(),
                request_id: r.id.clone(),
                status: Some(r.status),
                urgent: false,
            }),
        }
    }
}
