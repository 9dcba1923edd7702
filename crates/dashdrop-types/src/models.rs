use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Requester id used when the client does not identify itself.
pub const ANONYMOUS_BUYER: &str = "anonymous";

/// Pickup point used when the requester leaves it blank.
pub const DEFAULT_PICKUP_POINT: &str = "Food Court / Canteen";

/// Notification target meaning "every connected user".
pub const BROADCAST_USER: &str = "all";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

/// Lifecycle state of a delivery request.
///
/// The forward chain is `Pending -> Accepted -> PickedUp -> OnTheWay -> Delivered`;
/// `Cancelled` is a terminal side exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    PickedUp,
    OnTheWay,
    Delivered,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 6] = [
        Self::Pending,
        Self::Accepted,
        Self::PickedUp,
        Self::OnTheWay,
        Self::Delivered,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::PickedUp => "picked_up",
            Self::OnTheWay => "on_the_way",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// True once a runner has taken the request and it has not been cancelled.
    pub fn has_runner(&self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::PickedUp | Self::OnTheWay | Self::Delivered
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseError {
                kind: "status",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    Normal,
    Urgent,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Urgent => "urgent",
        }
    }

    pub fn is_urgent(&self) -> bool {
        matches!(self, Self::Urgent)
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "urgent" => Ok(Self::Urgent),
            other => Err(ParseError {
                kind: "delivery mode",
                value: other.to_string(),
            }),
        }
    }
}

/// What a requester submits. Inputs are trusted; nothing here is validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRequest {
    #[serde(default)]
    pub buyer_id: Option<String>,
    #[serde(default)]
    pub qr_image_url: Option<String>,
    pub delivery_location: String,
    pub room: String,
    pub tip: u32,
    #[serde(default)]
    pub mode: DeliveryMode,
    #[serde(default)]
    pub pickup_point: Option<String>,
}

/// A delivery task as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub buyer_id: String,
    pub qr_image_url: Option<String>,
    pub delivery_location: String,
    pub room: String,
    pub tip: u32,
    pub mode: DeliveryMode,
    pub pickup_point: String,
    pub status: RequestStatus,
    pub runner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Build a fresh `Pending` request, filling in the requester and pickup defaults.
    pub fn pending(id: String, new: NewRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            buyer_id: new
                .buyer_id
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| ANONYMOUS_BUYER.to_string()),
            qr_image_url: new.qr_image_url,
            delivery_location: new.delivery_location,
            room: new.room,
            tip: new.tip,
            mode: new.mode,
            pickup_point: new
                .pickup_point
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_PICKUP_POINT.to_string()),
            status: RequestStatus::Pending,
            runner_id: None,
            created_at: now,
            accepted_at: None,
            updated_at: now,
        }
    }

    /// `runner_id` is present exactly when the status says a runner holds the request.
    /// A request cancelled after acceptance may still name its former runner.
    pub fn runner_consistent(&self) -> bool {
        match self.status {
            RequestStatus::Cancelled => true,
            status => status.has_runner() == self.runner_id.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewRequest,
    RequestAccepted,
    StatusUpdate,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewRequest => "new_request",
            Self::RequestAccepted => "request_accepted",
            Self::StatusUpdate => "status_update",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_request" => Ok(Self::NewRequest),
            "request_accepted" => Ok(Self::RequestAccepted),
            "status_update" => Ok(Self::StatusUpdate),
            other => Err(ParseError {
                kind: "notification type",
                value: other.to_string(),
            }),
        }
    }
}

/// A persisted event record describing a change to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    /// A user id, or [`BROADCAST_USER`].
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub request_id: String,
    pub status: Option<RequestStatus>,
    pub urgent: bool,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_broadcast(&self) -> bool {
        self.user_id == BROADCAST_USER
    }

    /// Whether `user_id` should see this notification.
    pub fn is_for(&self, user_id: &str) -> bool {
        self.is_broadcast() || self.user_id == user_id
    }
}
