use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{Notification, ParseError, Request};

/// Record collections that publish insert events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Requests,
    Notifications,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requests => "requests",
            Self::Notifications => "notifications",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requests" => Ok(Self::Requests),
            "notifications" => Ok(Self::Notifications),
            other => Err(ParseError {
                kind: "collection",
                value: other.to_string(),
            }),
        }
    }
}

/// A record newly inserted into one of the collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "table", content = "new", rename_all = "lowercase")]
pub enum InsertEvent {
    Requests(Request),
    Notifications(Notification),
}

impl InsertEvent {
    pub fn collection(&self) -> Collection {
        match self {
            Self::Requests(_) => Collection::Requests,
            Self::Notifications(_) => Collection::Notifications,
        }
    }

    /// The inserted record on its own, without the envelope.
    pub fn record_json(&self) -> serde_json::Result<String> {
        match self {
            Self::Requests(r) => serde_json::to_string(r),
            Self::Notifications(n) => serde_json::to_string(n),
        }
    }
}

/// Optional `user_id = X` filter on a subscription.
///
/// Requests match on their requester; notifications match on their target,
/// and broadcast notifications match every user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub user_id: Option<String>,
}

impl RecordFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    pub fn matches(&self, event: &InsertEvent) -> bool {
        let Some(user_id) = self.user_id.as_deref() else {
            return true;
        };
        match event {
            InsertEvent::Requests(r) => r.buyer_id == user_id,
            InsertEvent::Notifications(n) => n.is_for(user_id),
        }
    }
}

/// Payload delivered to the service worker's `push` handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default = "default_push_title")]
    pub title: String,
    #[serde(default = "default_push_body")]
    pub body: String,
    #[serde(default = "default_push_url")]
    pub url: String,
    #[serde(default = "default_push_tag")]
    pub tag: String,
    #[serde(default)]
    pub urgent: bool,
}

fn default_push_title() -> String {
    "DashDrop Notification".to_string()
}

fn default_push_body() -> String {
    "You have a new update".to_string()
}

fn default_push_url() -> String {
    "/".to_string()
}

fn default_push_tag() -> String {
    "campusdash-notification".to_string()
}

impl PushPayload {
    /// Payload for an in-app event; title and url use the app defaults.
    pub fn new(body: impl Into<String>, tag: impl Into<String>, urgent: bool) -> Self {
        Self {
            title: "DashDrop".to_string(),
            body: body.into(),
            url: default_push_url(),
            tag: tag.into(),
            urgent,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{NewRequest, NotificationKind, BROADCAST_USER};

    fn request_for(buyer: &str) -> InsertEvent {
        let new = NewRequest {
            buyer_id: Some(buyer.into()),
            delivery_location: "Library".into(),
            room: "G12".into(),
            tip: 10,
            ..Default::default()
        };
        InsertEvent::Requests(Request::pending("r1".into(), new, Utc::now()))
    }

    fn notification_for(user: &str) -> InsertEvent {
        InsertEvent::Notifications(Notification {
            id: "n1".into(),
            user_id: user.into(),
            kind: NotificationKind::RequestAccepted,
            message: "Your request has been accepted by a dasher!".into(),
            request_id: "r1".into(),
            status: None,
            urgent: false,
            read: false,
            created_at: Utc::now(),
        })
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = RecordFilter::any();
        assert!(filter.matches(&request_for("buyer-1")));
        assert!(filter.matches(&notification_for("buyer-2")));
    }

    #[test]
    fn user_filter_matches_requester_and_target() {
        let filter = RecordFilter::user("buyer-1");
        assert!(filter.matches(&request_for("buyer-1")));
        assert!(!filter.matches(&request_for("buyer-2")));
        assert!(filter.matches(&notification_for("buyer-1")));
        assert!(!filter.matches(&notification_for("buyer-2")));
        assert!(filter.matches(&notification_for(BROADCAST_USER)));
    }

    #[test]
    fn insert_event_envelope_uses_table_and_new() {
        let value = serde_json::to_value(notification_for("buyer-1")).unwrap();
        assert_eq!(value["table"], "notifications");
        assert_eq!(value["new"]["type"], "request_accepted");
    }

    #[test]
    fn push_payload_defaults_match_service_worker() {
        let payload: PushPayload = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.title, "DashDrop Notification");
        assert_eq!(payload.body, "You have a new update");
        assert_eq!(payload.url, "/");
        assert_eq!(payload.tag, "campusdash-notification");
        assert!(!payload.urgent);
    }
}
