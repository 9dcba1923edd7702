use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use tracing::warn;
use uuid::Uuid;

use dashdrop_db::Database;
use dashdrop_db::models::{NotificationRow, RequestRow};
use dashdrop_realtime::ChangeFeed;
use dashdrop_types::events::InsertEvent;
use dashdrop_types::models::{
    BROADCAST_USER, DeliveryMode, NewRequest, Notification, NotificationKind, Request,
    RequestStatus,
};

use crate::error::{Result, StoreError};
use crate::lifecycle;
use crate::notify::NotificationEvent;
use crate::store::RequestStore;

const OPEN_REQUESTS_LIMIT: u32 = 100;

/// Status changes can only move forward, so a compare-and-set can lose at
/// most once per remaining lifecycle step.
const MAX_CAS_ATTEMPTS: usize = 8;

/// Remote record store: SQLite for the records, [`ChangeFeed`] for the
/// realtime insert stream.
#[derive(Clone)]
pub struct RemoteStore {
    db: Arc<Database>,
    feed: ChangeFeed,
}

impl RemoteStore {
    pub fn new(db: Arc<Database>, feed: ChangeFeed) -> Self {
        Self { db, feed }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Run a blocking DB call off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
            .map_err(StoreError::Persistence)
    }

    async fn fetch(&self, id: &str) -> Result<Option<Request>> {
        let id = id.to_string();
        self.blocking(move |db| db.get_request(&id))
            .await?
            .map(request_from_row)
            .transpose()
    }
}

impl RequestStore for RemoteStore {
    async fn create(&self, new: NewRequest) -> Result<Request> {
        let request = Request::pending(Uuid::new_v4().to_string(), new, now());
        let row = request_to_row(&request);

        self.blocking(move |db| db.insert_request(&row)).await?;

        self.feed.publish(InsertEvent::Requests(request.clone()));
        Ok(request)
    }

    async fn accept(&self, id: &str, runner_id: &str) -> Result<Request> {
        let now = timestamp(Utc::now());
        let (rid, runner) = (id.to_string(), runner_id.to_string());

        let accepted = self
            .blocking(move |db| {
                db.accept_request(
                    &rid,
                    &runner,
                    RequestStatus::Pending.as_str(),
                    RequestStatus::Accepted.as_str(),
                    &now,
                )
            })
            .await?;

        if let Some(row) = accepted {
            return request_from_row(row);
        }

        // The conditional write did not match: find out why.
        match self.fetch(id).await? {
            None => Err(StoreError::NotFound(id.to_string())),
            Some(current) if current.status == RequestStatus::Cancelled => {
                Err(StoreError::InvalidTransition {
                    from: current.status,
                    to: RequestStatus::Accepted,
                })
            }
            Some(_) => Err(StoreError::Conflict {
                request_id: id.to_string(),
            }),
        }
    }

    async fn set_status(&self, id: &str, status: RequestStatus) -> Result<Request> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .fetch(id)
                .await?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            lifecycle::check_update(current.status, status)?;

            let now = timestamp(Utc::now());
            let rid = id.to_string();
            let expected = current.status.as_str();
            let updated = self
                .blocking(move |db| {
                    db.compare_and_set_status(&rid, expected, status.as_str(), &now)
                })
                .await?;

            match updated {
                Some(row) => return request_from_row(row),
                None => warn!(
                    "Request {} changed while moving to {}, re-checking",
                    id, status
                ),
            }
        }

        Err(StoreError::Persistence(anyhow!(
            "request {} kept changing while moving to {}",
            id,
            status
        )))
    }

    async fn get(&self, id: &str) -> Result<Option<Request>> {
        self.fetch(id).await
    }

    async fn open_requests(&self) -> Result<Vec<Request>> {
        self.blocking(|db| {
            db.requests_with_status(RequestStatus::Pending.as_str(), OPEN_REQUESTS_LIMIT)
        })
        .await?
        .into_iter()
        .map(request_from_row)
        .collect()
    }

    async fn record_notification(&self, event: &NotificationEvent) -> Result<Option<Notification>> {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: event.user_id.clone(),
            kind: event.kind,
            message: event.message.clone(),
            request_id: event.request_id.clone(),
            status: event.status,
            urgent: event.urgent,
            read: false,
            created_at: now(),
        };
        let row = notification_to_row(&notification);

        self.blocking(move |db| db.insert_notification(&row)).await?;

        self.feed
            .publish(InsertEvent::Notifications(notification.clone()));
        Ok(Some(notification))
    }

    async fn notifications_for(&self, user_id: &str, limit: u32) -> Result<Vec<Notification>> {
        let user_id = user_id.to_string();
        self.blocking(move |db| db.notifications_for_user(&user_id, BROADCAST_USER, limit))
            .await?
            .into_iter()
            .map(notification_from_row)
            .collect()
    }

    async fn mark_notification_read(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.blocking(move |db| db.mark_notification_read(&id)).await
    }
}

/// Current time at the precision timestamps are stored with, so a record
/// reads back equal to the value it was written from.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so stored timestamps sort as text.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str, record_id: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by hand through the sqlite shell use datetime('now').
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on record '{}': {}", raw, record_id, e);
            DateTime::default()
        })
}

fn request_to_row(request: &Request) -> RequestRow {
    RequestRow {
        id: request.id.clone(),
        buyer_id: request.buyer_id.clone(),
        qr_image_url: request.qr_image_url.clone(),
        delivery_location: request.delivery_location.clone(),
        room: request.room.clone(),
        tip: i64::from(request.tip),
        mode: request.mode.as_str().to_string(),
        pickup_point: request.pickup_point.clone(),
        status: request.status.as_str().to_string(),
        runner_id: request.runner_id.clone(),
        created_at: timestamp(request.created_at),
        accepted_at: request.accepted_at.map(timestamp),
        updated_at: timestamp(request.updated_at),
    }
}

fn request_from_row(row: RequestRow) -> Result<Request> {
    let status: RequestStatus = row
        .status
        .parse()
        .map_err(|e| anyhow!("request {}: {}", row.id, e))?;
    let mode: DeliveryMode = row
        .mode
        .parse()
        .map_err(|e| anyhow!("request {}: {}", row.id, e))?;
    let tip = u32::try_from(row.tip).map_err(|_| anyhow!("request {}: bad tip {}", row.id, row.tip))?;

    Ok(Request {
        created_at: parse_timestamp(&row.created_at, &row.id),
        accepted_at: row
            .accepted_at
            .as_deref()
            .map(|raw| parse_timestamp(raw, &row.id)),
        updated_at: parse_timestamp(&row.updated_at, &row.id),
        id: row.id,
        buyer_id: row.buyer_id,
        qr_image_url: row.qr_image_url,
        delivery_location: row.delivery_location,
        room: row.room,
        tip,
        mode,
        pickup_point: row.pickup_point,
        status,
        runner_id: row.runner_id,
    })
}

fn notification_to_row(n: &Notification) -> NotificationRow {
    NotificationRow {
        id: n.id.clone(),
        user_id: n.user_id.clone(),
        kind: n.kind.as_str().to_string(),
        message: n.message.clone(),
        request_id: n.request_id.clone(),
        status: n.status.map(|s| s.as_str().to_string()),
        urgent: n.urgent,
        read: n.read,
        created_at: timestamp(n.created_at),
    }
}

fn notification_from_row(row: NotificationRow) -> Result<Notification> {
    let kind: NotificationKind = row
        .kind
        .parse()
        .map_err(|e| anyhow!("notification {}: {}", row.id, e))?;
    let status: Option<RequestStatus> = match row.status.as_deref() {
        Some(raw) => Some(
            raw.parse()
                .map_err(|e| anyhow!("notification {}: {}", row.id, e))?,
        ),
        None => None,
    };

    Ok(Notification {
        created_at: parse_timestamp(&row.created_at, &row.id),
        id: row.id,
        user_id: row.user_id,
        kind,
        message: row.message,
        request_id: row.request_id,
        status,
        urgent: row.urgent,
        read: row.read,
    })
}
