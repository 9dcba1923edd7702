use std::future::Future;

use dashdrop_types::models::{NewRequest, Notification, Request, RequestStatus};

use crate::error::Result;
use crate::local::LocalStore;
use crate::notify::NotificationEvent;
use crate::remote::RemoteStore;

/// Record store behind the request operations.
///
/// Implementations must make `accept` a single conditional write and
/// `set_status` a compare-and-set on the current status, both validated
/// against [`crate::lifecycle`].
pub trait RequestStore: Send + Sync {
    /// Persist a new `pending` request.
    fn create(&self, new: NewRequest) -> impl Future<Output = Result<Request>> + Send;

    /// Assign `runner_id` if and only if the request is still `pending`.
    fn accept(&self, id: &str, runner_id: &str) -> impl Future<Output = Result<Request>> + Send;

    /// Move the request to `status` if it is a direct successor of the current one.
    fn set_status(
        &self,
        id: &str,
        status: RequestStatus,
    ) -> impl Future<Output = Result<Request>> + Send;

    fn get(&self, id: &str) -> impl Future<Output = Result<Option<Request>>> + Send;

    /// Pending requests a dasher can pick from.
    fn open_requests(&self) -> impl Future<Output = Result<Vec<Request>>> + Send;

    /// Persist a notification record. Stores without notification storage
    /// return `Ok(None)`.
    fn record_notification(
        &self,
        event: &NotificationEvent,
    ) -> impl Future<Output = Result<Option<Notification>>> + Send;

    fn notifications_for(
        &self,
        user_id: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Notification>>> + Send;

    /// Returns false when the notification does not exist.
    fn mark_notification_read(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;
}

/// The store chosen once at startup: the remote record store, or the offline
/// single-slot fallback.
pub enum Backend {
    Remote(RemoteStore),
    Local(LocalStore),
}

impl Backend {
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl RequestStore for Backend {
    async fn create(&self, new: NewRequest) -> Result<Request> {
        match self {
            Self::Remote(store) => store.create(new).await,
            Self::Local(store) => store.create(new).await,
        }
    }

    async fn accept(&self, id: &str, runner_id: &str) -> Result<Request> {
        match self {
            Self::Remote(store) => store.accept(id, runner_id).await,
            Self::Local(store) => store.accept(id, runner_id).await,
        }
    }

    async fn set_status(&self, id: &str, status: RequestStatus) -> Result<Request> {
        match self {
            Self::Remote(store) => store.set_status(id, status).await,
            Self::Local(store) => store.set_status(id, status).await,
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Request>> {
        match self {
            Self::Remote(store) => store.get(id).await,
            Self::Local(store) => store.get(id).await,
        }
    }

    async fn open_requests(&self) -> Result<Vec<Request>> {
        match self {
            Self::Remote(store) => store.open_requests().await,
            Self::Local(store) => store.open_requests().await,
        }
    }

    async fn record_notification(&self, event: &NotificationEvent) -> Result<Option<Notification>> {
        match self {
            Self::Remote(store) => store.record_notification(event).await,
            Self::Local(store) => store.record_notification(event).await,
        }
    }

    async fn notifications_for(&self, user_id: &str, limit: u32) -> Result<Vec<Notification>> {
        match self {
            Self::Remote(store) => store.notifications_for(user_id, limit).await,
            Self::Local(store) => store.notifications_for(user_id, limit).await,
        }
    }

    async fn mark_notification_read(&self, id: &str) -> Result<bool> {
        match self {
            Self::Remote(store) => store.mark_notification_read(id).await,
            Self::Local(store) => store.mark_notification_read(id).await,
        }
    }
}
