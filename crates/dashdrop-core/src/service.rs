use std::sync::Arc;

use tracing::{info, warn};

use dashdrop_realtime::{SubscriptionError, SubscriptionHandle, SubscriptionManager};
use dashdrop_types::models::{NewRequest, Notification, Request, RequestStatus};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::lifecycle::LifecycleEvent;
use crate::notify::{NotificationDispatcher, Toast, ToastSurface};
use crate::store::{Backend, RequestStore};
use crate::surfaces::{TracingAlert, TracingSurface, TracingToast};

/// Request operations plus their post-commit notifications.
///
/// Every mutating call commits to the store first. Only once the write is
/// durable is the resulting [`LifecycleEvent`] dispatched; dispatch failures
/// are logged and never turn a committed write into an error.
pub struct RequestService<S: RequestStore = Backend> {
    store: S,
    dispatcher: NotificationDispatcher,
    realtime: Option<SubscriptionManager>,
    toast: Arc<dyn ToastSurface>,
}

impl RequestService<Backend> {
    /// Service wired to headless surfaces, as the server runs it.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let (backend, realtime) = config.open_backend()?;
        let dispatcher = NotificationDispatcher::new(
            Arc::new(TracingSurface::new(config.notifications)),
            Arc::new(TracingAlert),
        );
        let mut service = Self::new(backend, dispatcher, Arc::new(TracingToast));
        if let Some(manager) = realtime {
            service = service.with_realtime(manager);
        }
        Ok(service)
    }

    pub fn is_offline(&self) -> bool {
        self.store.is_offline()
    }
}

impl<S: RequestStore> RequestService<S> {
    pub fn new(store: S, dispatcher: NotificationDispatcher, toast: Arc<dyn ToastSurface>) -> Self {
        Self {
            store,
            dispatcher,
            realtime: None,
            toast,
        }
    }

    pub fn with_realtime(mut self, manager: SubscriptionManager) -> Self {
        self.realtime = Some(manager);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub fn realtime(&self) -> Option<&SubscriptionManager> {
        self.realtime.as_ref()
    }

    pub fn request_permission(&self) -> bool {
        self.dispatcher.request_permission()
    }

    pub async fn create_request(&self, new: NewRequest) -> Result<Request> {
        let request = self.store.create(new).await?;
        info!(
            "Request {} created ({}, ₹{} tip)",
            request.id, request.mode, request.tip
        );
        self.after_commit(LifecycleEvent::Created(request.clone()))
            .await;
        Ok(request)
    }

    pub async fn accept_request(&self, id: &str, runner_id: &str) -> Result<Request> {
        let request = match self.store.accept(id, runner_id).await {
            Ok(request) => request,
            Err(e) => {
                if e.is_conflict() {
                    info!("Request {} lost to another dasher ({} too late)", id, runner_id);
                }
                return Err(e);
            }
        };
        info!("Request {} accepted by {}", request.id, runner_id);
        self.after_commit(LifecycleEvent::Accepted(request.clone()))
            .await;
        Ok(request)
    }

    pub async fn update_status(&self, id: &str, status: RequestStatus) -> Result<Request> {
        let request = self.store.set_status(id, status).await?;
        info!("Request {} is now {}", request.id, request.status);
        self.after_commit(LifecycleEvent::StatusChanged(request.clone()))
            .await;
        Ok(request)
    }

    /// [`update_status`](Self::update_status) from an untyped status name. An
    /// unrecognised name fails before the store is touched.
    pub async fn update_status_str(&self, id: &str, status: &str) -> Result<Request> {
        let status: RequestStatus = status
            .parse()
            .map_err(|_| StoreError::UnknownStatus(status.to_string()))?;
        self.update_status(id, status).await
    }

    pub async fn cancel_request(&self, id: &str) -> Result<Request> {
        self.update_status(id, RequestStatus::Cancelled).await
    }

    pub async fn get_request(&self, id: &str) -> Result<Option<Request>> {
        self.store.get(id).await
    }

    pub async fn open_requests(&self) -> Result<Vec<Request>> {
        self.store.open_requests().await
    }

    pub async fn notifications_for(&self, user_id: &str, limit: u32) -> Result<Vec<Notification>> {
        self.store.notifications_for(user_id, limit).await
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<bool> {
        self.store.mark_notification_read(id).await
    }

    /// Every new request, as it is inserted.
    pub async fn subscribe_to_requests<F>(
        &self,
        callback: F,
    ) -> Result<SubscriptionHandle, SubscriptionError>
    where
        F: Fn(Request) + Send + Sync + 'static,
    {
        self.realtime_manager()?
            .subscribe_to_requests(callback)
            .await
    }

    /// Notifications for `user_id` (broadcasts included). Each one raises a
    /// toast before it reaches `callback`.
    pub async fn watch_notifications<F>(
        &self,
        user_id: &str,
        callback: F,
    ) -> Result<SubscriptionHandle, SubscriptionError>
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        let toast = self.toast.clone();
        self.realtime_manager()?
            .subscribe_to_notifications(user_id, move |notification| {
                if let Err(e) = toast.show_toast(&Toast::from_notification(&notification)) {
                    warn!("Toast failed: {}", e);
                }
                callback(notification);
            })
            .await
    }

    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some(manager) = &self.realtime {
            manager.unsubscribe(handle).await;
        }
    }

    pub async fn unsubscribe_all(&self) {
        if let Some(manager) = &self.realtime {
            manager.unsubscribe_all().await;
        }
    }

    fn realtime_manager(&self) -> Result<&SubscriptionManager, SubscriptionError> {
        self.realtime.as_ref().ok_or(SubscriptionError::Unavailable)
    }

    async fn after_commit(&self, event: LifecycleEvent) {
        let Some(notification) = event.notification() else {
            return;
        };
        // Already logged by the dispatcher; the write itself stands.
        let _ = self.dispatcher.send(&self.store, &notification).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use dashdrop_db::Database;
    use dashdrop_realtime::ChangeFeed;
    use dashdrop_types::models::{DeliveryMode, NotificationKind};

    use super::*;
    use crate::local::LocalStore;
    use crate::notify::Permission;
    use crate::remote::RemoteStore;
    use crate::surfaces::testing::{FailingStore, RecordingAlert, RecordingSurface, RecordingToast};

    struct Harness {
        service: RequestService<RemoteStore>,
        surface: Arc<RecordingSurface>,
        alert: Arc<RecordingAlert>,
        toast: Arc<RecordingToast>,
    }

    fn harness() -> Harness {
        let feed = ChangeFeed::new();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let surface = Arc::new(RecordingSurface::answering(Permission::Granted));
        let alert = Arc::new(RecordingAlert::default());
        let toast = Arc::new(RecordingToast::default());
        let dispatcher = NotificationDispatcher::new(surface.clone(), alert.clone());
        dispatcher.request_permission();
        let service = RequestService::new(RemoteStore::new(db, feed.clone()), dispatcher, toast.clone())
            .with_realtime(SubscriptionManager::new(feed));
        Harness {
            service,
            surface,
            alert,
            toast,
        }
    }

    fn order(mode: DeliveryMode) -> NewRequest {
        NewRequest {
            buyer_id: Some("buyer-1".into()),
            delivery_location: "Hostel B".into(),
            room: "214".into(),
            tip: 20,
            mode,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn failed_create_sends_nothing() {
        let surface = Arc::new(RecordingSurface::answering(Permission::Granted));
        let alert = Arc::new(RecordingAlert::default());
        let dispatcher = NotificationDispatcher::new(surface.clone(), alert.clone());
        dispatcher.request_permission();
        let service = RequestService::new(FailingStore, dispatcher, Arc::new(RecordingToast::default()));

        let err = service
            .create_request(order(DeliveryMode::Urgent))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Persistence(_)));
        assert!(surface.shown().is_empty());
        assert_eq!(alert.plays(), 0);
    }

    #[tokio::test]
    async fn urgent_request_flow() {
        let h = harness();
        let created = h.service.create_request(order(DeliveryMode::Urgent)).await.unwrap();
        assert_eq!(created.status, RequestStatus::Pending);
        assert_eq!(created.mode, DeliveryMode::Urgent);
        assert_eq!(created.runner_id, None);

        let shown = h.surface.shown();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].body, "New urgent request: ₹20 tip");
        assert!(shown[0].require_interaction);
        assert_eq!(h.alert.plays(), 1);

        let accepted = h.service.accept_request(&created.id, "dasher-1").await.unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);
        assert_eq!(accepted.runner_id.as_deref(), Some("dasher-1"));

        let err = h
            .service
            .accept_request(&created.id, "dasher-2")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "Request already accepted by another dasher");

        let stored = h.service.get_request(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.runner_id.as_deref(), Some("dasher-1"));

        let inbox = h.service.notifications_for("buyer-1", 10).await.unwrap();
        assert_eq!(inbox[0].kind, NotificationKind::RequestAccepted);
        assert_eq!(inbox[1].kind, NotificationKind::NewRequest);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_accepts_have_one_winner() {
        let service = Arc::new(harness().service);
        let created = service.create_request(order(DeliveryMode::Normal)).await.unwrap();

        let mut tasks = Vec::new();
        for runner in ["dasher-1", "dasher-2", "dasher-3", "dasher-4"] {
            let service = service.clone();
            let id = created.id.clone();
            tasks.push(tokio::spawn(async move {
                (runner, service.accept_request(&id, runner).await)
            }));
        }

        let mut winners = Vec::new();
        for task in tasks {
            let (runner, result) = task.await.unwrap();
            match result {
                Ok(_) => winners.push(runner),
                Err(e) => assert!(e.is_conflict(), "unexpected error: {e}"),
            }
        }

        assert_eq!(winners.len(), 1);
        let stored = service.get_request(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.runner_id.as_deref(), Some(winners[0]));
    }

    #[tokio::test]
    async fn delivered_notifies_exactly_once() {
        let h = harness();
        let created = h.service.create_request(order(DeliveryMode::Normal)).await.unwrap();
        h.service.accept_request(&created.id, "dasher-1").await.unwrap();
        for status in [RequestStatus::PickedUp, RequestStatus::OnTheWay, RequestStatus::Delivered] {
            h.service.update_status(&created.id, status).await.unwrap();
        }

        let delivered: Vec<Notification> = h
            .service
            .notifications_for("buyer-1", 50)
            .await
            .unwrap()
            .into_iter()
            .filter(|n| n.status == Some(RequestStatus::Delivered))
            .collect();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].kind, NotificationKind::StatusUpdate);
        assert_eq!(delivered[0].message, "Your order has been delivered! 🎉");
        assert_eq!(delivered[0].user_id, "buyer-1");
    }

    #[tokio::test]
    async fn unknown_status_dispatches_nothing() {
        let h = harness();
        let created = h.service.create_request(order(DeliveryMode::Normal)).await.unwrap();
        h.service.accept_request(&created.id, "dasher-1").await.unwrap();
        let before = h.surface.shown().len();

        let err = h
            .service
            .update_status_str(&created.id, "teleported")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownStatus(s) if s == "teleported"));
        assert_eq!(h.surface.shown().len(), before);

        let stored = h.service.get_request(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Accepted);
    }

    #[tokio::test]
    async fn backward_update_is_rejected_without_notifying() {
        let h = harness();
        let created = h.service.create_request(order(DeliveryMode::Normal)).await.unwrap();
        h.service.accept_request(&created.id, "dasher-1").await.unwrap();
        h.service
            .update_status(&created.id, RequestStatus::PickedUp)
            .await
            .unwrap();
        let before = h.surface.shown().len();

        let err = h
            .service
            .update_status_str(&created.id, "accepted")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: RequestStatus::PickedUp,
                to: RequestStatus::Accepted
            }
        ));
        assert_eq!(h.surface.shown().len(), before);
    }

    #[tokio::test]
    async fn cancel_after_accept_is_silent_and_keeps_runner() {
        let h = harness();
        let created = h.service.create_request(order(DeliveryMode::Normal)).await.unwrap();
        h.service.accept_request(&created.id, "dasher-1").await.unwrap();
        let before = h.surface.shown().len();

        let cancelled = h.service.cancel_request(&created.id).await.unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert_eq!(cancelled.runner_id.as_deref(), Some("dasher-1"));
        assert_eq!(h.surface.shown().len(), before);

        assert!(h.service.cancel_request(&created.id).await.is_err());
    }

    #[tokio::test]
    async fn watched_notifications_raise_toasts() {
        let h = harness();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = h
            .service
            .watch_notifications("buyer-1", move |n| {
                let _ = tx.send(n);
            })
            .await
            .unwrap();

        let created = h.service.create_request(order(DeliveryMode::Urgent)).await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.request_id, created.id);
        assert_eq!(received.kind, NotificationKind::NewRequest);

        let toasts = h.toast.toasts();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].title, "NEW REQUEST");
        assert_eq!(toasts[0].icon, "alert-circle");

        h.service.unsubscribe(handle).await;
        h.service.create_request(order(DeliveryMode::Normal)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(h.toast.toasts().len(), 1);
    }

    #[tokio::test]
    async fn request_subscribers_see_new_requests() {
        let h = harness();
        let (tx, mut rx) = mpsc::unbounded_channel();
        h.service
            .subscribe_to_requests(move |r| {
                let _ = tx.send(r);
            })
            .await
            .unwrap();

        let created = h.service.create_request(order(DeliveryMode::Normal)).await.unwrap();
        let seen = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, created);

        h.service.unsubscribe_all().await;
        assert_eq!(h.service.realtime().unwrap().active_count().await, 0);
    }

    #[tokio::test]
    async fn offline_service_has_no_realtime_but_still_alerts() {
        let surface = Arc::new(RecordingSurface::answering(Permission::Granted));
        let alert = Arc::new(RecordingAlert::default());
        let dispatcher = NotificationDispatcher::new(surface.clone(), alert.clone());
        dispatcher.request_permission();
        let service = RequestService::new(
            Backend::Local(LocalStore::in_memory()),
            dispatcher,
            Arc::new(RecordingToast::default()),
        );
        assert!(service.is_offline());

        let created = service.create_request(order(DeliveryMode::Urgent)).await.unwrap();
        assert_eq!(surface.shown().len(), 1);
        assert_eq!(alert.plays(), 1);
        assert!(service.notifications_for("buyer-1", 10).await.unwrap().is_empty());

        service.accept_request(&created.id, "dasher-1").await.unwrap();
        assert_eq!(
            service.subscribe_to_requests(|_| {}).await.unwrap_err(),
            SubscriptionError::Unavailable
        );
    }
}
