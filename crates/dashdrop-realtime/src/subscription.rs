use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use dashdrop_types::events::{Collection, InsertEvent, RecordFilter};
use dashdrop_types::models::{Notification, Request};

use crate::feed::ChangeFeed;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("realtime feed is closed")]
    Closed,
    #[error("realtime subscriptions are not available in offline mode")]
    Unavailable,
}

/// Identifies one open subscription. Pass it back to
/// [`SubscriptionManager::unsubscribe`] to close the channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: Uuid,
    collection: Collection,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }
}

type Callback = Arc<dyn Fn(InsertEvent) + Send + Sync>;

struct ActiveSubscription {
    live: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Opens and closes filtered insert subscriptions on a [`ChangeFeed`].
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    feed: ChangeFeed,
    active: RwLock<HashMap<Uuid, ActiveSubscription>>,
}

impl SubscriptionManager {
    pub fn new(feed: ChangeFeed) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                feed,
                active: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.inner.feed
    }

    /// Open a subscription. `callback` runs once per matching insert, in the
    /// order the feed published them.
    pub async fn subscribe<F>(
        &self,
        collection: Collection,
        filter: RecordFilter,
        callback: F,
    ) -> Result<SubscriptionHandle, SubscriptionError>
    where
        F: Fn(InsertEvent) + Send + Sync + 'static,
    {
        let rx = self.inner.feed.receiver().ok_or(SubscriptionError::Closed)?;
        let id = Uuid::new_v4();
        let live = Arc::new(AtomicBool::new(true));
        let callback: Callback = Arc::new(callback);

        let task = tokio::spawn(deliver(rx, collection, filter, live.clone(), callback));

        self.inner
            .active
            .write()
            .await
            .insert(id, ActiveSubscription { live, task });

        debug!("Opened {} subscription {}", collection, id);
        Ok(SubscriptionHandle { id, collection })
    }

    /// Every inserted request.
    pub async fn subscribe_to_requests<F>(
        &self,
        callback: F,
    ) -> Result<SubscriptionHandle, SubscriptionError>
    where
        F: Fn(Request) + Send + Sync + 'static,
    {
        self.subscribe(Collection::Requests, RecordFilter::any(), move |event| {
            if let InsertEvent::Requests(request) = event {
                callback(request);
            }
        })
        .await
    }

    /// Notifications addressed to `user_id`, broadcast ones included.
    pub async fn subscribe_to_notifications<F>(
        &self,
        user_id: &str,
        callback: F,
    ) -> Result<SubscriptionHandle, SubscriptionError>
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        self.subscribe(
            Collection::Notifications,
            RecordFilter::user(user_id),
            move |event| {
                if let InsertEvent::Notifications(notification) = event {
                    callback(notification);
                }
            },
        )
        .await
    }

    /// Close a subscription. Once this returns the delivery task has stopped,
    /// so no callback runs for anything published afterwards.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        let removed = self.inner.active.write().await.remove(&handle.id);
        if let Some(sub) = removed {
            stop(handle.id, sub).await;
            debug!("Closed {} subscription {}", handle.collection, handle.id);
        }
    }

    pub async fn unsubscribe_all(&self) {
        let drained: Vec<(Uuid, ActiveSubscription)> =
            self.inner.active.write().await.drain().collect();
        for (id, sub) in drained {
            stop(id, sub).await;
        }
    }

    /// Close every subscription and refuse new ones.
    pub async fn shutdown(&self) {
        self.inner.feed.close();
        self.unsubscribe_all().await;
    }

    pub async fn active_count(&self) -> usize {
        self.inner.active.read().await.len()
    }
}

async fn stop(id: Uuid, sub: ActiveSubscription) {
    sub.live.store(false, Ordering::Release);
    sub.task.abort();
    if let Err(e) = sub.task.await {
        if e.is_panic() {
            warn!("Subscription {} callback panicked: {}", id, e);
        }
    }
}

async fn deliver(
    mut rx: mpsc::UnboundedReceiver<InsertEvent>,
    collection: Collection,
    filter: RecordFilter,
    live: Arc<AtomicBool>,
    callback: Callback,
) {
    while let Some(event) = rx.recv().await {
        if !live.load(Ordering::Acquire) {
            break;
        }
        if event.collection() == collection && filter.matches(&event) {
            callback(event);
        }
    }
}
