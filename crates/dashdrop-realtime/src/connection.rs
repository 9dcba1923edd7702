use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use dashdrop_types::events::{Collection, InsertEvent, RecordFilter};

use crate::subscription::SubscriptionManager;

/// Heartbeat interval: the server pings idle sockets so dead peers are noticed.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Stream inserts of `collection` matching `filter` to a WebSocket client,
/// one JSON record per text frame, until the client goes away or the feed
/// shuts down.
pub async fn stream_inserts(
    socket: WebSocket,
    manager: SubscriptionManager,
    collection: Collection,
    filter: RecordFilter,
) {
    let (sender, receiver) = socket.split();
    forward_inserts(sender, receiver, manager, collection, filter).await;
}

async fn forward_inserts<S, R, E>(
    mut sender: S,
    mut receiver: R,
    manager: SubscriptionManager,
    collection: Collection,
    filter: RecordFilter,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<InsertEvent>();

    let handle = match manager
        .subscribe(collection, filter.clone(), move |event| {
            let _ = tx.send(event);
        })
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            warn!("Realtime subscription failed: {}", e);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    info!(
        "Realtime client subscribed to {} (user filter: {:?})",
        collection, filter.user_id
    );

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            next = rx.recv() => {
                let Some(event) = next else {
                    // Subscription ended under us: the manager shut down.
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                let json = match event.record_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialize {} record: {}", collection, e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("Realtime socket error: {}", e);
                        break;
                    }
                    // Clients only listen; anything else they send is ignored.
                    Some(Ok(_)) => {}
                }
            }
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    manager.unsubscribe(handle).await;
    info!("Realtime client left {}", collection);
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use futures_util::stream;

    use dashdrop_types::models::{NewRequest, Request};

    use super::*;
    use crate::feed::ChangeFeed;

    fn request(id: &str) -> Request {
        let new = NewRequest {
            delivery_location: "Hostel B".into(),
            room: "214".into(),
            tip: 20,
            ..Default::default()
        };
        Request::pending(id.into(), new, Utc::now())
    }

    async fn wait_for_subscriber(manager: &SubscriptionManager) {
        while manager.active_count().await == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn socket_closes_when_manager_shuts_down() {
        let feed = ChangeFeed::new();
        let manager = SubscriptionManager::new(feed.clone());
        let mut frames: Vec<Message> = Vec::new();

        let forward = forward_inserts(
            &mut frames,
            stream::pending::<Result<Message, axum::Error>>(),
            manager.clone(),
            Collection::Requests,
            RecordFilter::any(),
        );
        let driver = async {
            wait_for_subscriber(&manager).await;
            feed.publish(InsertEvent::Requests(request("r1")));
            tokio::time::sleep(Duration::from_millis(50)).await;
            manager.shutdown().await;
        };

        tokio::time::timeout(Duration::from_secs(2), async { tokio::join!(forward, driver) })
            .await
            .unwrap();

        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], Message::Text(json) if json.as_str().contains("\"id\":\"r1\"")));
        assert!(matches!(frames[1], Message::Close(None)));
    }

    #[tokio::test]
    async fn client_close_unsubscribes() {
        let feed = ChangeFeed::new();
        let manager = SubscriptionManager::new(feed);
        let mut frames: Vec<Message> = Vec::new();

        let incoming = stream::iter(vec![Ok::<_, axum::Error>(Message::Close(None))]);
        tokio::time::timeout(
            Duration::from_secs(2),
            forward_inserts(
                &mut frames,
                incoming,
                manager.clone(),
                Collection::Notifications,
                RecordFilter::user("buyer-1"),
            ),
        )
        .await
        .unwrap();

        assert!(frames.is_empty());
        assert_eq!(manager.active_count().await, 0);
    }
}
