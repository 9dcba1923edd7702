use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use dashdrop_types::events::InsertEvent;

/// In-process change stream: every committed insert is handed, in commit
/// order, to each open receiver. Receivers are unbounded, so a slow
/// subscriber falls behind but never loses a record.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    inner: Arc<Mutex<FeedState>>,
}

#[derive(Default)]
struct FeedState {
    senders: Vec<mpsc::UnboundedSender<InsertEvent>>,
    closed: bool,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish an insert. Having no receivers is not an error. Receivers that
    /// have been dropped are pruned here.
    pub fn publish(&self, event: InsertEvent) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        state.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// A new receiver, or `None` once the feed has been closed.
    pub fn receiver(&self) -> Option<mpsc::UnboundedReceiver<InsertEvent>> {
        let mut state = self.state();
        if state.closed {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.senders.push(tx);
        Some(rx)
    }

    /// Refuse new receivers and drop further publishes. Open receivers end
    /// once they have drained what was already published.
    pub fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        state.senders.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn receiver_count(&self) -> usize {
        self.state().senders.iter().filter(|tx| !tx.is_closed()).count()
    }
}
