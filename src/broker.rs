//! Publish/subscribe bus for the current target rate.
//!
//! Every session worker holds a [`Subscription`]; the control plane publishes
//! a new transactions-per-second value and every currently registered
//! subscriber observes it in publish order. Publishing never blocks on a slow
//! subscriber: each subscription has a small bounded buffer and a lagging
//! receiver skips overwritten values, resuming at the oldest retained one.
//! Only the most recent rate matters to a session, so skipped intermediates
//! are harmless.

use tokio::sync::broadcast;
use tracing::debug;

const SUBSCRIPTION_BUFFER: usize = 16;

/// Broadcaster distributing the target rate to all connection workers.
#[derive(Debug, Clone)]
pub struct Broker {
    tx: broadcast::Sender<u32>,
}

impl Broker {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIPTION_BUFFER);
        Self { tx }
    }

    /// Register a new listener. The subscription only observes values
    /// published after this call.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Deliver `tps` to every currently registered subscription.
    /// Fire-and-forget; a missing or slow consumer never blocks the caller.
    pub fn publish(&self, tps: u32) {
        match self.tx.send(tps) {
            Ok(n) => debug!(tps, subscribers = n, "published rate"),
            Err(_) => debug!(tps, "published rate with no subscribers"),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

/// A session's handle on the broker. Dropped when the session worker exits,
/// which unregisters the listener.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<u32>,
}

impl Subscription {
    /// Wait for the next published rate. Returns `None` once the broker has
    /// been dropped and all buffered values are consumed.
    pub async fn recv(&mut self) -> Option<u32> {
        loop {
            match self.rx.recv().await {
                Ok(tps) => return Some(tps),
                // Overwritten while we were busy; continue from the oldest
                // value still buffered.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
