use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcast topic with bounded capacity.
/// `T` must be `Send + Sync` because the tick thread publishes and async tasks consume.
#[derive(Debug, Clone)]
pub struct Topic<T> {
    name: &'static str,
    tx: broadcast::Sender<Arc<T>>,
}

impl<T: Send + Sync + 'static> Topic<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { name, tx }
    }

    /// Publish to current subscribers. Returns how many received it; zero is not an error.
    pub fn publish(&self, msg: T) -> usize {
        match self.tx.send(Arc::new(msg)) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(topic = self.name, "No subscribers, message dropped");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<T>> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
