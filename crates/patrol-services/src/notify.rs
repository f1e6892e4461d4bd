//! Realtime notification hook.
//!
//! Fired once per stored message. Delivery is best-effort: the dispatch
//! engine logs a failure and moves on.

use patrol_core::model::Message;
use tokio::sync::broadcast;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification channel closed")]
    Closed,
    #[error("notification transport: {0}")]
    Transport(String),
}

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &Message) -> Result<(), NotifyError>;
}

/// In-process fan-out over a tokio broadcast channel.
///
/// Having no subscriber is not an error: nobody is listening, nothing is lost.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Message>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, message: &Message) -> Result<(), NotifyError> {
        if self.tx.receiver_count() == 0 {
            return Ok(());
        }
        self.tx
            .send(message.clone())
            .map(|_| ())
            .map_err(|_| NotifyError::Closed)
    }
}
