use std::sync::mpsc::{self, Receiver, Sender};

use tracing::debug;
use views::ViewId;

/// A renderer reported that it released memory.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ReleaseAck {
    pub view: ViewId,
}

/// Sending side, held by whatever receives renderer messages.
#[derive(Debug, Clone)]
pub struct AckSender {
    sender: Sender<ReleaseAck>,
}

impl AckSender {
    /// Records an acknowledgment. Never blocks; dropped if nobody listens.
    pub fn acknowledge(&self, view: ViewId) {
        if self.sender.send(ReleaseAck { view }).is_err() {
            debug!(view = %view, "release acknowledgment dropped, watchdog gone");
        }
    }
}

/// Receiving side, drained by the watchdog for diagnostics only.
#[derive(Debug)]
pub struct AckReceiver {
    receiver: Receiver<ReleaseAck>,
}

impl AckReceiver {
    /// Returns every acknowledgment received so far without waiting.
    pub fn drain(&self) -> Vec<ReleaseAck> {
        self.receiver.try_iter().collect()
    }
}

/// Creates a connected acknowledgment sender and receiver.
pub fn ack_channel() -> (AckSender, AckReceiver) {
    let (sender, receiver) = mpsc::channel();
    (AckSender { sender }, AckReceiver { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_is_non_blocking() {
        let (sender, receiver) = ack_channel();
        assert!(receiver.drain().is_empty());

        sender.acknowledge(ViewId::new(3));
        sender.clone().acknowledge(ViewId::new(4));
        let acks = receiver.drain();
        assert_eq!(
            acks,
            vec![
                ReleaseAck { view: ViewId::new(3) },
                ReleaseAck { view: ViewId::new(4) },
            ]
        );
        assert!(receiver.drain().is_empty());
    }

    #[test]
    fn acknowledging_without_receiver_is_harmless() {
        let (sender, receiver) = ack_channel();
        drop(receiver);
        sender.acknowledge(ViewId::new(1));
    }
}
