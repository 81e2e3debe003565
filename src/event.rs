//! Observer surface for transfer lifecycle events.
//!
//! The engine reports through [`TransferObserver`]; callers either implement
//! the trait directly or mount a [`ChannelObserver`] and drain
//! [`TransferEvent`]s from the receiving end.

use tokio::sync::mpsc::UnboundedSender;

use crate::state::SegmentStatus;

/// Callback surface for segment transfer lifecycle events.
///
/// Every method defaults to a no-op so implementors override only what they
/// render. Events for different segments interleave arbitrarily; the segment
/// index addresses each one. Callbacks run on transfer tasks and must not
/// block.
pub trait TransferObserver: Send + Sync {
    /// Called when a segment changes lifecycle state.
    fn on_state_change(&self, _index: u32, _status: SegmentStatus) {}

    /// Called with fresh progress figures, roughly every tenth chunk.
    ///
    /// `percent` is 0 to 100. All three figures are zero when the response
    /// declared no content length.
    fn on_progress(&self, _index: u32, _percent: u64, _remaining: u64, _total: u64) {}

    /// Called once per segment when the first body chunk arrives.
    fn on_transfer_start(&self, _index: u32) {}

    /// Called once per segment when the body is exhausted.
    fn on_transfer_complete(&self, _index: u32) {}
}

/// An observer that discards every event.
pub struct NoObserver;

impl TransferObserver for NoObserver {}

/// One transfer lifecycle event, as carried by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// A segment changed lifecycle state.
    StateChanged {
        /// Manifest part index.
        index: u32,
        /// The state entered.
        status: SegmentStatus,
    },
    /// Fresh progress figures for a segment.
    Progress {
        /// Manifest part index.
        index: u32,
        /// Progress percentage, 0 to 100.
        percent: u64,
        /// Bytes outstanding.
        remaining: u64,
        /// Declared total bytes.
        total: u64,
    },
    /// The first body chunk arrived.
    TransferStarted {
        /// Manifest part index.
        index: u32,
    },
    /// The body was exhausted.
    TransferCompleted {
        /// Manifest part index.
        index: u32,
    },
}

/// Forwards observer callbacks onto an unbounded channel.
///
/// Send failures are ignored: a dropped receiver just means nobody is
/// listening any more, which must not disturb the transfer.
pub struct ChannelObserver {
    sender: UnboundedSender<TransferEvent>,
}

impl ChannelObserver {
    /// Creates an observer forwarding onto `sender`.
    #[must_use]
    pub const fn new(sender: UnboundedSender<TransferEvent>) -> Self {
        Self { sender }
    }
}

impl TransferObserver for ChannelObserver {
    fn on_state_change(&self, index: u32, status: SegmentStatus) {
        let _ = self
            .sender
            .send(TransferEvent::StateChanged { index, status });
    }

    fn on_progress(&self, index: u32, percent: u64, remaining: u64, total: u64) {
        let _ = self.sender.send(TransferEvent::Progress {
            index,
            percent,
            remaining,
            total,
        });
    }

    fn on_transfer_start(&self, index: u32) {
        let _ = self.sender.send(TransferEvent::TransferStarted { index });
    }

    fn on_transfer_complete(&self, index: u32) {
        let _ = self.sender.send(TransferEvent::TransferCompleted { index });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn no_observer_accepts_everything() {
        let observer = NoObserver;
        observer.on_state_change(0, SegmentStatus::Initialized);
        observer.on_progress(0, 50, 500, 1000);
        observer.on_transfer_start(0);
        observer.on_transfer_complete(0);
    }

    #[test]
    fn channel_observer_forwards_events_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = ChannelObserver::new(tx);

        observer.on_state_change(2, SegmentStatus::Initialized);
        observer.on_transfer_start(2);
        observer.on_progress(2, 10, 900, 1000);
        observer.on_transfer_complete(2);

        assert_eq!(
            rx.try_recv().unwrap(),
            TransferEvent::StateChanged {
                index: 2,
                status: SegmentStatus::Initialized
            }
        );
        assert_eq!(rx.try_recv().unwrap(), TransferEvent::TransferStarted { index: 2 });
        assert_eq!(
            rx.try_recv().unwrap(),
            TransferEvent::Progress {
                index: 2,
                percent: 10,
                remaining: 900,
                total: 1000
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            TransferEvent::TransferCompleted { index: 2 }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_observer_survives_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let observer = ChannelObserver::new(tx);
        observer.on_transfer_start(0);
    }
}
