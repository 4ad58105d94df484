//! One-directional snapshot channel between producer and consumer contexts.
//!
//! The bridge keeps only the latest unconsumed snapshot and drops older
//! ones: a consumer slower than its producer observes the newest value and
//! misses the intermediate ticks. The display only ever projects the latest
//! state, so that policy is deliberate — callers must not assume every tick
//! is rendered.
//!
//! Both consumer shapes are supported: pull via
//! [`SnapshotReceiver::latest`] (the sync half of the watch API needs no
//! runtime, so a UI event loop can call it directly) and push via
//! [`SnapshotReceiver::deliver`], which feeds a callback per arrival.

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::snapshot::Snapshot;

/// The other side of the bridge is gone.
#[derive(Debug, Error)]
#[error("snapshot bridge closed")]
pub struct BridgeClosed;

/// Creates a connected sender/receiver pair with no snapshot yet.
pub fn channel() -> (SnapshotSender, SnapshotReceiver) {
    let (tx, rx) = watch::channel(None);
    (SnapshotSender { tx }, SnapshotReceiver { rx })
}

/// Producer half: forwards one snapshot per tick.
#[derive(Debug)]
pub struct SnapshotSender {
    tx: watch::Sender<Option<Snapshot>>,
}

impl SnapshotSender {
    /// Replaces the latest unconsumed snapshot.
    pub fn send(&self, snapshot: Snapshot) -> Result<(), BridgeClosed> {
        self.tx.send(Some(snapshot)).map_err(|_| BridgeClosed)
    }

    /// Whether any consumer is still attached.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Consumer half.
#[derive(Debug, Clone)]
pub struct SnapshotReceiver {
    rx: watch::Receiver<Option<Snapshot>>,
}

impl SnapshotReceiver {
    /// Pull shape: the latest snapshot, or `None` before the first tick.
    pub fn latest(&mut self) -> Option<Snapshot> {
        self.rx.borrow_and_update().clone()
    }

    /// Whether a snapshot newer than the last [`latest`](Self::latest) or
    /// delivery has arrived.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Waits for the next unseen snapshot.
    pub async fn changed(&mut self) -> Result<Snapshot, BridgeClosed> {
        loop {
            self.rx.changed().await.map_err(|_| BridgeClosed)?;
            if let Some(snapshot) = self.rx.borrow_and_update().clone() {
                return Ok(snapshot);
            }
        }
    }

    /// Push shape: invokes `on_snapshot` for each arrival, in arrival order,
    /// until `cancel` fires or the producer goes away.
    pub async fn deliver<F>(mut self, cancel: CancellationToken, mut on_snapshot: F)
    where
        F: FnMut(Snapshot),
    {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = self.changed() => match changed {
                    Ok(snapshot) => on_snapshot(snapshot),
                    Err(BridgeClosed) => break,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Clock;

    fn snapshot_with_stack(stack: u8) -> Snapshot {
        Snapshot {
            stack,
            ..Snapshot::default()
        }
    }

    #[test]
    fn empty_until_first_send() {
        let (_tx, mut rx) = channel();
        assert!(rx.latest().is_none());
        assert!(!rx.has_changed());
    }

    #[test]
    fn slow_consumer_sees_only_the_latest() {
        let (tx, mut rx) = channel();
        tx.send(snapshot_with_stack(1)).unwrap();
        tx.send(snapshot_with_stack(2)).unwrap();
        tx.send(snapshot_with_stack(3)).unwrap();

        assert_eq!(rx.latest().unwrap().stack, 3);
        // The intermediate snapshots were dropped, not queued.
        assert!(!rx.has_changed());
    }

    #[tokio::test]
    async fn changed_waits_for_unseen_snapshots() {
        let (tx, mut rx) = channel();
        tx.send(snapshot_with_stack(5)).unwrap();
        assert_eq!(rx.changed().await.unwrap().stack, 5);

        tx.send(snapshot_with_stack(6)).unwrap();
        assert_eq!(rx.changed().await.unwrap().stack, 6);
    }

    #[tokio::test]
    async fn changed_reports_closure() {
        let (tx, mut rx) = channel();
        drop(tx);
        assert!(rx.changed().await.is_err());
    }

    #[tokio::test]
    async fn deliver_feeds_the_callback_until_the_producer_is_gone() {
        let (tx, rx) = channel();
        let cancel = CancellationToken::new();
        let consumer = tokio::spawn(async move {
            let mut seen = Vec::new();
            rx.deliver(cancel, |snapshot| seen.push(snapshot.stack)).await;
            seen
        });

        tx.send(snapshot_with_stack(1)).unwrap();
        tokio::task::yield_now().await;
        tx.send(snapshot_with_stack(2)).unwrap();
        drop(tx);

        let seen = consumer.await.unwrap();
        assert_eq!(seen.last(), Some(&2));
    }

    #[tokio::test]
    async fn deliver_stops_on_cancel() {
        let (tx, rx) = channel();
        let cancel = CancellationToken::new();
        let consumer = tokio::spawn(rx.deliver(cancel.clone(), |_| {}));

        cancel.cancel();
        consumer.await.unwrap();
        assert!(!tx.is_open());
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let mut snapshot = Snapshot {
            clock: Clock::Ticks(65),
            stack: 4,
            history: vec!["mov %b %a".to_string()],
            ..Snapshot::default()
        };
        snapshot.registers[0][0] = true;

        let (tx, mut rx) = channel();
        tx.send(snapshot.clone()).unwrap();
        assert_eq!(rx.latest().unwrap(), snapshot);
    }
}
