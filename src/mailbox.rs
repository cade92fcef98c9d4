//! Single-slot "latest value" channel.
//!
//! Posting overwrites any value the receiver has not picked up yet, so a
//! slow consumer only ever sees the most recent value and nothing piles up.
//! Runtime-agnostic: built on a mutex-protected slot and an `AtomicWaker`.

use std::future::poll_fn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::Poll;

use futures::task::AtomicWaker;

struct Slot<T> {
    value: Mutex<Option<T>>,
    closed: AtomicBool,
    waker: AtomicWaker,
}

/// Create a connected sender/receiver pair.
pub(crate) fn mailbox<T>() -> (Sender<T>, Receiver<T>) {
    let slot = Arc::new(Slot {
        value: Mutex::new(None),
        closed: AtomicBool::new(false),
        waker: AtomicWaker::new(),
    });
    (
        Sender {
            slot: Arc::clone(&slot),
        },
        Receiver { slot },
    )
}

/// Posting half of a mailbox. Dropping it closes the mailbox.
pub(crate) struct Sender<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Sender<T> {
    /// Store `value` as the latest one. Returns true if it replaced a value
    /// that was never received.
    pub(crate) fn post(&self, value: T) -> bool {
        if self.is_closed() {
            return false;
        }
        let replaced = self
            .slot
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(value)
            .is_some();
        self.slot.waker.wake();
        replaced
    }

    /// Close the mailbox, discarding any value not yet received.
    pub(crate) fn close(&self) {
        self.slot.closed.store(true, Ordering::Release);
        self.slot
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.slot.waker.wake();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.slot.closed.load(Ordering::Acquire)
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Receiving half of a mailbox.
pub(crate) struct Receiver<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Receiver<T> {
    /// Wait for the next value. Returns `None` once the mailbox is closed.
    pub(crate) async fn recv(&mut self) -> Option<T> {
        poll_fn(|cx| {
            self.slot.waker.register(cx.waker());
            if self.slot.closed.load(Ordering::Acquire) {
                return Poll::Ready(None);
            }
            match self.take() {
                Some(value) => Poll::Ready(Some(value)),
                None => Poll::Pending,
            }
        })
        .await
    }

    fn take(&self) -> Option<T> {
        self.slot
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[cfg(all(test, feature = "runtime-tokio"))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_latest_value_wins() {
        let (tx, mut rx) = mailbox();
        assert!(!tx.post(1));
        assert!(tx.post(2));
        assert!(tx.post(3));
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_close_discards_pending() {
        let (tx, mut rx) = mailbox();
        tx.post("stale");
        tx.close();
        assert_eq!(rx.recv().await, None);
        assert!(!tx.post("late"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_drop_closes() {
        let (tx, mut rx) = mailbox::<u8>();
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_wakes_waiting_receiver() {
        let (tx, mut rx) = mailbox();
        let waiter = tokio::spawn(async move { rx.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.post(42);
        assert_eq!(waiter.await.unwrap(), Some(42));
    }
}
