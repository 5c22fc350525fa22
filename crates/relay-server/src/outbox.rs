//! Per-connection outbound queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Sending half of one connection's bounded frame queue.
///
/// A writer task owns the receiver and drains it onto the socket, so frames
/// reach a given connection in the order they were queued.
pub struct Outbox {
    tx: mpsc::Sender<Arc<String>>,
    /// Whether the peer has answered since the last heartbeat check.
    is_alive: AtomicBool,
    /// When the last Pong (or any frame) was received.
    last_pong: Mutex<Instant>,
    /// Frames skipped because the queue was full or closed.
    dropped: AtomicU64,
    /// Cancelled when the broadcaster gives up on a slow consumer.
    evicted: CancellationToken,
}

impl Outbox {
    /// Wrap an existing sender.
    pub fn new(tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            tx,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(Instant::now()),
            dropped: AtomicU64::new(0),
            evicted: CancellationToken::new(),
        }
    }

    /// New outbox plus the receiver its writer task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Queue one frame without waiting.
    ///
    /// Returns `false` if the queue is full or closed, and counts the drop.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Lifetime count of skipped frames.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Record that the peer is responsive.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag. `true` if the peer answered since the
    /// previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the peer last answered.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Ask the connection's session loop to close.
    pub fn evict(&self) {
        self.evicted.cancel();
    }

    /// Whether [`Outbox::evict`] has been called.
    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }

    /// Token that fires on eviction.
    pub fn eviction(&self) -> CancellationToken {
        self.evicted.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_in_order() {
        let (outbox, mut rx) = Outbox::channel(8);
        assert!(outbox.send(Arc::new("a".into())));
        assert!(outbox.send(Arc::new("b".into())));
        assert_eq!(&*rx.recv().await.unwrap(), "a");
        assert_eq!(&*rx.recv().await.unwrap(), "b");
        assert_eq!(outbox.drop_count(), 0);
    }

    #[test]
    fn full_queue_counts_drop() {
        let (outbox, _rx) = Outbox::channel(1);
        assert!(outbox.send(Arc::new("first".into())));
        assert!(!outbox.send(Arc::new("second".into())));
        assert_eq!(outbox.drop_count(), 1);
    }

    #[test]
    fn closed_queue_counts_drop() {
        let (outbox, rx) = Outbox::channel(4);
        drop(rx);
        assert!(!outbox.send(Arc::new("x".into())));
        assert_eq!(outbox.drop_count(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (outbox, _rx) = Outbox::channel(0);
        assert!(outbox.send(Arc::new("x".into())));
    }

    #[test]
    fn check_alive_resets_flag() {
        let (outbox, _rx) = Outbox::channel(1);
        assert!(outbox.check_alive());
        assert!(!outbox.check_alive());
        outbox.mark_alive();
        assert!(outbox.check_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn last_pong_elapsed_tracks_mark_alive() {
        let (outbox, _rx) = Outbox::channel(1);
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(outbox.last_pong_elapsed() >= Duration::from_secs(45));
        outbox.mark_alive();
        assert!(outbox.last_pong_elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn evict_fires_token() {
        let (outbox, _rx) = Outbox::channel(1);
        let token = outbox.eviction();
        assert!(!outbox.is_evicted());
        outbox.evict();
        assert!(outbox.is_evicted());
        assert!(token.is_cancelled());
    }
}
