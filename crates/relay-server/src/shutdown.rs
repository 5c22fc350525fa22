//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Signals the HTTP server, the sweeper, and socket loops to stop.
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Fresh coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Cancel the token, then give `handles` up to `within` to finish.
    ///
    /// Returns `false` if the window elapsed first. Handles still running at
    /// that point are left detached.
    pub async fn shutdown_and_wait(&self, handles: Vec<JoinHandle<()>>, within: Duration) -> bool {
        self.shutdown();
        let pending = handles.len();
        info!(pending, within = ?within, "stopping background tasks");

        match tokio::time::timeout(within, futures::future::join_all(handles)).await {
            Ok(results) => {
                for err in results.into_iter().filter_map(Result::err) {
                    warn!(error = %err, "background task ended abnormally");
                }
                true
            }
            Err(_) => {
                warn!(within = ?within, "background tasks still running after shutdown window");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_cancels_every_token() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.token();
        let t2 = coord.clone().token();
        assert!(!t1.is_cancelled());
        coord.shutdown();
        coord.shutdown();
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }

    #[tokio::test]
    async fn waits_for_listeners_to_stop() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });
        assert!(
            coord
                .shutdown_and_wait(vec![handle], Duration::from_secs(5))
                .await
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_window() {
        let coord = ShutdownCoordinator::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        let finished = coord
            .shutdown_and_wait(vec![handle], Duration::from_millis(100))
            .await;
        assert!(!finished);
        assert!(coord.token().is_cancelled());
    }
}
