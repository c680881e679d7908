//! Cooperative cancellation for the crawl
//!
//! A single [`CancelHandle`] owns the signal; every blocking step of the crawl
//! (HTTP requests, oracle calls, sleeps, gate acquisition) observes a cloned
//! [`CancelToken`] and unwinds once the signal fires.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

/// Returned by cancellable operations when the token fired first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Sending side of the cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Receiving side of the cancellation signal, cheap to clone
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/token pair
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    /// Fire the signal
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Another token observing this handle
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Fire the signal once `deadline` elapses
    ///
    /// The timer task ends early once every token has been dropped.
    pub fn cancel_after(&self, deadline: Duration) -> tokio::task::JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline) => {
                    tracing::warn!(deadline_secs = deadline.as_secs(), "Crawl deadline reached, cancelling");
                    let _ = tx.send(true);
                }
                _ = tx.closed() => {}
            }
        })
    }
}

impl CancelToken {
    /// A token that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether the signal has fired
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal fires
    ///
    /// Pends forever when the handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run `fut` unless the signal fires first
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Sleep for `duration` unless the signal fires first
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        if duration.is_zero() {
            return if self.is_cancelled() { Err(Cancelled) } else { Ok(()) };
        }
        self.run(tokio::time::sleep(duration)).await
    }
}
