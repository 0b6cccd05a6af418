//! Polled results of asynchronous work.
//!
//! Tile content and tile-tree properties arrive through a [`PendingResult`].
//! Frame traversal calls [`PendingResult::poll`] and never blocks; work that
//! finishes between frames is observed on the next one.
//!
//! ```
//! use tileview::request::{PendingResult, Poll};
//!
//! let (sender, pending) = PendingResult::channel();
//! assert!(matches!(pending.poll(), Poll::Pending));
//!
//! sender.send(42);
//! assert!(matches!(pending.poll(), Poll::Ready(42)));
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

/// Outcome of polling a [`PendingResult`].
#[derive(Debug, PartialEq)]
pub enum Poll<T> {
    /// Still running.
    Pending,
    /// Finished. Returned once; later polls report `Disconnected`.
    Ready(T),
    /// The producer went away without a result, or the result was already taken.
    Disconnected,
}

/// Cooperative cancellation flag shared between a request and its producer.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Handle to a value that becomes available later.
pub struct PendingResult<T> {
    receiver: Receiver<T>,
    cancel: CancelToken,
}

impl<T: Send + 'static> PendingResult<T> {
    /// Runs `work` on a background thread. The closure receives the request's
    /// cancel token and should return early once it is canceled.
    pub fn spawn<F>(work: F) -> Self
    where
        F: FnOnce(&CancelToken) -> T + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let cancel = CancelToken::new();
        let token = cancel.clone();

        std::thread::spawn(move || {
            let result = work(&token);
            // The handle may have been dropped; nobody is waiting then
            let _ = sender.send(result);
        });

        Self { receiver, cancel }
    }
}

impl<T> PendingResult<T> {
    /// A result that is available on the first poll.
    pub fn ready(value: T) -> Self {
        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(value);
        Self {
            receiver,
            cancel: CancelToken::new(),
        }
    }

    /// A result completed by hand through the returned [`ResultSender`].
    pub fn channel() -> (ResultSender<T>, Self) {
        let (sender, receiver) = mpsc::channel();
        let cancel = CancelToken::new();
        (
            ResultSender {
                sender,
                cancel: cancel.clone(),
            },
            Self { receiver, cancel },
        )
    }

    pub fn poll(&self) -> Poll<T> {
        match self.receiver.try_recv() {
            Ok(value) => Poll::Ready(value),
            Err(TryRecvError::Empty) => Poll::Pending,
            Err(TryRecvError::Disconnected) => Poll::Disconnected,
        }
    }

    /// Asks the producer to stop. The result, if one still arrives, is ignored
    /// by the caller.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

/// Producer side of [`PendingResult::channel`].
pub struct ResultSender<T> {
    sender: Sender<T>,
    cancel: CancelToken,
}

impl<T> ResultSender<T> {
    /// Delivers the result. Returns false if the handle was dropped.
    pub fn send(self, value: T) -> bool {
        self.sender.send(value).is_ok()
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }
}
