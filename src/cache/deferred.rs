//! Deferred Module
//!
//! Single-assignment outcome cell shared by every caller awaiting one lookup.

use tokio::sync::watch;

use crate::error::{CacheError, Result};

// == Deferred ==
/// Read side of a single-assignment cell holding a lookup outcome.
///
/// Any number of clones may await the same outcome. The cell is written once
/// through its [`Completer`].
#[derive(Debug)]
pub struct Deferred<V, E> {
    rx: watch::Receiver<Option<std::result::Result<V, E>>>,
}

// Manual impl: cloning a receiver does not require `V: Clone`.
impl<V, E> Clone for Deferred<V, E> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

/// Write side of a [`Deferred`].
///
/// Dropping a completer without calling [`Completer::complete`] wakes every
/// awaiter with [`CacheError::Interrupted`].
#[derive(Debug)]
pub struct Completer<V, E> {
    tx: watch::Sender<Option<std::result::Result<V, E>>>,
}

impl<V, E> Deferred<V, E>
where
    V: Clone,
    E: Clone,
{
    // == Constructors ==
    /// Creates an unresolved cell and the handle that resolves it.
    pub fn pending() -> (Self, Completer<V, E>) {
        let (tx, rx) = watch::channel(None);
        (Self { rx }, Completer { tx })
    }

    /// Creates a cell that is already resolved with `outcome`.
    pub fn resolved(outcome: std::result::Result<V, E>) -> Self {
        let (_tx, rx) = watch::channel(Some(outcome));
        Self { rx }
    }

    // == Wait ==
    /// Waits for the outcome.
    ///
    /// Returns immediately when the cell is already resolved.
    pub async fn wait(&self) -> Result<V, E> {
        let mut rx = self.rx.clone();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| CacheError::Interrupted)?
            .clone();

        match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err(err)) => Err(CacheError::Lookup(err)),
            None => Err(CacheError::Interrupted),
        }
    }

    // == Poll ==
    /// Returns the outcome if it is already known, without waiting.
    pub fn poll(&self) -> Option<std::result::Result<V, E>> {
        self.rx.borrow().clone()
    }

    /// Returns the value if the cell resolved successfully.
    pub fn success(&self) -> Option<V> {
        self.poll().and_then(std::result::Result::ok)
    }
}

impl<V, E> Deferred<V, E> {
    /// Returns true once an outcome has been written.
    pub fn is_resolved(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Returns true if the completer went away without writing an outcome.
    pub fn is_abandoned(&self) -> bool {
        !self.is_resolved() && self.rx.has_changed().is_err()
    }
}

impl<V, E> Completer<V, E> {
    // == Complete ==
    /// Writes the outcome and wakes every awaiter.
    pub fn complete(self, outcome: std::result::Result<V, E>) {
        // send_replace succeeds even when no receiver is left.
        self.tx.send_replace(Some(outcome));
    }
}
