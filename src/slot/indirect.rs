/*!
 * Indirect Slots
 * Placeholder cells redirected exactly once to a concrete result
 */

use super::{AsyncSlot, SlotResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Forwarding errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    #[error("indirect slot has already been forwarded")]
    AlreadyForwarded,
}

/// A result placeholder issued before its value exists.
///
/// Observers obtain the placeholder's [`IndirectSlot::slot`] view and treat
/// it like any other [`AsyncSlot`]: continuations registered before
/// forwarding still fire, using the forwarded value, once the target
/// resolves. Forwarding is a one-time redirection; a second attempt is
/// rejected with [`SlotError::AlreadyForwarded`].
pub struct IndirectSlot<T, E> {
    inner: Arc<AsyncSlot<T, E>>,
    forwarded: AtomicBool,
}

impl<T, E> IndirectSlot<T, E> {
    pub fn new() -> Self {
        Self {
            inner: AsyncSlot::pending(),
            forwarded: AtomicBool::new(false),
        }
    }

    /// Observer view of the placeholder.
    ///
    /// Once forwarded this slot behaves identically to the target for all
    /// observers, including those that registered continuations before
    /// forwarding occurred.
    pub fn slot(&self) -> Arc<AsyncSlot<T, E>> {
        Arc::clone(&self.inner)
    }

    pub fn is_forwarded(&self) -> bool {
        self.forwarded.load(Ordering::Acquire)
    }

    /// Redirect the placeholder to `target`.
    ///
    /// If `target` is already resolved the placeholder resolves immediately
    /// with the identical shared payload; otherwise it resolves whenever
    /// `target` does.
    pub fn forward_to(&self, target: &Arc<AsyncSlot<T, E>>) -> Result<(), SlotError>
    where
        T: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        self.claim()?;
        let inner = Arc::clone(&self.inner);
        target.and_then(move |result: SlotResult<T, E>| inner.resolve_shared(result));
        Ok(())
    }

    /// Forward directly to a known error, consuming the single redirection.
    pub fn forward_error(&self, error: E) -> Result<(), SlotError> {
        self.claim()?;
        self.inner.fail(error);
        Ok(())
    }

    fn claim(&self) -> Result<(), SlotError> {
        self.forwarded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| SlotError::AlreadyForwarded)
    }
}

impl<T, E> Default for IndirectSlot<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Drop for IndirectSlot<T, E> {
    fn drop(&mut self) {
        if !self.forwarded.load(Ordering::Acquire) && !self.inner.is_resolved() {
            log::debug!("indirect slot dropped before forwarding; observers will never fire");
        }
    }
}
