/*!
 * Async Slots
 *
 * Single-assignment future cells used for every asynchronous value in the
 * runtime: compiled executables, specialized artifacts, raw kernel results,
 * and caller-facing buffer handles.
 *
 * ## State machine
 *
 * ```text
 *            resolve(value)
 * Pending ──────────────────▶ Resolved(T)
 *    │
 *    │       fail(error)
 *    └──────────────────────▶ Failed(E)
 * ```
 *
 * The transition happens exactly once. Resolving a slot twice is a
 * programming error and panics rather than being reported as a runtime
 * failure. Continuations registered while Pending fire once, in
 * registration order, on the thread that resolves the slot; continuations
 * registered after resolution run immediately on the registering thread.
 *
 * A resolved value never mutates again, so readers need no lock: the payload
 * is shared behind an `Arc` and observed through [`AsyncSlot::peek`].
 */

mod indirect;

pub use indirect::{IndirectSlot, SlotError};

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Resolved payload shared by every observer of a slot.
pub type SlotResult<T, E> = Arc<Result<T, E>>;

type Continuation<T, E> = Box<dyn FnOnce(SlotResult<T, E>) + Send>;

/// Single-assignment future cell.
///
/// Shared by reference counting: the producer and every observer hold an
/// `Arc<AsyncSlot<_, _>>` to the same cell.
pub struct AsyncSlot<T, E> {
    /// Resolved payload; written exactly once.
    value: OnceLock<SlotResult<T, E>>,
    /// Continuations registered before resolution; `None` once drained.
    waiters: Mutex<Option<Vec<Continuation<T, E>>>>,
}

impl<T, E> AsyncSlot<T, E> {
    /// Create an unresolved slot.
    pub fn pending() -> Arc<Self> {
        Arc::new(Self {
            value: OnceLock::new(),
            waiters: Mutex::new(Some(Vec::new())),
        })
    }

    /// Create a slot already holding a value.
    pub fn resolved(value: T) -> Arc<Self> {
        let slot = Self::pending();
        slot.resolve(value);
        slot
    }

    /// Create a slot already holding an error.
    pub fn failed(error: E) -> Arc<Self> {
        let slot = Self::pending();
        slot.fail(error);
        slot
    }

    /// Resolve the slot to a value.
    ///
    /// # Panics
    ///
    /// Panics if the slot was already resolved or failed.
    pub fn resolve(&self, value: T) {
        self.finish(Arc::new(Ok(value)));
    }

    /// Resolve the slot to an error.
    ///
    /// # Panics
    ///
    /// Panics if the slot was already resolved or failed.
    pub fn fail(&self, error: E) {
        self.finish(Arc::new(Err(error)));
    }

    /// Resolve with an already-shared payload. Used by forwarding so the
    /// placeholder and its target observe the identical allocation.
    pub(crate) fn resolve_shared(&self, result: SlotResult<T, E>) {
        self.finish(result);
    }

    fn finish(&self, result: SlotResult<T, E>) {
        let drained = {
            let mut waiters = self.waiters.lock();
            assert!(
                self.value.set(result.clone()).is_ok(),
                "async slot resolved more than once"
            );
            waiters.take().unwrap_or_default()
        };
        // Run continuations outside the lock, in registration order.
        for continuation in drained {
            continuation(result.clone());
        }
    }

    /// Synchronous inspection of the resolved payload, if any.
    pub fn peek(&self) -> Option<&Result<T, E>> {
        self.value.get().map(Arc::as_ref)
    }

    /// Whether the slot has left the Pending state.
    pub fn is_resolved(&self) -> bool {
        self.value.get().is_some()
    }

    /// Whether the slot resolved to an error.
    pub fn is_error(&self) -> bool {
        matches!(self.peek(), Some(Err(_)))
    }

    /// Register a continuation to run exactly once when the slot resolves.
    ///
    /// If the slot is already resolved the continuation runs immediately on
    /// the calling thread. Continuations registered while the slot is
    /// Pending run in registration order on the resolving thread.
    pub fn and_then<F>(&self, continuation: F)
    where
        F: FnOnce(SlotResult<T, E>) + Send + 'static,
    {
        {
            let mut waiters = self.waiters.lock();
            if let Some(list) = waiters.as_mut() {
                list.push(Box::new(continuation));
                return;
            }
        }
        let result = self
            .value
            .get()
            .expect("drained slot must hold a value")
            .clone();
        continuation(result);
    }
}

impl<T, E> AsyncSlot<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Await resolution without polling.
    ///
    /// Layered on [`AsyncSlot::and_then`]; the dispatch paths themselves
    /// never block on a slot.
    pub async fn wait(&self) -> SlotResult<T, E> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.and_then(move |result| {
            let _ = tx.send(result);
        });
        rx.await.expect("async slot dropped before resolution")
    }
}

impl<T, E> fmt::Debug for AsyncSlot<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.peek() {
            None => "Pending",
            Some(Ok(_)) => "Resolved",
            Some(Err(_)) => "Failed",
        };
        f.debug_struct("AsyncSlot").field("state", &state).finish()
    }
}

/// Run `on_ready` once every slot in `slots` has resolved.
///
/// The closure and everything it captures stay alive until it fires; the
/// dispatcher uses this to extend operand buffer lifetimes across deferred
/// results.
pub fn run_when_ready<T, E, F>(slots: &[Arc<AsyncSlot<T, E>>], on_ready: F)
where
    F: FnOnce() + Send + 'static,
{
    let pending: Vec<_> = slots
        .iter()
        .filter(|slot| !slot.is_resolved())
        .cloned()
        .collect();

    if pending.is_empty() {
        on_ready();
        return;
    }

    let remaining = Arc::new(AtomicUsize::new(pending.len()));
    let on_ready = Arc::new(Mutex::new(Some(on_ready)));

    for slot in pending {
        let remaining = Arc::clone(&remaining);
        let on_ready = Arc::clone(&on_ready);
        slot.and_then(move |_| {
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                if let Some(callback) = on_ready.lock().take() {
                    callback();
                }
            }
        });
    }
}
