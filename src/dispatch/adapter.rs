/*!
 * Result Adapter
 * Three-path delivery from raw kernel results to caller-facing handles
 *
 * Per declared output, delivery picks among:
 * 1. error fast path: the raw slot already failed, bind the error now
 * 2. available fast path: the raw value is already resolved, construct the
 *    handle now with synchronously extracted metadata
 * 3. deferred path: register a continuation that constructs the handle (or
 *    forwards the error) once the raw slot resolves
 *
 * Collapsing to "always defer" would add scheduling latency to warm calls;
 * assuming synchronous completion would be unsafe whenever specialization
 * or the artifact itself defers work.
 */

use crate::core::errors::ExecError;
use crate::exec::{BufferHandle, DeviceRef, RawResultSlot};
use crate::slot::AsyncSlot;
use std::sync::Arc;

/// Caller-facing per-output result.
pub type ResultSlot = Arc<AsyncSlot<BufferHandle, ExecError>>;

/// Converts raw per-output async values into caller-facing buffer handles.
#[derive(Debug, Clone)]
pub struct ResultAdapter {
    device: DeviceRef,
}

impl ResultAdapter {
    pub fn new(device: DeviceRef) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    /// Deliver the raw result `raw` into the caller-facing slot `out`.
    ///
    /// Returns true when delivery took the deferred path, which is the
    /// signal that operand lifetimes must outlive this call.
    pub fn deliver(&self, raw: &RawResultSlot, out: &ResultSlot) -> bool {
        match raw.peek() {
            // Error fast path.
            Some(Err(err)) => {
                out.fail(err.clone());
                false
            }
            // Available fast path: metadata extracted synchronously.
            Some(Ok(tensor)) => {
                out.resolve(BufferHandle::new(
                    self.device.clone(),
                    tensor.metadata().clone(),
                    Arc::clone(raw),
                ));
                false
            }
            // Deferred path.
            None => {
                let device = self.device.clone();
                let raw_ref = Arc::clone(raw);
                let out = Arc::clone(out);
                raw.and_then(move |result| match result.as_ref() {
                    Ok(tensor) => out.resolve(BufferHandle::new(
                        device,
                        tensor.metadata().clone(),
                        raw_ref,
                    )),
                    Err(err) => out.fail(err.clone()),
                });
                true
            }
        }
    }
}
