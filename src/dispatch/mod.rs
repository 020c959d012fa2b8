/*!
 * Executable Dispatch
 *
 * Runs a compiled artifact against operand buffers and delivers one result
 * slot per declared output.
 *
 * ## Paths
 *
 * ```text
 * ┌──────────────┐
 * │   dispatch   │
 * └──────┬───────┘
 *        │
 *        ├── executable_for(operands) ──┐
 *        │                              │
 *    ┌───▼─────┐                 ┌──────▼──────┐
 *    │ Resolved │                 │   Pending   │
 *    └───┬─────┘                 └──────┬──────┘
 *        │ run inline                   │ indirect placeholders,
 *        │                              │ dispatch when ready,
 *        │                              │ forward exactly once
 *        └────────────┬─────────────────┘
 *                     │
 *              ┌──────▼──────┐
 *              │ ResultSlots │
 *              └─────────────┘
 * ```
 *
 * The calling thread never blocks: either the fast paths complete
 * synchronously or continuations are registered and the call returns.
 */

mod adapter;

pub use adapter::{ResultAdapter, ResultSlot};

use crate::core::errors::ExecError;
use crate::exec::{
    convert_operands, BufferHandle, DeviceRef, Executable, JitExecutable, OperandDescriptor,
    RawResultSlot,
};
use crate::host::HostRuntime;
use crate::monitoring::span_dispatch;
use crate::slot::{run_when_ready, AsyncSlot, IndirectSlot};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Dispatches compiled artifacts over operand buffers.
#[derive(Clone)]
pub struct ExecutableDispatcher {
    host: Arc<dyn HostRuntime>,
    adapter: ResultAdapter,
}

impl ExecutableDispatcher {
    pub fn new(host: Arc<dyn HostRuntime>, device: DeviceRef) -> Self {
        Self {
            host,
            adapter: ResultAdapter::new(device),
        }
    }

    /// Dispatch `jit` against `operands`.
    ///
    /// Always returns one slot per declared output, in declared order.
    /// Conversion and specialization errors are broadcast to every slot;
    /// execution errors are carried per output.
    pub fn dispatch(&self, jit: &JitExecutable, operands: &[BufferHandle]) -> Vec<ResultSlot> {
        let num_results = jit.num_results();
        let span = span_dispatch(jit.entrypoint(), num_results);
        let _guard = span.enter();

        // Extract descriptors from the operand buffers to pass them as the
        // compiled kernel arguments.
        let descriptors = match convert_operands(operands) {
            Ok(descriptors) => descriptors,
            Err(err) => {
                span.record_error(&err.to_string());
                return broadcast_error(num_results, err);
            }
        };

        // Get an executable that might be specialized to the operands.
        let executable = match jit.executable_for(&descriptors, &self.host) {
            Ok(slot) => slot,
            Err(err) => {
                span.record_error(&err.to_string());
                return broadcast_error(num_results, err);
            }
        };

        // If the executable is available, execute it inline.
        if let Some(ready) = executable.peek() {
            return match ready {
                Err(err) => {
                    span.record_error(&err.to_string());
                    broadcast_error(num_results, err.clone())
                }
                Ok(artifact) => {
                    span.record_deferred(false);
                    let outs: Vec<ResultSlot> =
                        (0..num_results).map(|_| AsyncSlot::pending()).collect();
                    self.run_ready(artifact, &descriptors, operands, &outs);
                    outs
                }
            };
        }

        // Otherwise execute it when the executable becomes available. The
        // continuation captures lifetime-extended copies of the operands,
        // descriptors, and result placeholders.
        span.record_deferred(true);
        let placeholders: Vec<IndirectSlot<BufferHandle, ExecError>> =
            (0..num_results).map(|_| IndirectSlot::new()).collect();
        let outs: Vec<ResultSlot> = placeholders.iter().map(IndirectSlot::slot).collect();

        let dispatcher = self.clone();
        let operands: Vec<BufferHandle> = operands.to_vec();
        let trace_id = span.trace_id().to_string();
        executable.and_then(move |resolved| {
            debug!(trace_id = %trace_id, "deferred executable resolved; dispatching");
            match resolved.as_ref() {
                Err(err) => {
                    warn!(
                        trace_id = %trace_id,
                        error = %err,
                        "specialization failed; broadcasting to placeholders"
                    );
                    for placeholder in &placeholders {
                        if placeholder.forward_error(err.clone()).is_err() {
                            error!(trace_id = %trace_id, "result placeholder already forwarded");
                        }
                    }
                }
                Ok(artifact) => {
                    let fresh: Vec<ResultSlot> = (0..placeholders.len())
                        .map(|_| AsyncSlot::pending())
                        .collect();
                    dispatcher.run_ready(artifact, &descriptors, &operands, &fresh);

                    // Forward the previously issued placeholders to the
                    // freshly produced results, exactly once each.
                    for (placeholder, target) in placeholders.iter().zip(&fresh) {
                        if placeholder.forward_to(target).is_err() {
                            error!(trace_id = %trace_id, "result placeholder already forwarded");
                        }
                    }
                }
            }
        });

        outs
    }

    /// Invoke an available artifact and adapt its raw results into `outs`.
    fn run_ready(
        &self,
        artifact: &Arc<dyn Executable>,
        descriptors: &[OperandDescriptor],
        operands: &[BufferHandle],
        outs: &[ResultSlot],
    ) {
        let declared = outs.len();

        // Storage for the raw kernel results, one cell per declared output.
        let mut raw: Vec<Option<RawResultSlot>> = vec![None; declared];
        artifact.execute(descriptors, &mut raw);

        let mut deferred = false;
        for (index, out) in outs.iter().enumerate() {
            match &raw[index] {
                Some(slot) => deferred |= self.adapter.deliver(slot, out),
                None => {
                    // The artifact broke its populate-every-output contract.
                    error!(index = index, "executable did not populate declared result");
                    out.fail(ExecError::UnpopulatedResult { index });
                }
            }
        }

        // Keep operands alive while any result is still in flight.
        if deferred {
            let keepalive: Vec<BufferHandle> = operands.to_vec();
            let raw_slots: Vec<RawResultSlot> = raw.into_iter().flatten().collect();
            run_when_ready(&raw_slots, move || drop(keepalive));
        }
    }
}

/// Broadcast one error to every declared result of a call.
fn broadcast_error(num_results: usize, error: ExecError) -> Vec<ResultSlot> {
    warn!(
        error = %error,
        results = num_results,
        "broadcasting error to all declared results"
    );
    (0..num_results)
        .map(|_| AsyncSlot::failed(error.clone()))
        .collect()
}
