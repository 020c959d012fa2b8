/*!
 * Buffer Handles
 * Caller-facing buffer references and operand conversion
 */

use super::tensor::{DType, Tensor, TensorMetadata};
use crate::core::errors::{ExecError, ExecResult};
use crate::slot::AsyncSlot;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Raw per-output value produced by a compiled artifact.
pub type RawResultSlot = Arc<AsyncSlot<Tensor, ExecError>>;

/// Reference to the device a buffer lives on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRef {
    name: Arc<str>,
}

impl DeviceRef {
    pub fn new(name: &str) -> Self {
        Self { name: Arc::from(name) }
    }

    /// The host CPU device.
    pub fn host() -> Self {
        Self::new("cpu:0")
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Caller-facing buffer handle.
///
/// Binds shape/type metadata and a device reference to a shared, possibly
/// still unresolved tensor value. Dispatch results use the same shape, so
/// an output of one call can be fed back as an operand of the next.
#[derive(Debug, Clone)]
pub struct BufferHandle {
    device: DeviceRef,
    metadata: TensorMetadata,
    value: RawResultSlot,
}

impl PartialEq for BufferHandle {
    /// Two handles are equal when they reference the same value cell with
    /// the same metadata on the same device.
    fn eq(&self, other: &Self) -> bool {
        self.device == other.device
            && self.metadata == other.metadata
            && Arc::ptr_eq(&self.value, &other.value)
    }
}

impl BufferHandle {
    pub fn new(device: DeviceRef, metadata: TensorMetadata, value: RawResultSlot) -> Self {
        Self {
            device,
            metadata,
            value,
        }
    }

    /// Wrap an already materialized tensor.
    pub fn available(device: DeviceRef, tensor: Tensor) -> Self {
        let metadata = tensor.metadata().clone();
        Self::new(device, metadata, AsyncSlot::resolved(tensor))
    }

    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    pub fn metadata(&self) -> &TensorMetadata {
        &self.metadata
    }

    pub fn value(&self) -> &RawResultSlot {
        &self.value
    }
}

/// A converted view of an operand buffer.
///
/// Holds the base address of the tensor storage rather than a borrow, so
/// descriptors can be captured by deferred continuations. The address is
/// valid only while the source buffer is alive; the dispatcher extends
/// buffer lifetimes until every in-flight result has resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandDescriptor {
    pub addr: usize,
    pub dtype: DType,
    pub shape: Vec<usize>,
    /// Row-major strides in elements.
    pub strides: Vec<usize>,
    pub len_bytes: usize,
}

impl OperandDescriptor {
    /// View the operand storage.
    ///
    /// # Safety
    ///
    /// The source buffer must still be alive and its storage unchanged.
    pub unsafe fn bytes(&self) -> &[u8] {
        std::slice::from_raw_parts(self.addr as *const u8, self.len_bytes)
    }
}

/// Convert one operand buffer into a descriptor.
///
/// Fails if the buffer value has not resolved, carries an error, or its
/// storage does not match its metadata.
pub fn convert_operand(index: usize, buffer: &BufferHandle) -> ExecResult<OperandDescriptor> {
    match buffer.value().peek() {
        None => Err(ExecError::OperandUnavailable { index }),
        Some(Err(err)) => Err(err.clone()),
        Some(Ok(tensor)) => {
            let metadata = tensor.metadata();
            if metadata.byte_size() != tensor.data().len() {
                return Err(ExecError::OperandConversion {
                    index,
                    reason: format!(
                        "storage holds {} bytes but metadata declares {}",
                        tensor.data().len(),
                        metadata.byte_size()
                    ),
                });
            }
            Ok(OperandDescriptor {
                addr: tensor.data().as_ptr() as usize,
                dtype: metadata.dtype,
                shape: metadata.shape.clone(),
                strides: metadata.row_major_strides(),
                len_bytes: tensor.data().len(),
            })
        }
    }
}

/// Convert every operand, failing the whole call on the first error.
pub fn convert_operands(operands: &[BufferHandle]) -> ExecResult<Vec<OperandDescriptor>> {
    let mut descriptors = Vec::with_capacity(operands.len());
    for (index, buffer) in operands.iter().enumerate() {
        descriptors.push(convert_operand(index, buffer)?);
    }
    debug!(operands = descriptors.len(), "converted operand buffers");
    Ok(descriptors)
}
