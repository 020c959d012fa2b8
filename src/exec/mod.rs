/*!
 * Executables
 * Compiled artifacts, specialization, and the invocation contract
 */

mod buffer;
mod tensor;

pub use buffer::{
    convert_operand, convert_operands, BufferHandle, DeviceRef, OperandDescriptor, RawResultSlot,
};
pub use tensor::{DType, Tensor, TensorMetadata};

use crate::core::errors::{ExecError, ExecResult};
use crate::host::HostRuntime;
use crate::slot::AsyncSlot;
use std::fmt;
use std::sync::Arc;

/// A specialized executable that may still be materializing.
pub type SpecializedSlot = Arc<AsyncSlot<Arc<dyn Executable>, ExecError>>;

/// Operand and result arity of a compiled function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FunctionSignature {
    pub num_operands: usize,
    pub num_results: usize,
}

/// An opaque compiled artifact.
///
/// Invocation contract: `execute` must place one [`RawResultSlot`] into
/// every cell of `results`, resolved now or later. The dispatcher treats a
/// cell left empty as a contract violation, distinguishable from a
/// legitimate runtime error.
pub trait Executable: Send + Sync + 'static {
    fn num_results(&self) -> usize;

    fn execute(&self, operands: &[OperandDescriptor], results: &mut [Option<RawResultSlot>]);
}

/// Produces a variant of an executable tailored to specific operands.
///
/// Specialization may run in the background: the returned slot can be
/// pending, and dispatch continues through indirect result placeholders
/// until it resolves.
pub trait Specializer: Send + Sync + 'static {
    fn specialize(
        &self,
        operands: &[OperandDescriptor],
        host: &Arc<dyn HostRuntime>,
    ) -> SpecializedSlot;
}

/// A cached compilation product.
///
/// Immutable after creation. Holds the default artifact and, optionally, a
/// specializer that can produce operand-tailored variants asynchronously.
pub struct JitExecutable {
    entrypoint: String,
    signature: FunctionSignature,
    default: Arc<dyn Executable>,
    specializer: Option<Arc<dyn Specializer>>,
}

impl JitExecutable {
    pub fn new(
        entrypoint: impl Into<String>,
        signature: FunctionSignature,
        default: Arc<dyn Executable>,
    ) -> Self {
        Self {
            entrypoint: entrypoint.into(),
            signature,
            default,
            specializer: None,
        }
    }

    pub fn with_specializer(mut self, specializer: Arc<dyn Specializer>) -> Self {
        self.specializer = Some(specializer);
        self
    }

    pub fn entrypoint(&self) -> &str {
        &self.entrypoint
    }

    pub fn signature(&self) -> FunctionSignature {
        self.signature
    }

    pub fn num_results(&self) -> usize {
        self.signature.num_results
    }

    /// Get an executable that might be specialized to the operands.
    ///
    /// Without a specializer the default artifact is returned in an
    /// already-resolved slot, which keeps warm dispatches on the fast path.
    pub fn executable_for(
        &self,
        operands: &[OperandDescriptor],
        host: &Arc<dyn HostRuntime>,
    ) -> ExecResult<SpecializedSlot> {
        if operands.len() != self.signature.num_operands {
            return Err(ExecError::ArityMismatch {
                expected: self.signature.num_operands,
                actual: operands.len(),
            });
        }
        match &self.specializer {
            None => Ok(AsyncSlot::resolved(Arc::clone(&self.default))),
            Some(specializer) => Ok(specializer.specialize(operands, host)),
        }
    }
}

impl fmt::Debug for JitExecutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JitExecutable")
            .field("entrypoint", &self.entrypoint)
            .field("signature", &self.signature)
            .field("specialized", &self.specializer.is_some())
            .finish()
    }
}

/// Executable backed by a plain function.
///
/// The bridge between compiled artifacts and host-side kernels; also the
/// workhorse of the test suite.
pub struct FnExecutable {
    num_results: usize,
    run: Box<dyn Fn(&[OperandDescriptor], &mut [Option<RawResultSlot>]) + Send + Sync>,
}

impl FnExecutable {
    pub fn new<F>(num_results: usize, run: F) -> Self
    where
        F: Fn(&[OperandDescriptor], &mut [Option<RawResultSlot>]) + Send + Sync + 'static,
    {
        Self {
            num_results,
            run: Box::new(run),
        }
    }
}

impl Executable for FnExecutable {
    fn num_results(&self) -> usize {
        self.num_results
    }

    fn execute(&self, operands: &[OperandDescriptor], results: &mut [Option<RawResultSlot>]) {
        (self.run)(operands, results)
    }
}
