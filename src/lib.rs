/*!
 * JIT Runtime Library
 * Asynchronous compilation cache and executable dispatch
 */

pub mod compile;
pub mod context;
pub mod core;
pub mod dispatch;
pub mod exec;
pub mod host;
pub mod monitoring;
pub mod slot;

// Re-exports
pub use crate::compile::{
    derive_key, CacheStats, CompilationCache, CompileOptions, CompileRequest, Compiler,
    ExecutableSlot, FailurePolicy, KeyPolicy, OptLevel,
};
pub use crate::context::{ExecutionContext, ExecutionContextBuilder};
pub use crate::core::errors::{CompileError, CompileResult, ExecError, ExecResult};
pub use crate::core::types::{CompilationKey, LocationId};
pub use crate::dispatch::{ExecutableDispatcher, ResultAdapter, ResultSlot};
pub use crate::exec::{
    convert_operand, convert_operands, BufferHandle, DType, DeviceRef, Executable, FnExecutable,
    FunctionSignature, JitExecutable, OperandDescriptor, RawResultSlot, SpecializedSlot,
    Specializer, Tensor, TensorMetadata,
};
pub use crate::host::{HostRuntime, HostTask, InlineHost, TokioHost};
pub use crate::monitoring::init_tracing;
pub use crate::slot::{run_when_ready, AsyncSlot, IndirectSlot, SlotError, SlotResult};
