/*!
 * Shared Test Fixtures
 * Stub collaborators for the compile and dispatch tests
 */

#![allow(dead_code)]

use jit_runtime::{
    AsyncSlot, BufferHandle, CompileError, CompileOptions, CompileResult, Compiler, DeviceRef,
    Executable, ExecError, FnExecutable, FunctionSignature, HostRuntime, HostTask, JitExecutable,
    OperandDescriptor, RawResultSlot, ResultSlot, SpecializedSlot, Specializer, Tensor,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Host runtime that queues tasks until the test drains them.
///
/// Makes "still compiling in the background" a deterministic state: nothing
/// enqueued runs before [`QueueHost::run_all`].
pub struct QueueHost {
    tasks: Mutex<Vec<HostTask>>,
}

impl QueueHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn queued(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Drain and run queued tasks, including tasks they enqueue in turn.
    pub fn run_all(&self) {
        loop {
            let drained: Vec<HostTask> = std::mem::take(&mut *self.tasks.lock());
            if drained.is_empty() {
                break;
            }
            for task in drained {
                task();
            }
        }
    }
}

impl HostRuntime for QueueHost {
    fn enqueue(&self, task: HostTask) {
        self.tasks.lock().push(task);
    }

    fn worker_count(&self) -> usize {
        2
    }
}

/// Compiler front end stub.
///
/// Units are line-oriented: `fn <name>: <kind>` with kinds `add_one`,
/// `double`, and `fail`. Counts invocations so tests can assert
/// single-flight behavior.
pub struct StubCompiler {
    compiles: AtomicUsize,
    delay: Option<Duration>,
}

impl StubCompiler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            compiles: AtomicUsize::new(0),
            delay: None,
        })
    }

    /// Sleep inside `compile` so concurrent callers race the compilation.
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            compiles: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    pub fn count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

impl Compiler for StubCompiler {
    fn compile(
        &self,
        unit: &str,
        entrypoint: &str,
        _options: &CompileOptions,
    ) -> CompileResult<JitExecutable> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let kind = unit
            .lines()
            .find_map(|line| {
                let rest = line.trim().strip_prefix("fn ")?;
                let (name, kind) = rest.split_once(':')?;
                (name.trim() == entrypoint).then(|| kind.trim().to_string())
            })
            .ok_or_else(|| CompileError::UnknownEntrypoint(entrypoint.to_string()))?;

        match kind.as_str() {
            "add_one" => Ok(elementwise_jit(entrypoint, |v| v + 1)),
            "double" => Ok(elementwise_jit(entrypoint, |v| v * 2)),
            "fail" => Err(CompileError::Frontend(format!(
                "kernel `{}` is unbuildable",
                entrypoint
            ))),
            other => Err(CompileError::Frontend(format!(
                "unknown kernel kind `{}`",
                other
            ))),
        }
    }
}

/// Elementwise i32 kernel with one operand and one result.
pub fn elementwise_jit<F>(entrypoint: &str, f: F) -> JitExecutable
where
    F: Fn(i32) -> i32 + Send + Sync + 'static,
{
    let artifact: Arc<dyn Executable> = Arc::new(FnExecutable::new(1, move |operands, results| {
        let values: Vec<i32> = read_i32(&operands[0]).into_iter().map(&f).collect();
        let shape = operands[0].shape.clone();
        results[0] = Some(AsyncSlot::resolved(Tensor::from_i32(shape, &values)));
    }));
    JitExecutable::new(
        entrypoint,
        FunctionSignature {
            num_operands: 1,
            num_results: 1,
        },
        artifact,
    )
}

/// Kernel whose outputs stay pending until the test resolves them.
///
/// Every dispatch appends its freshly issued raw result slots to the
/// returned list, in declared output order.
pub fn manual_jit(
    entrypoint: &str,
    num_operands: usize,
    num_results: usize,
) -> (JitExecutable, Arc<Mutex<Vec<RawResultSlot>>>) {
    let issued: Arc<Mutex<Vec<RawResultSlot>>> = Arc::new(Mutex::new(Vec::new()));
    let issued_in_kernel = Arc::clone(&issued);

    let artifact: Arc<dyn Executable> =
        Arc::new(FnExecutable::new(num_results, move |_, results| {
            let mut issued = issued_in_kernel.lock();
            for cell in results.iter_mut() {
                let slot: RawResultSlot = AsyncSlot::pending();
                issued.push(Arc::clone(&slot));
                *cell = Some(slot);
            }
        }));

    let jit = JitExecutable::new(
        entrypoint,
        FunctionSignature {
            num_operands,
            num_results,
        },
        artifact,
    );
    (jit, issued)
}

/// Specializer that materializes its artifact on the host runtime.
///
/// Under [`QueueHost`] the returned slot stays pending until the test
/// drains the queue, which exercises the deferred-executable path.
pub struct HostSpecializer {
    artifact: Arc<dyn Executable>,
}

impl HostSpecializer {
    pub fn new(artifact: Arc<dyn Executable>) -> Arc<Self> {
        Arc::new(Self { artifact })
    }
}

impl Specializer for HostSpecializer {
    fn specialize(
        &self,
        _operands: &[OperandDescriptor],
        host: &Arc<dyn HostRuntime>,
    ) -> SpecializedSlot {
        let slot: SpecializedSlot = AsyncSlot::pending();
        let resolved = Arc::clone(&slot);
        let artifact = Arc::clone(&self.artifact);
        host.enqueue(Box::new(move || resolved.resolve(artifact)));
        slot
    }
}

/// Specializer whose background step always fails.
pub struct FailingSpecializer;

impl Specializer for FailingSpecializer {
    fn specialize(
        &self,
        _operands: &[OperandDescriptor],
        host: &Arc<dyn HostRuntime>,
    ) -> SpecializedSlot {
        let slot: SpecializedSlot = AsyncSlot::pending();
        let resolved = Arc::clone(&slot);
        host.enqueue(Box::new(move || {
            resolved.fail(ExecError::Specialization(
                "no variant for operand shapes".to_string(),
            ));
        }));
        slot
    }
}

pub fn read_i32(descriptor: &OperandDescriptor) -> Vec<i32> {
    let bytes = unsafe { descriptor.bytes() };
    bytes
        .chunks_exact(4)
        .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn i32_buffer(values: &[i32]) -> BufferHandle {
    BufferHandle::available(DeviceRef::host(), Tensor::from_i32(vec![values.len()], values))
}

/// Await a result slot and return its tensor contents.
pub async fn wait_i32(slot: &ResultSlot) -> Vec<i32> {
    let result = slot.wait().await;
    let handle = result.as_ref().as_ref().expect("result carried an error");
    let tensor = handle.value().wait().await;
    tensor
        .as_ref()
        .as_ref()
        .expect("tensor carried an error")
        .to_i32_vec()
        .expect("expected an i32 tensor")
}

/// Read an already-resolved result slot without awaiting.
pub fn peek_i32(slot: &ResultSlot) -> Vec<i32> {
    let handle = match slot.peek() {
        Some(Ok(handle)) => handle,
        other => panic!("expected available result, got {:?}", other),
    };
    match handle.value().peek() {
        Some(Ok(tensor)) => tensor.to_i32_vec().expect("expected an i32 tensor"),
        other => panic!("expected available tensor, got {:?}", other),
    }
}
