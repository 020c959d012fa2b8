/*!
 * Execution Context
 * Owns the compilation cache, host runtime, and dispatch wiring
 *
 * One context per execution session. The cache is a typed member of the
 * context rather than an entry in an ambient registry, so lookups are
 * direct field access instead of keyed lookups in shared global state.
 */

use crate::compile::{
    derive_key, CompilationCache, CompileRequest, Compiler, ExecutableSlot, FailurePolicy,
    KeyPolicy,
};
use crate::core::errors::CompileResult;
use crate::dispatch::{ExecutableDispatcher, ResultSlot};
use crate::exec::{BufferHandle, DeviceRef, JitExecutable};
use crate::host::{HostRuntime, InlineHost};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// An execution session.
///
/// Construct with [`ExecutionContext::builder`]; the compiler front end is
/// required, everything else has defaults.
pub struct ExecutionContext {
    session: Uuid,
    host: Arc<dyn HostRuntime>,
    compiler: Arc<dyn Compiler>,
    cache: CompilationCache,
    dispatcher: ExecutableDispatcher,
    device: DeviceRef,
    key_policy: KeyPolicy,
}

impl ExecutionContext {
    pub fn builder(compiler: Arc<dyn Compiler>) -> ExecutionContextBuilder {
        ExecutionContextBuilder::new(compiler)
    }

    /// Compile the requested unit, or return the cached slot for its key.
    ///
    /// Request validation happens synchronously before key derivation;
    /// invalid requests never enter the cache. The returned slot resolves
    /// once the background compilation finishes, and is shared by every
    /// caller whose request derives the same key.
    pub fn compile(&self, request: CompileRequest) -> CompileResult<ExecutableSlot> {
        let entrypoint = request.validated_entrypoint()?.to_owned();
        let key = derive_key(self.key_policy, &request);
        debug!(
            session = %self.session,
            key = %key,
            entrypoint = %entrypoint,
            "compile requested"
        );

        let mut options = request.options.clone();
        if options.worker_count.is_none() {
            options.worker_count = Some(self.host.worker_count());
        }

        let compiler = Arc::clone(&self.compiler);
        let unit = request.unit;
        Ok(self.cache.get_or_compile(key, &self.host, move || {
            compiler.compile(&unit, &entrypoint, &options)
        }))
    }

    /// Dispatch a compiled executable against operand buffers.
    pub fn execute(&self, jit: &JitExecutable, operands: &[BufferHandle]) -> Vec<ResultSlot> {
        self.dispatcher.dispatch(jit, operands)
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn cache(&self) -> &CompilationCache {
        &self.cache
    }

    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    pub fn host(&self) -> &Arc<dyn HostRuntime> {
        &self.host
    }

    pub fn key_policy(&self) -> KeyPolicy {
        self.key_policy
    }
}

/// Builder for [`ExecutionContext`]
pub struct ExecutionContextBuilder {
    compiler: Arc<dyn Compiler>,
    host: Arc<dyn HostRuntime>,
    device: DeviceRef,
    key_policy: KeyPolicy,
    failure_policy: FailurePolicy,
}

impl ExecutionContextBuilder {
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self {
            compiler,
            host: Arc::new(InlineHost),
            device: DeviceRef::host(),
            key_policy: KeyPolicy::default(),
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_host(mut self, host: Arc<dyn HostRuntime>) -> Self {
        self.host = host;
        self
    }

    pub fn with_device(mut self, device: DeviceRef) -> Self {
        self.device = device;
        self
    }

    pub fn with_key_policy(mut self, policy: KeyPolicy) -> Self {
        self.key_policy = policy;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn build(self) -> ExecutionContext {
        let session = Uuid::new_v4();
        info!(
            session = %session,
            device = %self.device,
            key_policy = ?self.key_policy,
            "execution context initialized"
        );
        ExecutionContext {
            session,
            dispatcher: ExecutableDispatcher::new(Arc::clone(&self.host), self.device.clone()),
            cache: CompilationCache::with_policy(self.failure_policy),
            host: self.host,
            compiler: self.compiler,
            device: self.device,
            key_policy: self.key_policy,
        }
    }
}
