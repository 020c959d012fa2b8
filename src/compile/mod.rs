/*!
 * Compilation
 * Compile requests, key derivation, and the single-flight cache
 */

mod cache;

pub use cache::{CacheEntry, CacheStats, CompilationCache, ExecutableSlot, FailurePolicy};

use crate::core::errors::{CompileError, CompileResult};
use crate::core::types::{CompilationKey, LocationId};
use crate::exec::JitExecutable;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Compiler front end collaborator.
///
/// Invoked at most once per compilation key; the cache owns that guarantee.
pub trait Compiler: Send + Sync + 'static {
    fn compile(
        &self,
        unit: &str,
        entrypoint: &str,
        options: &CompileOptions,
    ) -> CompileResult<JitExecutable>;
}

/// Options forwarded to the compiler front end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Worker threads available to the compiler. When unset, filled in from
    /// the host runtime's worker count.
    pub worker_count: Option<usize>,
    pub opt_level: OptLevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptLevel {
    None,
    #[default]
    Default,
    Aggressive,
}

/// A request to compile one unit of source code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRequest {
    /// Serialized compilation unit.
    pub unit: String,
    /// Symbols referencing the function to compile. Exactly one must be
    /// given; anything else is a validation error raised before scheduling.
    pub entrypoints: Vec<String>,
    pub options: CompileOptions,
    /// Call-site token, consulted only under [`KeyPolicy::CallSite`].
    pub location: LocationId,
}

impl CompileRequest {
    pub fn new(unit: impl Into<String>, entrypoint: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            entrypoints: vec![entrypoint.into()],
            options: CompileOptions::default(),
            location: LocationId::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_location(mut self, location: LocationId) -> Self {
        self.location = location;
        self
    }

    /// The single entrypoint symbol, or a validation error.
    pub fn validated_entrypoint(&self) -> CompileResult<&str> {
        match self.entrypoints.as_slice() {
            [single] => Ok(single),
            other => Err(CompileError::InvalidEntrypoints(other.len())),
        }
    }
}

/// How compilation keys are derived from requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KeyPolicy {
    /// Hash of the serialized unit plus its entrypoint symbols. Textually
    /// identical units share a cache entry wherever they appear.
    #[default]
    ContentHash,
    /// The caller-provided call-site token. Identical units at different
    /// call sites compile separately, and a changed unit reusing a call
    /// site hits the stale entry; kept for compatibility with callers that
    /// key by position.
    CallSite,
}

/// Derive the cache key for a request under the given policy.
pub fn derive_key(policy: KeyPolicy, request: &CompileRequest) -> CompilationKey {
    match policy {
        KeyPolicy::CallSite => CompilationKey(request.location.0),
        KeyPolicy::ContentHash => {
            let mut hasher = DefaultHasher::new();
            request.unit.hash(&mut hasher);
            request.entrypoints.hash(&mut hasher);
            CompilationKey(hasher.finish())
        }
    }
}
