/*!
 * Compilation Cache
 * Race-free single-flight cache from compilation key to executable slot
 */

use crate::core::errors::CompileError;
use crate::core::types::CompilationKey;
use crate::exec::JitExecutable;
use crate::host::HostRuntime;
use crate::slot::AsyncSlot;
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared reference to the eventual compilation product for a key.
pub type ExecutableSlot = Arc<AsyncSlot<JitExecutable, CompileError>>;

/// What happens to a cache entry whose compilation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// A failed compilation permanently poisons the entry; every current
    /// and future caller of the key observes the cached error.
    #[default]
    Poison,
    /// A caller observing a failed entry replaces it and becomes the new
    /// single-flight winner for the key.
    Retry,
}

/// Outcome of find-or-allocate for one caller.
///
/// `allocated` is true for exactly one caller per entry creation; that
/// caller is responsible for scheduling the compilation that resolves the
/// slot. Everyone else simply holds a reference and observes resolution
/// through normal slot mechanics.
pub struct CacheEntry {
    pub slot: ExecutableSlot,
    pub allocated: bool,
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    compiles: AtomicU64,
    failures: AtomicU64,
}

/// Compilation cache with single-flight semantics.
///
/// Entries live for the lifetime of the cache; there is no eviction. The
/// entry map is the only lock-synchronized shared state in the subsystem,
/// and find-or-allocate is atomic with respect to concurrent callers.
///
/// # Performance
/// - Cache-line aligned for optimal access in hot dispatch paths
#[repr(C, align(64))]
pub struct CompilationCache {
    entries: DashMap<CompilationKey, ExecutableSlot, RandomState>,
    policy: FailurePolicy,
    counters: Arc<CacheCounters>,
}

impl CompilationCache {
    pub fn new() -> Self {
        Self::with_policy(FailurePolicy::default())
    }

    pub fn with_policy(policy: FailurePolicy) -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
            policy,
            counters: Arc::new(CacheCounters::default()),
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Look up an existing entry.
    ///
    /// Returns a new reference to the slot regardless of its state; a
    /// pending, resolved, or failed entry is returned as-is.
    pub fn find(&self, key: CompilationKey) -> Option<ExecutableSlot> {
        match self.entries.get(&key) {
            Some(slot) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&slot))
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Atomically find or create the entry for `key`.
    ///
    /// Exactly one caller sees `allocated == true` per entry creation;
    /// callers racing on the same key receive the winner's slot. Under
    /// [`FailurePolicy::Retry`] an entry observed in the failed state is
    /// replaced, and the replacing caller wins the new flight.
    pub fn find_or_allocate(&self, key: CompilationKey) -> CacheEntry {
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let slot = Arc::clone(occupied.get());
                if self.policy == FailurePolicy::Retry && slot.is_error() {
                    debug!(key = %key, "replacing poisoned cache entry for retry");
                    let fresh: ExecutableSlot = AsyncSlot::pending();
                    occupied.insert(Arc::clone(&fresh));
                    CacheEntry {
                        slot: fresh,
                        allocated: true,
                    }
                } else {
                    CacheEntry {
                        slot,
                        allocated: false,
                    }
                }
            }
            Entry::Vacant(vacant) => {
                debug!(key = %key, "allocating cache entry");
                let slot: ExecutableSlot = AsyncSlot::pending();
                vacant.insert(Arc::clone(&slot));
                CacheEntry {
                    slot,
                    allocated: true,
                }
            }
        }
    }

    /// Resolve-or-compile with single-flight semantics.
    ///
    /// If an entry exists it is returned immediately, whatever its state.
    /// Otherwise the calling thread that wins allocation schedules
    /// `compile_fn` on the host runtime; the background task resolves the
    /// slot to the executable or captures the error into it. Losing racers
    /// receive the same slot without scheduling anything.
    pub fn get_or_compile<F>(
        &self,
        key: CompilationKey,
        host: &Arc<dyn HostRuntime>,
        compile_fn: F,
    ) -> ExecutableSlot
    where
        F: FnOnce() -> Result<JitExecutable, CompileError> + Send + 'static,
    {
        // Fast path: the entry already exists in any state.
        if let Some(slot) = self.find(key) {
            if self.policy == FailurePolicy::Poison || !slot.is_error() {
                return slot;
            }
        }

        let entry = self.find_or_allocate(key);

        // We lost the race; some other caller schedules the compilation.
        if !entry.allocated {
            return entry.slot;
        }

        self.counters.compiles.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::clone(&entry.slot);
        let counters = Arc::clone(&self.counters);
        host.enqueue(Box::new(move || match compile_fn() {
            Ok(executable) => {
                debug!(key = %key, entrypoint = executable.entrypoint(), "compilation finished");
                slot.resolve(executable);
            }
            Err(err) => {
                warn!(key = %key, error = %err, "compilation failed; caching error");
                counters.failures.fetch_add(1, Ordering::Relaxed);
                slot.fail(err);
            }
        }));

        entry.slot
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            compiles: self.counters.compiles.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for CompilationCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for the compilation cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub compiles: u64,
    pub failures: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cache Stats: {} entries, {} hits, {} misses, {} compiles, {} failures",
            self.entries, self.hits, self.misses, self.compiles, self.failures
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{Executable, FnExecutable, FunctionSignature, Tensor};
    use crate::host::InlineHost;
    use crate::slot::AsyncSlot as Slot;

    fn test_executable() -> JitExecutable {
        let artifact: Arc<dyn Executable> = Arc::new(FnExecutable::new(1, |_, results| {
            results[0] = Some(Slot::resolved(Tensor::from_i32(vec![1], &[0])));
        }));
        JitExecutable::new(
            "main",
            FunctionSignature {
                num_operands: 0,
                num_results: 1,
            },
            artifact,
        )
    }

    fn inline_host() -> Arc<dyn HostRuntime> {
        Arc::new(InlineHost)
    }

    #[test]
    fn test_allocate_then_share() {
        let cache = CompilationCache::new();
        let key = CompilationKey(1);

        let winner = cache.find_or_allocate(key);
        assert!(winner.allocated);

        let loser = cache.find_or_allocate(key);
        assert!(!loser.allocated);
        assert!(Arc::ptr_eq(&winner.slot, &loser.slot));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_or_compile_resolves_inline() {
        let cache = CompilationCache::new();
        let key = CompilationKey(7);

        let slot = cache.get_or_compile(key, &inline_host(), || Ok(test_executable()));
        assert!(slot.is_resolved());
        assert_eq!(slot.peek().unwrap().as_ref().unwrap().entrypoint(), "main");
        assert_eq!(cache.stats().compiles, 1);
    }

    #[test]
    fn test_resolved_entry_is_never_recompiled() {
        let cache = CompilationCache::new();
        let key = CompilationKey(7);
        let host = inline_host();

        let first = cache.get_or_compile(key, &host, || Ok(test_executable()));
        let second = cache.get_or_compile(key, &host, || {
            panic!("compile_fn must not run for a resolved key")
        });

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().compiles, 1);
    }

    #[test]
    fn test_poison_policy_keeps_failed_entry() {
        let cache = CompilationCache::new();
        let key = CompilationKey(3);
        let host = inline_host();

        let slot = cache.get_or_compile(key, &host, || {
            Err(CompileError::Frontend("parse error".to_string()))
        });
        assert!(slot.is_error());

        let again = cache.get_or_compile(key, &host, || {
            panic!("poisoned key must not be retried")
        });
        assert!(Arc::ptr_eq(&slot, &again));
        assert_eq!(cache.stats().failures, 1);
    }

    #[test]
    fn test_retry_policy_replaces_failed_entry() {
        let cache = CompilationCache::with_policy(FailurePolicy::Retry);
        let key = CompilationKey(3);
        let host = inline_host();

        let failed = cache.get_or_compile(key, &host, || {
            Err(CompileError::Frontend("transient".to_string()))
        });
        assert!(failed.is_error());

        let retried = cache.get_or_compile(key, &host, || Ok(test_executable()));
        assert!(!Arc::ptr_eq(&failed, &retried));
        assert!(retried.is_resolved());
        assert!(!retried.is_error());
        assert_eq!(cache.stats().compiles, 2);
        // Only one entry for the key, even after replacement.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stats_counts_hits_and_misses() {
        let cache = CompilationCache::new();
        let key = CompilationKey(9);

        assert!(cache.find(key).is_none());
        cache.get_or_compile(key, &inline_host(), || Ok(test_executable()));
        assert!(cache.find(key).is_some());

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert!(stats.hits >= 1);
        assert!(stats.misses >= 1);
        assert!(stats.hit_rate() > 0.0);
    }
}
