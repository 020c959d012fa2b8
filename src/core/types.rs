/*!
 * Core Types
 * Common identifier types used across the runtime
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key identifying a unique compilation unit in the cache.
///
/// Two requests with equal keys observe the same compiled artifact (or the
/// same cached error). How a key is derived from a request is governed by
/// [`crate::compile::KeyPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompilationKey(pub u64);

impl fmt::Display for CompilationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Call-site token attached to a compile request.
///
/// Only consulted under [`crate::compile::KeyPolicy::CallSite`], which keys
/// the cache by position instead of content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationId(pub u64);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loc:{}", self.0)
    }
}
