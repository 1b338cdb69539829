//! Pluggable merge strategies.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type FirstSyncHook = Arc<dyn Fn(Vec<Value>) -> Vec<Value> + Send + Sync>;
type FullSyncHook = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Strategies reconciling remote responses with local data.
///
/// Both default to identity, which makes the remote response win
/// (last writer wins).
#[derive(Clone)]
pub struct MergeHooks {
    first_sync: FirstSyncHook,
    full_sync: FullSyncHook,
}

impl Default for MergeHooks {
    fn default() -> Self {
        Self {
            first_sync: Arc::new(|items| items),
            full_sync: Arc::new(|item| item),
        }
    }
}

impl fmt::Debug for MergeHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeHooks").finish_non_exhaustive()
    }
}

impl MergeHooks {
    /// Creates identity hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the hook applied to a bootstrap snapshot.
    pub fn with_merge_first_sync<F>(mut self, hook: F) -> Self
    where
        F: Fn(Vec<Value>) -> Vec<Value> + Send + Sync + 'static,
    {
        self.first_sync = Arc::new(hook);
        self
    }

    /// Replaces the hook applied to each replayed write's response.
    pub fn with_merge_full_sync<F>(mut self, hook: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.full_sync = Arc::new(hook);
        self
    }

    /// Applies the bootstrap hook.
    pub fn merge_first_sync(&self, items: Vec<Value>) -> Vec<Value> {
        (self.first_sync)(items)
    }

    /// Applies the per-record hook.
    pub fn merge_full_sync(&self, item: Value) -> Value {
        (self.full_sync)(item)
    }
}
