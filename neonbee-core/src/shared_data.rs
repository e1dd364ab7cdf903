//! Shared-data contracts: cluster-wide async maps and named locks.
//!
//! The registry stack stores every entry as a key mapped to a set of values.
//! Values are `serde_json::Value` so any transport that can carry JSON-like
//! primitives satisfies the contract.

use crate::{LockProvider, NeonBeeResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A value set stored under one registry key. Insertion-ordered, no duplicates.
pub type ValueSet = Vec<Value>;

/// Cluster-wide asynchronous map from string keys to value sets.
///
/// Individual operations are atomic, read-modify-write sequences are not.
/// Callers needing atomic updates wrap them in a named lock.
#[async_trait]
pub trait AsyncMap: Send + Sync {
    /// Name of the map within its shared-data provider.
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> NeonBeeResult<Option<ValueSet>>;

    async fn put(&self, key: &str, values: ValueSet) -> NeonBeeResult<()>;

    /// Remove a key, returning the previous value set.
    async fn remove(&self, key: &str) -> NeonBeeResult<Option<ValueSet>>;

    async fn clear(&self) -> NeonBeeResult<()>;

    /// Snapshot of all entries.
    async fn entries(&self) -> NeonBeeResult<HashMap<String, ValueSet>>;

    async fn keys(&self) -> NeonBeeResult<HashSet<String>>;
}

/// Provider of named async maps and named locks.
#[async_trait]
pub trait SharedData: LockProvider {
    /// Get (creating on first use) the async map called `name`.
    async fn async_map(&self, name: &str) -> NeonBeeResult<Arc<dyn AsyncMap>>;
}

/// Add `values` to `set`, skipping values already present.
///
/// Returns the number of values actually added.
pub fn union_into(set: &mut ValueSet, values: impl IntoIterator<Item = Value>) -> usize {
    let mut added = 0;
    for value in values {
        if !set.contains(&value) {
            set.push(value);
            added += 1;
        }
    }
    added
}

/// Remove every value in `values` from `set`.
///
/// Returns the number of values actually removed.
pub fn difference_in_place(set: &mut ValueSet, values: &[Value]) -> usize {
    let before = set.len();
    set.retain(|existing| !values.contains(existing));
    before - set.len()
}
