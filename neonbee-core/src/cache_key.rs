//! Cache keys and the default key computation.
//!
//! The default key is the ordered tuple `(user identifier, query)`. The user
//! identifier is looked up in the principal's attributes using a fixed,
//! order-sensitive list of candidate attribute names.

use crate::{DataContext, DataQuery, NeonBeeResult, SharedDataError};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

/// Attribute names (before case variants) that may carry a user identifier.
const USER_IDENTIFIER_BASE_NAMES: &[&str] = &[
    "user",
    "userid",
    "user_id",
    "userIdentifier",
    "user_identifier",
    "username",
    "user_name",
];

/// Candidate principal attributes, in lookup order.
///
/// Each base name contributes itself, its lowercase and uppercase forms and
/// a capitalized form; duplicates are dropped keeping the first position.
pub static USER_IDENTIFIER_ATTRIBUTES: Lazy<Vec<String>> = Lazy::new(|| {
    let mut names: Vec<String> = Vec::new();
    for base in USER_IDENTIFIER_BASE_NAMES {
        for variant in [
            base.to_string(),
            base.to_lowercase(),
            base.to_uppercase(),
            capitalize(base),
        ] {
            if !names.contains(&variant) {
                names.push(variant);
            }
        }
    }
    names
});

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Extract the identity a cache key is scoped to.
///
/// - no principal: `null`
/// - first matching candidate attribute: that attribute's value
/// - no candidate present: the whole principal map
pub fn user_identifier(principal: Option<&Map<String, Value>>) -> Value {
    let Some(principal) = principal else {
        return Value::Null;
    };

    USER_IDENTIFIER_ATTRIBUTES
        .iter()
        .find_map(|name| principal.get(name))
        .map(canonicalize)
        .unwrap_or_else(|| canonicalize(&Value::Object(principal.clone())))
}

/// Rebuild a value with object keys in sorted order, so equal content always
/// serializes identically whatever the map implementation.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Opaque, hashable cache key.
///
/// Keys are compared by their canonical serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    repr: Arc<str>,
}

impl CacheKey {
    /// Build a key from any serializable tuple of key dimensions.
    pub fn from_parts<T: Serialize + ?Sized>(parts: &T) -> NeonBeeResult<Self> {
        let repr = serde_json::to_string(parts).map_err(|e| SharedDataError::Serialization {
            reason: e.to_string(),
        })?;
        Ok(Self::from_string(repr))
    }

    /// Wrap an already-canonical string.
    pub fn from_string(repr: impl AsRef<str>) -> Self {
        Self {
            repr: Arc::from(repr.as_ref()),
        }
    }

    /// Default key for a request: `(user identifier, query)`.
    pub fn for_request(query: &DataQuery, context: &DataContext) -> NeonBeeResult<Self> {
        let user = user_identifier(context.principal());
        Self::from_parts(&(user, query))
    }

    pub fn as_str(&self) -> &str {
        &self.repr
    }

    /// Stable non-cryptographic hash of the serialized key.
    ///
    /// Used to name coalescing locks. Collisions only make unrelated keys
    /// coalesce; lookups always use the full key.
    pub fn stable_hash(&self) -> u64 {
        xxh3_64(self.repr.as_bytes())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}
