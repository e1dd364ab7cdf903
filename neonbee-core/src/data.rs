//! Request data model shared by producers and the caching core.

use crate::{new_correlation_id, CacheKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

// ============================================================================
// QUERY
// ============================================================================

/// Kind of operation a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataAction {
    Create,
    #[default]
    Read,
    Update,
    Delete,
}

/// A data request's query: action, path, parameters, headers and body.
///
/// Parameters and headers are kept in ordered maps so two queries with the
/// same content always serialize identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DataQuery {
    pub action: DataAction,
    pub uri_path: String,
    pub parameters: BTreeMap<String, Vec<String>>,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: Vec<u8>,
}

impl DataQuery {
    pub fn new(uri_path: impl Into<String>) -> Self {
        Self {
            uri_path: uri_path.into(),
            ..Default::default()
        }
    }

    pub fn with_action(mut self, action: DataAction) -> Self {
        self.action = action;
        self
    }

    /// Append a value to a (possibly multi-valued) parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a parameter, if any.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// A sub-request a producer declares during the requirement phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataRequest {
    /// Qualified name of the producer that should serve the sub-request.
    pub target: String,
    pub query: DataQuery,
}

impl DataRequest {
    pub fn new(target: impl Into<String>, query: DataQuery) -> Self {
        Self {
            target: target.into(),
            query,
        }
    }
}

/// Results of resolved sub-requests, keyed by target.
pub type DataMap = HashMap<String, Value>;

// ============================================================================
// VOLATILE CACHE REGISTER
// ============================================================================

/// Request-scoped handoff between the requirement and retrieval phases.
///
/// When the requirement phase finds a cached value it stashes it here so the
/// retrieval phase of the same request can return it without a second cache
/// read, which might otherwise observe an eviction in between. Entries are
/// removed as soon as they are read back. Entries are scoped by producer type
/// so two producers serving the same request never see each other's values.
#[derive(Default)]
pub struct VolatileCacheRegister {
    entries: Mutex<HashMap<(String, CacheKey), Box<dyn Any + Send + Sync>>>,
}

impl VolatileCacheRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stash<T: Any + Send + Sync>(&self, scope: &str, key: CacheKey, value: T) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert((scope.to_string(), key), Box::new(value));
    }

    /// Remove and return the stashed value, if one of type `T` is present.
    pub fn take<T: Any + Send + Sync>(&self, scope: &str, key: &CacheKey) -> Option<T> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let stashed = entries.remove(&(scope.to_string(), key.clone()))?;
        stashed.downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for VolatileCacheRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolatileCacheRegister")
            .field("entries", &self.len())
            .finish()
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

/// Per-request context travelling with a query through both phases.
///
/// Cloning is cheap and clones share the volatile cache register.
#[derive(Debug, Clone)]
pub struct DataContext {
    correlation_id: String,
    principal: Option<Map<String, Value>>,
    data: Map<String, Value>,
    register: Arc<VolatileCacheRegister>,
}

impl Default for DataContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DataContext {
    pub fn new() -> Self {
        Self {
            correlation_id: new_correlation_id(),
            principal: None,
            data: Map::new(),
            register: Arc::new(VolatileCacheRegister::new()),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Attach the authenticated principal's attributes.
    pub fn with_principal(mut self, principal: Map<String, Value>) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn principal(&self) -> Option<&Map<String, Value>> {
        self.principal.as_ref()
    }

    /// Arbitrary context data shared between producers of one request.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn put_data(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn volatile_register(&self) -> &VolatileCacheRegister {
        &self.register
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(s: &str) -> CacheKey {
        CacheKey::from_string(s)
    }

    #[test]
    fn test_query_builder_collects_multi_valued_parameters() {
        let query = DataQuery::new("/books")
            .with_parameter("tag", "rust")
            .with_parameter("tag", "async")
            .with_header("accept", "application/json")
            .with_body("payload");

        assert_eq!(query.action, DataAction::Read);
        assert_eq!(query.parameters["tag"], vec!["rust", "async"]);
        assert_eq!(query.parameter("tag"), Some("rust"));
        assert_eq!(query.parameter("missing"), None);
        assert_eq!(query.body, b"payload".to_vec());
    }

    #[test]
    fn test_register_take_removes_entry() {
        let register = VolatileCacheRegister::new();
        register.stash("books", key("k1"), 42_u32);
        assert_eq!(register.len(), 1);

        assert_eq!(register.take::<u32>("books", &key("k1")), Some(42));
        assert!(register.is_empty());
        assert_eq!(register.take::<u32>("books", &key("k1")), None);
    }

    #[test]
    fn test_register_is_scoped_by_producer() {
        let register = VolatileCacheRegister::new();
        register.stash("books", key("shared"), "from-books".to_string());
        register.stash("authors", key("shared"), "from-authors".to_string());

        assert_eq!(
            register.take::<String>("authors", &key("shared")).as_deref(),
            Some("from-authors")
        );
        assert_eq!(
            register.take::<String>("books", &key("shared")).as_deref(),
            Some("from-books")
        );
    }

    #[test]
    fn test_register_type_mismatch_yields_none() {
        let register = VolatileCacheRegister::new();
        register.stash("books", key("k"), 1_u64);
        assert_eq!(register.take::<String>("books", &key("k")), None);
    }

    #[test]
    fn test_context_clones_share_register() {
        let mut ctx = DataContext::new().with_correlation_id("corr-1");
        ctx.put_data("tenant", json!("acme"));
        let clone = ctx.clone();

        ctx.volatile_register().stash("books", key("k"), 7_i32);
        assert_eq!(clone.volatile_register().take::<i32>("books", &key("k")), Some(7));
        assert_eq!(clone.correlation_id(), "corr-1");
        assert_eq!(clone.data()["tenant"], json!("acme"));
    }

    #[test]
    fn test_fresh_contexts_do_not_share_register() {
        let a = DataContext::new();
        let b = DataContext::new();
        a.volatile_register().stash("books", key("k"), 1_i32);
        assert_eq!(b.volatile_register().take::<i32>("books", &key("k")), None);
        assert_ne!(a.correlation_id(), b.correlation_id());
    }
}
