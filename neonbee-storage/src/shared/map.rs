//! In-process async map.

use async_trait::async_trait;
use neonbee_core::{AsyncMap, NeonBeeResult, ValueSet};
use std::collections::{HashMap, HashSet};

/// In-memory [`AsyncMap`] shared by every node of a single process.
///
/// Uses tokio::sync::RwLock for safe async access.
#[derive(Debug)]
pub struct LocalAsyncMap {
    name: String,
    entries: tokio::sync::RwLock<HashMap<String, ValueSet>>,
}

impl LocalAsyncMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AsyncMap for LocalAsyncMap {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> NeonBeeResult<Option<ValueSet>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, values: ValueSet) -> NeonBeeResult<()> {
        self.entries.write().await.insert(key.to_string(), values);
        Ok(())
    }

    async fn remove(&self, key: &str) -> NeonBeeResult<Option<ValueSet>> {
        Ok(self.entries.write().await.remove(key))
    }

    async fn clear(&self) -> NeonBeeResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn entries(&self) -> NeonBeeResult<HashMap<String, ValueSet>> {
        Ok(self.entries.read().await.clone())
    }

    async fn keys(&self) -> NeonBeeResult<HashSet<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_remove() {
        let map = LocalAsyncMap::new("entities");
        assert_eq!(map.name(), "entities");
        assert!(map.get("k").await.unwrap().is_none());

        map.put("k", vec![json!("a")]).await.unwrap();
        assert_eq!(map.get("k").await.unwrap(), Some(vec![json!("a")]));

        assert_eq!(map.remove("k").await.unwrap(), Some(vec![json!("a")]));
        assert!(map.is_empty().await);
    }

    #[tokio::test]
    async fn test_entries_and_keys_snapshot() {
        let map = LocalAsyncMap::new("entities");
        map.put("a", vec![json!(1)]).await.unwrap();
        map.put("b", vec![json!(2)]).await.unwrap();

        let keys = map.keys().await.unwrap();
        assert_eq!(keys, ["a", "b"].iter().map(|s| s.to_string()).collect());

        let entries = map.entries().await.unwrap();
        assert_eq!(entries["b"], vec![json!(2)]);

        map.clear().await.unwrap();
        assert_eq!(map.len().await, 0);
    }
}
