//! 缓存后端能力接口
//!
use super::pattern::glob_match;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

/// 缓存后端：两个操作都应当幂等
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// 删除匹配 glob/前缀模式的全部键
    async fn delete_by_pattern(&self, pattern: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl<T> CacheBackend for Arc<T>
where
    T: CacheBackend + ?Sized,
{
    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        (**self).delete(key).await
    }

    async fn delete_by_pattern(&self, pattern: &str) -> anyhow::Result<()> {
        (**self).delete_by_pattern(pattern).await
    }
}

/// 内存缓存后端（测试、示例与本地开发）
#[derive(Clone, Default)]
pub struct InMemoryCacheBackend {
    entries: Arc<DashMap<String, Value>>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_by_pattern(&self, pattern: &str) -> anyhow::Result<()> {
        self.entries.retain(|key, _| !glob_match(pattern, key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn delete_by_pattern_only_touches_matching_keys() {
        let cache = InMemoryCacheBackend::new();
        cache.insert("user:u1", json!({"name": "a"}));
        cache.insert("user:u1:stats", json!(1));
        cache.insert("user:u2:stats", json!(2));

        cache.delete_by_pattern("user:u1:*").await.unwrap();
        assert!(cache.contains("user:u1"));
        assert!(!cache.contains("user:u1:stats"));
        assert!(cache.contains("user:u2:stats"));

        cache.delete("user:u1").await.unwrap();
        cache.delete("user:u1").await.unwrap();
        assert_eq!(cache.len(), 1);
    }
}
