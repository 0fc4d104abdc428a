//! The role cache: a `cached::TimedCache` in front of a pluggable
//! `RoleSource`, behind a `tokio::sync::Mutex` and shared via `Arc`. No
//! negative caching, no single-flight -- both are explicitly optional.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cached::{Cached, TimedCache};
use gqiam_core::Role;
use tokio::sync::Mutex;
use tracing::instrument;

#[async_trait]
pub trait RoleSource: Send + Sync {
    async fn get_one(&self, name: &str) -> Result<Option<Role>, anyhow::Error>;
    /// A requested name the source doesn't return is silently omitted.
    async fn get_many(&self, names: &[String]) -> Result<Vec<Role>, anyhow::Error>;
}

pub struct RoleCache<S> {
    source: S,
    cache: Mutex<TimedCache<String, Role>>,
}

impl<S: RoleSource> RoleCache<S> {
    pub fn new(source: S, ttl: Duration) -> Self {
        Self { source, cache: Mutex::new(TimedCache::with_lifespan(ttl.as_secs())) }
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn get_one(&self, name: &str) -> Result<Option<Role>, anyhow::Error> {
        if let Some(role) = self.cache.lock().await.cache_get(&name.to_string()) {
            tracing::trace!(name, "role cache hit");
            return Ok(Some(role.clone()));
        }
        tracing::trace!(name, "role cache miss");
        let fetched = self.source.get_one(name).await?;
        if let Some(role) = &fetched {
            self.cache.lock().await.cache_set(name.to_string(), role.clone());
        }
        Ok(fetched)
    }

    /// Cached entries are returned directly; the unresolved remainder is
    /// fetched in one call to the source.
    #[instrument(level = "trace", skip(self, names))]
    pub async fn get_many(&self, names: &[String]) -> Result<Vec<Role>, anyhow::Error> {
        let mut resolved = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        {
            let mut cache = self.cache.lock().await;
            for name in names {
                match cache.cache_get(name) {
                    Some(role) => resolved.push(role.clone()),
                    None => missing.push(name.clone()),
                }
            }
        }

        if !missing.is_empty() {
            let fetched = self.source.get_many(&missing).await?;
            let mut cache = self.cache.lock().await;
            for role in fetched {
                cache.cache_set(role.name.clone(), role.clone());
                resolved.push(role);
            }
        }

        Ok(resolved)
    }

    pub async fn invalidate(&self, name: &str) {
        self.cache.lock().await.cache_remove(name);
    }

    pub async fn purge(&self) {
        self.cache.lock().await.cache_clear();
    }

    /// Runs until the `Arc` is dropped elsewhere; the periodic purge pass is
    /// just a full clear on its own schedule, distinct from per-entry TTL
    /// expiry that already happens lazily on `Get`.
    pub async fn run_purge_loop(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            self.purge().await;
            tracing::debug!("role cache purge pass completed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqiam_core::Policy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn role(name: &str) -> Role {
        Role { name: name.to_string(), policies: Vec::<Policy>::new() }
    }

    struct CountingSource {
        calls: AtomicUsize,
        roles: Vec<Role>,
    }

    #[async_trait]
    impl RoleSource for CountingSource {
        async fn get_one(&self, name: &str) -> Result<Option<Role>, anyhow::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.roles.iter().find(|r| r.name == name).cloned())
        }

        async fn get_many(&self, names: &[String]) -> Result<Vec<Role>, anyhow::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.roles.iter().filter(|r| names.contains(&r.name)).cloned().collect())
        }
    }

    #[tokio::test]
    async fn cache_hit_avoids_a_second_source_call() {
        let source = CountingSource { calls: AtomicUsize::new(0), roles: vec![role("admin")] };
        let cache = RoleCache::new(source, Duration::from_secs(300));

        assert!(cache.get_one("admin").await.unwrap().is_some());
        assert!(cache.get_one("admin").await.unwrap().is_some());
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_many_fetches_only_the_missing_remainder() {
        let source =
            CountingSource { calls: AtomicUsize::new(0), roles: vec![role("admin"), role("auditor")] };
        let cache = RoleCache::new(source, Duration::from_secs(300));

        cache.get_one("admin").await.unwrap();
        let all = cache.get_many(&["admin".to_string(), "auditor".to_string()]).await.unwrap();
        assert_eq!(all.len(), 2);
        // One call from `get_one`, one from `get_many` fetching only "auditor".
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unresolved_name_is_silently_omitted() {
        let source = CountingSource { calls: AtomicUsize::new(0), roles: vec![role("admin")] };
        let cache = RoleCache::new(source, Duration::from_secs(300));

        let result = cache.get_many(&["admin".to_string(), "ghost".to_string()]).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "admin");
    }

    #[tokio::test]
    async fn invalidate_forces_a_re_fetch() {
        let source = CountingSource { calls: AtomicUsize::new(0), roles: vec![role("admin")] };
        let cache = RoleCache::new(source, Duration::from_secs(300));

        cache.get_one("admin").await.unwrap();
        cache.invalidate("admin").await;
        cache.get_one("admin").await.unwrap();
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn purge_empties_the_whole_cache() {
        let source =
            CountingSource { calls: AtomicUsize::new(0), roles: vec![role("admin"), role("auditor")] };
        let cache = RoleCache::new(source, Duration::from_secs(300));

        cache.get_one("admin").await.unwrap();
        cache.get_one("auditor").await.unwrap();
        cache.purge().await;
        cache.get_one("admin").await.unwrap();
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 3);
    }
}
