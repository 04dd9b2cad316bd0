use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Rendered output keyed by name, valid for as long as the index generation
/// it was rendered from is current.
pub struct GenerationCache<T> {
    cache: Option<RwLock<CacheMap<T>>>,
}

type CacheMap<T> = HashMap<String, CacheValue<T>>;

struct CacheValue<T> {
    generation: i64,
    value: Arc<T>,
}

impl<T> GenerationCache<T> {
    pub fn new() -> Self {
        GenerationCache {
            cache: Some(RwLock::new(HashMap::new())),
        }
    }

    pub fn non_caching() -> Self {
        GenerationCache {
            cache: None,
        }
    }

    pub fn get(&self, key: &str, generation: i64) -> Option<Arc<T>> {
        let cache = self.cache.as_ref()?.read().unwrap_or_else(PoisonError::into_inner);
        cache.get(key)
            .filter(|cached| cached.generation >= generation)
            .map(|cached| cached.value.clone())
    }

    pub fn add(&self, key: &str, generation: i64, content: T) -> Arc<T> {
        let value = Arc::new(content);
        if let Some(ref cache) = self.cache {
            let mut cache = cache.write().unwrap_or_else(PoisonError::into_inner);
            cache.insert(key.to_string(), CacheValue {
                generation,
                value: value.clone(),
            });
        }
        value
    }

    /// Returns the cached value or renders and stores a new one.
    pub fn get_or<E, F>(&self, key: &str, generation: i64, render: F) -> Result<Arc<T>, E>
        where F: FnOnce() -> Result<T, E>
    {
        if let Some(value) = self.get(key, generation) {
            return Ok(value);
        }
        Ok(self.add(key, generation, render()?))
    }
}

impl<T> Default for GenerationCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_add_and_get() {
        let cache = GenerationCache::new();
        let cached = cache.add("rss", 10, "feed".to_string());
        assert_eq!(Arc::strong_count(&cached), 2);

        assert_eq!(cache.get("rss", 10).unwrap().as_str(), "feed");
        assert_eq!(cache.get("rss", 9).unwrap().as_str(), "feed");
        assert!(cache.get("rss", 11).is_none());
        assert!(cache.get("sitemap", 10).is_none());
    }

    #[test]
    fn test_get_or_renders_once_per_generation() {
        let cache = GenerationCache::new();
        let mut renders = 0;
        let mut render = |generation: i64| {
            cache.get_or("rss", generation, || -> io::Result<String> {
                renders += 1;
                Ok(format!("feed-{}", generation))
            })
        };

        assert_eq!(render(1).unwrap().as_str(), "feed-1");
        assert_eq!(render(1).unwrap().as_str(), "feed-1");
        assert_eq!(render(2).unwrap().as_str(), "feed-2");
        drop(render);
        assert_eq!(renders, 2);
    }

    #[test]
    fn test_render_error_is_not_cached() {
        let cache: GenerationCache<String> = GenerationCache::new();
        let res = cache.get_or("rss", 1, || Err(io::Error::new(io::ErrorKind::Other, "boom")));
        assert!(res.is_err());
        assert!(cache.get("rss", 1).is_none());
    }

    #[test]
    fn test_non_caching() {
        let cache = GenerationCache::non_caching();
        let cached = cache.add("rss", 1, "feed".to_string());
        assert_eq!(Arc::strong_count(&cached), 1);
        assert!(cache.get("rss", 1).is_none());
    }
}
