// src/engine/preview.rs
//
// Object-URL registry. Each encoded result is published under an opaque
// `blob:` URL that stays resolvable until the owner revokes it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const URL_PREFIX: &str = "blob:pixel-press/";

#[derive(Clone, Debug)]
struct Blob {
    data: Arc<Vec<u8>>,
    mime: &'static str,
}

/// Live object URLs. Cloning the `Arc` around it shares one namespace.
#[derive(Debug, Default)]
pub struct ObjectUrlRegistry {
    entries: Mutex<HashMap<String, Blob>>,
    next_id: AtomicU64,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `data` and return its URL.
    pub fn create(&self, data: Arc<Vec<u8>>, mime: &'static str) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = format!("{URL_PREFIX}{id}");
        self.entries.lock().insert(url.clone(), Blob { data, mime });
        url
    }

    /// Bytes and MIME type behind a live URL.
    pub fn resolve(&self, url: &str) -> Option<(Arc<Vec<u8>>, &'static str)> {
        self.entries
            .lock()
            .get(url)
            .map(|blob| (Arc::clone(&blob.data), blob.mime))
    }

    /// Release a URL. Returns false if it was not live.
    pub fn revoke(&self, url: &str) -> bool {
        self.entries.lock().remove(url).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_resolve_revoke() {
        let registry = ObjectUrlRegistry::new();
        let url = registry.create(Arc::new(vec![1, 2, 3]), "image/png");
        assert!(url.starts_with("blob:"));
        let (data, mime) = registry.resolve(&url).unwrap();
        assert_eq!(data.as_slice(), &[1, 2, 3]);
        assert_eq!(mime, "image/png");
        assert_eq!(registry.live_count(), 1);

        assert!(registry.revoke(&url));
        assert!(registry.resolve(&url).is_none());
        assert!(!registry.revoke(&url));
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_urls_are_unique() {
        let registry = ObjectUrlRegistry::new();
        let a = registry.create(Arc::new(vec![]), "image/jpeg");
        let b = registry.create(Arc::new(vec![]), "image/jpeg");
        assert_ne!(a, b);
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn test_concurrent_creates() {
        let registry = Arc::new(ObjectUrlRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = Arc::clone(&registry);
                std::thread::spawn(move || r.create(Arc::new(vec![0]), "image/webp"))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.live_count(), 8);
    }
}
