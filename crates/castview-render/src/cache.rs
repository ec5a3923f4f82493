//! Pool of interchangeable GPU-backed resources.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

/// Attributes that can be folded into a cache key.
pub trait AttributeKey {
    /// Deterministic string; equal attributes give equal strings.
    fn hash_key(&self) -> String;
}

impl AttributeKey for castview_gpu::TextureAttributes {
    fn hash_key(&self) -> String {
        castview_gpu::TextureAttributes::hash_key(self)
    }
}

/// A resource the [`ResourceCache`] can pool.
pub trait Cacheable: Sized {
    type Attributes: AttributeKey;

    /// Construct a fresh resource. Must not touch the GPU.
    fn create(width: u32, height: u32, attributes: &Self::Attributes) -> Self;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn attributes(&self) -> &Self::Attributes;

    /// Whether the resource holds GPU state worth keeping.
    fn is_cacheable(&self) -> bool;
}

/// Build the key shared by all interchangeable resources.
pub fn cache_key<A: AttributeKey>(width: u32, height: u32, attributes: &A) -> String {
    format!("{}x{}-{}", width, height, attributes.hash_key())
}

/// Pooled resources grouped by key.
///
/// A resource leaves the pool on `fetch` and only comes back through
/// `give_back`, so an instance has at most one owner at a time.
pub struct ResourceCache<T: Cacheable> {
    pool: Mutex<HashMap<String, Vec<T>>>,
    created: AtomicU64,
    reused: AtomicU64,
}

impl<T: Cacheable> ResourceCache<T> {
    pub fn new() -> Self {
        Self {
            pool: Mutex::new(HashMap::new()),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Take a pooled resource with matching key, or create a new one.
    pub fn fetch(&self, width: u32, height: u32, attributes: &T::Attributes) -> T {
        let key = cache_key(width, height, attributes);

        let pooled = self.pool.lock().get_mut(&key).and_then(Vec::pop);
        match pooled {
            Some(resource) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                trace!(%key, "Cache hit");
                resource
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                trace!(%key, "Cache miss");
                T::create(width, height, attributes)
            }
        }
    }

    /// Hand a resource back. Resources without GPU state are dropped.
    pub fn give_back(&self, resource: T) {
        if !resource.is_cacheable() {
            trace!("Dropping uncacheable resource");
            return;
        }

        let key = cache_key(resource.width(), resource.height(), resource.attributes());
        self.pool.lock().entry(key).or_default().push(resource);
    }

    /// Drain every pooled resource through `destroy`.
    pub fn purge(&self, mut destroy: impl FnMut(T)) {
        let drained = std::mem::take(&mut *self.pool.lock());

        let mut count = 0usize;
        for resource in drained.into_values().flatten() {
            destroy(resource);
            count += 1;
        }
        debug!(count, "Resource cache purged");
    }

    /// Total pooled resources.
    pub fn pooled(&self) -> usize {
        self.pool.lock().values().map(Vec::len).sum()
    }

    /// Pooled resources under one key.
    pub fn pooled_for(&self, width: u32, height: u32, attributes: &T::Attributes) -> usize {
        let key = cache_key(width, height, attributes);
        self.pool.lock().get(&key).map_or(0, Vec::len)
    }

    /// Resources constructed on a miss.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Fetches served from the pool.
    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }
}

impl<T: Cacheable> Default for ResourceCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static NEXT: AtomicU64 = AtomicU64::new(1);

    #[derive(Debug, Clone, PartialEq)]
    struct Attrs(&'static str);

    impl AttributeKey for Attrs {
        fn hash_key(&self) -> String {
            self.0.to_string()
        }
    }

    #[derive(Debug)]
    struct Slab {
        serial: u64,
        width: u32,
        height: u32,
        attrs: Attrs,
        allocated: bool,
    }

    impl Cacheable for Slab {
        type Attributes = Attrs;

        fn create(width: u32, height: u32, attributes: &Attrs) -> Self {
            Self {
                serial: NEXT.fetch_add(1, Ordering::Relaxed),
                width,
                height,
                attrs: attributes.clone(),
                allocated: false,
            }
        }

        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }

        fn attributes(&self) -> &Attrs {
            &self.attrs
        }

        fn is_cacheable(&self) -> bool {
            self.allocated
        }
    }

    #[test]
    fn test_key_format() {
        assert_eq!(cache_key(640, 480, &Attrs("rgba")), "640x480-rgba");
    }

    #[test]
    fn test_returned_instance_is_reused() {
        let cache = ResourceCache::<Slab>::new();
        let mut slab = cache.fetch(4, 4, &Attrs("a"));
        slab.allocated = true;
        let serial = slab.serial;

        cache.give_back(slab);
        assert_eq!(cache.pooled(), 1);

        let again = cache.fetch(4, 4, &Attrs("a"));
        assert_eq!(again.serial, serial);
        assert_eq!(cache.pooled(), 0);
        assert_eq!(cache.reused(), 1);
    }

    #[test]
    fn test_mismatched_key_gets_new_instance() {
        let cache = ResourceCache::<Slab>::new();
        let mut slab = cache.fetch(4, 4, &Attrs("a"));
        slab.allocated = true;
        let serial = slab.serial;
        cache.give_back(slab);

        let other_attrs = cache.fetch(4, 4, &Attrs("b"));
        let other_size = cache.fetch(4, 5, &Attrs("a"));
        assert_ne!(other_attrs.serial, serial);
        assert_ne!(other_size.serial, serial);
        assert_eq!(cache.pooled_for(4, 4, &Attrs("a")), 1);
    }

    #[test]
    fn test_uncacheable_resource_is_dropped() {
        let cache = ResourceCache::<Slab>::new();
        let slab = cache.fetch(2, 2, &Attrs("a"));
        cache.give_back(slab);
        assert_eq!(cache.pooled(), 0);
    }

    #[test]
    fn test_concurrent_fetch_never_duplicates() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let cache = Arc::new(ResourceCache::<Slab>::new());
        for _ in 0..4 {
            let mut slab = cache.fetch(8, 8, &Attrs("a"));
            slab.allocated = true;
            cache.give_back(slab);
        }
        assert_eq!(cache.pooled(), 1);

        let mut seeded = Vec::new();
        for _ in 0..4 {
            let mut slab = Slab::create(8, 8, &Attrs("a"));
            slab.allocated = true;
            seeded.push(slab);
        }
        for slab in seeded {
            cache.give_back(slab);
        }

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.fetch(8, 8, &Attrs("a")).serial)
            })
            .collect();
        let serials: HashSet<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(serials.len(), 5);
        assert_eq!(cache.pooled(), 0);
    }

    #[test]
    fn test_purge_destroys_everything() {
        let cache = ResourceCache::<Slab>::new();
        for w in 1..=3 {
            let mut slab = cache.fetch(w, 1, &Attrs("a"));
            slab.allocated = true;
            cache.give_back(slab);
        }

        let mut destroyed = Vec::new();
        cache.purge(|slab| destroyed.push(slab.width));
        destroyed.sort_unstable();

        assert_eq!(destroyed, vec![1, 2, 3]);
        assert_eq!(cache.pooled(), 0);
    }
}
