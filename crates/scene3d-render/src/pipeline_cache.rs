//! Memoized pipelines keyed by primitive kind and pass.
//!
//! Each entry remembers the device it was compiled on. A lookup made with a
//! different device identity misses and recompiles, so swapping the device
//! invalidates the whole cache without any explicit flush.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use scene3d_core::PrimitiveKind;

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a wgpu device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(u64);

impl DeviceId {
    /// Allocates a fresh identity.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which pass a pipeline draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Shaded output of opaque collections, writing depth.
    Render,
    /// Shaded output of collections with alpha below one. Depth is tested
    /// but not written.
    Translucent,
    /// ID-encoded output.
    Picking,
}

/// Cache key.
pub type PipelineKey = (PrimitiveKind, PassKind);

#[derive(Debug)]
struct CacheEntry<P> {
    pipeline: P,
    device_id: DeviceId,
}

/// Pipelines compiled at most once per key per device.
#[derive(Debug)]
pub struct PipelineCache<P> {
    entries: HashMap<PipelineKey, CacheEntry<P>>,
    compilations: u64,
}

impl<P> Default for PipelineCache<P> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            compilations: 0,
        }
    }
}

impl<P: Clone> PipelineCache<P> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached pipeline for `key` on `device_id`, compiling it with
    /// `create` on a miss. Failures are returned and not cached.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: PipelineKey,
        device_id: DeviceId,
        create: impl FnOnce() -> Result<P, E>,
    ) -> Result<P, E> {
        if let Some(entry) = self.entries.get(&key) {
            if entry.device_id == device_id {
                return Ok(entry.pipeline.clone());
            }
        }
        let pipeline = create()?;
        self.compilations += 1;
        self.entries.insert(
            key,
            CacheEntry {
                pipeline: pipeline.clone(),
                device_id,
            },
        );
        Ok(pipeline)
    }

    /// Returns true if `key` holds a pipeline for `device_id`.
    #[must_use]
    pub fn contains(&self, key: PipelineKey, device_id: DeviceId) -> bool {
        self.entries
            .get(&key)
            .is_some_and(|entry| entry.device_id == device_id)
    }

    /// Number of successful compilations so far.
    #[must_use]
    pub fn compilations(&self) -> u64 {
        self.compilations
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINTS_RENDER: PipelineKey = (PrimitiveKind::PointCloud, PassKind::Render);
    const POINTS_PICKING: PipelineKey = (PrimitiveKind::PointCloud, PassKind::Picking);

    #[test]
    fn test_compiles_once_per_key() {
        let mut cache = PipelineCache::<String>::new();
        let device = DeviceId::next();
        let mut calls = 0;

        for _ in 0..3 {
            let p: Result<String, ()> = cache.get_or_try_insert_with(POINTS_RENDER, device, || {
                calls += 1;
                Ok("points/render".to_string())
            });
            assert_eq!(p.unwrap(), "points/render");
        }
        assert_eq!(calls, 1);

        let p: Result<String, ()> =
            cache.get_or_try_insert_with(POINTS_PICKING, device, || Ok("points/picking".into()));
        assert_eq!(p.unwrap(), "points/picking");
        assert_eq!(cache.compilations(), 2);
    }

    #[test]
    fn test_device_swap_recompiles() {
        let mut cache = PipelineCache::<u32>::new();
        let first = DeviceId::next();
        let second = DeviceId::next();
        assert_ne!(first, second);

        let _ = cache.get_or_try_insert_with::<()>(POINTS_RENDER, first, || Ok(1));
        assert!(cache.contains(POINTS_RENDER, first));
        assert!(!cache.contains(POINTS_RENDER, second));

        let p = cache.get_or_try_insert_with::<()>(POINTS_RENDER, second, || Ok(2));
        assert_eq!(p, Ok(2));
        assert!(!cache.contains(POINTS_RENDER, first));
        assert_eq!(cache.compilations(), 2);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let mut cache = PipelineCache::<u32>::new();
        let device = DeviceId::next();

        let err = cache.get_or_try_insert_with(POINTS_RENDER, device, || Err("bad shader"));
        assert_eq!(err, Err("bad shader"));
        assert!(!cache.contains(POINTS_RENDER, device));

        let ok = cache.get_or_try_insert_with::<&str>(POINTS_RENDER, device, || Ok(7));
        assert_eq!(ok, Ok(7));
    }
}
