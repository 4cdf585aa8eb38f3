//! Frame cache store: ordered, bounded, byte-accounted.
//!
//! **Why**: smooth playback needs decoded frames resident in RAM, and RAM
//! is finite. The store tracks resident bytes and evicts least-recently
//! used frames to stay inside its budget.
//!
//! **Used by**: readers (deposit produced frames), pre-roll worker
//! (residency checks + byte budget for paused-mode window sizing).

use log::{debug, info};
use lru::LruCache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use sysinfo::System;

use crate::frame::Frame;

/// Contract the pre-roll worker consumes. `max_bytes() == 0` means
/// unlimited and disables byte-based window sizing in paused mode.
pub trait CacheStore: Send + Sync {
    /// Is this frame number resident?
    fn contains(&self, frame_number: i64) -> bool;

    /// Number of resident frames.
    fn count(&self) -> usize;

    /// Byte budget, 0 = unlimited.
    fn max_bytes(&self) -> u64;

    /// Drop every resident frame.
    fn clear_all(&self);

    /// Deposit a frame, keyed by its frame number.
    fn insert(&self, frame: Arc<Frame>);

    /// Fetch a resident frame (refreshes its recency).
    fn get(&self, frame_number: i64) -> Option<Arc<Frame>>;
}

/// In-memory LRU frame store with atomic byte accounting.
#[derive(Debug)]
pub struct FrameCache {
    frames: Mutex<LruCache<i64, Arc<Frame>>>,
    bytes_used: AtomicU64,
    max_bytes: u64,
}

impl FrameCache {
    /// Store with a fixed byte budget (0 = unlimited).
    pub fn new(max_bytes: u64) -> Self {
        Self {
            frames: Mutex::new(LruCache::unbounded()),
            bytes_used: AtomicU64::new(0),
            max_bytes,
        }
    }

    /// Store sized from available system memory.
    ///
    /// `fraction` of available RAM after holding back `reserve_gb` for the
    /// rest of the system.
    pub fn with_memory_fraction(fraction: f64, reserve_gb: f64) -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available = sys.available_memory();
        let reserve = (reserve_gb * 1024.0 * 1024.0 * 1024.0) as u64;
        let usable = available.saturating_sub(reserve);
        let max_bytes = (usable as f64 * fraction) as u64;

        info!(
            "FrameCache init: available={} MB, reserve={} MB, limit={} MB ({}%)",
            available / 1024 / 1024,
            reserve / 1024 / 1024,
            max_bytes / 1024 / 1024,
            (fraction * 100.0) as u32
        );

        Self::new(max_bytes)
    }

    /// Currently resident bytes.
    pub fn bytes_used(&self) -> u64 {
        self.bytes_used.load(Ordering::Relaxed)
    }

    /// Evict LRU frames until `incoming` more bytes fit the budget. The
    /// incoming frame itself always gets inserted, even when it alone
    /// exceeds the budget.
    fn make_room(&self, frames: &mut LruCache<i64, Arc<Frame>>, incoming: u64) {
        if self.max_bytes == 0 {
            return;
        }
        while self.bytes_used.load(Ordering::Relaxed) + incoming > self.max_bytes {
            match frames.pop_lru() {
                Some((number, evicted)) => {
                    let freed = evicted.bytes() as u64;
                    self.bytes_used.fetch_sub(freed, Ordering::Relaxed);
                    debug!("evicted frame {} ({} bytes)", number, freed);
                }
                None => break,
            }
        }
    }
}

impl CacheStore for FrameCache {
    fn contains(&self, frame_number: i64) -> bool {
        // contains() does not refresh recency; residency probes from the
        // worker must not perturb eviction order.
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&frame_number)
    }

    fn count(&self) -> usize {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn clear_all(&self) {
        let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = frames.len();
        frames.clear();
        self.bytes_used.store(0, Ordering::Relaxed);
        debug!("cleared cache ({} frames dropped)", dropped);
    }

    fn insert(&self, frame: Arc<Frame>) {
        let number = frame.number;
        let size = frame.bytes() as u64;
        let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());

        // Replacing an existing entry frees its bytes first.
        if let Some(old) = frames.pop(&number) {
            self.bytes_used
                .fetch_sub(old.bytes() as u64, Ordering::Relaxed);
        }

        self.make_room(&mut frames, size);
        frames.put(number, frame);
        self.bytes_used.fetch_add(size, Ordering::Relaxed);
    }

    fn get(&self, frame_number: i64) -> Option<Arc<Frame>> {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&frame_number)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(number: i64) -> Arc<Frame> {
        // 16x16 RGBA + 2x64 audio = 1024 + 512 bytes
        Arc::new(Frame::with_image_and_audio(
            number,
            16,
            16,
            image::Rgba([0, 0, 0, 255]),
            64,
            2,
        ))
    }

    #[test]
    fn test_insert_contains_get() {
        let cache = FrameCache::new(0);
        assert_eq!(cache.count(), 0);
        assert!(!cache.contains(1));

        cache.insert(frame(1));
        assert!(cache.contains(1));
        assert_eq!(cache.count(), 1);
        assert_eq!(cache.get(1).unwrap().number, 1);
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn test_byte_accounting_and_replace() {
        let cache = FrameCache::new(0);
        let size = frame(1).bytes() as u64;

        cache.insert(frame(1));
        assert_eq!(cache.bytes_used(), size);

        // Same key replaces, not accumulates.
        cache.insert(frame(1));
        assert_eq!(cache.bytes_used(), size);
        assert_eq!(cache.count(), 1);
    }

    #[test]
    fn test_lru_eviction_over_budget() {
        let size = frame(1).bytes() as u64;
        // Room for three frames.
        let cache = FrameCache::new(size * 3);

        for n in 1..=3 {
            cache.insert(frame(n));
        }
        assert_eq!(cache.count(), 3);

        // Touch frame 1 so frame 2 becomes the eviction candidate.
        let _ = cache.get(1);
        cache.insert(frame(4));

        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
        assert!(cache.contains(4));
        assert_eq!(cache.bytes_used(), size * 3);
    }

    #[test]
    fn test_oversized_frame_still_inserts() {
        let cache = FrameCache::new(10);
        cache.insert(frame(1));
        assert!(cache.contains(1));
        assert_eq!(cache.count(), 1);
    }

    #[test]
    fn test_clear_all() {
        let cache = FrameCache::new(0);
        for n in 1..=5 {
            cache.insert(frame(n));
        }
        cache.clear_all();
        assert_eq!(cache.count(), 0);
        assert_eq!(cache.bytes_used(), 0);
        assert!(!cache.contains(3));
    }
}
