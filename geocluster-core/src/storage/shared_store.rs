//! Shared per-entity coordinate store
//!
//! One fixed-width slot per entity index holding `(lat, lon, pop)` plus an
//! explicit populated flag. Fetch workers write disjoint index ranges and
//! k-means workers read disjoint chunks, so slots are plain atomics with no
//! lock around the buffer.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{GeoClusterError, Result};

/// Coordinate/population triplet for one entity
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    pub pop: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64, pop: f64) -> Self {
        Self { lat, lon, pop }
    }
}

/// A single slot. Fields are f64 bit patterns.
struct Slot {
    lat: AtomicU64,
    lon: AtomicU64,
    pop: AtomicU64,
    populated: AtomicBool,
}

impl Slot {
    fn empty() -> Self {
        Self {
            lat: AtomicU64::new(0),
            lon: AtomicU64::new(0),
            pop: AtomicU64::new(0),
            populated: AtomicBool::new(false),
        }
    }

    fn load(&self) -> Option<GeoPoint> {
        if !self.populated.load(Ordering::Acquire) {
            return None;
        }
        Some(GeoPoint {
            lat: f64::from_bits(self.lat.load(Ordering::Relaxed)),
            lon: f64::from_bits(self.lon.load(Ordering::Relaxed)),
            pop: f64::from_bits(self.pop.load(Ordering::Relaxed)),
        })
    }
}

/// Flat, pre-sized store shared by every worker of both phases.
///
/// Index `i` refers to the same logical entity for the whole pipeline run.
/// Share it with `Arc<SharedDataStore>`; nothing is copied per worker.
pub struct SharedDataStore {
    slots: Box<[Slot]>,
}

impl SharedDataStore {
    /// Create a store with `len` unpopulated slots
    pub fn new(len: usize) -> Self {
        let slots = (0..len).map(|_| Slot::empty()).collect::<Vec<_>>();
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    /// Number of entity slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Write an entity's triplet and mark the slot populated.
    ///
    /// Fails if the slot was already populated: during the fetch phase each
    /// index has exactly one owner, so a second write means the partition
    /// was violated.
    pub fn write(&self, index: usize, point: GeoPoint) -> Result<()> {
        let slot = self.slot(index)?;
        if slot.populated.load(Ordering::Acquire) {
            return Err(GeoClusterError::IndexCollision { index });
        }
        slot.lat.store(point.lat.to_bits(), Ordering::Relaxed);
        slot.lon.store(point.lon.to_bits(), Ordering::Relaxed);
        slot.pop.store(point.pop.to_bits(), Ordering::Relaxed);
        slot.populated.store(true, Ordering::Release);
        Ok(())
    }

    /// Read a slot, `None` if it has not been populated
    pub fn read(&self, index: usize) -> Result<Option<GeoPoint>> {
        Ok(self.slot(index)?.load())
    }

    /// Check whether a slot holds data
    pub fn is_populated(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .map(|s| s.populated.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Count populated slots
    pub fn populated_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.populated.load(Ordering::Acquire))
            .count()
    }

    /// All populated triplets, in index order
    pub fn populated_points(&self) -> Vec<GeoPoint> {
        self.slots.iter().filter_map(Slot::load).collect()
    }

    /// Iterate populated `(index, point)` pairs inside `range`.
    ///
    /// The range is clamped to the store length.
    pub fn range_iter(&self, range: Range<usize>) -> impl Iterator<Item = (usize, GeoPoint)> + '_ {
        let end = range.end.min(self.slots.len());
        let start = range.start.min(end);
        self.slots[start..end]
            .iter()
            .enumerate()
            .filter_map(move |(offset, slot)| slot.load().map(|p| (start + offset, p)))
    }

    fn slot(&self, index: usize) -> Result<&Slot> {
        self.slots.get(index).ok_or(GeoClusterError::IndexOutOfRange {
            index,
            len: self.slots.len(),
        })
    }
}

impl std::fmt::Debug for SharedDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedDataStore")
            .field("len", &self.len())
            .field("populated", &self.populated_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_write_and_read() {
        let store = SharedDataStore::new(4);
        assert_eq!(store.read(2).unwrap(), None);

        store.write(2, GeoPoint::new(1.5, -3.0, 42.0)).unwrap();
        assert_eq!(store.read(2).unwrap(), Some(GeoPoint::new(1.5, -3.0, 42.0)));
        assert!(store.is_populated(2));
        assert_eq!(store.populated_count(), 1);
    }

    #[test]
    fn test_zero_triplet_is_a_real_point() {
        let store = SharedDataStore::new(2);
        store.write(0, GeoPoint::new(0.0, 0.0, 0.0)).unwrap();

        assert!(store.is_populated(0));
        assert!(!store.is_populated(1));
        assert_eq!(store.populated_points(), vec![GeoPoint::default()]);
    }

    #[test]
    fn test_collision_and_bounds() {
        let store = SharedDataStore::new(3);
        store.write(1, GeoPoint::new(1.0, 1.0, 1.0)).unwrap();

        assert!(matches!(
            store.write(1, GeoPoint::new(2.0, 2.0, 2.0)),
            Err(GeoClusterError::IndexCollision { index: 1 })
        ));
        assert!(matches!(
            store.write(3, GeoPoint::default()),
            Err(GeoClusterError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_range_iter_skips_unpopulated() {
        let store = SharedDataStore::new(6);
        store.write(1, GeoPoint::new(1.0, 0.0, 0.0)).unwrap();
        store.write(4, GeoPoint::new(4.0, 0.0, 0.0)).unwrap();

        let seen: Vec<usize> = store.range_iter(0..5).map(|(i, _)| i).collect();
        assert_eq!(seen, vec![1, 4]);

        let clamped: Vec<usize> = store.range_iter(3..100).map(|(i, _)| i).collect();
        assert_eq!(clamped, vec![4]);
    }

    #[test]
    fn test_disjoint_concurrent_writes() {
        let store = Arc::new(SharedDataStore::new(400));
        let handles: Vec<_> = (0..4)
            .map(|w| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in (w..400).step_by(4) {
                        store.write(i, GeoPoint::new(i as f64, w as f64, 1.0)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.populated_count(), 400);
        assert_eq!(store.read(9).unwrap().unwrap().lon, 1.0);
    }
}
