//! K-means map step
//!
//! Pure computation over one contiguous index range of the shared store:
//! nearest-centroid assignment plus per-centroid partial sums.

use std::ops::Range;

use super::centroid::{nearest_centroid, Centroid, PartialAggregate};
use crate::storage::SharedDataStore;

/// Output of a map step over one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPartials {
    /// One aggregate per centroid, in centroid order
    pub partials: Vec<PartialAggregate>,
    /// Sum of minimum squared distances in the chunk
    pub inertia: f64,
}

/// Output of a final assignment over one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkAssignments {
    /// `(entity index, cluster index)` for every populated entity
    pub assignments: Vec<(usize, usize)>,
    pub inertia: f64,
}

/// Assign each populated entity in `range` and accumulate partial sums
pub fn map_chunk(
    store: &SharedDataStore,
    range: Range<usize>,
    centroids: &[Centroid],
) -> ChunkPartials {
    let mut partials = vec![PartialAggregate::default(); centroids.len()];
    let mut inertia = 0.0;

    for (_, point) in store.range_iter(range) {
        if let Some((cluster, d2)) = nearest_centroid(&point, centroids) {
            partials[cluster].add(&point);
            inertia += d2;
        }
    }

    ChunkPartials { partials, inertia }
}

/// Assign each populated entity in `range` without aggregating
pub fn assign_chunk(
    store: &SharedDataStore,
    range: Range<usize>,
    centroids: &[Centroid],
) -> ChunkAssignments {
    let mut assignments = Vec::new();
    let mut inertia = 0.0;

    for (index, point) in store.range_iter(range) {
        if let Some((cluster, d2)) = nearest_centroid(&point, centroids) {
            assignments.push((index, cluster));
            inertia += d2;
        }
    }

    ChunkAssignments {
        assignments,
        inertia,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::GeoPoint;

    fn store() -> SharedDataStore {
        let store = SharedDataStore::new(5);
        store.write(0, GeoPoint::new(0.0, 0.0, 0.0)).unwrap();
        store.write(1, GeoPoint::new(1.0, 0.0, 0.0)).unwrap();
        store.write(3, GeoPoint::new(10.0, 0.0, 0.0)).unwrap();
        store.write(4, GeoPoint::new(12.0, 0.0, 0.0)).unwrap();
        store
    }

    #[test]
    fn test_map_chunk() {
        let centroids = [GeoPoint::new(0.0, 0.0, 0.0), GeoPoint::new(10.0, 0.0, 0.0)];
        let result = map_chunk(&store(), 0..5, &centroids);

        assert_eq!(result.partials[0].count, 2);
        assert_eq!(result.partials[0].sum_lat, 1.0);
        assert_eq!(result.partials[1].count, 2);
        assert_eq!(result.partials[1].sum_lat, 22.0);
        assert_eq!(result.inertia, 1.0 + 4.0);
    }

    #[test]
    fn test_assign_chunk_range() {
        let centroids = [GeoPoint::new(0.0, 0.0, 0.0), GeoPoint::new(10.0, 0.0, 0.0)];
        let result = assign_chunk(&store(), 1..4, &centroids);
        assert_eq!(result.assignments, vec![(1, 0), (3, 1)]);
    }
}
