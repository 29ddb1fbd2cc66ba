//! Initial centroid selection
//!
//! Samples `k` distinct populated entities. When fewer than `k` exist the
//! centroids are synthesized uniformly over the globe instead.

use rand::seq::index;
use rand::Rng;

use super::centroid::Centroid;
use crate::storage::GeoPoint;

/// Upper bound (exclusive) for synthetic population
pub const SYNTHETIC_MAX_POPULATION: f64 = 5_000_000.0;

/// Pick `k` initial centroids from `pool`
pub fn seed_centroids<R: Rng + ?Sized>(pool: &[GeoPoint], k: usize, rng: &mut R) -> Vec<Centroid> {
    if pool.len() < k {
        return random_centroids(k, rng);
    }

    index::sample(rng, pool.len(), k)
        .into_iter()
        .map(|i| pool[i])
        .collect()
}

/// `k` centroids with lat in [-90, 90], lon in [-180, 180], pop in [0, 5e6)
pub fn random_centroids<R: Rng + ?Sized>(k: usize, rng: &mut R) -> Vec<Centroid> {
    (0..k)
        .map(|_| {
            GeoPoint::new(
                rng.random_range(-90.0..=90.0),
                rng.random_range(-180.0..=180.0),
                rng.random_range(0.0..SYNTHETIC_MAX_POPULATION),
            )
        })
        .collect()
}
