//! Centroids, the distance metric, and per-round partial aggregates

use serde::{Deserialize, Serialize};

use crate::storage::GeoPoint;

/// Population is divided by this before entering the metric, putting it on
/// the same scale as degrees of latitude/longitude.
pub const POPULATION_SCALE: f64 = 1_000_000.0;

/// Representative point of a cluster. Immutable during a round.
pub type Centroid = GeoPoint;

/// `(Δlat)² + (Δlon)² + (Δpop/1e6)²`
pub fn squared_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = a.lat - b.lat;
    let d_lon = a.lon - b.lon;
    let d_pop = a.pop / POPULATION_SCALE - b.pop / POPULATION_SCALE;
    d_lat * d_lat + d_lon * d_lon + d_pop * d_pop
}

pub fn distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Index of the nearest centroid and the squared distance to it.
///
/// Ties go to the lowest index. `None` only when `centroids` is empty.
pub fn nearest_centroid(point: &GeoPoint, centroids: &[Centroid]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, centroid) in centroids.iter().enumerate() {
        let d2 = squared_distance(point, centroid);
        match best {
            Some((_, min)) if d2 >= min => {}
            _ => best = Some((idx, d2)),
        }
    }
    best
}

/// Running sums of the points assigned to one centroid
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PartialAggregate {
    pub sum_lat: f64,
    pub sum_lon: f64,
    pub sum_pop: f64,
    pub count: u64,
}

impl PartialAggregate {
    pub fn add(&mut self, point: &GeoPoint) {
        self.sum_lat += point.lat;
        self.sum_lon += point.lon;
        self.sum_pop += point.pop;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &PartialAggregate) {
        self.sum_lat += other.sum_lat;
        self.sum_lon += other.sum_lon;
        self.sum_pop += other.sum_pop;
        self.count += other.count;
    }

    /// Elementwise mean, `None` for an empty cluster
    pub fn mean(&self) -> Option<Centroid> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(GeoPoint::new(self.sum_lat / n, self.sum_lon / n, self.sum_pop / n))
    }
}
