//! Unit tests for parallel k-means rounds over the shared store

use std::sync::Arc;

use geocluster_core::cluster::{
    nearest_centroid, ClusterConfig, ClusterOrchestrator, ClusterPhase, PartialAggregate,
};
use geocluster_core::{GeoPoint, SharedDataStore};

const EPS: f64 = 1e-9;

/// Three well-separated groups of four cities each
fn twelve_cities() -> Vec<GeoPoint> {
    vec![
        GeoPoint::new(10.0, 10.0, 1e6),
        GeoPoint::new(11.0, 10.0, 1e6),
        GeoPoint::new(10.0, 11.0, 1e6),
        GeoPoint::new(11.0, 11.0, 1e6),
        GeoPoint::new(-20.0, 30.0, 2e6),
        GeoPoint::new(-22.0, 30.0, 2e6),
        GeoPoint::new(-20.0, 32.0, 2e6),
        GeoPoint::new(-22.0, 32.0, 6e6),
        GeoPoint::new(40.0, -50.0, 5e5),
        GeoPoint::new(44.0, -50.0, 5e5),
        GeoPoint::new(40.0, -46.0, 5e5),
        GeoPoint::new(44.0, -46.0, 1.5e6),
    ]
}

fn store_from(points: &[Option<GeoPoint>]) -> Arc<SharedDataStore> {
    let store = SharedDataStore::new(points.len());
    for (index, point) in points.iter().enumerate() {
        if let Some(point) = point {
            store.write(index, *point).unwrap();
        }
    }
    Arc::new(store)
}

fn config(k: usize, num_workers: usize) -> ClusterConfig {
    ClusterConfig {
        k,
        num_workers,
        seed: Some(7),
        ..Default::default()
    }
}

fn assert_point(actual: &GeoPoint, lat: f64, lon: f64, pop: f64) {
    assert!((actual.lat - lat).abs() < EPS, "lat {} != {}", actual.lat, lat);
    assert!((actual.lon - lon).abs() < EPS, "lon {} != {}", actual.lon, lon);
    assert!((actual.pop - pop).abs() < 1e-3, "pop {} != {}", actual.pop, pop);
}

#[test]
fn test_first_round_partials_and_means() {
    let points = twelve_cities();
    let store = store_from(&points.iter().copied().map(Some).collect::<Vec<_>>());
    let mut orchestrator = ClusterOrchestrator::new(config(3, 4), store).unwrap();

    let seeds = vec![points[0], points[4], points[8]];
    let round = orchestrator.run_round(&seeds).unwrap();

    assert_eq!(round.partials[0].count, 4);
    assert_eq!(round.partials[1].count, 4);
    assert_eq!(round.partials[2].count, 4);

    let b = &round.partials[1];
    assert!((b.sum_lat - -84.0).abs() < EPS);
    assert!((b.sum_lon - 124.0).abs() < EPS);
    assert!((b.sum_pop - 12e6).abs() < 1e-3);

    let c = &round.partials[2];
    assert!((c.sum_lat - 168.0).abs() < EPS);
    assert!((c.sum_lon - -192.0).abs() < EPS);
    assert!((c.sum_pop - 3e6).abs() < 1e-3);

    assert_point(&round.centroids[0], 10.5, 10.5, 1e6);
    assert_point(&round.centroids[1], -21.0, 31.0, 3e6);
    assert_point(&round.centroids[2], 42.0, -48.0, 7.5e5);
    assert!(round.reseeded.is_empty());
    assert_eq!(orchestrator.phase(), ClusterPhase::Reduce);
}

#[test]
fn test_converges_to_group_means() {
    let points = twelve_cities();
    let store = store_from(&points.iter().copied().map(Some).collect::<Vec<_>>());
    let mut orchestrator = ClusterOrchestrator::new(config(3, 4), store).unwrap();

    let outcome = orchestrator
        .run_with_centroids(vec![points[0], points[4], points[8]])
        .unwrap();

    assert!(outcome.converged);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(orchestrator.phase(), ClusterPhase::Done);
    assert_point(&outcome.centroids[0], 10.5, 10.5, 1e6);
    assert_point(&outcome.centroids[1], -21.0, 31.0, 3e6);
    assert_point(&outcome.centroids[2], 42.0, -48.0, 7.5e5);

    let expected: Vec<Option<usize>> = (0..12).map(|i| Some(i / 4)).collect();
    assert_eq!(outcome.assignments, expected);
    assert_eq!(outcome.cluster_sizes(), vec![4, 4, 4]);
}

#[test]
fn test_counts_match_populated_entities() {
    let mut points: Vec<Option<GeoPoint>> = twelve_cities().into_iter().map(Some).collect();
    points[2] = None;
    points[9] = None;
    points.push(None);
    let store = store_from(&points);
    let populated = store.populated_count();

    // More workers than makes sense still partitions exactly
    let mut orchestrator = ClusterOrchestrator::new(config(3, 5), store).unwrap();
    let seeds = orchestrator.seed_centroids();
    let round = orchestrator.run_round(&seeds).unwrap();

    let counted: u64 = round.partials.iter().map(|p| p.count).sum();
    assert_eq!(counted as usize, populated);

    let (assignments, _) = orchestrator.final_assignment(&round.centroids).unwrap();
    assert_eq!(assignments.iter().flatten().count(), populated);
    assert!(assignments[2].is_none());
    assert!(assignments[9].is_none());
    assert!(assignments[12].is_none());
}

#[test]
fn test_parallel_means_match_brute_force() {
    let points = twelve_cities();
    let store = store_from(&points.iter().copied().map(Some).collect::<Vec<_>>());
    let mut orchestrator = ClusterOrchestrator::new(config(2, 3), store).unwrap();

    let seeds = vec![GeoPoint::new(0.0, 0.0, 0.0), GeoPoint::new(30.0, -30.0, 1e6)];
    let round = orchestrator.run_round(&seeds).unwrap();

    let mut expected = vec![PartialAggregate::default(); 2];
    for point in &points {
        let (cluster, _) = nearest_centroid(point, &seeds).unwrap();
        expected[cluster].add(point);
    }

    for (cluster, aggregate) in expected.iter().enumerate() {
        match aggregate.mean() {
            Some(mean) => assert_point(&round.centroids[cluster], mean.lat, mean.lon, mean.pop),
            None => assert!(round.reseeded.contains(&cluster)),
        }
    }
}

#[test]
fn test_empty_cluster_is_reseeded() {
    let points = twelve_cities();
    let store = store_from(&points.iter().copied().map(Some).collect::<Vec<_>>());
    let mut orchestrator = ClusterOrchestrator::new(config(3, 4), store).unwrap();

    // The third centroid is far from everything and attracts no entities
    let seeds = vec![points[0], points[4], GeoPoint::new(89.0, 179.0, 5e6)];
    let round = orchestrator.run_round(&seeds).unwrap();

    assert_eq!(round.centroids.len(), 3);
    assert_eq!(round.reseeded, vec![2]);
    assert_eq!(round.partials[2].count, 0);
    assert!(points.contains(&round.centroids[2]));
}

#[test]
fn test_final_assignment_is_idempotent() {
    let points = twelve_cities();
    let store = store_from(&points.iter().copied().map(Some).collect::<Vec<_>>());
    let mut orchestrator = ClusterOrchestrator::new(config(3, 4), store).unwrap();

    let outcome = orchestrator.run().unwrap();
    let (again, inertia) = orchestrator.final_assignment(&outcome.centroids).unwrap();

    assert_eq!(again, outcome.assignments);
    assert!((inertia - outcome.inertia).abs() < 1e-9);
}

#[test]
fn test_single_populated_entity_falls_back_to_random_seeds() {
    let mut points: Vec<Option<GeoPoint>> = vec![None; 12];
    points[5] = Some(GeoPoint::new(1.0, 2.0, 3.0));
    let store = store_from(&points);
    let mut orchestrator = ClusterOrchestrator::new(config(3, 4), store).unwrap();

    let seeds = orchestrator.seed_centroids();
    assert_eq!(seeds.len(), 3);
    for seed in &seeds {
        assert!((-90.0..=90.0).contains(&seed.lat));
        assert!((-180.0..=180.0).contains(&seed.lon));
        assert!((0.0..5e6).contains(&seed.pop));
    }

    let outcome = orchestrator.run().unwrap();
    assert_eq!(outcome.centroids.len(), 3);
    assert_eq!(outcome.assignments.iter().flatten().count(), 1);
}

#[test]
fn test_iteration_cap_respected() {
    let points = twelve_cities();
    let store = store_from(&points.iter().copied().map(Some).collect::<Vec<_>>());
    let mut orchestrator = ClusterOrchestrator::new(
        ClusterConfig {
            max_iterations: 1,
            convergence_threshold: 0.0,
            ..config(3, 2)
        },
        store,
    )
    .unwrap();

    let outcome = orchestrator
        .run_with_centroids(vec![points[0], points[1], points[2]])
        .unwrap();
    assert_eq!(outcome.iterations, 1);
    assert!(!outcome.converged);
    assert_eq!(outcome.history.len(), 1);
}
