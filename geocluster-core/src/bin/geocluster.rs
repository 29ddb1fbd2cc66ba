//! geocluster binary: fetch (or load) city records, cluster them, report groups

use geocluster_core::{Pipeline, PipelineConfig, PipelineRuntime};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting geocluster");

    let config = PipelineConfig::from_env()?;
    let runtime = PipelineRuntime::new(config.runtime.clone())?;
    let pipeline = Pipeline::new(config)?;

    match &pipeline.config().dataset {
        Some(path) => info!("Loading local dataset {}", path.display()),
        None => info!(
            "Fetching {} entities from {}",
            pipeline.config().fetch.total_entities,
            pipeline.config().fetch.http.base_url
        ),
    }

    let outcome = match pipeline.run(&runtime) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Pipeline failed: {}", e);
            runtime.shutdown();
            return Err(e.into());
        }
    };

    if !outcome.abandoned_pages.is_empty() {
        info!("Abandoned pages: {:?}", outcome.abandoned_pages);
    }

    let clustering = &outcome.clustering;
    info!(
        "Clustering finished after {} iterations (converged: {}, inertia: {:.4})",
        clustering.iterations, clustering.converged, clustering.inertia
    );

    let sizes = clustering.cluster_sizes();
    for (cluster, names) in outcome.groups().iter().enumerate() {
        let c = &clustering.centroids[cluster];
        info!(
            "Cluster {} ({} cities) centered at lat {:.3}, lon {:.3}, pop {:.0}",
            cluster + 1,
            sizes.get(cluster).copied().unwrap_or(0),
            c.lat,
            c.lon,
            c.pop
        );
        for name in names {
            println!("cluster {}\t{}", cluster + 1, name);
        }
    }

    if std::env::var_os("GEOCLUSTER_PRINT_METRICS").is_some() {
        print!("{}", geocluster_core::metrics::gather_metrics());
    }

    runtime.shutdown();
    Ok(())
}
