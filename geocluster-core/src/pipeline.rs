//! End-to-end pipeline
//!
//! Fetch fills the shared store; clustering starts only after every fetch
//! worker has reported, then reads the same store.

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::cluster::{ClusterOrchestrator, ClusterOutcome};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::fetch::{
    CityRecord, FetchOrchestrator, HttpPageSource, LocalDataset, PageSource,
    local::MAX_LOCAL_ENTITIES,
};
use crate::runtime::PipelineRuntime;
use crate::storage::SharedDataStore;

/// Everything the presentation layer needs
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// One record per store index
    pub records: Vec<CityRecord>,
    /// Pages abandoned during fetch (empty for local datasets)
    pub abandoned_pages: Vec<usize>,
    pub clustering: ClusterOutcome,
}

impl PipelineOutcome {
    /// Entity names grouped by cluster
    pub fn groups(&self) -> Vec<Vec<String>> {
        self.clustering.groups(&self.records)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run against the configured local dataset, or the HTTP source
    pub fn run(&self, runtime: &PipelineRuntime) -> Result<PipelineOutcome> {
        match &self.config.dataset {
            Some(path) => self.run_local(path),
            None => {
                let source = Arc::new(HttpPageSource::new(self.config.fetch.http.clone())?);
                self.run_api(runtime, source)
            }
        }
    }

    /// Fetch from `source`, then cluster
    pub fn run_api(
        &self,
        runtime: &PipelineRuntime,
        source: Arc<dyn PageSource>,
    ) -> Result<PipelineOutcome> {
        let store = Arc::new(SharedDataStore::new(self.config.fetch.total_entities));
        let orchestrator = FetchOrchestrator::new(self.config.fetch.clone(), source, store.clone())?;

        let fetched = runtime.block_on_io(orchestrator.run())?;
        info!(
            "Fetch phase complete, {} entities populated",
            store.populated_count()
        );

        let clustering = self.cluster(store)?;
        Ok(PipelineOutcome {
            records: fetched.records,
            abandoned_pages: fetched.abandoned_pages,
            clustering,
        })
    }

    /// Load a local JSON dataset, then cluster
    pub fn run_local(&self, path: &Path) -> Result<PipelineOutcome> {
        let dataset = LocalDataset::load(path, MAX_LOCAL_ENTITIES)?;
        let clustering = self.cluster(dataset.store)?;
        Ok(PipelineOutcome {
            records: dataset.records,
            abandoned_pages: Vec::new(),
            clustering,
        })
    }

    fn cluster(&self, store: Arc<SharedDataStore>) -> Result<ClusterOutcome> {
        let mut orchestrator = ClusterOrchestrator::new(self.config.cluster.clone(), store)?;
        orchestrator.run()
    }
}
