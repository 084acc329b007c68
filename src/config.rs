use crate::workflow::WorkflowTiming;
use std::path::{Path, PathBuf};

/// Service configuration
///
/// Built once at startup and handed to [`crate::LendingService::open`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding one JSON document per collection
    pub data_dir: PathBuf,

    /// Number of background workflow workers
    pub workers: usize,

    /// Simulated latency windows for the workflows
    pub timing: WorkflowTiming,

    /// Seed for the decision source; `None` seeds from entropy
    pub decision_seed: Option<u64>,
}

impl ServiceConfig {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            workers: 2,
            timing: WorkflowTiming::default(),
            decision_seed: None,
        }
    }

    /// Set the worker count (clamped to at least one)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the simulated latency windows
    pub fn timing(mut self, timing: WorkflowTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Seed the decision source for reproducible runs
    pub fn decision_seed(mut self, seed: u64) -> Self {
        self.decision_seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ServiceConfig::new("/tmp/lendsim-data");
        assert_eq!(config.workers, 2);
        assert!(config.decision_seed.is_none());
    }

    #[test]
    fn test_workers_clamped() {
        let config = ServiceConfig::new("/tmp/lendsim-data").workers(0);
        assert_eq!(config.workers, 1);
    }
}
