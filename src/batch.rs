use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::criteria::SearchCriteria;
use crate::orchestrator::{Orchestrator, SearchEvent, SearchOutcome};
use crate::tree::NodeId;
use crate::Result;

/// Batch ("auto search") configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Wait between consecutive queue items.
    pub item_debounce: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            item_debounce: Duration::from_millis(200),
        }
    }
}

/// Drives many filenames through the orchestrator sequentially, one session
/// at a time, keeping the per-path outcomes for later inspection.
///
/// Pagination is suppressed while the queue runs: an auto search settles for
/// the first page of candidates per item.
pub struct BatchDriver {
    orchestrator: Arc<Orchestrator>,
    config: BatchConfig,
    queue: Mutex<VecDeque<(PathBuf, SearchCriteria)>>,
    outcomes: Mutex<HashMap<PathBuf, SearchOutcome>>,
    /// Session errors per path, kept apart so a failed item never hides the
    /// others' results.
    errors: Mutex<HashMap<PathBuf, String>>,
}

impl BatchDriver {
    pub fn new(orchestrator: Arc<Orchestrator>, config: BatchConfig) -> Self {
        Self {
            orchestrator,
            config,
            queue: Mutex::new(VecDeque::new()),
            outcomes: Mutex::new(HashMap::new()),
            errors: Mutex::new(HashMap::new()),
        }
    }

    /// Build criteria from a path via the orchestrator's parser and enqueue
    /// it.
    pub fn add_path(&self, path: impl Into<PathBuf>) -> SearchCriteria {
        let path = path.into();
        let parsed = self.orchestrator.parser().parse_path(&path, false);
        let criteria = SearchCriteria::from_parsed(&parsed);
        self.add_search(path, criteria.clone());
        criteria
    }

    /// Enqueue an explicit (path, criteria) pair.
    pub fn add_search(&self, path: impl Into<PathBuf>, criteria: SearchCriteria) {
        self.queue.lock().push_back((path.into(), criteria));
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run the queue to completion. Individual session failures are recorded
    /// per path; the queue keeps going.
    pub async fn run(&self) -> Result<()> {
        self.orchestrator.set_suppress_pagination(true);
        info!("Auto search starting: {} item(s) queued", self.queue_len());

        let mut first = true;
        loop {
            let Some((path, mut criteria)) = self.queue.lock().pop_front() else {
                break;
            };
            if !first {
                tokio::time::sleep(self.config.item_debounce).await;
            }
            first = false;

            self.orchestrator.emit_event(SearchEvent::AutoSearchPartial {
                path: path.clone(),
            });

            match self.orchestrator.search(&path, &mut criteria).await {
                Ok(outcome) => {
                    debug!(
                        "Auto search resolved {} with {} match(es)",
                        path.display(),
                        outcome.match_count()
                    );
                    self.outcomes.lock().insert(path.clone(), outcome);
                    self.errors.lock().remove(&path);
                }
                Err(crate::Error::Cancelled) => {
                    warn!("Auto search cancelled at {}", path.display());
                    self.orchestrator.set_suppress_pagination(false);
                    return Err(crate::Error::Cancelled);
                }
                Err(e) => {
                    warn!("Auto search failed for {}: {e}", path.display());
                    self.errors.lock().insert(path.clone(), e.to_string());
                }
            }

            let has_more = self.queue_len() > 0;
            self.orchestrator.emit_event(SearchEvent::AutoSearchFinished {
                path,
                criteria,
                has_more,
            });
        }

        self.orchestrator.set_suppress_pagination(false);
        info!("Auto search finished");
        Ok(())
    }

    /// Inspect the outcome stored for a path, if its session completed.
    /// Outcomes stay owned by the driver, so access goes through a closure.
    pub fn get_result<T>(
        &self,
        path: &Path,
        f: impl FnOnce(&SearchOutcome) -> T,
    ) -> Option<T> {
        self.outcomes.lock().get(path).map(f)
    }

    /// Best-match node id for a path.
    pub fn best_match(&self, path: &Path) -> Option<NodeId> {
        self.outcomes
            .lock()
            .get(path)
            .and_then(|outcome| outcome.best_match())
    }

    /// Error message recorded for a path's failed session.
    pub fn error(&self, path: &Path) -> Option<String> {
        self.errors.lock().get(path).cloned()
    }

    /// Paths whose sessions have completed so far, available while the
    /// queue is still running.
    pub fn partial_results(&self) -> Vec<PathBuf> {
        self.outcomes.lock().keys().cloned().collect()
    }

    /// Forget all stored outcomes and errors.
    pub fn reset_results(&self) {
        self.outcomes.lock().clear();
        self.errors.lock().clear();
    }

    /// Drop the orchestrator's response cache.
    pub fn clear_search_cache(&self) {
        self.orchestrator.clear_search_cache();
    }

    /// Cancel the run: the current session stops issuing new requests and
    /// the remaining queue is dropped.
    pub async fn stop(&self) {
        self.queue.lock().clear();
        self.orchestrator.stop().await;
    }
}

impl std::fmt::Debug for BatchDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDriver")
            .field("queued", &self.queue_len())
            .field("resolved", &self.outcomes.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::OrchestratorConfig;
    use crate::provider::HttpTransport;

    fn driver() -> BatchDriver {
        let orchestrator = Arc::new(Orchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(HttpTransport::new()),
        ));
        BatchDriver::new(orchestrator, BatchConfig::default())
    }

    #[test]
    fn test_add_path_builds_criteria() {
        let driver = driver();
        let criteria = driver.add_path("/media/Show.Name.S02E05.mkv");

        assert_eq!(criteria.search_name, "Show Name");
        assert_eq!(criteria.season, Some(2));
        assert_eq!(criteria.episodes, vec![5]);
        assert_eq!(driver.queue_len(), 1);
    }

    #[test]
    fn test_reset_results() {
        let driver = driver();
        driver
            .errors
            .lock()
            .insert(PathBuf::from("/a"), "boom".to_string());
        assert!(driver.error(Path::new("/a")).is_some());

        driver.reset_results();
        assert!(driver.error(Path::new("/a")).is_none());
    }
}
