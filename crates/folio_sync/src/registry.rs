//! Directory of live paper agents.
//!
//! Papers spin up on first use and run independently; the registry hands out
//! cloneable handles and never touches paper state itself. Each paper's
//! documents live under `<data_dir>/<paper_id>/`.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::RwLock;
use tracing::info;

use folio_core::engine::SyncEngine;
use folio_core::protocol::PaperId;
use folio_core::store::FsStore;
use folio_core::SyncError;

use crate::agent::{PaperAgent, PaperHandle};
use crate::config::Config;

/// Registry of running paper agents, keyed by paper id.
pub struct PaperRegistry {
    config: Config,
    papers: RwLock<HashMap<PaperId, PaperHandle>>,
}

impl PaperRegistry {
    /// Create a registry storing papers under `config.data_dir`.
    pub fn new(config: Config) -> Self {
        PaperRegistry {
            config,
            papers: RwLock::new(HashMap::new()),
        }
    }

    /// Root directory of one paper's documents.
    pub fn paper_root(&self, paper_id: &str) -> PathBuf {
        self.config.data_dir.join(paper_id)
    }

    /// Get the running agent for `paper_id`, spawning one if needed.
    ///
    /// Handles whose agents have stopped are evicted and replaced.
    pub async fn get_or_create(&self, paper_id: &str) -> Result<PaperHandle, SyncError> {
        validate_paper_id(paper_id)?;

        {
            let papers = self.papers.read().await;
            if let Some(handle) = papers.get(paper_id) {
                if !handle.is_stopped() {
                    return Ok(handle.clone());
                }
            }
        }

        let mut papers = self.papers.write().await;
        // Double-check after acquiring the write lock.
        if let Some(handle) = papers.get(paper_id) {
            if !handle.is_stopped() {
                return Ok(handle.clone());
            }
        }

        let engine = SyncEngine::new(FsStore::new(), self.paper_root(paper_id))
            .mailbox_capacity(self.config.mailbox_capacity);
        let handle = PaperAgent::spawn(paper_id, engine, self.config.request_capacity);
        papers.insert(paper_id.to_string(), handle.clone());
        info!(paper = %paper_id, "spawned paper agent");
        Ok(handle)
    }

    /// Look up a running agent without creating one.
    pub async fn get(&self, paper_id: &str) -> Option<PaperHandle> {
        let papers = self.papers.read().await;
        papers
            .get(paper_id)
            .filter(|handle| !handle.is_stopped())
            .cloned()
    }

    /// Stop one paper, persisting its documents, and drop its handle.
    pub async fn stop_paper(&self, paper_id: &str) -> Result<(), SyncError> {
        let handle = {
            let mut papers = self.papers.write().await;
            papers.remove(paper_id)
        };
        match handle {
            Some(handle) => handle.stop().await,
            None => Ok(()),
        }
    }

    /// Stop every paper. Each paper persists; the first failure is returned
    /// after all agents have been stopped.
    pub async fn stop_all(&self) -> Result<(), SyncError> {
        let handles: Vec<(PaperId, PaperHandle)> = {
            let mut papers = self.papers.write().await;
            papers.drain().collect()
        };
        let mut first_failure = None;
        for (paper_id, handle) in handles {
            if let Err(e) = handle.stop().await {
                tracing::error!(paper = %paper_id, error = %e, "stop failed");
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Number of live paper agents.
    pub async fn paper_count(&self) -> usize {
        let papers = self.papers.read().await;
        papers
            .values()
            .filter(|handle| !handle.is_stopped())
            .count()
    }
}

/// A paper id becomes a directory name, so it must be a single plain path
/// segment.
fn validate_paper_id(paper_id: &str) -> Result<(), SyncError> {
    let plain = !paper_id.is_empty()
        && paper_id != "."
        && paper_id != ".."
        && !paper_id.contains(['/', '\\']);
    if plain {
        Ok(())
    } else {
        Err(SyncError::InvalidPath(paper_id.to_string()))
    }
}
