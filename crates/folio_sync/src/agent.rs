//! The per-paper single-writer agent.
//!
//! One tokio task owns one paper's [`SyncEngine`] and consumes a typed
//! request channel; every request carries a oneshot reply sender. Requests
//! are processed strictly in arrival order, so no locks guard any paper
//! state, and papers never share mutable state with each other.
//!
//! `Stop` is absorbing: the agent persists its documents, acknowledges, and
//! exits. Requests still queued behind it, and any sent afterwards, fail
//! with [`SyncError::Stopped`].

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use folio_core::engine::SyncEngine;
use folio_core::protocol::{PaperId, PeerId, SessionItem, SyncSession};
use folio_core::{DiffProvider, DocumentStore, SyncError};

/// Requests understood by a paper agent.
#[derive(Debug)]
pub enum PaperRequest {
    /// Register a peer with the paper.
    Join {
        /// The joining peer.
        peer: PeerId,
        /// Acknowledgement channel.
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    /// Remove a peer, its views and its pending messages.
    Part {
        /// The parting peer.
        peer: PeerId,
        /// Acknowledgement channel.
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    /// Process one synchronization exchange for a peer.
    SyncSession {
        /// The requesting peer.
        peer: PeerId,
        /// Paper id echoed into the response envelope.
        paper: PaperId,
        /// Ordered inbound items.
        items: Vec<SessionItem>,
        /// Channel for the response session or failure.
        reply: oneshot::Sender<Result<SyncSession, SyncError>>,
    },
    /// Save every live document.
    Persist {
        /// Completion channel; carries the first store failure.
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    /// Report when the paper last changed.
    LastModificationDate {
        /// Channel for the timestamp.
        reply: oneshot::Sender<Result<DateTime<Utc>, SyncError>>,
    },
    /// Persist everything and terminate the agent.
    Stop {
        /// Completion channel for the final persist.
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
}

/// Cloneable handle for talking to one paper agent.
#[derive(Clone, Debug)]
pub struct PaperHandle {
    tx: mpsc::Sender<PaperRequest>,
}

impl PaperHandle {
    /// Register `peer` with the paper. Idempotent.
    pub async fn join(&self, peer: impl Into<PeerId>) -> Result<(), SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PaperRequest::Join {
                peer: peer.into(),
                reply,
            })
            .await
            .map_err(|_| SyncError::Stopped)?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    /// Remove `peer` from the paper. Idempotent.
    pub async fn part(&self, peer: impl Into<PeerId>) -> Result<(), SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PaperRequest::Part {
                peer: peer.into(),
                reply,
            })
            .await
            .map_err(|_| SyncError::Stopped)?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    /// Run one synchronization exchange and return the response session.
    pub async fn sync_session(
        &self,
        peer: impl Into<PeerId>,
        paper: impl Into<PaperId>,
        items: Vec<SessionItem>,
    ) -> Result<SyncSession, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PaperRequest::SyncSession {
                peer: peer.into(),
                paper: paper.into(),
                items,
                reply,
            })
            .await
            .map_err(|_| SyncError::Stopped)?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    /// Save every live document of the paper.
    pub async fn persist(&self) -> Result<(), SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PaperRequest::Persist { reply })
            .await
            .map_err(|_| SyncError::Stopped)?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    /// When any document of the paper last changed.
    pub async fn last_modification_date(&self) -> Result<DateTime<Utc>, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PaperRequest::LastModificationDate { reply })
            .await
            .map_err(|_| SyncError::Stopped)?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    /// Persist the paper and terminate its agent.
    pub async fn stop(&self) -> Result<(), SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PaperRequest::Stop { reply })
            .await
            .map_err(|_| SyncError::Stopped)?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    /// Whether the agent behind this handle has terminated.
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The single-writer task owning one paper's engine.
pub struct PaperAgent<S: DocumentStore, D: DiffProvider> {
    paper: PaperId,
    engine: SyncEngine<S, D>,
    rx: mpsc::Receiver<PaperRequest>,
}

impl<S, D> PaperAgent<S, D>
where
    S: DocumentStore + 'static,
    D: DiffProvider + 'static,
{
    /// Spawn the agent task for `paper` and return its handle.
    pub fn spawn(
        paper: impl Into<PaperId>,
        engine: SyncEngine<S, D>,
        request_capacity: usize,
    ) -> PaperHandle {
        let (tx, rx) = mpsc::channel(request_capacity.max(1));
        let agent = PaperAgent {
            paper: paper.into(),
            engine,
            rx,
        };
        tokio::spawn(agent.run());
        PaperHandle { tx }
    }

    async fn run(mut self) {
        info!(paper = %self.paper, "paper agent started");
        while let Some(request) = self.rx.recv().await {
            match request {
                PaperRequest::Join { peer, reply } => {
                    debug!(paper = %self.paper, %peer, "join");
                    self.engine.join(&peer);
                    let _ = reply.send(Ok(()));
                }
                PaperRequest::Part { peer, reply } => {
                    debug!(paper = %self.paper, %peer, "part");
                    self.engine.part(&peer);
                    let _ = reply.send(Ok(()));
                }
                PaperRequest::SyncSession {
                    peer,
                    paper,
                    items,
                    reply,
                } => {
                    let result = self.engine.handle_session(&peer, items).await;
                    if let Err(e) = &result {
                        warn!(paper = %self.paper, %peer, error = %e, "session failed");
                    }
                    let _ = reply.send(result.map(|items| SyncSession {
                        peer,
                        paper,
                        items,
                    }));
                }
                PaperRequest::Persist { reply } => {
                    let result = self.engine.persist_all().await;
                    if let Err(e) = &result {
                        error!(paper = %self.paper, error = %e, "persist failed");
                    }
                    let _ = reply.send(result);
                }
                PaperRequest::LastModificationDate { reply } => {
                    let _ = reply.send(Ok(self.engine.last_modified()));
                }
                PaperRequest::Stop { reply } => {
                    let result = self.engine.persist_all().await;
                    if let Err(e) = &result {
                        error!(paper = %self.paper, error = %e, "persist on stop failed");
                    }
                    // Close before acknowledging so the channel reads as
                    // stopped by the time the caller resumes; queued and
                    // future requests all fail with Stopped.
                    self.rx.close();
                    let _ = reply.send(result);
                    break;
                }
            }
        }
        info!(paper = %self.paper, "paper agent terminated");
    }
}
