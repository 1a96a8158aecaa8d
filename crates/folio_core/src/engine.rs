//! The per-paper differential synchronization engine.
//!
//! One `SyncEngine` holds everything a paper agent owns: the authoritative
//! documents, every peer's shadow views, the peer mailboxes and the
//! modification clock. All methods take `&mut self`; serialization of
//! callers is the agent's job, so no locks appear here.
//!
//! The update cycle for one inbound command:
//!
//! ```text
//! command ──▶ revision gate ──▶ action dispatch ──▶ flush stack
//!             (ack trim,         (delta / raw /      (diff shadow vs
//!              loss recovery)     nullify)            document, queue
//!                                                     outbound command)
//! ```
//!
//! Revision drift and undecodable deltas never fail a request: the view
//! drops to `delta_ok = false` and the next flush answers with a full `Raw`
//! snapshot instead.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::delta;
use crate::diff::{DiffProvider, TextDiffProvider};
use crate::document::{Document, DocumentView, PendingEdit};
use crate::error::SyncError;
use crate::mailbox::Mailboxes;
use crate::protocol::{EditOp, PeerId, SessionItem, SyncAction, SyncCommand};
use crate::store::DocumentStore;
use crate::uri;

/// Default bound on pending messages per peer mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Synchronization state and logic for a single paper.
pub struct SyncEngine<S: DocumentStore, D: DiffProvider = TextDiffProvider> {
    store: S,
    provider: D,
    root: PathBuf,
    documents: HashMap<PathBuf, Document>,
    views: HashMap<(PeerId, PathBuf), DocumentView>,
    mailboxes: Mailboxes,
    last_modified: DateTime<Utc>,
}

impl<S: DocumentStore> SyncEngine<S> {
    /// Create an engine with the default diff provider.
    pub fn new(store: S, root: impl Into<PathBuf>) -> Self {
        Self::with_provider(store, TextDiffProvider, root)
    }
}

impl<S: DocumentStore, D: DiffProvider> SyncEngine<S, D> {
    /// Create an engine with an explicit diff provider.
    pub fn with_provider(store: S, provider: D, root: impl Into<PathBuf>) -> Self {
        SyncEngine {
            store,
            provider,
            root: root.into(),
            documents: HashMap::new(),
            views: HashMap::new(),
            mailboxes: Mailboxes::new(DEFAULT_MAILBOX_CAPACITY),
            last_modified: Utc::now(),
        }
    }

    /// Replace the mailbox bound (messages kept per peer).
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailboxes = Mailboxes::new(capacity);
        self
    }

    // ==================== Peer Lifecycle ====================

    /// Register a peer, creating its empty mailbox. Idempotent.
    pub fn join(&mut self, peer: &str) {
        self.mailboxes.ensure(peer);
    }

    /// Remove a peer: its views and its mailbox, pending messages included.
    /// Idempotent.
    pub fn part(&mut self, peer: &str) {
        self.views.retain(|(owner, _), _| owner != peer);
        self.mailboxes.remove(peer);
    }

    /// Number of peers currently joined.
    pub fn peer_count(&self) -> usize {
        self.mailboxes.peer_count()
    }

    // ==================== Inspection ====================

    /// When any document of this paper last changed.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Authoritative text of a file, if it is live in this paper.
    pub fn document_text(&self, filename: &str) -> Option<&str> {
        let path = self.canonicalize(filename).ok()?;
        self.documents.get(&path).map(|d| d.text.as_str())
    }

    /// A peer's view of a file, if one exists.
    pub fn view(&self, peer: &str, filename: &str) -> Option<&DocumentView> {
        let path = self.canonicalize(filename).ok()?;
        self.views.get(&(peer.to_string(), path))
    }

    /// Number of live documents.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    // ==================== Session Processing ====================

    /// Process one session's items in order and assemble the response:
    /// outbound commands first, then the peer's pending messages.
    ///
    /// An error aborts the rest of the batch; mutations already applied are
    /// retained.
    pub async fn handle_session(
        &mut self,
        peer: &str,
        items: Vec<SessionItem>,
    ) -> Result<Vec<SessionItem>, SyncError> {
        let mut response = Vec::new();
        for item in items {
            match item {
                SessionItem::Message(message) => {
                    self.mailboxes.broadcast(peer, &message);
                }
                SessionItem::Command(command) => {
                    let outbound = self.handle_command(peer, command).await?;
                    response.extend(outbound.into_iter().map(SessionItem::Command));
                }
            }
        }
        for message in self.mailboxes.drain(peer) {
            response.push(SessionItem::Message(message));
        }
        Ok(response)
    }

    /// Save every live document; the first store failure wins.
    pub async fn persist_all(&self) -> Result<(), SyncError> {
        for document in self.documents.values() {
            self.store.save(&document.path, &document.text).await?;
        }
        Ok(())
    }

    // ==================== Command Processing ====================

    async fn handle_command(
        &mut self,
        peer: &str,
        command: SyncCommand,
    ) -> Result<Vec<SyncCommand>, SyncError> {
        let path = self.canonicalize(&command.filename)?;
        self.ensure_document(&path, &command.filename).await?;

        let key = (peer.to_string(), path.clone());
        if !self.views.contains_key(&key) {
            let view = self
                .documents
                .get(&path)
                .map(|d| DocumentView::new(&d.text))
                .expect("document ensured above");
            self.views.insert(key.clone(), view);
        }

        self.revision_gate(&key, command.revision, &command.filename);

        match command.action {
            SyncAction::Nullify => {
                self.nullify(&path, &command.filename).await?;
                return Ok(Vec::new());
            }
            SyncAction::Delta {
                revision,
                edits,
                overwrite,
            } => self.apply_delta(&key, &path, revision, &edits, overwrite, &command.filename),
            SyncAction::Raw {
                revision,
                data,
                overwrite,
            } => {
                let decoded =
                    uri::decode(&data).map_err(|e| SyncError::Encoding(e.to_string()))?;
                let view = self.views.get_mut(&key).expect("view ensured above");
                let document = self.documents.get_mut(&path).expect("document ensured above");
                let server_revision = view.server_shadow_revision;
                view.set_shadow(document, decoded, revision, server_revision, overwrite);
                self.last_modified = Utc::now();
                log::debug!(
                    "raw resync of {} for {} at revision {}",
                    command.filename,
                    peer,
                    revision
                );
            }
        }

        Ok(self.flush_stack(&key, &command.filename))
    }

    /// Step 3 of command processing: acknowledgement trimming and recovery
    /// from a lost server response.
    fn revision_gate(&mut self, key: &(PeerId, PathBuf), revision: u64, filename: &str) {
        let view = self.views.get_mut(key).expect("view ensured above");
        if revision != view.server_shadow_revision && revision == view.backup_shadow_revision {
            // The previous response never reached the client.
            log::warn!(
                "client revision {} behind server {} on {}, restoring backup shadow",
                revision,
                view.server_shadow_revision,
                filename
            );
            view.restore_backup_shadow();
            self.last_modified = Utc::now();
        }
        let view = self.views.get_mut(key).expect("view ensured above");
        view.edits.retain(|edit| edit.revision > revision);
        view.delta_ok = revision == view.server_shadow_revision;
        if !view.delta_ok {
            log::warn!(
                "revision desync on {}: client {} vs server {}, raw resync scheduled",
                filename,
                revision,
                view.server_shadow_revision
            );
        }
    }

    /// Merge a client edit script into shadow and document.
    fn apply_delta(
        &mut self,
        key: &(PeerId, PathBuf),
        path: &Path,
        revision: u64,
        edits: &[EditOp],
        overwrite: bool,
        filename: &str,
    ) {
        let view = self.views.get_mut(key).expect("view ensured above");
        let document = self.documents.get_mut(path).expect("document ensured above");

        if !view.delta_ok {
            // Awaiting a Raw; the flush below answers with one.
            view.overwrite = overwrite;
            return;
        }
        if revision < view.client_shadow_revision {
            log::debug!(
                "dropping duplicate delta {} (< {}) on {}",
                revision,
                view.client_shadow_revision,
                filename
            );
            view.overwrite = overwrite;
            return;
        }
        if revision > view.client_shadow_revision {
            log::warn!(
                "delta from the future on {}: {} > {}, raw resync scheduled",
                filename,
                revision,
                view.client_shadow_revision
            );
            view.delta_ok = false;
            view.overwrite = overwrite;
            return;
        }

        let delta_text = delta::edits_to_text(edits);
        let diffs = match self.provider.diff_from_delta(&view.shadow, &delta_text) {
            Ok(diffs) => diffs,
            Err(e) => {
                log::warn!("malformed delta on {}: {}", filename, e);
                view.delta_ok = false;
                return;
            }
        };

        let patches = self.provider.patch_make(&view.shadow, &diffs);
        view.shadow = self.provider.diff_text2(&diffs);
        view.backup_shadow = view.shadow.clone();
        view.backup_shadow_revision = view.server_shadow_revision;
        view.changed = true;

        if overwrite {
            document.text = view.shadow.clone();
        } else {
            let (patched, results) = self.provider.patch_apply(&patches, &document.text);
            if results.iter().any(|&applied| !applied) {
                log::warn!(
                    "{} of {} hunks dropped while merging {}",
                    results.iter().filter(|&&applied| !applied).count(),
                    results.len(),
                    filename
                );
            }
            document.text = patched;
        }
        if !patches.is_empty() {
            self.last_modified = Utc::now();
        }
        view.client_shadow_revision += 1;
        view.overwrite = overwrite;
    }

    /// Synthesize the outbound command bringing the client's shadow up to
    /// the current server text, and re-emit everything unacknowledged.
    fn flush_stack(&mut self, key: &(PeerId, PathBuf), filename: &str) -> Vec<SyncCommand> {
        let view = self.views.get_mut(key).expect("view ensured above");
        let document = self.documents.get(&key.1).expect("document ensured above");

        if view.delta_ok {
            let mut diffs = self.provider.diff_main(&view.shadow, &document.text);
            self.provider.diff_cleanup_efficiency(&mut diffs);
            let delta_text = self.provider.diff_to_delta(&diffs);
            let edits = delta::parse_edits(&delta_text).expect("self-produced delta parses");
            view.edits.push(PendingEdit {
                revision: view.server_shadow_revision,
                action: SyncAction::Delta {
                    revision: view.server_shadow_revision,
                    edits,
                    overwrite: view.overwrite,
                },
            });
            view.server_shadow_revision += 1;
        } else {
            view.client_shadow_revision += 1;
            let action = if document.text.is_empty() {
                SyncAction::Raw {
                    revision: view.server_shadow_revision,
                    data: String::new(),
                    overwrite: false,
                }
            } else {
                SyncAction::Raw {
                    revision: view.server_shadow_revision,
                    data: uri::encode(&document.text),
                    overwrite: true,
                }
            };
            view.edits.push(PendingEdit {
                revision: view.server_shadow_revision,
                action,
            });
        }

        view.shadow = document.text.clone();
        view.changed = true;

        // The whole unacknowledged stack goes out, re-enveloped at the
        // now-current server revision; entries leave the stack only through
        // acknowledgement in the revision gate.
        let envelope_revision = view.server_shadow_revision;
        view.edits
            .iter()
            .map(|edit| SyncCommand {
                filename: filename.to_string(),
                revision: envelope_revision,
                action: edit.action.clone(),
            })
            .collect()
    }

    /// Remove the document from store, memory and every view.
    ///
    /// The store delete runs first; if it fails the in-memory state stays
    /// intact and the error surfaces. A document that was never persisted
    /// deletes cleanly.
    async fn nullify(&mut self, path: &Path, filename: &str) -> Result<(), SyncError> {
        match self.store.delete(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(SyncError::Store(e)),
        }
        self.documents.remove(path);
        self.views.retain(|(_, view_path), _| view_path != path);
        log::info!("nullified {}", filename);
        Ok(())
    }

    // ==================== Documents ====================

    async fn ensure_document(&mut self, path: &Path, filename: &str) -> Result<(), SyncError> {
        if self.documents.contains_key(path) {
            return Ok(());
        }
        let text = match self.store.load(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("creating empty document {}", filename);
                String::new()
            }
            Err(e) => return Err(SyncError::Store(e)),
        };
        self.documents
            .insert(path.to_path_buf(), Document::new(path.to_path_buf(), filename, text));
        Ok(())
    }

    /// Join a client filename onto the paper root, lexically.
    ///
    /// `.` components drop; `..`, root and prefix components reject the
    /// path so a peer can never reach outside its paper.
    fn canonicalize(&self, filename: &str) -> Result<PathBuf, SyncError> {
        let mut canonical = self.root.clone();
        let mut pushed = false;
        for component in Path::new(filename).components() {
            match component {
                Component::Normal(part) => {
                    canonical.push(part);
                    pushed = true;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(SyncError::InvalidPath(filename.to_string()));
                }
            }
        }
        if pushed {
            Ok(canonical)
        } else {
            Err(SyncError::InvalidPath(filename.to_string()))
        }
    }
}
