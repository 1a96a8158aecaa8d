//! Per-file server state: the authoritative document and per-peer views.
//!
//! A [`Document`] is the single authoritative text for one file of a paper.
//! A [`DocumentView`] is the differential-synchronization bookkeeping the
//! server keeps for one `(peer, file)` pair: the client shadow, a one-step
//! backup for loss recovery, revision counters and the stack of outbound
//! commands the client has not acknowledged yet.

use std::path::PathBuf;

use crate::protocol::SyncAction;

/// The authoritative server copy of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Canonical absolute path; the stable key inside a paper.
    pub path: PathBuf,
    /// The path as clients name it, relative to the paper root.
    pub filename: String,
    /// Current authoritative text.
    pub text: String,
}

impl Document {
    /// Create a document with the given canonical path and text.
    pub fn new(path: PathBuf, filename: impl Into<String>, text: impl Into<String>) -> Self {
        Document {
            path,
            filename: filename.into(),
            text: text.into(),
        }
    }
}

/// An outbound command awaiting client acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEdit {
    /// Server shadow revision the action was emitted at.
    pub revision: u64,
    /// The emitted action.
    pub action: SyncAction,
}

/// Differential-synchronization state for one `(peer, file)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentView {
    /// Last text both sides are known to have agreed on.
    pub shadow: String,
    /// One-step-older shadow, kept to recover from a lost response.
    pub backup_shadow: String,
    /// Server shadow revision captured in `backup_shadow`.
    pub backup_shadow_revision: u64,
    /// Count of deltas the server has emitted for this view.
    pub server_shadow_revision: u64,
    /// Count of deltas accepted from the client.
    pub client_shadow_revision: u64,
    /// Unacknowledged outbound commands, oldest first.
    pub edits: Vec<PendingEdit>,
    /// Whether the next client delta may be applied, or a Raw resync is due.
    pub delta_ok: bool,
    /// Last overwrite flag seen from the client.
    pub overwrite: bool,
    /// Advisory dirty flag.
    pub changed: bool,
}

impl DocumentView {
    /// A fresh view whose shadow starts at the current document text.
    pub fn new(document_text: &str) -> Self {
        DocumentView {
            shadow: document_text.to_string(),
            backup_shadow: document_text.to_string(),
            backup_shadow_revision: 0,
            server_shadow_revision: 0,
            client_shadow_revision: 0,
            edits: Vec::new(),
            delta_ok: true,
            overwrite: false,
            changed: false,
        }
    }

    /// Roll the shadow back to the backup after a lost server response.
    pub fn restore_backup_shadow(&mut self) {
        self.shadow = self.backup_shadow.clone();
        self.server_shadow_revision = self.backup_shadow_revision;
        self.edits.clear();
    }

    /// Reinitialize the shadow from a full snapshot.
    ///
    /// When `overwrite` is set the authoritative text is forced to the
    /// snapshot as well.
    pub fn set_shadow(
        &mut self,
        document: &mut Document,
        data: String,
        client_revision: u64,
        server_revision: u64,
        overwrite: bool,
    ) {
        if overwrite {
            document.text = data.clone();
        }
        self.shadow = data.clone();
        self.client_shadow_revision = client_revision;
        self.server_shadow_revision = server_revision;
        self.backup_shadow = data;
        self.backup_shadow_revision = server_revision;
        self.edits.clear();
        self.delta_ok = true;
        self.changed = true;
    }

    /// Snapshot the current shadow into the backup.
    pub fn update(&mut self) {
        self.backup_shadow = self.shadow.clone();
        self.backup_shadow_revision = self.server_shadow_revision;
        self.changed = true;
    }
}
