//! # `folio_core`
//!
//! The folio synchronization engine: differential synchronization for
//! collaborative papers, in the style of Neil Fraser's *Differential
//! Synchronization*. Peers edit shared text documents belonging to a paper;
//! the engine keeps one shadow per `(peer, file)` pair consistent with the
//! single authoritative server document through diff/patch exchanges.
//!
//! This crate is transport-agnostic. The outer layers (HTTP, authentication,
//! the per-paper agent task) live elsewhere; everything here is driven
//! through [`SyncEngine`] by a single writer.

#![warn(missing_docs)]

/// Diff-match-patch textual delta codec.
pub mod delta;

/// Diff computation behind the provider seam.
pub mod diff;

/// Authoritative documents and per-peer shadow views.
pub mod document;

/// The per-paper synchronization state machine.
pub mod engine;

/// Engine error taxonomy.
pub mod error;

/// Peer mailboxes for message fan-out.
pub mod mailbox;

/// Context patches for best-effort merging.
pub mod patch;

/// Wire protocol types.
pub mod protocol;

/// Document persistence contract and stores.
pub mod store;

/// `encodeURI`-compatible escaping.
pub mod uri;

pub use delta::DeltaError;
pub use diff::{Diff, DiffProvider, Op, TextDiffProvider};
pub use document::{Document, DocumentView, PendingEdit};
pub use engine::{DEFAULT_MAILBOX_CAPACITY, SyncEngine};
pub use error::SyncError;
pub use mailbox::Mailboxes;
pub use patch::Patch;
pub use protocol::{
    EditOp, Message, PaperId, PeerId, SessionItem, SyncAction, SyncCommand, SyncSession,
};
pub use store::{DocumentStore, FsStore, MemoryStore};
