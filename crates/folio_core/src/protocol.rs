//! Wire types for the paper synchronization protocol (JSON envelopes).
//!
//! A transport delivers one [`SyncSession`] per request; the engine answers
//! with a `SyncSession` of the same shape. Items inside a session are either
//! opaque peer-to-peer messages or per-file synchronization commands. All
//! sums are closed and dispatch is by pattern match.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::uri;

/// Opaque client identifier within one paper.
pub type PeerId = String;

/// Opaque identifier of a paper (a set of jointly edited documents).
pub type PaperId = String;

/// A full synchronization exchange for one peer, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSession {
    /// The peer this exchange belongs to.
    pub peer: PeerId,
    /// The paper being synchronized.
    pub paper: PaperId,
    /// Ordered session items; responses carry outbound commands first, then
    /// the peer's pending messages.
    pub items: Vec<SessionItem>,
}

/// One element of a session, processed strictly in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionItem {
    /// A broadcast message for the other peers of the paper.
    Message(Message),
    /// A per-file synchronization command.
    Command(SyncCommand),
}

/// An opaque peer-to-peer message, fanned out to every other peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Arbitrary JSON payload; the engine never inspects it.
    pub payload: serde_json::Value,
}

/// A synchronization command scoped to one file of the paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCommand {
    /// File path as the client names it, relative to the paper root.
    pub filename: String,
    /// The client's view of the server shadow revision.
    pub revision: u64,
    /// What to do with the file.
    pub action: SyncAction,
}

/// The action carried by a [`SyncCommand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncAction {
    /// An incremental edit script against the sender's shadow.
    Delta {
        /// Revision of the shadow the edits apply to.
        revision: u64,
        /// The edit script, in diff-match-patch delta order.
        edits: Vec<EditOp>,
        /// Force the receiving text to the post-edit shadow.
        overwrite: bool,
    },
    /// A full snapshot, used to (re)initialize a shadow.
    Raw {
        /// Revision to reset the shadow bookkeeping to.
        revision: u64,
        /// URI-encoded document text (see [`crate::uri`]).
        data: String,
        /// Force the receiving text to the snapshot.
        overwrite: bool,
    },
    /// Delete the document and every view of it.
    Nullify,
}

/// A single typed edit of a diff-match-patch textual delta.
///
/// Lengths count UTF-16 code units, matching what JavaScript clients produce.
/// On the wire an op is its delta token: `"=5"`, `"-3"`, or `"+"` followed by
/// the `encodeURI`-escaped inserted text, so a JSON array of ops is exactly a
/// tab-split `diff_toDelta` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    /// Keep the next `n` UTF-16 code units.
    Equal(u64),
    /// Drop the next `n` UTF-16 code units.
    Delete(u64),
    /// Insert the given text.
    Insert(String),
}

/// Failure to parse an [`EditOp`] delta token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadToken(pub String);

impl std::fmt::Display for BadToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bad delta token: {:?}", self.0)
    }
}

impl std::error::Error for BadToken {}

impl EditOp {
    /// Render the op as its delta token.
    pub fn to_token(&self) -> String {
        match self {
            EditOp::Equal(n) => format!("={}", n),
            EditOp::Delete(n) => format!("-{}", n),
            EditOp::Insert(text) => format!("+{}", uri::encode(text)),
        }
    }

    /// Parse a delta token back into an op.
    pub fn from_token(token: &str) -> Result<Self, BadToken> {
        let bad = || BadToken(token.to_string());
        match token.as_bytes().first() {
            Some(b'=') => Ok(EditOp::Equal(parse_count(&token[1..]).ok_or_else(bad)?)),
            Some(b'-') => Ok(EditOp::Delete(parse_count(&token[1..]).ok_or_else(bad)?)),
            Some(b'+') => Ok(EditOp::Insert(uri::decode(&token[1..]).map_err(|_| bad())?)),
            _ => Err(bad()),
        }
    }
}

/// Counts must be positive: a zero-length keep or delete is malformed.
fn parse_count(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match digits.parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n),
    }
}

impl Serialize for EditOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_token())
    }
}

impl<'de> Deserialize<'de> for EditOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        EditOp::from_token(&token).map_err(D::Error::custom)
    }
}
