//! The diff-match-patch textual delta syntax.
//!
//! A delta describes how to turn one text into another as tab-joined tokens:
//! `=N` keeps N units of the source, `-N` drops N units, `+text` inserts
//! `encodeURI`-escaped text. Lengths count UTF-16 code units because the
//! reference implementation lives in JavaScript; a delta produced here must
//! parse byte-identically on such a client and vice versa.

use crate::diff::{Diff, Op};
use crate::protocol::{BadToken, EditOp};
use crate::uri;

/// Failure to interpret a delta string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaError {
    /// A token was not `=N`, `-N` or `+text`.
    Token(String),
    /// A length token reached past the end of the source text.
    Overrun(u64),
    /// A length token split a surrogate pair of the source text.
    SurrogateSplit(u64),
    /// The delta did not consume the source text exactly.
    LengthMismatch {
        /// UTF-16 length of the source text.
        expected: u64,
        /// UTF-16 units the delta consumed.
        consumed: u64,
    },
}

impl std::fmt::Display for DeltaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeltaError::Token(token) => write!(f, "bad delta token: {:?}", token),
            DeltaError::Overrun(at) => write!(f, "delta ran past source end at unit {}", at),
            DeltaError::SurrogateSplit(at) => {
                write!(f, "delta splits a surrogate pair at unit {}", at)
            }
            DeltaError::LengthMismatch { expected, consumed } => write!(
                f,
                "delta consumed {} of {} source units",
                consumed, expected
            ),
        }
    }
}

impl std::error::Error for DeltaError {}

impl From<BadToken> for DeltaError {
    fn from(error: BadToken) -> Self {
        DeltaError::Token(error.0)
    }
}

/// UTF-16 code unit length of `text`.
pub fn utf16_len(text: &str) -> u64 {
    text.chars().map(|c| c.len_utf16() as u64).sum()
}

/// Split `text` after `count` UTF-16 code units.
///
/// Fails when `text` is shorter than `count` or when the boundary would land
/// inside a supplementary-plane character. `consumed` is the unit offset of
/// `text` within the overall source, used only for error positions.
fn take_utf16(text: &str, count: u64, consumed: u64) -> Result<(&str, &str), DeltaError> {
    let mut units = 0u64;
    for (idx, c) in text.char_indices() {
        if units == count {
            return Ok(text.split_at(idx));
        }
        if units > count {
            break;
        }
        units += c.len_utf16() as u64;
    }
    if units == count {
        return Ok((text, ""));
    }
    if units > count {
        Err(DeltaError::SurrogateSplit(consumed + count))
    } else {
        Err(DeltaError::Overrun(consumed + units))
    }
}

/// Serialize a diff into its compact delta form.
pub fn to_delta(diffs: &[Diff]) -> String {
    let tokens: Vec<String> = diffs
        .iter()
        .map(|diff| match diff.op {
            Op::Equal => format!("={}", utf16_len(&diff.text)),
            Op::Delete => format!("-{}", utf16_len(&diff.text)),
            Op::Insert => format!("+{}", uri::encode(&diff.text)),
        })
        .collect();
    tokens.join("\t")
}

/// Parse a delta into typed edit ops, without a source text.
pub fn parse_edits(delta: &str) -> Result<Vec<EditOp>, DeltaError> {
    let mut edits = Vec::new();
    for token in delta.split('\t') {
        // A blank token comes from a trailing tab; skip it.
        if token.is_empty() {
            continue;
        }
        edits.push(EditOp::from_token(token)?);
    }
    Ok(edits)
}

/// Join typed edit ops back into delta text. Exact inverse of [`parse_edits`].
pub fn edits_to_text(edits: &[EditOp]) -> String {
    let tokens: Vec<String> = edits.iter().map(EditOp::to_token).collect();
    tokens.join("\t")
}

/// Rehydrate a delta against the source text it was computed from.
///
/// Fails when the delta is malformed or inconsistent with `base`'s length.
pub fn from_delta(base: &str, delta: &str) -> Result<Vec<Diff>, DeltaError> {
    let mut diffs = Vec::new();
    let mut rest = base;
    let mut consumed = 0u64;
    for edit in parse_edits(delta)? {
        match edit {
            EditOp::Equal(n) => {
                let (taken, tail) = take_utf16(rest, n, consumed)?;
                diffs.push(Diff::equal(taken));
                rest = tail;
                consumed += n;
            }
            EditOp::Delete(n) => {
                let (taken, tail) = take_utf16(rest, n, consumed)?;
                diffs.push(Diff::delete(taken));
                rest = tail;
                consumed += n;
            }
            EditOp::Insert(text) => diffs.push(Diff::insert(text)),
        }
    }
    if !rest.is_empty() {
        return Err(DeltaError::LengthMismatch {
            expected: utf16_len(base),
            consumed,
        });
    }
    Ok(diffs)
}

/// The target text implied by a diff.
pub fn text2(diffs: &[Diff]) -> String {
    let mut out = String::new();
    for diff in diffs {
        match diff.op {
            Op::Equal | Op::Insert => out.push_str(&diff.text),
            Op::Delete => {}
        }
    }
    out
}
