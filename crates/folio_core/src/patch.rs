//! Context patches for merging shadow edits into the server text.
//!
//! A patch hunk captures an edit cluster plus a few characters of equal
//! context on each side. Application is best-effort and exact: a hunk lands
//! at the nearest occurrence of its source text, or is discarded when the
//! surrounding text has drifted past recognition. Differential sync
//! tolerates dropped hunks; the next flush re-converges the shadows.

use crate::diff::{Diff, Op};

/// Equal context kept around each edit cluster, in characters.
const PATCH_MARGIN: usize = 4;

/// One self-contained hunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Byte offset of `source` in the text the diff was computed from.
    start: usize,
    /// Text the hunk replaces: leading context, kept-and-deleted runs,
    /// trailing context.
    source: String,
    /// Replacement: leading context, kept-and-inserted runs, trailing context.
    target: String,
}

impl Patch {
    /// True when the hunk changes nothing.
    pub fn is_noop(&self) -> bool {
        self.source == self.target
    }
}

/// Last `count` characters of `text`.
fn suffix_chars(text: &str, count: usize) -> &str {
    let chars = text.chars().count();
    let skip = chars.saturating_sub(count);
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}

/// First `count` characters of `text`.
fn prefix_chars(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build hunks from a diff computed against `text`.
///
/// Equalities of at most `2 * PATCH_MARGIN` characters between edits are
/// absorbed into a single hunk; longer ones split hunks and donate context
/// to both sides.
pub fn make(text: &str, diffs: &[Diff]) -> Vec<Patch> {
    debug_assert_eq!(
        diffs
            .iter()
            .filter(|d| d.op != Op::Insert)
            .map(|d| d.text.as_str())
            .collect::<String>(),
        text,
        "diff does not reconstruct the patched text"
    );

    let mut patches = Vec::new();
    let mut open: Option<Patch> = None;
    let mut offset = 0usize;
    let mut last_equal = "";

    for (i, diff) in diffs.iter().enumerate() {
        match diff.op {
            Op::Equal => {
                if let Some(hunk) = open.as_mut() {
                    let more_edits = diffs[i + 1..].iter().any(|d| d.op != Op::Equal);
                    if more_edits && diff.text.chars().count() <= 2 * PATCH_MARGIN {
                        hunk.source.push_str(&diff.text);
                        hunk.target.push_str(&diff.text);
                    } else {
                        let context = prefix_chars(&diff.text, PATCH_MARGIN);
                        let mut hunk = open.take().expect("cluster is open");
                        hunk.source.push_str(context);
                        hunk.target.push_str(context);
                        patches.push(hunk);
                    }
                }
                offset += diff.text.len();
                last_equal = &diff.text;
            }
            Op::Delete | Op::Insert => {
                let hunk = open.get_or_insert_with(|| {
                    let context = suffix_chars(last_equal, PATCH_MARGIN);
                    Patch {
                        start: offset - context.len(),
                        source: context.to_string(),
                        target: context.to_string(),
                    }
                });
                if diff.op == Op::Delete {
                    hunk.source.push_str(&diff.text);
                    offset += diff.text.len();
                } else {
                    hunk.target.push_str(&diff.text);
                }
            }
        }
    }
    if let Some(hunk) = open {
        patches.push(hunk);
    }
    patches
}

/// Apply hunks to `text`, returning the result and a per-hunk success flag.
pub fn apply(patches: &[Patch], text: &str) -> (String, Vec<bool>) {
    let mut out = text.to_string();
    let mut results = Vec::with_capacity(patches.len());
    let mut drift = 0isize;

    for hunk in patches {
        let expected = clamp_boundary(&out, hunk.start.saturating_add_signed(drift));
        let position = if hunk.source.is_empty() {
            Some(expected)
        } else {
            find_nearest(&out, &hunk.source, expected)
        };
        match position {
            Some(at) => {
                out.replace_range(at..at + hunk.source.len(), &hunk.target);
                drift = drift + hunk.target.len() as isize - hunk.source.len() as isize;
                results.push(true);
            }
            None => results.push(false),
        }
    }
    (out, results)
}

/// Nearest exact occurrence of `needle` to the `expected` byte offset.
fn find_nearest(haystack: &str, needle: &str, expected: usize) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (at, _) in haystack.match_indices(needle) {
        let distance = at.abs_diff(expected);
        match best {
            Some(prev) if prev.abs_diff(expected) <= distance => {}
            _ => best = Some(at),
        }
    }
    best
}

/// Clamp a byte offset into `text` down to the nearest char boundary.
fn clamp_boundary(text: &str, offset: usize) -> usize {
    let mut at = offset.min(text.len());
    while at > 0 && !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}
