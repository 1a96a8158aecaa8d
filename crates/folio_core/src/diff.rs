//! Text diff computation behind the [`DiffProvider`] seam.
//!
//! The engine never computes diffs itself; it asks a provider. The delta and
//! patch wire formats are fixed by client compatibility, so the trait only
//! requires the diff algorithm and cleanup; serialization and patching have
//! provided defaults over [`crate::delta`] and [`crate::patch`].

use similar::{ChangeTag, TextDiff};

use crate::delta::{self, DeltaError, utf16_len};
use crate::patch::{self, Patch};

/// The kind of a diff run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Text present in both sides.
    Equal,
    /// Text present only in the source.
    Delete,
    /// Text present only in the target.
    Insert,
}

/// One run of a character-level diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    /// What happened to this run.
    pub op: Op,
    /// The run's text.
    pub text: String,
}

impl Diff {
    /// An equality run.
    pub fn equal(text: impl Into<String>) -> Self {
        Diff {
            op: Op::Equal,
            text: text.into(),
        }
    }

    /// A deletion run.
    pub fn delete(text: impl Into<String>) -> Self {
        Diff {
            op: Op::Delete,
            text: text.into(),
        }
    }

    /// An insertion run.
    pub fn insert(text: impl Into<String>) -> Self {
        Diff {
            op: Op::Insert,
            text: text.into(),
        }
    }
}

/// Diff, delta and patch operations over UTF-8 strings.
///
/// Implementations must be deterministic; identity across operations is by
/// value only.
pub trait DiffProvider: Send + Sync {
    /// Compute an edit script turning `old` into `new`.
    ///
    /// Identical inputs yield an empty script.
    fn diff_main(&self, old: &str, new: &str) -> Vec<Diff>;

    /// Post-process a diff in place to trade precision for compactness.
    fn diff_cleanup_efficiency(&self, diffs: &mut Vec<Diff>);

    /// Serialize a diff to the compact delta form.
    fn diff_to_delta(&self, diffs: &[Diff]) -> String {
        delta::to_delta(diffs)
    }

    /// Rehydrate a delta against the text it was computed from.
    fn diff_from_delta(&self, base: &str, delta_text: &str) -> Result<Vec<Diff>, DeltaError> {
        delta::from_delta(base, delta_text)
    }

    /// The target text implied by a diff.
    fn diff_text2(&self, diffs: &[Diff]) -> String {
        delta::text2(diffs)
    }

    /// Build patch hunks applying `diffs` to `text`.
    fn patch_make(&self, text: &str, diffs: &[Diff]) -> Vec<Patch> {
        patch::make(text, diffs)
    }

    /// Best-effort patch application; rejected hunks report `false`.
    fn patch_apply(&self, patches: &[Patch], text: &str) -> (String, Vec<bool>) {
        patch::apply(patches, text)
    }
}

/// Default provider: character-level Myers diffs via the `similar` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDiffProvider;

/// Equalities shorter than this (UTF-16 units) fold into surrounding edits.
const EFFICIENCY_EDIT_COST: u64 = 4;

impl DiffProvider for TextDiffProvider {
    fn diff_main(&self, old: &str, new: &str) -> Vec<Diff> {
        if old == new {
            return Vec::new();
        }
        let diff = TextDiff::from_chars(old, new);
        let mut runs: Vec<Diff> = Vec::new();
        for change in diff.iter_all_changes() {
            let op = match change.tag() {
                ChangeTag::Equal => Op::Equal,
                ChangeTag::Delete => Op::Delete,
                ChangeTag::Insert => Op::Insert,
            };
            match runs.last_mut() {
                Some(last) if last.op == op => last.text.push_str(change.value()),
                _ => runs.push(Diff {
                    op,
                    text: change.value().to_string(),
                }),
            }
        }
        merge_clusters(&mut runs);
        runs
    }

    fn diff_cleanup_efficiency(&self, diffs: &mut Vec<Diff>) {
        merge_clusters(diffs);
        let mut folded = false;
        let mut i = 0;
        while i < diffs.len() {
            let fold = diffs[i].op == Op::Equal
                && utf16_len(&diffs[i].text) < EFFICIENCY_EDIT_COST
                && i > 0
                && i + 1 < diffs.len();
            if fold {
                // Splitting the equality into a paired delete/insert lets the
                // neighbouring edits coalesce into one run each.
                let text = std::mem::take(&mut diffs[i].text);
                diffs[i] = Diff::delete(text.clone());
                diffs.insert(i + 1, Diff::insert(text));
                folded = true;
                i += 2;
            } else {
                i += 1;
            }
        }
        if folded {
            merge_clusters(diffs);
        }
    }
}

/// Canonicalize a diff: drop empty runs, concatenate each contiguous edit
/// cluster into at most one deletion followed by one insertion, and merge
/// adjacent equalities.
fn merge_clusters(diffs: &mut Vec<Diff>) {
    let mut out: Vec<Diff> = Vec::with_capacity(diffs.len());
    let mut deleted = String::new();
    let mut inserted = String::new();
    for diff in diffs.drain(..) {
        match diff.op {
            Op::Delete => deleted.push_str(&diff.text),
            Op::Insert => inserted.push_str(&diff.text),
            Op::Equal => {
                if diff.text.is_empty() {
                    continue;
                }
                flush_edits(&mut out, &mut deleted, &mut inserted);
                match out.last_mut() {
                    Some(last) if last.op == Op::Equal => last.text.push_str(&diff.text),
                    _ => out.push(diff),
                }
            }
        }
    }
    flush_edits(&mut out, &mut deleted, &mut inserted);
    *diffs = out;
}

fn flush_edits(out: &mut Vec<Diff>, deleted: &mut String, inserted: &mut String) {
    if !deleted.is_empty() {
        out.push(Diff::delete(std::mem::take(deleted)));
    }
    if !inserted.is_empty() {
        out.push(Diff::insert(std::mem::take(inserted)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> TextDiffProvider {
        TextDiffProvider
    }

    fn apply(diffs: &[Diff]) -> (String, String) {
        let mut old = String::new();
        let mut new = String::new();
        for diff in diffs {
            match diff.op {
                Op::Equal => {
                    old.push_str(&diff.text);
                    new.push_str(&diff.text);
                }
                Op::Delete => old.push_str(&diff.text),
                Op::Insert => new.push_str(&diff.text),
            }
        }
        (old, new)
    }

    #[test]
    fn test_diff_identical_is_empty() {
        assert!(provider().diff_main("hello", "hello").is_empty());
        assert!(provider().diff_main("", "").is_empty());
    }

    #[test]
    fn test_diff_pure_insert() {
        let diffs = provider().diff_main("hello", "hello world");
        assert_eq!(apply(&diffs), ("hello".to_string(), "hello world".to_string()));
        assert!(diffs.iter().any(|d| d.op == Op::Insert));
        assert!(diffs.iter().all(|d| d.op != Op::Delete));
    }

    #[test]
    fn test_diff_pure_delete() {
        let diffs = provider().diff_main("hello world", "world");
        assert_eq!(apply(&diffs), ("hello world".to_string(), "world".to_string()));
    }

    #[test]
    fn test_diff_replace_reconstructs_both_sides() {
        let diffs = provider().diff_main("the quick brown fox", "the slow brown ox");
        let (old, new) = apply(&diffs);
        assert_eq!(old, "the quick brown fox");
        assert_eq!(new, "the slow brown ox");
    }

    #[test]
    fn test_diff_multibyte() {
        let diffs = provider().diff_main("caf\u{e9}", "cafe\u{301}s");
        let (old, new) = apply(&diffs);
        assert_eq!(old, "caf\u{e9}");
        assert_eq!(new, "cafe\u{301}s");
    }

    #[test]
    fn test_cleanup_merges_adjacent_runs() {
        let mut diffs = vec![
            Diff::insert("a"),
            Diff::insert("b"),
            Diff::equal("xy"),
            Diff::equal("z"),
        ];
        provider().diff_cleanup_efficiency(&mut diffs);
        assert_eq!(diffs, vec![Diff::insert("ab"), Diff::equal("xyz")]);
    }

    #[test]
    fn test_cleanup_folds_short_interior_equality() {
        let mut diffs = vec![
            Diff::delete("quick"),
            Diff::insert("slow"),
            Diff::equal("ab"),
            Diff::delete("fox"),
            Diff::insert("ox"),
        ];
        provider().diff_cleanup_efficiency(&mut diffs);
        assert_eq!(
            diffs,
            vec![Diff::delete("quickabfox"), Diff::insert("slowabox")]
        );
        let (old, new) = apply(&diffs);
        assert_eq!(old, "quickabfox");
        assert_eq!(new, "slowabox");
    }

    #[test]
    fn test_cleanup_keeps_long_equalities() {
        let mut diffs = vec![
            Diff::delete("a"),
            Diff::equal("plenty"),
            Diff::insert("b"),
        ];
        provider().diff_cleanup_efficiency(&mut diffs);
        assert_eq!(
            diffs,
            vec![
                Diff::delete("a"),
                Diff::equal("plenty"),
                Diff::insert("b"),
            ]
        );
    }

    #[test]
    fn test_cleanup_keeps_edge_equalities() {
        let mut diffs = vec![Diff::equal("ab"), Diff::insert("c"), Diff::equal("de")];
        provider().diff_cleanup_efficiency(&mut diffs);
        assert_eq!(
            diffs,
            vec![Diff::equal("ab"), Diff::insert("c"), Diff::equal("de")]
        );
    }

    #[test]
    fn test_delta_defaults_round_trip_through_provider() {
        let p = provider();
        let old = "hello";
        let new = "hello world";
        let mut diffs = p.diff_main(old, new);
        p.diff_cleanup_efficiency(&mut diffs);
        let delta_text = p.diff_to_delta(&diffs);
        let restored = p.diff_from_delta(old, &delta_text).unwrap();
        assert_eq!(p.diff_text2(&restored), new);
    }
}
