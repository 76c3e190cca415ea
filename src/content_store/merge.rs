//! Line-oriented three-way text merge (§4.1).
//!
//! Given a common ancestor (`base`) and two derived versions (`local`,
//! `remote`), produces either clean merged bytes or bytes carrying conflict
//! markers. Deterministic given the three inputs (§8 "Three-way
//! determinism").
//!
//! # Algorithm
//!
//! Computed as two independent line diffs against `base` (`base→local`,
//! `base→remote`) using [`similar`]. The non-equal ranges of each diff are
//! merged (interval union, by base-line position) into disjoint "hunks".
//! Inside a hunk the local and remote replacement text is compared: if
//! identical, emitted once; if only one side diverges from `base`, that
//! side's text wins; if both diverge and disagree, conflict markers are
//! emitted. Gaps between hunks are unmodified base lines, copied verbatim.

use std::ops::Range;

use similar::{DiffOp, TextDiff};

/// Result of a three-way merge.
pub struct MergeOutcome {
    /// The merged bytes. Contains conflict markers iff `has_conflicts`.
    pub bytes: Vec<u8>,
    /// Whether any hunk required a conflict marker.
    pub has_conflicts: bool,
}

/// Perform a three-way merge of `local` and `remote` against `base`.
#[must_use]
pub fn merge(base: &[u8], local: &[u8], remote: &[u8]) -> MergeOutcome {
    let base_lines = split_lines(base);
    let local_lines = split_lines(local);
    let remote_lines = split_lines(remote);

    let local_changes = non_equal_ranges(&base_lines, &local_lines);
    let remote_changes = non_equal_ranges(&base_lines, &remote_lines);

    let regions = union_ranges(&local_changes, &remote_changes);

    let mut out_lines: Vec<String> = Vec::new();
    let mut has_conflicts = false;
    let mut cursor = 0usize;

    for region in regions {
        // Gap before this region: unmodified on both sides, copy verbatim.
        out_lines.extend(base_lines[cursor..region.start].iter().map(|s| (*s).to_owned()));

        let base_region: Vec<&str> = base_lines[region.clone()].to_vec();
        let local_region = apply_changes(&region, &local_changes, &base_lines);
        let remote_region = apply_changes(&region, &remote_changes, &base_lines);

        if local_region == remote_region {
            out_lines.extend(local_region);
        } else if local_region == base_region {
            out_lines.extend(remote_region);
        } else if remote_region == base_region {
            out_lines.extend(local_region);
        } else {
            has_conflicts = true;
            out_lines.push("<<<<<<< LOCAL".to_owned());
            out_lines.extend(local_region);
            out_lines.push("=======".to_owned());
            out_lines.extend(remote_region);
            out_lines.push(">>>>>>> REMOTE".to_owned());
        }

        cursor = region.end;
    }
    out_lines.extend(base_lines[cursor..].iter().map(|s| (*s).to_owned()));

    MergeOutcome {
        bytes: out_lines.join("\n").into_bytes(),
        has_conflicts,
    }
}

/// Split into lines on `\n`, discarding a single trailing empty line so a
/// file ending in `\n` round-trips through `join("\n")` without growing an
/// extra blank line each merge.
fn split_lines(bytes: &[u8]) -> Vec<&str> {
    let text = std::str::from_utf8(bytes).unwrap_or("");
    if text.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

/// One non-equal base range and the lines it is replaced with.
type Change<'a> = (Range<usize>, Vec<&'a str>);

fn non_equal_ranges<'a>(base: &[&'a str], other: &[&'a str]) -> Vec<Change<'a>> {
    let diff = TextDiff::from_slices(base, other);
    let mut changes = Vec::new();
    for op in diff.ops() {
        match *op {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete { old_index, old_len, .. } => {
                changes.push((old_index..old_index + old_len, Vec::new()));
            }
            DiffOp::Insert { old_index, new_index, new_len } => {
                changes.push((old_index..old_index, other[new_index..new_index + new_len].to_vec()));
            }
            DiffOp::Replace { old_index, old_len, new_index, new_len } => {
                changes.push((
                    old_index..old_index + old_len,
                    other[new_index..new_index + new_len].to_vec(),
                ));
            }
        }
    }
    changes
}

/// Union the base-coordinate ranges from both change lists into a sorted,
/// disjoint list of hunks. Touching or overlapping ranges (including
/// zero-width insertion points) are merged into one hunk.
fn union_ranges(a: &[Change<'_>], b: &[Change<'_>]) -> Vec<Range<usize>> {
    let mut bounds: Vec<Range<usize>> = a.iter().chain(b.iter()).map(|(r, _)| r.clone()).collect();
    bounds.sort_by_key(|r| (r.start, r.end));

    let mut merged: Vec<Range<usize>> = Vec::new();
    for range in bounds {
        if let Some(last) = merged.last_mut() {
            if range.start <= last.end {
                last.end = last.end.max(range.end);
                continue;
            }
        }
        merged.push(range);
    }
    merged
}

/// Reconstruct the replacement text for `region` on one side, by walking the
/// region and splicing in that side's changes (in order), copying base lines
/// in the gaps between them.
fn apply_changes<'a>(region: &Range<usize>, changes: &[Change<'a>], base: &[&'a str]) -> Vec<&'a str> {
    let mut relevant: Vec<&Change<'a>> = changes
        .iter()
        .filter(|(r, _)| r.start >= region.start && r.end <= region.end)
        .collect();
    relevant.sort_by_key(|(r, _)| (r.start, r.end));

    let mut out = Vec::new();
    let mut cursor = region.start;
    for (range, lines) in relevant {
        if range.start > cursor {
            out.extend_from_slice(&base[cursor..range.start]);
        }
        out.extend(lines.iter().copied());
        cursor = cursor.max(range.end);
    }
    if cursor < region.end {
        out.extend_from_slice(&base[cursor..region.end]);
    }
    out
}
