//! Slicing engine for snapshot generation
//!
//! Two scenarios: a differential introducing slicing on a previously
//! unsliced base element, and a differential constraining slicing the base
//! already declares. Existing slicing may only tighten: discriminators must
//! match exactly, `ordered` may go `false -> true`, `rules` may move
//! `open -> openAtEnd -> closed`.

use crate::merge::{
    clone_with_context, expand_if_needed, merge_element, process_paths, DiffEntry, MergeState,
    PathRename,
};
use crate::issue::{SnapshotIssue, SnapshotIssueCode};
use siderite_models::{
    DiscriminatorType, ElementDefinition, ElementDefinitionDiscriminator,
    ElementDefinitionSlicing, SlicingRules,
};

fn is_child_path(path: &str, parent: &str) -> bool {
    path.starts_with(parent) && path.as_bytes().get(parent.len()) == Some(&b'.')
}

/// Default slicing descriptor for a path that introduces slices without an
/// explicit descriptor. Extension paths discriminate by `url`.
fn default_slicing(context_path: &str) -> ElementDefinitionSlicing {
    let last_segment = context_path.rsplit('.').next().unwrap_or(context_path);
    let discriminator = if last_segment == "extension" || last_segment == "modifierExtension" {
        Some(vec![ElementDefinitionDiscriminator {
            discriminator_type: DiscriminatorType::Value,
            path: "url".to_string(),
        }])
    } else {
        None
    };
    ElementDefinitionSlicing {
        discriminator,
        description: None,
        ordered: Some(false),
        rules: SlicingRules::Open,
    }
}

/// Merge a differential slicing descriptor onto the base's, enforcing the
/// tightening rules; incompatible changes emit `SLICING_ERROR` and keep the
/// base's value.
fn merge_slicing(
    base: &ElementDefinitionSlicing,
    diff: &ElementDefinitionSlicing,
    context_path: &str,
    state: &mut MergeState<'_>,
) -> ElementDefinitionSlicing {
    let mut merged = base.clone();

    let base_disc = base.discriminator.as_deref().unwrap_or(&[]);
    let diff_disc = diff.discriminator.as_deref().unwrap_or(&[]);
    if !diff_disc.is_empty() {
        let identical = base_disc.len() == diff_disc.len()
            && base_disc.iter().zip(diff_disc.iter()).all(|(b, d)| {
                b.discriminator_type == d.discriminator_type && b.path == d.path
            });
        if !identical && !base_disc.is_empty() {
            state.issues.push(SnapshotIssue::error(
                SnapshotIssueCode::SlicingError,
                "Differential slicing discriminators do not match the base slicing",
                context_path,
            ));
        } else {
            merged.discriminator = diff.discriminator.clone();
        }
    }

    if let Some(diff_ordered) = diff.ordered {
        let base_ordered = base.ordered.unwrap_or(false);
        if base_ordered && !diff_ordered {
            state.issues.push(SnapshotIssue::error(
                SnapshotIssueCode::SlicingError,
                "Slicing ordered cannot be relaxed from true to false",
                context_path,
            ));
        } else {
            merged.ordered = Some(diff_ordered);
        }
    }

    if diff.rules.strictness() < base.rules.strictness() {
        state.issues.push(SnapshotIssue::error(
            SnapshotIssueCode::SlicingError,
            format!(
                "Slicing rules cannot be relaxed from {} to {}",
                base.rules.as_code(),
                diff.rules.as_code()
            ),
            context_path,
        ));
    } else {
        merged.rules = diff.rules;
    }

    if diff.description.is_some() {
        merged.description = diff.description.clone();
    }

    merged
}

/// Emit a slice element and the result of recursing into its inner diffs
/// against the base's children (fresh clones per slice).
#[allow(clippy::too_many_arguments)]
fn emit_slice_with_children(
    slice_elem: ElementDefinition,
    base_children: &[ElementDefinition],
    context_path: &str,
    diffs: &mut [DiffEntry],
    group_start: usize,
    group_end: usize,
    state: &mut MergeState<'_>,
    depth: usize,
    rename: Option<PathRename<'_>>,
    result: &mut Vec<ElementDefinition>,
) {
    let slice_for_expand = slice_elem.clone();
    result.push(slice_elem);

    if group_end <= group_start {
        return;
    }
    let group = &mut diffs[group_start..group_end];
    if base_children.is_empty() {
        expand_if_needed(context_path, &slice_for_expand, group, state, depth, result);
    } else {
        let children = process_paths(base_children, group, state, depth + 1, rename);
        result.extend(children);
    }
}

/// Extent of the inner-diff group following a slice entry at `start`:
/// consecutive entries whose paths are children of the sliced path.
fn inner_group_end(diffs: &[DiffEntry], start: usize, context_path: &str) -> usize {
    let mut end = start;
    while end < diffs.len() && is_child_path(&diffs[end].element.path, context_path) {
        end += 1;
    }
    end
}

/// Apply explicit slicing for `base_elem` (branch D of the merger).
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_slicing(
    base_elem: &ElementDefinition,
    base_children: &[ElementDefinition],
    context_path: &str,
    diffs: &mut [DiffEntry],
    state: &mut MergeState<'_>,
    depth: usize,
    rename: Option<PathRename<'_>>,
) -> Vec<ElementDefinition> {
    if base_elem.slicing.is_some() {
        merge_existing_slicing(base_elem, base_children, context_path, diffs, state, depth, rename)
    } else {
        introduce_slicing(base_elem, base_children, context_path, diffs, state, depth, rename)
    }
}

/// Base is unsliced and the differential introduces slicing.
#[allow(clippy::too_many_arguments)]
fn introduce_slicing(
    base_elem: &ElementDefinition,
    base_children: &[ElementDefinition],
    context_path: &str,
    diffs: &mut [DiffEntry],
    state: &mut MergeState<'_>,
    depth: usize,
    rename: Option<PathRename<'_>>,
) -> Vec<ElementDefinition> {
    let mut result = Vec::new();

    // Slicing-definition diff: addresses the path itself, without sliceName
    let root_idx = (0..diffs.len()).find(|&k| {
        !diffs[k].consumed
            && diffs[k].element.path == context_path
            && diffs[k].element.slice_name.is_none()
    });

    let mut root = match root_idx {
        Some(k) => {
            let diff_elem = diffs[k].element.clone();
            diffs[k].consumed = true;
            merge_element(base_elem, &diff_elem, context_path)
        }
        None => {
            let mut cloned = clone_with_context(base_elem, rename);
            cloned.path = context_path.to_string();
            cloned
        }
    };
    if root.slicing.is_none() {
        root.slicing = Some(default_slicing(context_path));
    }
    result.push(root);

    // Unsliced base children follow the slicing root; differential entries
    // addressing them before the first slice entry merge here
    let first_slice_diff = (0..diffs.len())
        .find(|&k| {
            !diffs[k].consumed
                && diffs[k].element.path == context_path
                && diffs[k].element.slice_name.is_some()
        })
        .unwrap_or(diffs.len());
    let backbone =
        process_paths(base_children, &mut diffs[..first_slice_diff], state, depth, rename);
    result.extend(backbone);

    // Slice entries in differential order
    let mut k = 0;
    while k < diffs.len() {
        let is_slice_entry = !diffs[k].consumed
            && diffs[k].element.path == context_path
            && diffs[k].element.slice_name.is_some();
        if !is_slice_entry {
            k += 1;
            continue;
        }
        let diff_elem = diffs[k].element.clone();
        diffs[k].consumed = true;

        let mut slice_elem = merge_element(base_elem, &diff_elem, context_path);
        slice_elem.path = context_path.to_string();
        slice_elem.slicing = None;

        let group_start = k + 1;
        let group_end = inner_group_end(diffs, group_start, context_path);
        emit_slice_with_children(
            slice_elem,
            base_children,
            context_path,
            diffs,
            group_start,
            group_end,
            state,
            depth,
            rename,
            &mut result,
        );
        k = group_end.max(k + 1);
    }

    result
}

/// One base slice group: its root element plus its descendant range.
struct BaseSliceGroup {
    root: usize,
    end: usize,
}

/// Base already declares slicing; the differential constrains it.
#[allow(clippy::too_many_arguments)]
fn merge_existing_slicing(
    base_elem: &ElementDefinition,
    base_children: &[ElementDefinition],
    context_path: &str,
    diffs: &mut [DiffEntry],
    state: &mut MergeState<'_>,
    depth: usize,
    rename: Option<PathRename<'_>>,
) -> Vec<ElementDefinition> {
    let mut result = Vec::new();
    let base_path = &base_elem.path;
    let base_slicing = base_elem
        .slicing
        .clone()
        .unwrap_or_else(|| default_slicing(context_path));

    // Root: merge the slicing-definition diff if present, validating the
    // slicing constraint
    let root_idx = (0..diffs.len()).find(|&k| {
        !diffs[k].consumed
            && diffs[k].element.path == context_path
            && diffs[k].element.slice_name.is_none()
    });
    let mut root = match root_idx {
        Some(k) => {
            let diff_elem = diffs[k].element.clone();
            diffs[k].consumed = true;
            let mut merged = merge_element(base_elem, &diff_elem, context_path);
            merged.slicing = Some(match &diff_elem.slicing {
                Some(diff_slicing) => {
                    merge_slicing(&base_slicing, diff_slicing, context_path, state)
                }
                None => base_slicing.clone(),
            });
            merged
        }
        None => {
            let mut cloned = clone_with_context(base_elem, rename);
            cloned.path = context_path.to_string();
            cloned
        }
    };
    if root.slicing.is_none() {
        root.slicing = Some(base_slicing.clone());
    }
    result.push(root);

    // Partition base children: unsliced backbone first, then slice groups
    // in input order
    let first_slice = base_children
        .iter()
        .position(|e| &e.path == base_path && e.slice_name.is_some())
        .unwrap_or(base_children.len());
    let backbone = &base_children[..first_slice];

    let mut groups: Vec<BaseSliceGroup> = Vec::new();
    let mut i = first_slice;
    while i < base_children.len() {
        let elem = &base_children[i];
        if &elem.path == base_path && elem.slice_name.is_some() {
            let mut end = i + 1;
            while end < base_children.len() && is_child_path(&base_children[end].path, base_path) {
                end += 1;
            }
            groups.push(BaseSliceGroup { root: i, end });
            i = end;
        } else {
            i += 1;
        }
    }

    for child in backbone {
        result.push(clone_with_context(child, rename));
    }

    // Merge each base slice with its differential constraint by sliceName
    for group in &groups {
        let base_slice = &base_children[group.root];
        let slice_children = &base_children[group.root + 1..group.end];
        let slice_name = base_slice.slice_name.as_deref().unwrap_or_default();

        let diff_idx = (0..diffs.len()).find(|&k| {
            !diffs[k].consumed
                && diffs[k].element.path == context_path
                && diffs[k].element.slice_name.as_deref() == Some(slice_name)
        });

        match diff_idx {
            Some(k) => {
                let diff_elem = diffs[k].element.clone();
                diffs[k].consumed = true;
                let mut merged = merge_element(base_slice, &diff_elem, context_path);
                merged.path = context_path.to_string();
                merged.slicing = None;

                let group_start = k + 1;
                let group_end = inner_group_end(diffs, group_start, context_path);
                emit_slice_with_children(
                    merged,
                    slice_children,
                    context_path,
                    diffs,
                    group_start,
                    group_end,
                    state,
                    depth,
                    rename,
                    &mut result,
                );
            }
            None => {
                let mut cloned = clone_with_context(base_slice, rename);
                cloned.path = context_path.to_string();
                result.push(cloned);
                for child in slice_children {
                    result.push(clone_with_context(child, rename));
                }
            }
        }
    }

    // Remaining differential slices append as new slices unless closed
    let mut k = 0;
    while k < diffs.len() {
        let is_new_slice = !diffs[k].consumed
            && diffs[k].element.path == context_path
            && diffs[k].element.slice_name.is_some();
        if !is_new_slice {
            k += 1;
            continue;
        }
        let diff_elem = diffs[k].element.clone();
        diffs[k].consumed = true;
        let group_start = k + 1;
        let group_end = inner_group_end(diffs, group_start, context_path);

        if base_slicing.rules == SlicingRules::Closed {
            state.issues.push(SnapshotIssue::error(
                SnapshotIssueCode::SlicingError,
                format!(
                    "Cannot add slice \"{}\" to closed slicing",
                    diff_elem.slice_name.as_deref().unwrap_or_default()
                ),
                context_path,
            ));
            for entry in diffs[group_start..group_end].iter_mut() {
                entry.consumed = true;
            }
            k = group_end.max(k + 1);
            continue;
        }

        let mut slice_elem = merge_element(base_elem, &diff_elem, context_path);
        slice_elem.path = context_path.to_string();
        slice_elem.slicing = None;
        emit_slice_with_children(
            slice_elem,
            backbone,
            context_path,
            diffs,
            group_start,
            group_end,
            state,
            depth,
            rename,
            &mut result,
        );
        k = group_end.max(k + 1);
    }

    result
}
