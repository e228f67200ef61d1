//! Element merging for snapshot generation
//!
//! `process_paths` walks base and differential element ranges in parallel.
//! For each base element it selects one of four branches: inherit unchanged,
//! merge a single differential, synthesize type slicing over a choice
//! `[x]` element, or delegate explicit slicing to the slicing engine.
//! Differential paths below an unexpanded complex datatype trigger
//! expansion of the datatype's snapshot children into the current context.

use crate::context::{canonical_url_for_type, SdResolver};
use crate::issue::{SnapshotIssue, SnapshotIssueCode};
use crate::slicing::apply_slicing;
use siderite_models::{
    suffix_for_type, DiscriminatorType, ElementDefinition, ElementDefinitionBase,
    ElementDefinitionDiscriminator, ElementDefinitionSlicing, ElementDefinitionType, SlicingRules,
};
use std::collections::HashMap;

/// One differential element with its consumed flag. The merger never
/// re-marks an already consumed entry.
#[derive(Debug, Clone)]
pub(crate) struct DiffEntry {
    pub element: ElementDefinition,
    pub consumed: bool,
}

impl DiffEntry {
    pub fn new(element: ElementDefinition) -> Self {
        Self {
            element,
            consumed: false,
        }
    }
}

/// Shared merge state: datatype lookups, issue sink, depth limit.
pub(crate) struct MergeState<'a> {
    pub resolver: &'a dyn SdResolver,
    pub datatype_cache: &'a mut HashMap<String, Option<Vec<ElementDefinition>>>,
    pub issues: &'a mut Vec<SnapshotIssue>,
    pub max_depth: usize,
}

impl MergeState<'_> {
    /// Snapshot children of a datatype (root element excluded), cached by
    /// canonical URL. `None` when the datatype cannot be resolved.
    fn datatype_children(&mut self, code: &str) -> Option<Vec<ElementDefinition>> {
        let url = canonical_url_for_type(code);
        if let Some(cached) = self.datatype_cache.get(&url) {
            return cached.clone();
        }
        let children = self.resolver.resolve(&url).and_then(|sd| {
            sd.snapshot.map(|snapshot| {
                snapshot
                    .element
                    .into_iter()
                    .filter(|e| e.path.len() > code.len() && e.is_descendant_of(code))
                    .collect::<Vec<_>>()
            })
        });
        self.datatype_cache.insert(url, children.clone());
        children
    }
}

/// Path prefix rewrite applied while merging expanded datatype children
/// (e.g. `Identifier` -> `Patient.identifier`).
#[derive(Debug, Clone, Copy)]
pub(crate) struct PathRename<'a> {
    pub from: &'a str,
    pub to: &'a str,
}

pub(crate) fn rename_path(path: &str, rename: Option<PathRename<'_>>) -> String {
    match rename {
        Some(r) if path == r.from => r.to.to_string(),
        Some(r) if path.starts_with(r.from) && path.as_bytes().get(r.from.len()) == Some(&b'.') => {
            format!("{}{}", r.to, &path[r.from.len()..])
        }
        _ => path.to_string(),
    }
}

/// Clone a base element into the current context: rewrite its path and set
/// `base.{path,min,max}` traceability from the original base element.
pub(crate) fn clone_with_context(
    elem: &ElementDefinition,
    rename: Option<PathRename<'_>>,
) -> ElementDefinition {
    let mut out = elem.clone();
    out.path = rename_path(&elem.path, rename);
    if out.base.is_none() {
        out.base = Some(ElementDefinitionBase {
            path: elem.path.clone(),
            min: elem.min.unwrap_or(0),
            max: elem.max.clone().unwrap_or_else(|| "*".to_string()),
        });
    }
    out
}

/// The concrete type entry addressed by a diff path that narrows a choice
/// element (`Observation.value[x]` matched by `Observation.valueQuantity`).
/// Returns `None` when the diff path is not a direct variant of the base.
fn choice_variant<'t>(
    context_path: &str,
    diff_path: &str,
    types: Option<&'t [ElementDefinitionType]>,
) -> Option<&'t ElementDefinitionType> {
    let stem = context_path.strip_suffix("[x]")?;
    let rest = diff_path.strip_prefix(stem)?;
    if rest.is_empty() || rest.contains('.') || !rest.as_bytes()[0].is_ascii_uppercase() {
        return None;
    }
    types?.iter().find(|t| suffix_for_type(&t.code) == rest)
}

/// True when `diff_path` addresses `context_path` directly: exact match or a
/// concrete variant of a choice `[x]` path.
pub(crate) fn diff_matches(
    context_path: &str,
    diff: &ElementDefinition,
    types: Option<&[ElementDefinitionType]>,
) -> bool {
    diff.path == context_path || choice_variant(context_path, &diff.path, types).is_some()
}

fn more_restrictive_max<'a>(base: &'a str, diff: &'a str) -> &'a str {
    match (base, diff) {
        ("*", _) => diff,
        (_, "*") => base,
        (b, d) => {
            let b_num: u32 = b.parse().unwrap_or(u32::MAX);
            let d_num: u32 = d.parse().unwrap_or(u32::MAX);
            if d_num < b_num {
                diff
            } else {
                base
            }
        }
    }
}

/// Merge a differential element onto a base element.
///
/// Cardinality tightens (slices set theirs independently), documentation
/// and flags override, value-fixing choice slots replace, constraints and
/// mappings append, types narrow to the differential's subset. A diff path
/// that names a concrete variant of a choice `[x]` base collapses the type
/// list to the single matching entry.
pub(crate) fn merge_element(
    base: &ElementDefinition,
    diff: &ElementDefinition,
    context_path: &str,
) -> ElementDefinition {
    let mut merged = base.clone();
    merged.path = diff.path.clone();

    if diff.id.is_some() {
        merged.id = diff.id.clone();
    }
    if diff.slice_name.is_some() {
        merged.slice_name = diff.slice_name.clone();
    }
    if diff.label.is_some() {
        merged.label = diff.label.clone();
    }
    if diff.short.is_some() {
        merged.short = diff.short.clone();
    }
    if diff.definition.is_some() {
        merged.definition = diff.definition.clone();
    }
    if diff.comment.is_some() {
        merged.comment = diff.comment.clone();
    }
    if diff.requirements.is_some() {
        merged.requirements = diff.requirements.clone();
    }
    if diff.meaning_when_missing.is_some() {
        merged.meaning_when_missing = diff.meaning_when_missing.clone();
    }
    if diff.order_meaning.is_some() {
        merged.order_meaning = diff.order_meaning.clone();
    }
    if diff.must_support.is_some() {
        merged.must_support = diff.must_support;
    }
    if diff.is_modifier.is_some() {
        merged.is_modifier = diff.is_modifier;
        merged.is_modifier_reason = diff.is_modifier_reason.clone();
    }
    if diff.is_summary.is_some() {
        merged.is_summary = diff.is_summary;
    }
    if diff.default_value.is_some() {
        merged.default_value = diff.default_value.clone();
    }
    if diff.fixed.is_some() {
        merged.fixed = diff.fixed.clone();
    }
    if diff.pattern.is_some() {
        merged.pattern = diff.pattern.clone();
    }
    if diff.min_value.is_some() {
        merged.min_value = diff.min_value.clone();
    }
    if diff.max_value.is_some() {
        merged.max_value = diff.max_value.clone();
    }
    if diff.example.is_some() {
        merged.example = diff.example.clone();
    }
    if diff.max_length.is_some() {
        merged.max_length = diff.max_length;
    }
    if diff.content_reference.is_some() {
        merged.content_reference = diff.content_reference.clone();
    }

    // Cardinality: slices set theirs independently of the base element
    let is_slice = diff.is_slice();
    if let Some(diff_min) = diff.min {
        merged.min = Some(if is_slice {
            diff_min
        } else {
            diff_min.max(base.min.unwrap_or(0))
        });
    }
    if let Some(ref diff_max) = diff.max {
        merged.max = Some(if is_slice {
            diff_max.clone()
        } else {
            match &base.max {
                Some(base_max) => more_restrictive_max(base_max, diff_max).to_string(),
                None => diff_max.clone(),
            }
        });
    }

    // Types narrow to the differential's subset, keeping base profile data
    // for codes the diff does not touch
    if let Some(ref diff_types) = diff.types {
        let mut narrowed = Vec::with_capacity(diff_types.len());
        for diff_type in diff_types {
            match base
                .types
                .as_ref()
                .and_then(|ts| ts.iter().find(|bt| bt.code == diff_type.code))
            {
                Some(base_type) => {
                    let mut t = base_type.clone();
                    if diff_type.profile.is_some() {
                        t.profile = diff_type.profile.clone();
                    }
                    if diff_type.target_profile.is_some() {
                        t.target_profile = diff_type.target_profile.clone();
                    }
                    if diff_type.aggregation.is_some() {
                        t.aggregation = diff_type.aggregation.clone();
                    }
                    if diff_type.versioning.is_some() {
                        t.versioning = diff_type.versioning.clone();
                    }
                    narrowed.push(t);
                }
                None => narrowed.push(diff_type.clone()),
            }
        }
        merged.types = Some(narrowed);
    }

    // Choice narrowing: a concrete variant path collapses the type list
    if context_path.ends_with("[x]") && diff.path != context_path {
        if let Some(t) = choice_variant(context_path, &diff.path, base.types.as_deref()) {
            merged.types = Some(vec![t.clone()]);
        }
    }

    if diff.binding.is_some() {
        merged.binding = diff.binding.clone();
    }

    if diff.slicing.is_some() {
        merged.slicing = diff.slicing.clone();
    } else if is_slice {
        // Slice instances do not inherit the slicing descriptor
        merged.slicing = None;
    }

    if let Some(ref diff_aliases) = diff.alias {
        let mut all = merged.alias.take().unwrap_or_default();
        for alias in diff_aliases {
            if !all.contains(alias) {
                all.push(alias.clone());
            }
        }
        merged.alias = Some(all);
    }

    if let Some(ref diff_conditions) = diff.condition {
        let mut all = merged.condition.take().unwrap_or_default();
        for condition in diff_conditions {
            if !all.contains(condition) {
                all.push(condition.clone());
            }
        }
        merged.condition = Some(all);
    }

    if let Some(ref diff_constraints) = diff.constraint {
        let mut all = merged.constraint.take().unwrap_or_default();
        for constraint in diff_constraints {
            if !all.iter().any(|c| c.key == constraint.key) {
                all.push(constraint.clone());
            }
        }
        merged.constraint = Some(all);
    }

    if let Some(ref diff_mappings) = diff.mapping {
        let mut all = merged.mapping.take().unwrap_or_default();
        for mapping in diff_mappings {
            if !all.iter().any(|m| m.identity == mapping.identity) {
                all.push(mapping.clone());
            }
        }
        merged.mapping = Some(all);
    }

    if diff.extension.is_some() {
        merged.extension = diff.extension.clone();
    }

    for (key, value) in &diff.element_meta {
        merged.element_meta.insert(key.clone(), value.clone());
    }

    // Traceability from the original base element
    if merged.base.is_none() {
        merged.base = Some(ElementDefinitionBase {
            path: base.path.clone(),
            min: base.min.unwrap_or(0),
            max: base.max.clone().unwrap_or_else(|| "*".to_string()),
        });
    }

    merged
}

/// End of the descendant block of `base[start]` (exclusive).
pub(crate) fn block_end(base: &[ElementDefinition], start: usize) -> usize {
    let parent = &base[start].path;
    let mut end = start + 1;
    while end < base.len() && base[end].is_descendant_of(parent) {
        end += 1;
    }
    end
}

/// End of a slicing group (exclusive): the slicing root's descendants plus
/// same-path slice siblings and their descendants, stopping at the first
/// non-prefix path.
pub(crate) fn slice_group_end(base: &[ElementDefinition], start: usize) -> usize {
    let parent = &base[start].path;
    let mut end = start + 1;
    while end < base.len() && (&base[end].path == parent || base[end].is_descendant_of(parent)) {
        end += 1;
    }
    end
}

/// Visit base and differential ranges in parallel, emitting merged elements
/// in base order. See the module docs for the four branches.
pub(crate) fn process_paths(
    base: &[ElementDefinition],
    diffs: &mut [DiffEntry],
    state: &mut MergeState<'_>,
    depth: usize,
    rename: Option<PathRename<'_>>,
) -> Vec<ElementDefinition> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < base.len() {
        let elem = &base[i];
        // A sliced base element owns its same-path slice siblings too
        let end = if elem.slicing.is_some() {
            slice_group_end(base, i)
        } else {
            block_end(base, i)
        };
        let context_path = rename_path(&elem.path, rename);

        let matches: Vec<usize> = (0..diffs.len())
            .filter(|&k| {
                !diffs[k].consumed
                    && diff_matches(&context_path, &diffs[k].element, elem.types.as_deref())
            })
            .collect();

        let has_slicing = matches.iter().any(|&k| {
            diffs[k].element.slicing.is_some() || diffs[k].element.slice_name.is_some()
        });

        if has_slicing || (elem.slicing.is_some() && !matches.is_empty()) {
            // Branch D: explicit slicing (new or constraining existing)
            let emitted = apply_slicing(
                elem,
                &base[i + 1..end],
                &context_path,
                diffs,
                state,
                depth,
                rename,
            );
            result.extend(emitted);
            i = end;
            continue;
        }

        match matches.len() {
            0 => {
                // Branch A: inherit the base element unchanged
                let cloned = clone_with_context(elem, rename);
                let has_children = end > i + 1;
                result.push(cloned);
                if !has_children {
                    expand_if_needed(&context_path, elem, diffs, state, depth, &mut result);
                }
                i += 1;
            }
            1 => {
                // Branch B: merge the single differential onto the base
                let k = matches[0];
                let merged = merge_element(elem, &diffs[k].element, &context_path);
                diffs[k].consumed = true;
                let merged_path = merged.path.clone();
                let merged_for_expand = merged.clone();
                let has_children = end > i + 1;
                result.push(merged);
                if !has_children {
                    expand_if_needed(
                        &merged_path,
                        &merged_for_expand,
                        diffs,
                        state,
                        depth,
                        &mut result,
                    );
                }
                i += 1;
            }
            _ => {
                // Branch C: multiple concrete variants of a choice element
                if context_path.ends_with("[x]") {
                    type_slice(elem, &context_path, &matches, diffs, state, depth, &mut result);
                    i = end;
                } else {
                    // Duplicate same-path diffs without slicing: merge in order
                    let mut merged = clone_with_context(elem, rename);
                    for &k in &matches {
                        merged = merge_element(&merged, &diffs[k].element, &context_path);
                        diffs[k].consumed = true;
                    }
                    result.push(merged);
                    i += 1;
                }
            }
        }
    }

    result
}

/// Branch C: the base is a choice `[x]` and the differential addresses two
/// or more concrete variants. Emit a synthesized slicing root followed by
/// one narrowed element per addressed variant.
fn type_slice(
    elem: &ElementDefinition,
    context_path: &str,
    matches: &[usize],
    diffs: &mut [DiffEntry],
    state: &mut MergeState<'_>,
    depth: usize,
    result: &mut Vec<ElementDefinition>,
) {
    let mut root = clone_with_context(elem, None);
    root.path = context_path.to_string();
    root.slicing = Some(ElementDefinitionSlicing {
        discriminator: Some(vec![ElementDefinitionDiscriminator {
            discriminator_type: DiscriminatorType::Type,
            path: "$this".to_string(),
        }]),
        description: None,
        ordered: Some(false),
        rules: SlicingRules::Open,
    });
    result.push(root);

    for &k in matches {
        let diff = diffs[k].element.clone();
        let mut narrowed = merge_element(elem, &diff, context_path);
        narrowed.slicing = None;
        if narrowed.slice_name.is_none() {
            let slice_name = narrowed
                .path
                .rsplit('.')
                .next()
                .unwrap_or(&narrowed.path)
                .to_string();
            narrowed.slice_name = Some(slice_name);
        }
        diffs[k].consumed = true;
        let narrowed_path = narrowed.path.clone();
        let narrowed_for_expand = narrowed.clone();
        result.push(narrowed);
        expand_if_needed(
            &narrowed_path,
            &narrowed_for_expand,
            diffs,
            state,
            depth,
            result,
        );
    }
}

/// Datatype expansion: when unconsumed diffs address children of `parent`
/// and the base carries no inline children, clone the parent type's snapshot
/// children into this context and merge the diffs against them.
pub(crate) fn expand_if_needed(
    parent_path: &str,
    parent: &ElementDefinition,
    diffs: &mut [DiffEntry],
    state: &mut MergeState<'_>,
    depth: usize,
    result: &mut Vec<ElementDefinition>,
) {
    let needs_expansion = diffs.iter().any(|d| {
        !d.consumed
            && d.element.path.starts_with(parent_path)
            && d.element.path.as_bytes().get(parent_path.len()) == Some(&b'.')
    });
    if !needs_expansion {
        return;
    }

    if depth + 1 > state.max_depth {
        state.issues.push(SnapshotIssue::error(
            SnapshotIssueCode::RecursionLimit,
            format!("Datatype expansion exceeded maximum depth {}", state.max_depth),
            parent_path,
        ));
        return;
    }

    let Some(type_code) = parent.types.as_ref().and_then(|ts| ts.first()).map(|t| t.code.clone())
    else {
        state.issues.push(SnapshotIssue::error(
            SnapshotIssueCode::InternalError,
            "Cannot expand children of an element without a declared type",
            parent_path,
        ));
        return;
    };

    let Some(children) = state.datatype_children(&type_code) else {
        state.issues.push(SnapshotIssue::warning(
            SnapshotIssueCode::BaseNotFound,
            format!("Datatype definition not available: {}", type_code),
            parent_path,
        ));
        return;
    };

    tracing::debug!(parent = parent_path, datatype = %type_code, "expanding datatype children");

    let rename = PathRename {
        from: &type_code,
        to: parent_path,
    };
    let expanded = process_paths(&children, diffs, state, depth + 1, Some(rename));
    result.extend(expanded);
}
