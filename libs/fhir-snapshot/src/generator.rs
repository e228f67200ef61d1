//! Snapshot generation
//!
//! Walks the `baseDefinition` chain (generating missing base snapshots
//! recursively), merges the differential against the base snapshot, assigns
//! canonical element ids, and registers the finished definition back into
//! the resolver. A per-generator in-progress set detects circular base
//! chains; base StructureDefinitions are never mutated.

use crate::context::SdResolver;
use crate::error::{Error, Result};
use crate::issue::{SnapshotIssue, SnapshotIssueCode};
use crate::merge::{clone_with_context, process_paths, DiffEntry, MergeState};
use crate::normalization::assign_element_ids;
use siderite_models::{ElementDefinition, Snapshot, StructureDefinition};
use std::collections::{HashMap, HashSet};

/// Generation options
#[derive(Debug, Clone, Copy)]
pub struct SnapshotGeneratorOptions {
    /// Convert the first error-severity issue (and unconsumed differentials)
    /// into a typed error instead of reporting them on the outcome.
    pub throw_on_error: bool,
    /// Maximum datatype expansion depth.
    pub max_depth: usize,
}

impl Default for SnapshotGeneratorOptions {
    fn default() -> Self {
        Self {
            throw_on_error: false,
            max_depth: 30,
        }
    }
}

/// A generated StructureDefinition plus accumulated diagnostics.
#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub structure_definition: StructureDefinition,
    pub issues: Vec<SnapshotIssue>,
}

/// Snapshot generator over an external [`SdResolver`].
///
/// The in-progress set is per-instance; confine one generator to a single
/// logical task rather than sharing it across threads.
pub struct SnapshotGenerator<'a, R: SdResolver> {
    resolver: &'a mut R,
    options: SnapshotGeneratorOptions,
    in_progress: HashSet<String>,
    datatype_cache: HashMap<String, Option<Vec<ElementDefinition>>>,
}

/// Types that legitimately have no baseDefinition.
fn is_root_type(type_: &str) -> bool {
    matches!(type_, "Base" | "Element" | "Resource")
}

impl<'a, R: SdResolver> SnapshotGenerator<'a, R> {
    pub fn new(resolver: &'a mut R) -> Self {
        Self::with_options(resolver, SnapshotGeneratorOptions::default())
    }

    pub fn with_options(resolver: &'a mut R, options: SnapshotGeneratorOptions) -> Self {
        Self {
            resolver,
            options,
            in_progress: HashSet::new(),
            datatype_cache: HashMap::new(),
        }
    }

    /// Generate the snapshot for `sd`, returning a new StructureDefinition;
    /// the input (and any base definitions) are left untouched. The result
    /// is registered into the resolver so later generations reuse it.
    pub fn generate(&mut self, sd: &StructureDefinition) -> Result<SnapshotOutcome> {
        if sd.url.is_empty() {
            return Err(Error::MissingUrl);
        }
        if self.in_progress.contains(&sd.url) {
            return Err(Error::CircularDependency(sd.url.clone()));
        }
        self.in_progress.insert(sd.url.clone());
        let result = self.generate_guarded(sd);
        // Pop cleanly on both success and failure so a retry does not
        // falsely detect a cycle.
        self.in_progress.remove(&sd.url);
        result
    }

    fn generate_guarded(&mut self, sd: &StructureDefinition) -> Result<SnapshotOutcome> {
        let mut issues = Vec::new();

        let base_elements: Vec<ElementDefinition> = match &sd.base_definition {
            None => {
                if !is_root_type(&sd.type_) {
                    return Err(Error::MissingBaseDefinition(sd.url.clone()));
                }
                Vec::new()
            }
            Some(base_url) => {
                let base_sd = self
                    .resolver
                    .resolve(base_url)
                    .ok_or_else(|| Error::BaseNotFound(base_url.clone()))?;
                let base_sd = if base_sd.has_snapshot() {
                    base_sd
                } else {
                    tracing::debug!(url = %base_url, "generating missing base snapshot");
                    let outcome = self.generate(&base_sd)?;
                    outcome.structure_definition
                };
                base_sd.snapshot.map(|s| s.element).unwrap_or_default()
            }
        };

        let mut elements: Vec<ElementDefinition> = match &sd.differential {
            None => {
                // No differential: the base snapshot is cloned verbatim
                base_elements.iter().map(|e| clone_with_context(e, None)).collect()
            }
            Some(differential) if base_elements.is_empty() => {
                // Root type: the differential becomes the snapshot
                differential
                    .element
                    .iter()
                    .map(|e| clone_with_context(e, None))
                    .collect()
            }
            Some(differential) => {
                let sorted = sort_differential(&differential.element, &base_elements);
                let mut diffs: Vec<DiffEntry> =
                    sorted.into_iter().map(DiffEntry::new).collect();

                let resolver: &R = &*self.resolver;
                let mut state = MergeState {
                    resolver,
                    datatype_cache: &mut self.datatype_cache,
                    issues: &mut issues,
                    max_depth: self.options.max_depth,
                };
                let merged = process_paths(&base_elements, &mut diffs, &mut state, 0, None);

                for entry in &diffs {
                    if !entry.consumed {
                        issues.push(SnapshotIssue::warning(
                            SnapshotIssueCode::DifferentialNotConsumed,
                            format!(
                                "Differential element \"{}\" was not consumed",
                                entry.element.key()
                            ),
                            entry.element.path.clone(),
                        ));
                    }
                }
                merged
            }
        };

        assign_element_ids(&mut elements);

        if self.options.throw_on_error {
            if let Some(issue) = issues.iter().find(|i| i.is_error()) {
                return Err(match issue.code {
                    SnapshotIssueCode::SlicingError => Error::Slicing(issue.message.clone()),
                    _ => Error::Internal(issue.message.clone()),
                });
            }
            let unconsumed: Vec<&str> = issues
                .iter()
                .filter(|i| i.code == SnapshotIssueCode::DifferentialNotConsumed)
                .map(|i| i.path.as_str())
                .collect();
            if !unconsumed.is_empty() {
                return Err(Error::UnconsumedDifferential(unconsumed.join(", ")));
            }
        } else {
            for issue in &issues {
                if issue.code == SnapshotIssueCode::DifferentialNotConsumed {
                    tracing::warn!(path = %issue.path, "{}", issue.message);
                }
            }
        }

        let mut generated = sd.clone();
        generated.snapshot = Some(Snapshot { element: elements });
        self.resolver.register(generated.clone());

        Ok(SnapshotOutcome {
            structure_definition: generated,
            issues,
        })
    }
}

/// Order differential elements by their base-snapshot position so
/// out-of-order differentials still merge parent-before-child. Sliced
/// differentials keep their author order (slice grouping is positional).
fn sort_differential(
    differential: &[ElementDefinition],
    base: &[ElementDefinition],
) -> Vec<ElementDefinition> {
    if differential
        .iter()
        .any(|e| e.slice_name.is_some() || e.slicing.is_some())
    {
        return differential.to_vec();
    }

    let mut keyed: Vec<(usize, ElementDefinition)> = differential
        .iter()
        .map(|e| (base_position(&e.path, base), e.clone()))
        .collect();
    keyed.sort_by_key(|(pos, _)| *pos);
    keyed.into_iter().map(|(_, e)| e).collect()
}

/// Position of the most specific base element whose path anchors `path`
/// (exact, ancestor, or choice-stem match).
fn base_position(path: &str, base: &[ElementDefinition]) -> usize {
    let mut best: Option<(usize, usize)> = None; // (path length, index)
    for (i, elem) in base.iter().enumerate() {
        let anchored = path == elem.path
            || (path.starts_with(&elem.path)
                && path.as_bytes().get(elem.path.len()) == Some(&b'.'))
            || elem
                .path
                .strip_suffix("[x]")
                .map(|stem| {
                    path.starts_with(stem)
                        && path.len() > stem.len()
                        && path.as_bytes()[stem.len()].is_ascii_uppercase()
                })
                .unwrap_or(false);
        if anchored {
            let len = elem.path.len();
            if best.map(|(l, _)| len > l).unwrap_or(true) {
                best = Some((len, i));
            }
        }
    }
    best.map(|(_, i)| i).unwrap_or(usize::MAX)
}
