//! Run planning: what gets built, in which waves, under which filenames.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::PlanError;
use crate::manifest::DependencyEntry;
use crate::target::BuildTarget;

/// One selected entry and its planned output.
#[derive(Debug, Clone)]
pub struct PlannedEntry<'a> {
    pub entry: &'a DependencyEntry,
    /// Deterministic filename of the collected package.
    pub output_filename: String,
    /// Set when the entry is disabled for the target.
    pub disabled: bool,
}

/// The entries of one run for one target.
#[derive(Debug, Clone)]
pub struct BuildPlan<'a> {
    target: BuildTarget,
    entries: Vec<PlannedEntry<'a>>,
}

impl<'a> BuildPlan<'a> {
    /// Plan `entries` for `target`. Entries disabled for the target are kept
    /// but marked, unless they were selected explicitly by name.
    ///
    /// Fails when two enabled entries would collect to the same filename.
    pub fn new(
        entries: &[&'a DependencyEntry],
        target: &BuildTarget,
        explicit_selection: bool,
    ) -> Result<Self, PlanError> {
        let mut planned = Vec::with_capacity(entries.len());
        let mut owners: BTreeMap<String, &str> = BTreeMap::new();

        for &entry in entries {
            let output_filename =
                target.output_filename(&entry.name, entry.version_string(), entry.is_noarch());
            let disabled = !explicit_selection && entry.is_disabled_for(target.format);
            if !disabled {
                if let Some(first) = owners.insert(output_filename.clone(), &entry.name) {
                    return Err(PlanError::OutputCollision {
                        filename: output_filename,
                        first: first.to_string(),
                        second: entry.name.clone(),
                    });
                }
            }
            planned.push(PlannedEntry {
                entry,
                output_filename,
                disabled,
            });
        }

        Ok(Self {
            target: target.clone(),
            entries: planned,
        })
    }

    pub fn target(&self) -> &BuildTarget {
        &self.target
    }

    /// Planned entries in manifest order.
    pub fn entries(&self) -> &[PlannedEntry<'a>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indices of [`Self::entries`] grouped in waves: every entry comes after
    /// the planned entries its `depends_on` hints name. Hints naming entries
    /// outside the plan are already satisfied. Within a wave, manifest order
    /// is kept.
    pub fn waves(&self) -> Vec<Vec<usize>> {
        let planned_names = self
            .entries
            .iter()
            .map(|planned| planned.entry.name.as_str())
            .collect::<BTreeSet<_>>();

        let mut done: BTreeSet<&str> = BTreeSet::new();
        let mut remaining: Vec<usize> = (0..self.entries.len()).collect();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<usize>, Vec<usize>) =
                remaining.iter().partition(|&&index| {
                    self.entries[index].entry.depends_on.iter().all(|hint| {
                        !planned_names.contains(hint.as_str()) || done.contains(hint.as_str())
                    })
                });

            if ready.is_empty() {
                // Only reachable with a cyclic plan, which a loaded manifest
                // never produces; keep manifest order for the rest.
                waves.push(blocked);
                break;
            }
            for &index in &ready {
                done.insert(self.entries[index].entry.name.as_str());
            }
            waves.push(ready);
            remaining = blocked;
        }
        waves
    }
}
