/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Candidate thread-to-CPU placements.
//!
//! A [`Mapping`] is one profiled placement of an executable's threads onto
//! specific CPUs, labelled with numeric characteristics (execution time,
//! energy, ...).  Catalogues of mappings are produced offline and loaded by
//! [`crate::db`]; the selection engine picks one per client and derives
//! equivalent placements from it via the equivalence table.
//!
//! # Ownership model
//! Mappings are plain values.  A client stores a clone of its catalogue at
//! registration time and a clone of the selected mapping as its active one;
//! nothing is shared, so a catalogue reload never mutates a running client.

use std::collections::BTreeMap;

use crate::cpumask::CpuMask;
use crate::equivalence::{EquivalenceTable, Relabeling, UnknownEquivalenceClass};

/// One candidate placement.
///
/// Invariant: `cpus` is always the image of the thread map. The constructor
/// and [`relabeled`](Mapping::relabeled) maintain it; the fields are private
/// so nothing else can break it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    name: String,
    /// Thread name → CPU index.  `BTreeMap` so iteration (and therefore
    /// logging and enforcement order) is deterministic.
    threads: BTreeMap<String, usize>,
    /// Characteristic name → value, e.g. `"executionTime"` → `50.0`.
    characteristics: BTreeMap<String, f64>,
    cpus: CpuMask,
}

impl Mapping {
    pub fn new(
        name: impl Into<String>,
        threads: impl IntoIterator<Item = (String, usize)>,
        characteristics: impl IntoIterator<Item = (String, f64)>,
    ) -> Self {
        let threads: BTreeMap<String, usize> = threads.into_iter().collect();
        let cpus = threads.values().copied().collect();

        Mapping {
            name: name.into(),
            threads,
            characteristics: characteristics.into_iter().collect(),
            cpus,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The CPU assigned to `thread`, if the mapping knows the thread.
    pub fn cpu_for_thread(&self, thread: &str) -> Option<usize> {
        self.threads.get(thread).copied()
    }

    pub fn threads(&self) -> impl Iterator<Item = (&str, usize)> {
        self.threads.iter().map(|(name, &cpu)| (name.as_str(), cpu))
    }

    pub fn characteristic(&self, name: &str) -> Option<f64> {
        self.characteristics.get(name).copied()
    }

    pub fn characteristics(&self) -> impl Iterator<Item = (&str, f64)> {
        self.characteristics
            .iter()
            .map(|(name, &value)| (name.as_str(), value))
    }

    /// Full CPU footprint of the placement.
    pub fn cpus(&self) -> CpuMask {
        self.cpus
    }

    /// `true` for the default-initialised placeholder a client carries before
    /// its first selection.
    pub fn is_unset(&self) -> bool {
        self.name.is_empty() && self.threads.is_empty()
    }

    /// The same placement with its CPUs renamed through `relabeling`.
    /// CPUs absent from the relabeling keep their index; name and
    /// characteristics are shared unchanged.
    pub fn relabeled(&self, relabeling: &Relabeling) -> Mapping {
        let threads: BTreeMap<String, usize> = self
            .threads
            .iter()
            .map(|(thread, cpu)| {
                let cpu = relabeling.get(cpu).copied().unwrap_or(*cpu);
                (thread.clone(), cpu)
            })
            .collect();
        let cpus = threads.values().copied().collect();

        Mapping {
            name: self.name.clone(),
            threads,
            characteristics: self.characteristics.clone(),
            cpus,
        }
    }

    /// The equivalence-class expansion of this mapping: one derived mapping
    /// per member of the class containing its footprint, in member order.
    /// The member equal to the footprint reproduces `self`.
    pub fn equivalent_mappings(
        &self,
        table: &EquivalenceTable,
    ) -> Result<Vec<Mapping>, UnknownEquivalenceClass> {
        Ok(table
            .relabelings(self.cpus)?
            .iter()
            .map(|relabeling| self.relabeled(relabeling))
            .collect())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equivalence::config;

    fn mapping(name: &str, threads: &[(&str, usize)], exec_time: f64) -> Mapping {
        Mapping::new(
            name,
            threads.iter().map(|&(t, c)| (t.to_string(), c)),
            [("executionTime".to_string(), exec_time)],
        )
    }

    #[test]
    fn cpus_is_the_image_of_the_thread_map() {
        let m = mapping("m", &[("worker", 2), ("io", 5), ("backup", 2)], 1.0);
        assert_eq!(m.cpus(), CpuMask::of([2, 5]));
        assert_eq!(m.cpu_for_thread("io"), Some(5));
        assert_eq!(m.cpu_for_thread("missing"), None);
    }

    #[test]
    fn default_mapping_is_unset() {
        assert!(Mapping::default().is_unset());
        assert!(!mapping("m", &[("t", 0)], 1.0).is_unset());
    }

    #[test]
    fn relabeling_moves_only_mapped_cpus() {
        let m = mapping("m", &[("a", 0), ("b", 4)], 1.0);
        let relabeling = Relabeling::from([(0, 3)]);
        let moved = m.relabeled(&relabeling);

        assert_eq!(moved.cpu_for_thread("a"), Some(3));
        assert_eq!(moved.cpu_for_thread("b"), Some(4));
        assert_eq!(moved.cpus(), CpuMask::of([3, 4]));
        assert_eq!(moved.name(), "m");
        assert_eq!(moved.characteristic("executionTime"), Some(1.0));
    }

    #[test]
    fn expansion_yields_one_mapping_per_class_member() {
        let m = mapping("m", &[("worker", 0)], 50.0);
        let expanded = m.equivalent_mappings(config::table()).unwrap();

        // "1 little" has four members.
        assert_eq!(expanded.len(), 4);
        let footprints: Vec<CpuMask> = expanded.iter().map(|m| m.cpus()).collect();
        assert_eq!(
            footprints,
            vec![
                CpuMask::of([0]),
                CpuMask::of([1]),
                CpuMask::of([2]),
                CpuMask::of([3]),
            ]
        );
        // The identity member reproduces the original.
        assert_eq!(expanded[0], m);
    }

    #[test]
    fn expansion_of_an_unknown_footprint_fails() {
        let empty = Mapping::new("hollow", [], [("executionTime".to_string(), 1.0)]);
        assert!(empty.equivalent_mappings(config::table()).is_err());
    }

    #[test]
    fn expansion_preserves_thread_positions() {
        // Shape "1 little + 1 big": little slot carries "calc", big slot "gpu".
        let m = mapping("m", &[("calc", 1), ("gpu", 6)], 10.0);
        let expanded = m.equivalent_mappings(config::table()).unwrap();

        assert_eq!(expanded.len(), 16);
        for derived in &expanded {
            let calc = derived.cpu_for_thread("calc").unwrap();
            let gpu = derived.cpu_for_thread("gpu").unwrap();
            assert!(calc < 4, "'calc' must stay on a LITTLE core");
            assert!(gpu >= 4, "'gpu' must stay on a big core");
        }
    }
}
