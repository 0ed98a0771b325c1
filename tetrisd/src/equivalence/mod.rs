//! CPU equivalence algebra.
//!
//! Heterogeneous multicores offer many CPU subsets that are interchangeable
//! for scheduling purposes: running a workload on LITTLE cores `{0,1}` is
//! indistinguishable from running it on `{2,3}`.  The [`EquivalenceTable`]
//! groups such subsets into named classes and derives, for any member, the
//! positional *relabelings* onto every other member of its class.  The
//! selection engine uses these relabelings to expand a single profiled
//! mapping into all placements of the same hardware shape.
//!
//! The table is static configuration: built once at startup from the
//! reference architecture description in [`config`] and never mutated.

pub mod config;

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::cpumask::CpuMask;

/// Partial CPU renaming between two members of one equivalence class.
///
/// Maps old CPU index → new CPU index; CPUs that keep their index are absent.
/// The empty map is the identity relabeling.
pub type Relabeling = BTreeMap<usize, usize>;

/// The queried CPU set belongs to no class of the table.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("CPU set {cpus} is not in any equivalence class")]
pub struct UnknownEquivalenceClass {
    pub cpus: CpuMask,
}

/// One named class: an ordered collection of members sharing a hardware
/// shape.  Each member is an ordered CPU index sequence of the class size;
/// the position within a member is what defines the relabeling.
#[derive(Debug, Clone)]
pub struct EquivalenceClass {
    name: String,
    members: Vec<Vec<usize>>,
}

impl EquivalenceClass {
    pub fn new(name: impl Into<String>, members: Vec<Vec<usize>>) -> Self {
        let name = name.into();
        assert!(!members.is_empty(), "class '{name}' has no members");
        let size = members[0].len();
        assert!(
            members.iter().all(|m| m.len() == size),
            "class '{name}' mixes member sizes"
        );
        EquivalenceClass { name, members }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of CPUs per member.
    pub fn size(&self) -> usize {
        self.members[0].len()
    }

    /// Members in table order.
    pub fn members(&self) -> &[Vec<usize>] {
        &self.members
    }
}

/// Static classification of CPU subsets into equivalence classes.
///
/// Invariant: every CPU set appears in at most one class (checked at
/// construction).
pub struct EquivalenceTable {
    classes: Vec<EquivalenceClass>,
    /// CPU set → (class index, member index).
    index: HashMap<CpuMask, (usize, usize)>,
}

impl EquivalenceTable {
    /// Build a table from its classes.
    ///
    /// # Panics
    /// Panics if the same CPU set occurs in two classes (or twice in one),
    /// or if a member repeats a CPU.  The table is configuration; a broken
    /// table is a startup-time defect, not a runtime condition.
    pub fn from_classes(classes: Vec<EquivalenceClass>) -> Self {
        let mut index = HashMap::new();
        for (class_idx, class) in classes.iter().enumerate() {
            for (member_idx, member) in class.members.iter().enumerate() {
                let mask = CpuMask::of(member.iter().copied());
                assert_eq!(
                    mask.count(),
                    member.len(),
                    "member {member:?} of class '{}' repeats a CPU",
                    class.name
                );
                let prev = index.insert(mask, (class_idx, member_idx));
                assert!(
                    prev.is_none(),
                    "CPU set {mask} classified twice (class '{}')",
                    class.name
                );
            }
        }
        EquivalenceTable { classes, index }
    }

    /// The class containing `cpus`, if any.
    pub fn class_of(&self, cpus: CpuMask) -> Option<&EquivalenceClass> {
        self.index.get(&cpus).map(|&(class_idx, _)| &self.classes[class_idx])
    }

    /// All relabelings from `cpus` onto the members of its class, in member
    /// order.  The member equal to `cpus` contributes the identity (empty)
    /// relabeling.
    pub fn relabelings(
        &self,
        cpus: CpuMask,
    ) -> Result<Vec<Relabeling>, UnknownEquivalenceClass> {
        let &(class_idx, member_idx) = self
            .index
            .get(&cpus)
            .ok_or(UnknownEquivalenceClass { cpus })?;

        let class = &self.classes[class_idx];
        let base = &class.members[member_idx];

        let relabelings = class
            .members
            .iter()
            .map(|target| {
                base.iter()
                    .zip(target)
                    .filter(|(from, to)| from != to)
                    .map(|(&from, &to)| (from, to))
                    .collect()
            })
            .collect();

        Ok(relabelings)
    }

    pub fn classes(&self) -> &[EquivalenceClass] {
        &self.classes
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
