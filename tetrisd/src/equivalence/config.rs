//! Reference architecture description.
//!
//! An eight-core ARM big.LITTLE system: CPUs 0–3 are LITTLE cores, CPUs 4–7
//! are big cores.  Catalogue files refer to CPUs by the symbolic names
//! `ARM00`..`ARM07`.
//!
//! The equivalence table is derived from this description rather than listed
//! set-by-set: two CPU subsets are substitutable exactly when they contain
//! the same number of LITTLE cores and the same number of big cores, so the
//! classes are the shapes `(n little, m big)` and the members of a class are
//! all combinations realising its shape.  Members are enumerated in
//! lexicographic order, which fixes the deterministic expansion order the
//! selection engine's tie-breaking relies on.

use itertools::Itertools;
use once_cell::sync::Lazy;

use super::{EquivalenceClass, EquivalenceTable};
use crate::cpumask::N_CPUS;

/// LITTLE-core indices of the reference architecture.
pub const LITTLE_CPUS: [usize; 4] = [0, 1, 2, 3];

/// big-core indices of the reference architecture.
pub const BIG_CPUS: [usize; 4] = [4, 5, 6, 7];

/// Symbolic CPU names used in catalogue files, by CPU index.
pub const CPU_NAMES: [&str; N_CPUS] = [
    "ARM00", "ARM01", "ARM02", "ARM03", "ARM04", "ARM05", "ARM06", "ARM07",
];

/// CPU index for a symbolic name, `None` if the name is unknown.
pub fn cpu_index(name: &str) -> Option<usize> {
    CPU_NAMES.iter().position(|&n| n == name)
}

static TABLE: Lazy<EquivalenceTable> = Lazy::new(build_reference_table);

/// The process-wide equivalence table for the reference architecture.
pub fn table() -> &'static EquivalenceTable {
    &TABLE
}

fn class_name(n_little: usize, n_big: usize) -> String {
    match (n_little, n_big) {
        (n, 0) => format!("{n} little"),
        (0, m) => format!("{m} big"),
        (n, m) => format!("{n} little + {m} big"),
    }
}

/// One class per shape `(n little, m big)`, members in lexicographic order.
/// Together the classes partition the non-empty subsets of the CPU universe.
fn build_reference_table() -> EquivalenceTable {
    let mut classes = Vec::new();

    for n_little in 0..=LITTLE_CPUS.len() {
        for n_big in 0..=BIG_CPUS.len() {
            if n_little == 0 && n_big == 0 {
                continue;
            }

            let mut members = Vec::new();
            for littles in LITTLE_CPUS.iter().copied().combinations(n_little) {
                for bigs in BIG_CPUS.iter().copied().combinations(n_big) {
                    let mut member = littles.clone();
                    member.extend(&bigs);
                    members.push(member);
                }
            }

            classes.push(EquivalenceClass::new(
                class_name(n_little, n_big),
                members,
            ));
        }
    }

    EquivalenceTable::from_classes(classes)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpumask::CpuMask;

    #[test]
    fn cpu_names_map_to_their_index() {
        assert_eq!(cpu_index("ARM00"), Some(0));
        assert_eq!(cpu_index("ARM07"), Some(7));
        assert_eq!(cpu_index("ARM08"), None);
        assert_eq!(cpu_index("arm00"), None);
    }

    #[test]
    fn table_partitions_all_non_empty_subsets() {
        let total: usize = table()
            .classes()
            .iter()
            .map(|class| class.members().len())
            .sum();
        assert_eq!(total, (1 << N_CPUS) - 1);
    }

    #[test]
    fn shapes_get_their_expected_class() {
        let table = table();
        assert_eq!(table.class_of(CpuMask::of([2])).unwrap().name(), "1 little");
        assert_eq!(table.class_of(CpuMask::of([5])).unwrap().name(), "1 big");
        assert_eq!(
            table.class_of(CpuMask::of([0, 1, 4])).unwrap().name(),
            "2 little + 1 big"
        );
        assert_eq!(
            table.class_of(CpuMask::of([0, 1, 2, 3, 4, 5, 6, 7])).unwrap().name(),
            "4 little + 4 big"
        );
    }

    #[test]
    fn single_little_class_members_are_in_ascending_order() {
        let class = table().class_of(CpuMask::of([0])).unwrap();
        assert_eq!(
            class.members(),
            &[vec![0], vec![1], vec![2], vec![3]]
        );
    }

    #[test]
    fn member_counts_follow_the_binomials() {
        // C(4,2) × C(4,1) = 6 × 4 = 24 placements of shape "2 little + 1 big".
        let class = table().class_of(CpuMask::of([0, 1, 4])).unwrap();
        assert_eq!(class.members().len(), 24);
        assert_eq!(class.size(), 3);
    }

    #[test]
    fn empty_mask_belongs_to_no_class() {
        assert!(table().class_of(CpuMask::empty()).is_none());
        assert!(table().relabelings(CpuMask::empty()).is_err());
    }
}
