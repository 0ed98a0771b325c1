/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Fixed-universe CPU bit-set.
//!
//! [`CpuMask`] is the value type every other component trades in: mapping
//! footprints, per-thread affinity, occupancy unions and the blocked-CPU set
//! are all masks over the same universe of [`N_CPUS`] CPUs.  It is `Copy` and
//! fits in a register; pass it by value.

use std::fmt;

use thiserror::Error;

/// Number of CPUs in the managed universe.
///
/// Configuration-time constant of the reference architecture (four LITTLE
/// cores and four big cores, see [`crate::equivalence::config`]).  Every CPU
/// index handled by the daemon satisfies `index < N_CPUS`.
pub const N_CPUS: usize = 8;

/// A set of CPU indices over the fixed universe `0..N_CPUS`.
///
/// Equality and hashing are over the underlying bit pattern, so two masks
/// built in different orders compare equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CpuMask {
    bits: u64,
}

impl CpuMask {
    /// The empty set.
    pub const fn empty() -> Self {
        CpuMask { bits: 0 }
    }

    /// Build a mask from CPU indices.
    ///
    /// # Panics
    /// Panics if any index is `>= N_CPUS`.
    pub fn of(cpus: impl IntoIterator<Item = usize>) -> Self {
        let mut mask = CpuMask::empty();
        for cpu in cpus {
            mask.set(cpu);
        }
        mask
    }

    /// Reconstruct a mask from its raw bit pattern, dropping bits outside the
    /// universe.  Used at the wire boundary where the peer sends a full u64.
    pub const fn from_bits_truncate(bits: u64) -> Self {
        CpuMask {
            bits: bits & ((1 << N_CPUS) - 1),
        }
    }

    /// Raw bit pattern (bit N set = CPU N in the mask).
    pub const fn bits(self) -> u64 {
        self.bits
    }

    /// Insert `cpu` into the set.  Idempotent.
    ///
    /// # Panics
    /// Panics if `cpu >= N_CPUS`.
    pub fn set(&mut self, cpu: usize) {
        assert!(cpu < N_CPUS, "CPU index {cpu} outside universe 0..{N_CPUS}");
        self.bits |= 1 << cpu;
    }

    /// Remove `cpu` from the set.  Removing an absent CPU is a no-op.
    pub fn clear(&mut self, cpu: usize) {
        if cpu < N_CPUS {
            self.bits &= !(1 << cpu);
        }
    }

    pub const fn contains(self, cpu: usize) -> bool {
        cpu < N_CPUS && self.bits & (1 << cpu) != 0
    }

    pub const fn count(self) -> usize {
        self.bits.count_ones() as usize
    }

    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub const fn union(self, other: CpuMask) -> CpuMask {
        CpuMask {
            bits: self.bits | other.bits,
        }
    }

    pub const fn intersect(self, other: CpuMask) -> CpuMask {
        CpuMask {
            bits: self.bits & other.bits,
        }
    }

    /// `true` iff the two sets share at least one CPU.
    pub const fn overlaps(self, other: CpuMask) -> bool {
        self.bits & other.bits != 0
    }

    /// Ascending enumeration of the contained CPU indices.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..N_CPUS).filter(move |&cpu| self.contains(cpu))
    }
}

impl FromIterator<usize> for CpuMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        CpuMask::of(iter)
    }
}

impl fmt::Display for CpuMask {
    /// `"0,2,5"` for `{0, 2, 5}`, `"none"` for the empty set.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        for cpu in self.iter() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{cpu}")?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpuMask({self})")
    }
}

// ── CPU list syntax ───────────────────────────────────────────────────────────

/// Error parsing a textual CPU list.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CpuListError {
    #[error("empty element in CPU list")]
    EmptyElement,

    #[error("'{0}' is not a CPU number")]
    NotANumber(String),

    #[error("CPU {0} outside universe 0..{N_CPUS}")]
    OutOfRange(usize),

    #[error("descending range {0}-{1}")]
    DescendingRange(usize, usize),
}

impl CpuMask {
    /// Parse the `tetrisctl` CPU list syntax: comma-separated CPU numbers and
    /// inclusive ranges, e.g. `"0-2,5"` → `{0,1,2,5}`.  The empty string is
    /// the empty mask.
    pub fn parse_list(list: &str) -> Result<CpuMask, CpuListError> {
        let mut mask = CpuMask::empty();
        if list.trim().is_empty() {
            return Ok(mask);
        }

        for element in list.split(',') {
            let element = element.trim();
            if element.is_empty() {
                return Err(CpuListError::EmptyElement);
            }

            let (lo, hi) = match element.split_once('-') {
                Some((lo, hi)) => (parse_cpu(lo)?, parse_cpu(hi)?),
                None => {
                    let cpu = parse_cpu(element)?;
                    (cpu, cpu)
                }
            };

            if lo > hi {
                return Err(CpuListError::DescendingRange(lo, hi));
            }
            for cpu in lo..=hi {
                mask.set(cpu);
            }
        }

        Ok(mask)
    }
}

fn parse_cpu(s: &str) -> Result<usize, CpuListError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(CpuListError::EmptyElement);
    }
    let cpu: usize = s
        .parse()
        .map_err(|_| CpuListError::NotANumber(s.to_string()))?;
    if cpu >= N_CPUS {
        return Err(CpuListError::OutOfRange(cpu));
    }
    Ok(cpu)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mask_has_no_cpus() {
        let mask = CpuMask::empty();
        assert!(mask.is_empty());
        assert_eq!(mask.count(), 0);
        assert_eq!(mask.iter().count(), 0);
    }

    #[test]
    fn set_is_idempotent() {
        let mut mask = CpuMask::empty();
        mask.set(3);
        mask.set(3);
        assert_eq!(mask.count(), 1);
        assert!(mask.contains(3));
    }

    #[test]
    fn clear_removes_only_the_given_cpu() {
        let mut mask = CpuMask::of([1, 2, 5]);
        mask.clear(2);
        assert_eq!(mask, CpuMask::of([1, 5]));
        // Clearing an absent CPU is a no-op.
        mask.clear(7);
        assert_eq!(mask, CpuMask::of([1, 5]));
    }

    #[test]
    #[should_panic(expected = "outside universe")]
    fn set_out_of_universe_panics() {
        let mut mask = CpuMask::empty();
        mask.set(N_CPUS);
    }

    #[test]
    fn equality_ignores_insertion_order() {
        assert_eq!(CpuMask::of([5, 1, 2]), CpuMask::of([2, 5, 1]));
    }

    #[test]
    fn iteration_is_ascending() {
        let mask = CpuMask::of([6, 0, 3]);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 3, 6]);
    }

    #[test]
    fn union_and_intersection() {
        let a = CpuMask::of([0, 1, 4]);
        let b = CpuMask::of([1, 4, 7]);
        assert_eq!(a.union(b), CpuMask::of([0, 1, 4, 7]));
        assert_eq!(a.intersect(b), CpuMask::of([1, 4]));
        assert!(a.overlaps(b));
        assert!(!a.overlaps(CpuMask::of([2, 3])));
    }

    #[test]
    fn from_bits_truncate_drops_foreign_bits() {
        let mask = CpuMask::from_bits_truncate(u64::MAX);
        assert_eq!(mask.count(), N_CPUS);
    }

    #[test]
    fn display_formats_comma_list() {
        assert_eq!(CpuMask::of([0, 2, 5]).to_string(), "0,2,5");
        assert_eq!(CpuMask::empty().to_string(), "none");
    }

    // ── parse_list ────────────────────────────────────────────────────────────

    #[test]
    fn parse_list_single_cpus_and_ranges() {
        assert_eq!(CpuMask::parse_list("0-2,5").unwrap(), CpuMask::of([0, 1, 2, 5]));
        assert_eq!(CpuMask::parse_list("7").unwrap(), CpuMask::of([7]));
        assert_eq!(CpuMask::parse_list(" 1 , 3 - 4 ").unwrap(), CpuMask::of([1, 3, 4]));
    }

    #[test]
    fn parse_list_empty_string_is_empty_mask() {
        assert_eq!(CpuMask::parse_list("").unwrap(), CpuMask::empty());
        assert_eq!(CpuMask::parse_list("   ").unwrap(), CpuMask::empty());
    }

    #[test]
    fn parse_list_rejects_garbage() {
        assert_eq!(
            CpuMask::parse_list("0,,2"),
            Err(CpuListError::EmptyElement)
        );
        assert!(matches!(
            CpuMask::parse_list("banana"),
            Err(CpuListError::NotANumber(_))
        ));
        assert_eq!(
            CpuMask::parse_list("6-9"),
            Err(CpuListError::OutOfRange(9))
        );
        assert_eq!(
            CpuMask::parse_list("5-2"),
            Err(CpuListError::DescendingRange(5, 2))
        );
    }
}
