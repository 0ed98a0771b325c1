//! Mapping selection — the TETRiS algorithm.
//!
//! Given a client's catalogue, its filter and comparator, and the CPUs other
//! clients currently occupy, [`select_best_mapping`] returns the placement
//! the client should run under:
//!
//! 1. **Predicate prune** — drop catalogue mappings the filter rejects.
//! 2. **Expansion & occupancy prune** — expand each survivor across its
//!    equivalence class and drop every derived placement that overlaps an
//!    occupied CPU.
//! 3. **Optimum** — a single pass over the candidates keeps the first one
//!    and replaces it only when a later candidate is strictly better *and*
//!    passes the filter again.
//!
//! The result is deterministic: expansion follows catalogue order, member
//! order within a class is fixed by the equivalence table, and the strict
//! comparison never replaces an equal-scoring incumbent.
//!
//! The filter re-check in step 3 looks redundant — expansion preserves
//! characteristics, so a derived mapping should pass whenever its original
//! did.  It is retained deliberately; do not fold it away without evidence
//! that no caller depends on it.

pub mod error;
pub mod filter;

pub use error::SelectionError;
pub use filter::{Comparator, Filter, FilterOp};

use tracing::debug;

use crate::cpumask::CpuMask;
use crate::equivalence::EquivalenceTable;
use crate::mapping::Mapping;

/// Expand `mappings` across their equivalence classes and keep the derived
/// placements that do not overlap `occupied`.
///
/// Candidate order is catalogue order, then class-member order within each
/// mapping.
pub fn tetris_mappings(
    mappings: &[Mapping],
    occupied: CpuMask,
    table: &EquivalenceTable,
) -> Result<Vec<Mapping>, SelectionError> {
    let mut result = Vec::new();

    for mapping in mappings {
        for derived in mapping.equivalent_mappings(table)? {
            if !occupied.overlaps(derived.cpus()) {
                result.push(derived);
            }
        }
    }

    Ok(result)
}

/// Select the best placement for one client.
///
/// # Errors
/// * [`SelectionError::NoMappingSatisfiesFilter`] — the filter rejected the
///   whole catalogue.
/// * [`SelectionError::NoMappingFits`] — every equivalent placement overlaps
///   the occupied CPUs.
/// * [`SelectionError::UnknownEquivalenceClass`] — a catalogue mapping's
///   footprint is outside the equivalence table.
pub fn select_best_mapping(
    catalogue: &[Mapping],
    filter: &Filter,
    comparator: &Comparator,
    occupied: CpuMask,
    table: &EquivalenceTable,
) -> Result<Mapping, SelectionError> {
    // Step 1: predicate prune.
    let mut possible: Vec<&Mapping> = Vec::new();
    for mapping in catalogue {
        if filter.accepts(mapping) {
            possible.push(mapping);
        } else {
            debug!(
                mapping = mapping.name(),
                %filter,
                "mapping does not satisfy the filter"
            );
        }
    }

    if possible.is_empty() {
        return Err(SelectionError::NoMappingSatisfiesFilter);
    }
    debug!(
        candidates = possible.len(),
        %occupied,
        "mappings satisfying the filter"
    );

    // Step 2: TETRiS expansion + occupancy prune.
    let owned: Vec<Mapping> = possible.into_iter().cloned().collect();
    let candidates = tetris_mappings(&owned, occupied, table)?;

    if candidates.is_empty() {
        return Err(SelectionError::NoMappingFits);
    }
    debug!(candidates = candidates.len(), "placements fitting the free CPUs");

    // Step 3: single pass for the optimum; first-seen wins ties.
    let mut best = &candidates[0];
    for candidate in &candidates[1..] {
        if comparator.better_than(candidate, best) && filter.accepts(candidate) {
            debug!(
                better = candidate.name(),
                cpus = %candidate.cpus(),
                over = best.name(),
                %comparator,
                "found better placement"
            );
            best = candidate;
        }
    }

    Ok(best.clone())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
