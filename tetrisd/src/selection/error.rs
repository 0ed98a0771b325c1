/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error type for mapping selection.
//!
//! Every variant names the stage that produced nothing, so the manager can
//! report *why* a client was refused:
//!
//! | Variant | Stage | Client-visible effect |
//! |---|---|---|
//! | `NoMappingSatisfiesFilter` | predicate prune | `managed = false` / remap refused |
//! | `NoMappingFits` | occupancy prune | `managed = false` / remap refused |
//! | `UnknownEquivalenceClass` | expansion | `managed = false` / remap refused |

use thiserror::Error;

use crate::equivalence::UnknownEquivalenceClass;

#[derive(Debug, Error)]
pub enum SelectionError {
    /// The predicate prune left an empty candidate set: no catalogue mapping
    /// satisfies the client's filter.
    #[error("no mapping satisfies the filter")]
    NoMappingSatisfiesFilter,

    /// Every equivalent placement of every filter-passing mapping overlaps
    /// the occupied CPUs.
    #[error("no equivalent mapping fits the free CPUs")]
    NoMappingFits,

    /// A catalogue mapping's CPU footprint is not covered by the equivalence
    /// table, so it cannot be expanded.
    #[error(transparent)]
    UnknownEquivalenceClass(#[from] UnknownEquivalenceClass),
}
