/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Kernel CPU-affinity enforcement.
//!
//! Thin wrapper around `sched_setaffinity(2)`.  The manager treats failures
//! here as advisory: they are logged and the registry keeps the intended
//! mask, because a thread racing to exit must not corrupt server state.

use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;
use thiserror::Error;

use crate::cpumask::CpuMask;

#[derive(Debug, Error)]
pub enum AffinityError {
    #[error("cannot apply an empty CPU mask")]
    EmptyMask,

    #[error("sched_setaffinity failed: {0}")]
    Kernel(#[from] nix::errno::Errno),
}

/// Restrict the kernel thread `tid` to the CPUs in `cpus`.
///
/// `tid` is a kernel thread id (what `gettid(2)` returns), not a pthread
/// handle.  `tid == 0` addresses the calling thread.
pub fn set_thread_affinity(tid: i32, cpus: CpuMask) -> Result<(), AffinityError> {
    if cpus.is_empty() {
        return Err(AffinityError::EmptyMask);
    }

    let mut cpuset = CpuSet::new();
    for cpu in cpus.iter() {
        cpuset.set(cpu)?;
    }

    sched_setaffinity(Pid::from_raw(tid), &cpuset)?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
