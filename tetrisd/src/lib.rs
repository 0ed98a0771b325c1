/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! TETRiS – CPU-affinity orchestration for heterogeneous multicores.
//!
//! A long-running daemon that decides, for every registered client process
//! and each of its threads, which CPUs the kernel scheduler may use, and
//! enforces the decision through per-thread affinity masks.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── cpumask      – fixed-universe CPU bit-set
//! ├── equivalence/ – CPU equivalence classes and relabelings
//! ├── mapping      – candidate placements and their expansion
//! ├── selection/   – filter, comparator and the selection algorithm
//! ├── db/          – per-executable catalogue loading (CSV)
//! ├── affinity     – sched_setaffinity enforcement
//! ├── proto/       – fixed-size wire records
//! ├── net/         – listening sockets and framed connections
//! ├── manager/     – client registry and orchestration
//! └── server/      – epoll/signalfd event loop
//! ```

pub mod affinity;
pub mod cpumask;
pub mod db;
pub mod equivalence;
pub mod manager;
pub mod mapping;
pub mod net;
pub mod proto;
pub mod selection;
pub mod server;
