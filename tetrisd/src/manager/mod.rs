//! Client registry and orchestration.
//!
//! The [`Manager`] owns every live [`Client`], the mapping database and the
//! blocked-CPU mask.  The event loop feeds it accepted connections, client
//! records, control records and signal-driven operations; the manager runs
//! selection, updates the registry and enforces affinity.
//!
//! # Ownership model
//! Single-threaded by construction: the event loop is the only caller, so no
//! interior mutability is needed anywhere.  Clients are keyed by the raw fd
//! of their connection — that fd doubles as the public client id reported in
//! `NEW_CLIENT_ACK` and targeted by `tetrisctl upd_client`.

pub mod client;

pub use client::{Client, ClientThread, MAIN_THREAD};

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cpumask::CpuMask;
use crate::db::MappingDatabase;
use crate::equivalence::config;
use crate::equivalence::EquivalenceTable;
use crate::mapping::Mapping;
use crate::net::{Connection, Received, Sent};
use crate::proto::{ControlData, NewClient, TetrisData, UpdateClient};
use crate::selection::{select_best_mapping, Comparator, Filter, SelectionError};

/// Why a `NEW_CLIENT` registration was refused.
#[derive(Debug, Error)]
enum RegisterError {
    #[error("unknown client id {id}")]
    UnknownClient { id: i32 },

    #[error("no mapping catalogue for executable '{exec}'")]
    UnknownExecutable { exec: String },

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

pub struct Manager {
    /// Live clients by connection fd.  `BTreeMap` so occupancy unions and
    /// registry dumps walk the clients in a stable order.
    clients: BTreeMap<i32, Client>,
    db: MappingDatabase,
    /// CPUs the administrator removed from the placement universe; treated
    /// as permanently occupied during selection.
    blocked: CpuMask,
}

impl Manager {
    /// Create a manager and do the initial catalogue load from `mappings_dir`.
    pub fn new(mappings_dir: impl AsRef<Path>) -> Self {
        let mut manager = Manager {
            clients: BTreeMap::new(),
            db: MappingDatabase::new(mappings_dir.as_ref()),
            blocked: CpuMask::empty(),
        };
        manager.update_mappings();
        manager
    }

    // ── Connection lifecycle ──────────────────────────────────────────────────

    /// Track a freshly accepted connection as an (unregistered) client.
    pub fn client_connect(&mut self, id: i32, connection: Connection) {
        self.clients.insert(id, Client::new(connection));
    }

    /// Drop a client.  Affinity of its threads is deliberately not reverted;
    /// the last enforced masks survive the registration.
    pub fn client_disconnect(&mut self, id: i32) {
        if self.clients.remove(&id).is_some() {
            info!(id, "client removed");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn client(&self, id: i32) -> Option<&Client> {
        self.clients.get(&id)
    }

    // ── Client channel ────────────────────────────────────────────────────────

    /// Drain and handle every record pending on the client's connection.
    ///
    /// Returns `true` when the connection should be closed (peer hangup,
    /// protocol error, or a refused registration).
    pub fn client_message(&mut self, id: i32) -> bool {
        loop {
            let Some(client) = self.clients.get_mut(&id) else {
                warn!(id, "message for unknown client");
                return true;
            };

            match client.connection.recv::<TetrisData>() {
                Ok(Received::Frame(message)) => {
                    if self.dispatch_client(id, message) {
                        return true;
                    }
                }
                Ok(Received::Empty) => return false,
                Ok(Received::Closed) => return true,
                Err(e) => {
                    warn!(id, error = %e, "client connection failed");
                    return true;
                }
            }
        }
    }

    /// Handle one client record; returns `true` when the connection should
    /// close.
    fn dispatch_client(&mut self, id: i32, message: TetrisData) -> bool {
        match message {
            TetrisData::NewClient(nc) => {
                let managed = match self.register_client(id, &nc) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(id, pid = nc.pid, error = %e, "cannot manage client");
                        false
                    }
                };

                // The verdict is acknowledged either way; a failed write
                // downgrades the client to unmanaged.
                let ack = TetrisData::NewClientAck { id, managed };
                let acked = self.acknowledge(id, &ack);
                let managed = managed && acked;

                // An unmanaged client has no business staying connected.
                !managed
            }
            TetrisData::NewThread { tid, name } => {
                if let Some(client) = self.clients.get_mut(&id) {
                    client.register_thread(name.trim(), tid);
                }

                let ack = TetrisData::NewThreadAck { managed: true };
                self.acknowledge(id, &ack);
                false
            }
            other => {
                warn!(id, ?other, "unexpected message on client channel");
                false
            }
        }
    }

    /// Write an acknowledgment record; `false` if it could not be delivered.
    fn acknowledge(&mut self, id: i32, ack: &TetrisData) -> bool {
        let Some(client) = self.clients.get_mut(&id) else {
            return false;
        };
        match client.connection.send(ack) {
            Ok(Sent::Done) => true,
            Ok(Sent::Retry) | Err(_) => {
                error!(id, "failed to acknowledge client message");
                false
            }
        }
    }

    /// Populate a connected client from its `NEW_CLIENT` record, select its
    /// mapping and enforce affinity for the synthetic main thread.
    fn register_client(&mut self, id: i32, nc: &NewClient) -> Result<(), RegisterError> {
        let exec = basename(&nc.exec);
        info!(exec = %exec, pid = nc.pid, id, "new client registered");

        let catalogue = self
            .db
            .catalogue(&exec)
            .ok_or_else(|| RegisterError::UnknownExecutable { exec: exec.clone() })?
            .to_vec();

        let comparator = Comparator::new(nc.compare_criteria.trim(), nc.compare_more_is_better);
        let filter = nc
            .filter_criteria
            .as_deref()
            .map(Filter::parse)
            .unwrap_or_default();
        info!(%comparator, %filter, "client selection criteria");

        let occupied = self.occupied_cpus(id);
        let preferred = nc.preferred_mapping.as_deref().map(str::trim);
        let selected = choose_mapping(
            &catalogue,
            &filter,
            &comparator,
            occupied,
            preferred,
            config::table(),
        )?;

        let Some(client) = self.clients.get_mut(&id) else {
            return Err(RegisterError::UnknownClient { id });
        };
        client.pid = nc.pid;
        client.exec = exec;
        client.dynamic = nc.dynamic_client;
        client.catalogue = catalogue;
        client.comparator = comparator;
        client.filter = filter;
        client.install_mapping(selected);

        info!(
            mapping = client.active.name(),
            placement = if client.dynamic { "dynamic" } else { "static" },
            "client mapping installed"
        );

        client.register_thread(MAIN_THREAD, nc.pid);
        Ok(())
    }

    // ── Control channel ───────────────────────────────────────────────────────

    /// Handle one single-shot control record.
    pub fn control_message(&mut self, data: ControlData) {
        match data {
            ControlData::UpdateClient(update) => self.update_client(update),
            ControlData::UpdateMappings => self.update_mappings(),
            ControlData::BlockCpus { cpus } => self.block_cpus(cpus),
        }
    }

    /// Mutate a client's options and re-select its mapping.
    fn update_client(&mut self, update: UpdateClient) {
        let id = update.client_id;
        let occupied = self.occupied_cpus(id);

        let Some(client) = self.clients.get_mut(&id) else {
            warn!(id, "control message for unknown client");
            return;
        };
        info!(exec = %client.exec, pid = client.pid, id, "updating client");

        if let Some(dynamic) = update.dynamic_client {
            client.dynamic = dynamic;
            info!(
                placement = if dynamic { "dynamic" } else { "static" },
                "changed thread placement"
            );
        }
        if let Some((criteria, more_is_better)) = &update.comparator {
            client.comparator = Comparator::new(criteria.trim(), *more_is_better);
            info!(comparator = %client.comparator, "changed selection criteria");
        }
        if let Some(filter) = &update.filter_criteria {
            client.filter = Filter::parse(filter);
            info!(filter = %client.filter, "changed filter");
        }

        let preferred = update.preferred_mapping.as_deref().map(str::trim);
        match choose_mapping(
            &client.catalogue,
            &client.filter,
            &client.comparator,
            occupied,
            preferred,
            config::table(),
        ) {
            Ok(mapping) => client.install_mapping(mapping),
            Err(e) => warn!(id, error = %e, "re-selection failed, keeping current mapping"),
        }
    }

    /// Reload the mapping database from disk.  Already registered clients
    /// keep their catalogue copies.
    pub fn update_mappings(&mut self) {
        if let Err(e) = self.db.reload() {
            error!(error = %e, "reading mappings failed");
        }
    }

    /// Replace the blocked-CPU mask.  An empty mask unblocks everything.
    pub fn block_cpus(&mut self, cpus: CpuMask) {
        if cpus.is_empty() {
            info!("unblocking all CPUs");
        } else {
            info!(%cpus, "blocking CPUs");
        }
        self.blocked = cpus;
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    /// CPUs unavailable to the client `excluding`: the union of every other
    /// client's footprint plus the administratively blocked CPUs.
    fn occupied_cpus(&self, excluding: i32) -> CpuMask {
        self.clients
            .iter()
            .filter(|(&id, _)| id != excluding)
            .fold(self.blocked, |acc, (_, client)| acc.union(client.cpus()))
    }

    /// Write the registry to stdout (SIGUSR2).
    pub fn dump_registry(&self) {
        println!("Currently active mappings:");
        println!("==========================");
        for (id, client) in &self.clients {
            let class = config::table()
                .class_of(client.cpus())
                .map(|class| class.name())
                .unwrap_or("-");

            println!("Client '{}' [{}] (ID: {})", client.exec, client.pid, id);
            println!("-> mapping: {} [{}]", client.active.name(), class);
            println!("-> threads:");
            for thread in &client.threads {
                println!("--> {}({}): {}", thread.name, thread.tid, thread.cpus);
            }
        }
        println!("======= END OF LIST =======");
    }
}

/// Reduce a client-supplied executable path to its stripped basename.
fn basename(exec: &str) -> String {
    Path::new(exec.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Take the preferred mapping verbatim when the catalogue has it, otherwise
/// fall back to the full selection.
fn choose_mapping(
    catalogue: &[Mapping],
    filter: &Filter,
    comparator: &Comparator,
    occupied: CpuMask,
    preferred: Option<&str>,
    table: &EquivalenceTable,
) -> Result<Mapping, SelectionError> {
    if let Some(name) = preferred {
        match catalogue.iter().find(|m| m.name() == name) {
            Some(mapping) => {
                info!(mapping = name, "using preferred mapping");
                return Ok(mapping.clone());
            }
            None => {
                info!(mapping = name, "preferred mapping not in catalogue, selecting");
            }
        }
    }

    debug!(%occupied, "searching best mapping");
    select_best_mapping(catalogue, filter, comparator, occupied, table)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
