//! Per-client state and thread bookkeeping.

use tracing::{debug, info, warn};

use crate::affinity::set_thread_affinity;
use crate::cpumask::CpuMask;
use crate::mapping::Mapping;
use crate::net::Connection;
use crate::selection::{Comparator, Filter};

/// Synthetic thread name registered for a client's main thread.
pub const MAIN_THREAD: &str = "@main";

/// One registered kernel thread and the mask last enforced for it.
#[derive(Debug, Clone)]
pub struct ClientThread {
    pub name: String,
    pub tid: i32,
    pub cpus: CpuMask,
}

/// A managed client process.
///
/// Created empty when its connection is accepted; populated by `NEW_CLIENT`;
/// mutated by `NEW_THREAD` and admin updates; dropped when the connection
/// goes away.  Owns its [`Connection`], so the socket closes with the client.
#[derive(Debug)]
pub struct Client {
    pub connection: Connection,
    pub exec: String,
    pub pid: i32,
    /// Dynamic clients get the whole mapping footprint per thread instead of
    /// a per-thread pin; the kernel scheduler places within it.
    pub dynamic: bool,
    pub threads: Vec<ClientThread>,
    /// Private catalogue copy taken at registration; a database reload does
    /// not touch it.
    pub catalogue: Vec<Mapping>,
    pub active: Mapping,
    pub filter: Filter,
    pub comparator: Comparator,
}

impl Client {
    pub fn new(connection: Connection) -> Self {
        info!(fd = connection.raw_fd(), "new client created");
        Client {
            connection,
            exec: String::new(),
            pid: -1,
            dynamic: false,
            threads: Vec::new(),
            catalogue: Vec::new(),
            active: Mapping::default(),
            filter: Filter::default(),
            comparator: Comparator::default(),
        }
    }

    /// CPU footprint the client currently occupies.
    pub fn cpus(&self) -> CpuMask {
        self.active.cpus()
    }

    /// Affinity for the thread `name` under the active mapping:
    /// dynamic clients and threads the mapping does not know get the whole
    /// footprint, known threads of static clients a single-CPU pin.
    fn thread_affinity(&self, name: &str) -> CpuMask {
        if self.dynamic {
            return self.active.cpus();
        }
        match self.active.cpu_for_thread(name) {
            Some(cpu) => CpuMask::of([cpu]),
            None => self.active.cpus(),
        }
    }

    /// Make `mapping` the active one and re-enforce the affinity of every
    /// registered thread.
    ///
    /// Installing a mapping with the active mapping's name is a no-op; a
    /// repeated remap to the same name must not re-pin every thread.
    pub fn install_mapping(&mut self, mapping: Mapping) {
        if mapping.name() == self.active.name() {
            return;
        }

        info!(
            exec = %self.exec,
            pid = self.pid,
            mapping = mapping.name(),
            cpus = %mapping.cpus(),
            "changing client mapping"
        );
        self.active = mapping;

        let masks: Vec<CpuMask> = self
            .threads
            .iter()
            .map(|t| self.thread_affinity(&t.name))
            .collect();

        for (thread, cpus) in self.threads.iter_mut().zip(masks) {
            debug!(
                thread = %thread.name,
                tid = thread.tid,
                from = %thread.cpus,
                to = %cpus,
                "remapping thread"
            );
            thread.cpus = cpus;

            // The registry keeps the intended mask even if the kernel call
            // fails; a thread racing to exit must not corrupt server state.
            if let Err(e) = set_thread_affinity(thread.tid, cpus) {
                warn!(
                    thread = %thread.name,
                    tid = thread.tid,
                    error = %e,
                    "failed to set CPU affinity"
                );
            }
        }
    }

    /// Register the thread `name` with kernel id `tid` and enforce its
    /// affinity.  A duplicate name is logged and left untouched.
    pub fn register_thread(&mut self, name: &str, tid: i32) {
        info!(
            thread = name,
            tid,
            exec = %self.exec,
            "new thread registered"
        );

        if self.threads.iter().any(|t| t.name == name) {
            warn!(thread = name, "duplicate thread");
            return;
        }

        let cpus = self.thread_affinity(name);
        debug!(thread = name, %cpus, dynamic = self.dynamic, "thread affinity");

        self.threads.push(ClientThread {
            name: name.to_string(),
            tid,
            cpus,
        });

        if let Err(e) = set_thread_affinity(tid, cpus) {
            warn!(thread = name, tid, error = %e, "failed to set CPU affinity");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    fn client() -> Client {
        let (stream, _peer) = UnixStream::pair().unwrap();
        let mut client = Client::new(Connection::from_stream(stream));
        // Keep the peer end alive for the test via leak; the process exits anyway.
        std::mem::forget(_peer);
        client.exec = "app".to_string();
        client.pid = 900_000;
        client
    }

    fn mapping(name: &str, threads: &[(&str, usize)]) -> Mapping {
        Mapping::new(
            name,
            threads.iter().map(|&(t, c)| (t.to_string(), c)),
            [("executionTime".to_string(), 1.0)],
        )
    }

    #[test]
    fn static_client_pins_known_threads_to_one_cpu() {
        let mut client = client();
        client.install_mapping(mapping("M", &[("worker", 2), ("io", 5)]));

        client.register_thread("worker", 900_001);
        assert_eq!(client.threads[0].cpus, CpuMask::of([2]));
    }

    #[test]
    fn unknown_thread_falls_back_to_the_footprint() {
        let mut client = client();
        client.install_mapping(mapping("M", &[("worker", 2), ("io", 5)]));

        client.register_thread("helper", 900_001);
        assert_eq!(client.threads[0].cpus, CpuMask::of([2, 5]));
    }

    #[test]
    fn dynamic_client_threads_roam_the_footprint() {
        let mut client = client();
        client.dynamic = true;
        client.install_mapping(mapping("M", &[("worker", 2), ("io", 5)]));

        client.register_thread("worker", 900_001);
        assert_eq!(client.threads[0].cpus, CpuMask::of([2, 5]));
    }

    #[test]
    fn duplicate_thread_names_are_ignored() {
        let mut client = client();
        client.install_mapping(mapping("M", &[("worker", 2)]));

        client.register_thread("worker", 900_001);
        client.register_thread("worker", 900_002);

        assert_eq!(client.threads.len(), 1);
        assert_eq!(client.threads[0].tid, 900_001);
    }

    #[test]
    fn installing_a_mapping_remaps_every_thread() {
        let mut client = client();
        client.install_mapping(mapping("M1", &[("worker", 2), ("io", 5)]));
        client.register_thread("worker", 900_001);
        client.register_thread("io", 900_002);

        client.install_mapping(mapping("M2", &[("worker", 3), ("io", 6)]));

        assert_eq!(client.threads[0].cpus, CpuMask::of([3]));
        assert_eq!(client.threads[1].cpus, CpuMask::of([6]));
    }

    #[test]
    fn same_name_mapping_is_not_reinstalled() {
        let mut client = client();
        client.install_mapping(mapping("M", &[("worker", 2)]));
        client.register_thread("worker", 900_001);

        // Same name, different placement: the short-circuit keeps the old one.
        client.install_mapping(mapping("M", &[("worker", 3)]));
        assert_eq!(client.threads[0].cpus, CpuMask::of([2]));
        assert_eq!(client.active.cpu_for_thread("worker"), Some(2));
    }

    #[test]
    fn every_thread_mask_stays_within_the_footprint() {
        let mut client = client();
        client.install_mapping(mapping("M", &[("worker", 1), ("io", 4)]));
        client.register_thread("worker", 900_001);
        client.register_thread("stray", 900_002);

        for thread in &client.threads {
            assert_eq!(
                thread.cpus.intersect(client.cpus()),
                thread.cpus,
                "thread '{}' escapes the mapping footprint",
                thread.name
            );
        }
    }
}
