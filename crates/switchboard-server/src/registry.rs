//! Host registry: the single source of truth for who is hosting.
//!
//! The registry owns every [`HostRoute`] and maintains two indexes: host id
//! (allocation order) and display name. Host ids are process-unique,
//! allocated monotonically from 1, and never reused. Name lookups resolve to
//! the most-recently-registered host when several hosts share a name.
//!
//! All mutation goes through the router's serialization discipline; the
//! registry itself is a plain single-threaded structure.

use std::collections::{BTreeMap, HashMap};

use switchboard_proto::HostInfo;

use crate::routes::HostRoute;

/// Registry of active hosts with id and name indexes.
///
/// # Invariants
///
/// - `names` never contains an entry whose target is absent from `hosts`.
/// - Iteration over `hosts` is id order, which equals registration order
///   because ids are allocated monotonically.
#[derive(Debug)]
pub struct Registry {
    /// Host id → route. `BTreeMap` so snapshots come out in registration
    /// order.
    hosts: BTreeMap<u64, HostRoute>,
    /// Display name → host id. Registration overwrites: last one wins.
    names: HashMap<String, u64>,
    next_host_id: u64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { hosts: BTreeMap::new(), names: HashMap::new(), next_host_id: 1 }
    }

    /// Register a host under a display name.
    ///
    /// Never fails: name collisions are permitted, and the new host shadows
    /// any previous holder of the name for name-based lookups.
    pub fn register_host(&mut self, name: &str, session_id: u64) -> &HostRoute {
        let id = self.next_host_id;
        self.next_host_id += 1;

        self.names.insert(name.to_owned(), id);
        self.hosts
            .entry(id)
            .or_insert_with(|| HostRoute::new(id, name.to_owned(), session_id))
    }

    /// Remove a host from both indexes. Idempotent: `None` if already gone.
    ///
    /// The name index entry is removed only if it still points at this host;
    /// a later registration under the same name keeps its entry.
    pub fn unregister_host(&mut self, host_id: u64) -> Option<HostRoute> {
        let route = self.hosts.remove(&host_id)?;
        if self.names.get(route.name()).copied() == Some(host_id) {
            self.names.remove(route.name());
        }
        Some(route)
    }

    /// O(1) lookup by host id.
    pub fn host(&self, host_id: u64) -> Option<&HostRoute> {
        self.hosts.get(&host_id)
    }

    /// Mutable lookup by host id.
    pub fn host_mut(&mut self, host_id: u64) -> Option<&mut HostRoute> {
        self.hosts.get_mut(&host_id)
    }

    /// O(1) lookup by display name: the most-recently-registered holder.
    pub fn host_by_name(&self, name: &str) -> Option<&HostRoute> {
        self.hosts.get(self.names.get(name)?)
    }

    /// Snapshot of active hosts in registration order.
    ///
    /// Every entry's session is open by construction: a host is unregistered
    /// in the same serialized step that observes its session close.
    pub fn list_active_hosts(&self) -> Vec<HostInfo> {
        self.hosts
            .values()
            .map(|route| HostInfo { host_id: route.id(), host_name: route.name().to_owned() })
            .collect()
    }

    /// Number of registered hosts.
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }
}
