//! Public-Variable Neighborhood (§4.1).
//!
//! A one-hop broadcast gossip layer: each node publishes a small public
//! variable and observes the latest such variables of all of its neighbors,
//! keyed in a node-local `HashMap` with age-based eviction.

pub mod variable;

use std::collections::HashMap;

pub use variable::{EnergyAwareVariable, EnergyState, PlainVariable, PublicVariable};

use crate::adapters::Radio;
use crate::node_id::NodeId;

/// A single neighbor's last-known state (§3).
#[derive(Debug, Clone)]
pub struct NeighborEntry<V: PublicVariable> {
    pub id: NodeId,
    pub link_addr: [u8; 2],
    pub last_known_variable: V,
    pub last_refresh_timestamp: u32,
}

/// Callbacks fired on neighborhood change (§4.1, §9 "polymorphic
/// callbacks"). All methods default to no-ops so callers only implement
/// what they need.
pub trait PvnCallbacks<V: PublicVariable> {
    fn on_new(&mut self, _entry: &NeighborEntry<V>) {}
    fn on_change(&mut self, _entry: &NeighborEntry<V>) {}
    fn on_delete(&mut self, _entry: &NeighborEntry<V>) {}
}

/// A no-op callback set, for PVNs that only need `iterate`.
pub struct NoopCallbacks;
impl<V: PublicVariable> PvnCallbacks<V> for NoopCallbacks {}

/// The default "changed?" predicate: plain inequality (I1).
fn default_compare<V: PublicVariable>(old: &V, new: &V) -> bool {
    old != new
}

/// One node's public-variable broadcast channel and the neighbor table it
/// maintains from inbound broadcasts on the same port (§4.1).
pub struct Pvn<V: PublicVariable, CB: PvnCallbacks<V>> {
    port: u16,
    max_age_secs: u32,
    online: bool,
    neighbors: HashMap<NodeId, NeighborEntry<V>>,
    compare: fn(&V, &V) -> bool,
    callbacks: CB,
}

impl<V: PublicVariable, CB: PvnCallbacks<V>> Pvn<V, CB> {
    pub fn new(port: u16, max_age_secs: u32, callbacks: CB) -> Self {
        Pvn {
            port,
            max_age_secs,
            online: false,
            neighbors: HashMap::new(),
            compare: default_compare,
            callbacks,
        }
    }

    /// Install a custom "changed?" predicate (default: `PartialEq`, I1).
    pub fn set_compare(&mut self, compare: fn(&V, &V) -> bool) {
        self.compare = compare;
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn neighborhood_size(&self) -> usize {
        self.neighbors.len()
    }

    /// Lazily iterate the current neighbor table (unspecified order, I1).
    pub fn iterate(&self) -> impl Iterator<Item = &NeighborEntry<V>> {
        self.neighbors.values()
    }

    pub fn get(&self, id: NodeId) -> Option<&NeighborEntry<V>> {
        self.neighbors.get(&id)
    }

    /// Open the broadcast channel (offline -> online).
    pub async fn go_online<R: Radio>(&mut self, radio: &mut R) {
        if !self.online {
            radio.broadcast_open(self.port).await;
            self.online = true;
        }
    }

    /// Close the broadcast channel (online -> offline). Neither receiving
    /// nor spontaneous sending happens while offline.
    pub async fn go_offline<R: Radio>(&mut self, radio: &mut R) {
        if self.online {
            radio.broadcast_close(self.port).await;
            self.online = false;
        }
    }

    /// Transmit `variable` now, temporarily reopening the channel if the
    /// PVN is offline (§4.1 "may temporarily reopen a closed channel").
    pub async fn broadcast_now<R: Radio>(&mut self, radio: &mut R, variable: &V) {
        let was_offline = !self.online;
        if was_offline {
            radio.broadcast_open(self.port).await;
        }
        radio.broadcast_send(self.port, &variable.to_bytes()).await;
        if was_offline {
            radio.broadcast_close(self.port).await;
        }
    }

    /// Handle an inbound broadcast frame already routed to this PVN's port.
    pub fn receive(&mut self, from: NodeId, link_addr: [u8; 2], now: u32, payload: &[u8]) -> ReceiveOutcome {
        if payload.len() != V::SIZE {
            log::warn!(
                "pvn: dropping malformed broadcast from {from} on port {} ({} bytes, expected {})",
                self.port,
                payload.len(),
                V::SIZE
            );
            return ReceiveOutcome::Rejected;
        }
        let incoming = V::from_bytes(payload);

        if let Some(entry) = self.neighbors.get_mut(&from) {
            entry.last_refresh_timestamp = now;
            if (self.compare)(&entry.last_known_variable, &incoming) {
                entry.last_known_variable = incoming;
                self.callbacks.on_change(entry);
                ReceiveOutcome::Changed
            } else {
                entry.last_known_variable = incoming;
                ReceiveOutcome::Unchanged
            }
        } else {
            // One entry() call inserts the fully-populated record; there is
            // no window where the table holds a half-initialized neighbor.
            let entry = self.neighbors.entry(from).or_insert_with(|| NeighborEntry {
                id: from,
                link_addr,
                last_known_variable: incoming,
                last_refresh_timestamp: now,
            });
            self.callbacks.on_new(entry);
            ReceiveOutcome::New
        }
    }

    /// Evict every neighbor older than `max_age_secs` (I2, saturating age to
    /// avoid wrap-around shortly after boot). Returns the evicted ids.
    pub fn sweep(&mut self, now: u32) -> Vec<NodeId> {
        let max_age = self.max_age_secs;
        let stale: Vec<NodeId> = self
            .neighbors
            .iter()
            .filter(|(_, e)| now.saturating_sub(e.last_refresh_timestamp) > max_age)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            if let Some(entry) = self.neighbors.remove(id) {
                self.callbacks.on_delete(&entry);
            }
        }
        stale
    }
}

/// The result of feeding one inbound broadcast to [`Pvn::receive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    New,
    Changed,
    Unchanged,
    Rejected,
}

impl ReceiveOutcome {
    pub fn is_activity(self) -> bool {
        matches!(self, ReceiveOutcome::New | ReceiveOutcome::Changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting {
        new_count: u32,
        change_count: u32,
        delete_count: u32,
    }
    impl PvnCallbacks<PlainVariable> for Counting {
        fn on_new(&mut self, _entry: &NeighborEntry<PlainVariable>) {
            self.new_count += 1;
        }
        fn on_change(&mut self, _entry: &NeighborEntry<PlainVariable>) {
            self.change_count += 1;
        }
        fn on_delete(&mut self, _entry: &NeighborEntry<PlainVariable>) {
            self.delete_count += 1;
        }
    }

    fn var(parent: u16, dist: u8, children: u8) -> PlainVariable {
        PlainVariable {
            distance_to_root: dist,
            parent_id: NodeId(parent),
            children_count: children,
        }
    }

    /// P1: repeated delivery of identical broadcasts fires on_new exactly
    /// once and on_change zero times.
    #[test]
    fn p1_idempotence() {
        let mut pvn = Pvn::new(154, 15, Counting::default());
        let payload = var(1, 1, 0).to_bytes();
        for _ in 0..5 {
            pvn.receive(NodeId(2), [0, 2], 10, &payload);
        }
        assert_eq!(pvn.callbacks.new_count, 1);
        assert_eq!(pvn.callbacks.change_count, 0);
    }

    #[test]
    fn change_fires_on_distinct_payload() {
        let mut pvn = Pvn::new(154, 15, Counting::default());
        pvn.receive(NodeId(2), [0, 2], 10, &var(1, 1, 0).to_bytes());
        pvn.receive(NodeId(2), [0, 2], 11, &var(1, 1, 1).to_bytes());
        assert_eq!(pvn.callbacks.new_count, 1);
        assert_eq!(pvn.callbacks.change_count, 1);
    }

    /// P2: sweep removes all and only entries violating the max-age bound.
    #[test]
    fn p2_aging_sweep() {
        let mut pvn = Pvn::new(154, 15, Counting::default());
        pvn.receive(NodeId(2), [0, 2], 0, &var(1, 1, 0).to_bytes());
        pvn.receive(NodeId(3), [0, 3], 10, &var(1, 1, 0).to_bytes());
        pvn.sweep(16);
        assert!(pvn.get(NodeId(2)).is_none());
        assert!(pvn.get(NodeId(3)).is_some());
        assert_eq!(pvn.callbacks.delete_count, 1);
    }

    #[test]
    fn sweep_before_boot_does_not_underflow() {
        let mut pvn = Pvn::new(154, 15, Counting::default());
        pvn.receive(NodeId(2), [0, 2], 5, &var(1, 1, 0).to_bytes());
        // now < last_refresh_timestamp should never happen in practice, but
        // saturating_sub must not panic or wrap.
        pvn.sweep(0);
        assert!(pvn.get(NodeId(2)).is_some());
    }

    #[test]
    fn malformed_payload_is_dropped() {
        let mut pvn = Pvn::new(154, 15, Counting::default());
        assert_eq!(pvn.receive(NodeId(2), [0, 2], 0, &[1, 2]), ReceiveOutcome::Rejected);
        assert_eq!(pvn.neighborhood_size(), 0);
    }
}
