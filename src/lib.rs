//! A self-stabilizing Maximum-Leaf Spanning Tree backbone for duty-cycled
//! wireless sensor nodes.
//!
//! Three cooperating layers, one per module: [`pvn`] is the one-hop gossip
//! layer neighbors use to publish small state variables; [`mlst`] is the
//! parent-election state machine that turns a PVN snapshot into a tree;
//! [`rsu`] is the ACKed hop-by-hop unicast transport leaves use to get
//! application payloads to the root without staying awake for it. [`node`]
//! drives all three for one node around a single cooperative event loop.
//! [`harness`] and [`virtual_time`] back the test suite with an in-memory
//! medium and a scaled clock; neither is needed by a real deployment, which
//! would supply its own [`adapters::Radio`] and [`adapters::Clock`].

pub mod adapters;
pub mod config;
pub mod error;
pub mod harness;
pub mod mlst;
pub mod node;
pub mod node_id;
pub mod pvn;
pub mod random;
pub mod rsu;
pub mod virtual_time;
