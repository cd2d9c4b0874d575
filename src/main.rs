//! `mesh-harness`: a small multi-node demo binary.
//!
//! Spawns a three-node line (root - relay - leaf) on the in-memory medium,
//! drives a handful of MLST periods at accelerated virtual speed, sends one
//! application payload from the leaf, and logs each node's state as the
//! tree converges.

use embassy_executor::Executor;
use env_logger::Builder;
use log::{info, LevelFilter};
use std::thread;

use mlst_mesh::config::MeshConfig;
use mlst_mesh::harness::{Medium, MediumRadio, VirtualClock};
use mlst_mesh::mlst::{NodeRole, PlainVariant};
use mlst_mesh::node::Node;
use mlst_mesh::node_id::NodeId;
use mlst_mesh::random::StdRandomSource;
use mlst_mesh::virtual_time;

type DemoNode = Node<PlainVariant, MediumRadio, VirtualClock, StdRandomSource>;

#[embassy_executor::task(pool_size = 8)]
async fn node_task(mut node: DemoNode) {
    node.run().await
}

#[embassy_executor::task]
async fn leaf_sender_task(mut node: DemoNode, payload: &'static [u8]) {
    embassy_time::Timer::after(embassy_time::Duration::from_secs(5)).await;
    node.send(payload).await;
    node.run().await
}

fn main() {
    Builder::new().filter_level(LevelFilter::Info).init();
    info!("starting mesh-harness demo: root(1) - relay(2) - leaf(3)");

    virtual_time::set_time_scale_percent(1000);

    let medium = Medium::new();
    medium.link(NodeId(1), NodeId(2));
    medium.link(NodeId(2), NodeId(3));

    let config = MeshConfig::default();

    let root = Node::new(
        NodeId(1),
        NodeRole::Root,
        PlainVariant,
        medium.register(NodeId(1)),
        VirtualClock,
        StdRandomSource::from_link_addr_seed(1),
        config.clone(),
    );
    let relay = Node::new(
        NodeId(2),
        NodeRole::Member,
        PlainVariant,
        medium.register(NodeId(2)),
        VirtualClock,
        StdRandomSource::from_link_addr_seed(2),
        config.clone(),
    );
    let mut leaf = Node::new(
        NodeId(3),
        NodeRole::Member,
        PlainVariant,
        medium.register(NodeId(3)),
        VirtualClock,
        StdRandomSource::from_link_addr_seed(3),
        config,
    );
    leaf.set_failure_callback(|parent, tries| {
        log::warn!("leaf: send to {parent} failed (try {tries})");
    });

    let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
    executor.run(|spawner| {
        let _ = spawner.spawn(node_task(root));
        let _ = spawner.spawn(node_task(relay));
        let _ = spawner.spawn(leaf_sender_task(leaf, b"hello root"));
    });
}
