//! Host platform collaborators: the broadcast/unicast radio primitives and
//! the monotonic second counter a real node would source from its hardware.
//! A concrete implementation for tests lives in [`crate::harness`]; a real
//! deployment would implement `Radio` and `Clock` against actual hardware.

use crate::node_id::NodeId;

/// Monotonically non-decreasing seconds since boot (`clock_seconds()`).
pub trait Clock {
    fn now_secs(&self) -> u32;
}

/// A frame delivered to a node from its radio.
#[derive(Debug, Clone)]
pub enum RadioEvent {
    /// A PVN broadcast frame received on `port`.
    Broadcast {
        port: u16,
        from: NodeId,
        payload: Vec<u8>,
    },
    /// An RSU data or ACK frame received on `port`.
    Unicast {
        port: u16,
        from: NodeId,
        payload: Vec<u8>,
    },
}

/// Broadcast + unicast radio primitives (§6).
///
/// Each `open`/`close` pair must be balanced on every sleep transition (§5).
/// Callers fill the payload immediately before calling a `send` method; no
/// `.await` point separates "fill" from "send" in this crate's own code,
/// honoring the packet-buffer staging discipline of §5 and §9.
pub trait Radio {
    /// Open the broadcast channel on `port` so it can receive and send.
    fn broadcast_open(&mut self, port: u16) -> impl Future<Output = ()> + Send;
    /// Close the broadcast channel on `port`.
    fn broadcast_close(&mut self, port: u16) -> impl Future<Output = ()> + Send;
    /// Transmit `payload` as a single broadcast frame on `port`. May be
    /// called while the channel is logically offline — the caller is
    /// expected to `broadcast_open`/`broadcast_close` around a transient
    /// send in that case (see `Pvn::broadcast_now`).
    fn broadcast_send(&mut self, port: u16, payload: &[u8]) -> impl Future<Output = ()> + Send;

    /// Open the unicast channel on `port`.
    fn unicast_open(&mut self, port: u16) -> impl Future<Output = ()> + Send;
    /// Close the unicast channel on `port`.
    fn unicast_close(&mut self, port: u16) -> impl Future<Output = ()> + Send;
    /// Send `payload` to `dest` on the unicast channel `port`.
    fn unicast_send(
        &mut self,
        port: u16,
        dest: NodeId,
        payload: &[u8],
    ) -> impl Future<Output = ()> + Send;

    /// Wait for the next inbound frame on any currently open channel.
    fn recv(&mut self) -> impl Future<Output = RadioEvent> + Send;
}
