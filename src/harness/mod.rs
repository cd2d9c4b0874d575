//! An in-memory multi-node test medium, standing in for real radio hardware
//! in tests and the demo binary. A broadcast fan-out over an explicit
//! adjacency list, with the `'static` channel instances Embassy's
//! `Sender`/`Receiver` require obtained the same way long-lived simulated
//! queues are elsewhere in this codebase: `Box::leak(Box::new(...))`.
//!
//! There is no signal geometry or packet loss model here: delivery is
//! governed purely by the adjacency list a test sets up, and frames reach a
//! node's inbox regardless of whether that node's `Radio` channel is
//! logically open or closed. Real hardware would not deliver to a
//! powered-down receiver; this harness trades that fidelity for
//! determinism, since leaf sleep/wake decisions are already exercised at
//! the `Node` level through PVN/RSU state, not through the medium dropping
//! frames.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};

use crate::adapters::{Clock, Radio, RadioEvent};
use crate::node_id::NodeId;

const INBOX_CAPACITY: usize = 64;

type Inbox = Channel<CriticalSectionRawMutex, RadioEvent, INBOX_CAPACITY>;
type InboxSender = Sender<'static, CriticalSectionRawMutex, RadioEvent, INBOX_CAPACITY>;
type InboxReceiver = Receiver<'static, CriticalSectionRawMutex, RadioEvent, INBOX_CAPACITY>;

/// The shared medium every [`MediumRadio`] in a test talks through. Holds
/// the adjacency list (who can hear whom) and each registered node's inbox
/// sender.
pub struct Medium {
    inner: RefCell<MediumInner>,
}

#[derive(Default)]
struct MediumInner {
    links: HashMap<NodeId, HashSet<NodeId>>,
    senders: HashMap<NodeId, InboxSender>,
}

impl Medium {
    pub fn new() -> Rc<Medium> {
        Rc::new(Medium {
            inner: RefCell::new(MediumInner::default()),
        })
    }

    /// Register `id` on this medium and return its `Radio` handle. The
    /// channel is intentionally leaked: it must outlive every future that
    /// borrows from it, which in a test binary means "for the process
    /// lifetime".
    pub fn register(self: &Rc<Self>, id: NodeId) -> MediumRadio {
        let inbox: &'static Inbox = Box::leak(Box::new(Inbox::new()));
        self.inner.borrow_mut().senders.insert(id, inbox.sender());
        self.inner.borrow_mut().links.entry(id).or_default();
        MediumRadio {
            id,
            medium: Rc::clone(self),
            receiver: inbox.receiver(),
            broadcast_online: false,
            unicast_online: false,
        }
    }

    /// Make `a` and `b` able to hear each other's broadcasts and unicasts.
    /// Symmetric: wireless links have no direction here.
    pub fn link(&self, a: NodeId, b: NodeId) {
        let mut inner = self.inner.borrow_mut();
        inner.links.entry(a).or_default().insert(b);
        inner.links.entry(b).or_default().insert(a);
    }

    /// Break the link between `a` and `b`, simulating drift out of range.
    pub fn unlink(&self, a: NodeId, b: NodeId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(peers) = inner.links.get_mut(&a) {
            peers.remove(&b);
        }
        if let Some(peers) = inner.links.get_mut(&b) {
            peers.remove(&a);
        }
    }

    /// Remove a node from the medium entirely (a permanent departure, as
    /// opposed to a transient `unlink`).
    pub fn remove(&self, id: NodeId) {
        let mut inner = self.inner.borrow_mut();
        inner.senders.remove(&id);
        inner.links.remove(&id);
        for peers in inner.links.values_mut() {
            peers.remove(&id);
        }
    }

    fn neighbors_of(&self, id: NodeId) -> Vec<NodeId> {
        self.inner
            .borrow()
            .links
            .get(&id)
            .map(|peers| peers.iter().copied().collect())
            .unwrap_or_default()
    }

    async fn broadcast(&self, from: NodeId, port: u16, payload: &[u8]) {
        for peer in self.neighbors_of(from) {
            let sender = self.inner.borrow().senders.get(&peer).cloned();
            if let Some(sender) = sender {
                sender
                    .send(RadioEvent::Broadcast {
                        port,
                        from,
                        payload: payload.to_vec(),
                    })
                    .await;
            }
        }
    }

    async fn unicast(&self, from: NodeId, port: u16, dest: NodeId, payload: &[u8]) {
        let reachable = self.neighbors_of(from).contains(&dest);
        if !reachable {
            log::warn!("harness: {from} cannot reach {dest}, dropping unicast on port {port}");
            return;
        }
        let sender = self.inner.borrow().senders.get(&dest).cloned();
        if let Some(sender) = sender {
            sender
                .send(RadioEvent::Unicast {
                    port,
                    from,
                    payload: payload.to_vec(),
                })
                .await;
        }
    }
}

/// One node's `Radio` handle onto a shared [`Medium`]. `open`/`close` are
/// tracked only for diagnostics here since the medium always delivers;
/// `Node` itself already enforces every §5 open/close invariant.
pub struct MediumRadio {
    id: NodeId,
    medium: Rc<Medium>,
    receiver: InboxReceiver,
    broadcast_online: bool,
    unicast_online: bool,
}

impl Radio for MediumRadio {
    async fn broadcast_open(&mut self, _port: u16) {
        self.broadcast_online = true;
    }

    async fn broadcast_close(&mut self, _port: u16) {
        self.broadcast_online = false;
    }

    async fn broadcast_send(&mut self, port: u16, payload: &[u8]) {
        self.medium.broadcast(self.id, port, payload).await;
    }

    async fn unicast_open(&mut self, _port: u16) {
        self.unicast_online = true;
    }

    async fn unicast_close(&mut self, _port: u16) {
        self.unicast_online = false;
    }

    async fn unicast_send(&mut self, port: u16, dest: NodeId, payload: &[u8]) {
        self.medium.unicast(self.id, port, dest, payload).await;
    }

    async fn recv(&mut self) -> RadioEvent {
        self.receiver.receive().await
    }
}

/// A non-blocking peek at a radio's inbox, for deterministic test/demo
/// stepping in place of the real event loop's blocking `recv`.
pub trait NonBlockingRadio: Radio {
    fn try_recv(&mut self) -> Option<RadioEvent>;
}

impl NonBlockingRadio for MediumRadio {
    fn try_recv(&mut self) -> Option<RadioEvent> {
        self.receiver.try_receive().ok()
    }
}

/// A `Clock` reading the crate's scaled virtual time ([`crate::virtual_time`])
/// so multi-node scenarios can run many MLST periods without real sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualClock;

impl Clock for VirtualClock {
    fn now_secs(&self) -> u32 {
        embassy_time::Instant::now().as_secs() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: core::future::Future>(mut fut: F) -> F::Output {
        use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
        fn noop(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        let waker = unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) };
        let mut cx = Context::from_waker(&waker);
        let mut fut = unsafe { core::pin::Pin::new_unchecked(&mut fut) };
        loop {
            if let Poll::Ready(out) = fut.as_mut().poll(&mut cx) {
                return out;
            }
        }
    }

    #[test]
    fn broadcast_reaches_only_linked_neighbors() {
        let medium = Medium::new();
        let mut a = medium.register(NodeId(1));
        let mut b = medium.register(NodeId(2));
        let mut c = medium.register(NodeId(3));
        medium.link(NodeId(1), NodeId(2));

        block_on(async {
            a.broadcast_open(154).await;
            b.broadcast_open(154).await;
            c.broadcast_open(154).await;
            a.broadcast_send(154, &[9]).await;
        });

        let got_b = block_on(b.recv());
        match got_b {
            RadioEvent::Broadcast { from, payload, .. } => {
                assert_eq!(from, NodeId(1));
                assert_eq!(payload, vec![9]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(c.receiver.try_receive().is_err());
    }

    #[test]
    fn unicast_is_dropped_between_unlinked_nodes() {
        let medium = Medium::new();
        let mut a = medium.register(NodeId(1));
        let b = medium.register(NodeId(2));
        // no link established
        block_on(a.unicast_send(181, NodeId(2), &[1, 2, 3]));
        assert!(b.receiver.try_receive().is_err());
    }

    #[test]
    fn removed_node_is_unreachable() {
        let medium = Medium::new();
        let mut a = medium.register(NodeId(1));
        let b = medium.register(NodeId(2));
        medium.link(NodeId(1), NodeId(2));
        medium.remove(NodeId(2));
        block_on(a.broadcast_send(154, &[1]));
        assert!(b.receiver.try_receive().is_err());
    }
}
