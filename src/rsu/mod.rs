//! Reliable Sleep-Enabled Unicast (§4.3).
//!
//! Hop-by-hop retrying unicast with ACKs, a per-sender dedup window, a FIFO
//! send queue, and a sleep gate tied to leaf status. There is no RSU-owned
//! task: like the original's ctimer-driven callbacks, every method here is
//! invoked from the single per-node event loop in [`crate::node`], which
//! multiplexes exactly one outstanding timer deadline (§5 "a single timer
//! multiplexed").

pub mod history;
pub mod queue;

use embassy_time::{Duration, Instant};

use crate::adapters::Radio;
use crate::config::{MeshConfig, ACKNOWLEDGEMENT_PORT, MESSAGING_PORT};
use crate::node_id::NodeId;
use crate::random::{uniform, RandomSource};

pub use history::History;
pub use queue::SendQueue;

pub(crate) fn secs_to_duration(seconds: f32) -> Duration {
    Duration::from_micros((seconds.max(0.0) as f64 * 1_000_000.0) as u64)
}

/// Which action the single multiplexed timer should trigger when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fire `transmit_head` (either the inter-send spacing or the
    /// post-failure backoff elapsed).
    TransmitHead,
    /// Fire `on_ack_timeout` (no ACK arrived within `TIMEOUT_IN_SEC`).
    AckTimeout,
}

/// A callback invoked after every failed ACK wait, `(parent_id, tries)`.
pub trait FailureCallback: Send {
    fn on_failure(&mut self, parent: NodeId, tries: u8);
}
impl<F: FnMut(NodeId, u8) + Send> FailureCallback for F {
    fn on_failure(&mut self, parent: NodeId, tries: u8) {
        self(parent, tries)
    }
}

/// Root-only callback for newly arrived, deduplicated application payloads.
pub trait NewMessageCallback: Send {
    fn on_new_message(&mut self, payload: Vec<u8>);
}
impl<F: FnMut(Vec<u8>) + Send> NewMessageCallback for F {
    fn on_new_message(&mut self, payload: Vec<u8>) {
        self(payload)
    }
}

/// The singleton RSU transport for one node (§4.3 "Singleton").
pub struct Rsu {
    is_root: bool,
    online: bool,
    allow_sleep: bool,
    parent: NodeId,
    seqno: u8,
    queue: SendQueue,
    history: History,
    pending: Option<(TimerKind, Instant)>,
    failure_cb: Option<Box<dyn FailureCallback>>,
    new_message_cb: Option<Box<dyn NewMessageCallback>>,
}

impl Rsu {
    pub fn new(is_root: bool, history_capacity: usize) -> Self {
        Rsu {
            is_root,
            online: false,
            allow_sleep: false,
            parent: NodeId::UNDEFINED,
            seqno: 0,
            queue: SendQueue::new(),
            history: History::new(history_capacity),
            pending: None,
            failure_cb: None,
            new_message_cb: None,
        }
    }

    pub fn set_failure_callback(&mut self, cb: impl FailureCallback + 'static) {
        self.failure_cb = Some(Box::new(cb));
    }

    /// Root-only: set the callback for newly delivered application payloads.
    pub fn set_new_message_callback(&mut self, cb: impl NewMessageCallback + 'static) {
        self.new_message_cb = Some(Box::new(cb));
    }

    pub fn set_parent(&mut self, id: NodeId) {
        self.parent = id;
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// The deadline the node event loop should wait on next, if any.
    pub fn next_deadline(&self) -> Option<(TimerKind, Instant)> {
        self.pending
    }

    async fn open_channels<R: Radio>(&mut self, radio: &mut R) {
        if !self.online {
            radio.unicast_open(MESSAGING_PORT).await;
            radio.unicast_open(ACKNOWLEDGEMENT_PORT).await;
            self.online = true;
        }
    }

    async fn close_channels<R: Radio>(&mut self, radio: &mut R) {
        if self.online {
            radio.unicast_close(MESSAGING_PORT).await;
            radio.unicast_close(ACKNOWLEDGEMENT_PORT).await;
            self.online = false;
        }
    }

    /// Close the channels immediately if idle; otherwise remember to close
    /// them once the queue drains (§4.3 sleep gating).
    pub async fn allow_sleeping<R: Radio>(&mut self, radio: &mut R) {
        self.allow_sleep = true;
        if self.queue.is_empty() {
            self.close_channels(radio).await;
        }
    }

    /// Clear the sleep flag, waking the RSU up immediately if it was
    /// offline.
    pub async fn disallow_sleeping<R: Radio>(&mut self, radio: &mut R) {
        self.allow_sleep = false;
        if !self.online {
            self.open_channels(radio).await;
        }
    }

    fn arm_transmit_head(&mut self, rng: &mut dyn RandomSource, config: &MeshConfig) {
        let delay = config.next_msg_delay * uniform(rng, 0.5, 1.0);
        self.pending = Some((TimerKind::TransmitHead, Instant::now() + secs_to_duration(delay)));
    }

    /// `rsu_send`: enqueue `payload` (application bytes, without the seqno)
    /// toward the current parent.
    pub async fn send<R: Radio>(
        &mut self,
        radio: &mut R,
        rng: &mut dyn RandomSource,
        config: &MeshConfig,
        payload: &[u8],
    ) {
        self.open_channels(radio).await;

        let mut envelope = Vec::with_capacity(payload.len() + 1);
        envelope.push(self.seqno);
        envelope.extend_from_slice(payload);
        self.seqno = self.seqno.wrapping_add(1);

        let was_empty = self.queue.is_empty();
        self.queue.push_back(envelope);
        if was_empty {
            self.arm_transmit_head(rng, config);
        }
    }

    /// Invoked when the multiplexed timer fires with `TimerKind::TransmitHead`.
    pub async fn transmit_head<R: Radio>(&mut self, radio: &mut R, config: &MeshConfig) {
        if self.parent.is_undefined() {
            // No route yet: don't burn a try, just keep waiting.
            self.pending =
                Some((TimerKind::AckTimeout, Instant::now() + secs_to_duration(config.timeout_in_sec)));
            return;
        }
        if let Some(head) = self.queue.head_mut() {
            let envelope = head.envelope.clone();
            radio.unicast_send(MESSAGING_PORT, self.parent, &envelope).await;
            head.tries += 1;
        }
        self.pending =
            Some((TimerKind::AckTimeout, Instant::now() + secs_to_duration(config.timeout_in_sec)));
    }

    /// Invoked on an inbound frame on the ACK port.
    pub async fn on_ack<R: Radio>(
        &mut self,
        radio: &mut R,
        rng: &mut dyn RandomSource,
        config: &MeshConfig,
    ) {
        if self.queue.pop_head().is_none() {
            log::warn!("rsu: received unsolicited ACK, ignoring");
            return;
        }
        self.pending = None;
        if !self.queue.is_empty() {
            self.arm_transmit_head(rng, config);
        } else if self.allow_sleep {
            self.close_channels(radio).await;
        }
    }

    /// Invoked when the multiplexed timer fires with `TimerKind::AckTimeout`.
    pub async fn on_ack_timeout<R: Radio>(
        &mut self,
        radio: &mut R,
        rng: &mut dyn RandomSource,
        config: &MeshConfig,
    ) {
        if let Some(head) = self.queue.head() {
            let tries = head.tries;
            if let Some(cb) = self.failure_cb.as_mut() {
                cb.on_failure(self.parent, tries);
            }
            if tries > config.max_tries {
                self.queue.pop_head();
                if self.queue.is_empty() && self.allow_sleep {
                    self.close_channels(radio).await;
                }
            }
        }

        if let Some(head) = self.queue.head() {
            let tries = head.tries as f32;
            let delay = config.delay_on_fail_in_sec * tries * tries * uniform(rng, 0.0, 1.0);
            self.pending = Some((TimerKind::TransmitHead, Instant::now() + secs_to_duration(delay)));
        } else {
            self.pending = None;
        }
    }

    /// Invoked on an inbound frame on the data (messaging) port. Returns the
    /// deduplicated application payload when this node is root and the
    /// datagram has reached its destination.
    pub async fn on_data_receive<R: Radio>(
        &mut self,
        radio: &mut R,
        rng: &mut dyn RandomSource,
        config: &MeshConfig,
        from: NodeId,
        payload: &[u8],
    ) -> Option<Vec<u8>> {
        if payload.is_empty() {
            log::warn!("rsu: dropping empty data frame from {from}");
            return None;
        }
        let seqno = payload[0];
        let body = &payload[1..];

        // ACK first: a duplicate arose precisely because a previous ACK was
        // lost, so it must still be ACKed (§4.3, §7 item 2).
        radio.unicast_send(ACKNOWLEDGEMENT_PORT, from, b"A").await;

        if self.history.check(from, seqno) {
            return None;
        }
        self.history.add(from, seqno);

        if self.is_root {
            if let Some(cb) = self.new_message_cb.as_mut() {
                cb.on_new_message(body.to_vec());
            }
            return Some(body.to_vec());
        }

        self.send(radio, rng, config, body).await;
        None
    }
}
