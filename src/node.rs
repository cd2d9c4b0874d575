//! The per-node cooperative driver (§5 "single-threaded cooperative on
//! each node"). Wires PVN, the MLST state machine and RSU together around
//! one `embassy_futures::select` over the MLST period timer, RSU's single
//! multiplexed timer, and inbound radio frames — grounded on the
//! `NodeContext`/`select3` shape of `simulation::node_task::node_task`.

use embassy_futures::select::{select3, Either3};
use embassy_time::{Duration, Instant, Timer};

use crate::adapters::{Clock, Radio, RadioEvent};
use crate::config::{MeshConfig, ACKNOWLEDGEMENT_PORT, MESSAGING_PORT};
use crate::mlst::{Mlst, MlstVariant, NodeRole};
use crate::node_id::NodeId;
use crate::pvn::{NoopCallbacks, Pvn, PublicVariable};
use crate::random::{uniform, RandomSource};
use crate::rsu::{FailureCallback, NewMessageCallback, Rsu, TimerKind};

fn secs_to_duration(seconds: f32) -> Duration {
    crate::rsu::secs_to_duration(seconds)
}

/// One node's full protocol stack (§2 "Data flow").
pub struct Node<V, R, C, RND>
where
    V: MlstVariant,
    R: Radio,
    C: Clock,
    RND: RandomSource,
{
    id: NodeId,
    mlst: Mlst<V>,
    pvn: Pvn<V::Variable, NoopCallbacks>,
    rsu: Rsu,
    radio: R,
    clock: C,
    rng: RND,
    config: MeshConfig,
    next_period_at: Instant,
}

impl<V, R, C, RND> Node<V, R, C, RND>
where
    V: MlstVariant,
    R: Radio,
    C: Clock,
    RND: RandomSource,
{
    pub fn new(id: NodeId, role: NodeRole, variant: V, radio: R, clock: C, rng: RND, config: MeshConfig) -> Self {
        let is_root = matches!(role, NodeRole::Root);
        let mut pvn = Pvn::new(crate::config::MLST_PVN_PORT, config.max_age_of_mlst_nbr_seconds as u32, NoopCallbacks);
        // Ignore distance (and EA energy) ripples for activity purposes:
        // only a neighbor's parent_id/children_count actually changes this
        // node's own tree shape (matches `pvnCmp`).
        pvn.set_compare(V::topology_changed);
        let rsu = Rsu::new(is_root, config.max_history_size);
        Node {
            id,
            mlst: Mlst::new(id, role, variant),
            pvn,
            rsu,
            radio,
            clock,
            rng,
            config,
            next_period_at: Instant::now(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// `mlst_is_undefined()` (§6).
    pub fn is_undefined(&self) -> bool {
        self.mlst.is_undefined()
    }

    pub fn parent(&self) -> NodeId {
        self.mlst.parent()
    }

    pub fn is_leaf(&self) -> bool {
        self.mlst.is_leaf()
    }

    /// Whether the RSU transport currently has its channels open, i.e. is
    /// not sleeping (§7 error kind 5: "parent disappears ... RSU continues
    /// ... cannot transmit until a new parent is elected" implies waking up).
    pub fn is_awake(&self) -> bool {
        self.rsu.is_online()
    }

    pub fn set_failure_callback(&mut self, cb: impl FailureCallback + 'static) {
        self.rsu.set_failure_callback(cb);
    }

    /// Root-only (§6 "root-only `rsunicast_set_new_message_callback`").
    pub fn set_new_message_callback(&mut self, cb: impl NewMessageCallback + 'static) {
        self.rsu.set_new_message_callback(cb);
    }

    /// `mlst_send(bytes)`: submit an application payload for upstream
    /// delivery toward the root.
    pub async fn send(&mut self, payload: &[u8]) {
        self.rsu.send(&mut self.radio, &mut self.rng, &self.config, payload).await;
    }

    /// `mlst_print_state()` (§6): a one-line diagnostic summary.
    pub fn print_state(&self) {
        log::info!(
            "node {}: parent={} leaf={} children={} queue={} variable={:?}",
            self.id,
            self.mlst.parent(),
            self.mlst.is_leaf(),
            self.mlst.children_count(),
            self.rsu.queue_len(),
            self.mlst.own_variable().to_bytes(),
        );
    }

    fn parent_entry_is_fresh(&self) -> bool {
        match self.pvn.get(self.mlst.parent()) {
            Some(entry) => {
                self.clock.now_secs().saturating_sub(entry.last_refresh_timestamp)
                    <= self.config.max_age_of_parent_seconds as u32
            }
            None => false,
        }
    }

    /// One MLST round (§4.2, steps 1-8): sweep stale PVN entries, classify
    /// online/offline state off the post-sweep view, recompute, push the
    /// parent into RSU, broadcast, and decay the convergence counters.
    /// Public so tests and the demo binary can step a node's rounds
    /// deterministically instead of driving the real `run()` event loop.
    pub async fn run_round(&mut self) {
        let deleted = self.pvn.sweep(self.clock.now_secs());
        for dead in &deleted {
            self.mlst.on_parent_entry_deleted(*dead, &self.config);
        }
        if !deleted.is_empty() {
            self.mlst.mark_pvn_activity(&self.config);
        }

        if self.mlst.is_root() {
            self.pvn.go_online(&mut self.radio).await;
            self.rsu.disallow_sleeping(&mut self.radio).await;
        } else if self.mlst.is_undefined() {
            self.pvn.go_online(&mut self.radio).await;
            self.rsu.disallow_sleeping(&mut self.radio).await;
        } else if self.mlst.is_leaf()
            && self.mlst.stay_active_for_next_n_periods() == 0
            && self.parent_entry_is_fresh()
        {
            self.rsu.allow_sleeping(&mut self.radio).await;
            self.pvn.go_offline(&mut self.radio).await;
        } else if self.mlst.is_leaf() {
            self.pvn.go_online(&mut self.radio).await;
        } else {
            self.rsu.disallow_sleeping(&mut self.radio).await;
            self.pvn.go_online(&mut self.radio).await;
        }

        self.mlst.recompute(
            self.pvn.iterate().map(|e| (e.id, e.last_known_variable.clone())),
            &mut self.rng,
            &self.config,
        );

        self.rsu.set_parent(self.mlst.parent());
        let variable = self.mlst.own_variable().clone();
        self.pvn.broadcast_now(&mut self.radio, &variable).await;
        self.mlst.decay_counters();

        let base = self.config.mlst_period_length_seconds * uniform(&mut self.rng, 0.8, 1.0);
        let period_secs = base / self.mlst.period_divisor() as f32;
        self.next_period_at = Instant::now() + secs_to_duration(period_secs);

        self.print_state();
    }

    pub async fn dispatch_radio_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Broadcast { port, from, payload } if port == self.pvn.port() => {
                let outcome = self.pvn.receive(from, from.0.to_be_bytes(), self.clock.now_secs(), &payload);
                if outcome.is_activity() {
                    self.mlst.mark_pvn_activity(&self.config);
                }
            }
            RadioEvent::Unicast { port, from, payload } if port == MESSAGING_PORT => {
                self.rsu
                    .on_data_receive(&mut self.radio, &mut self.rng, &self.config, from, &payload)
                    .await;
            }
            RadioEvent::Unicast { port, .. } if port == ACKNOWLEDGEMENT_PORT => {
                self.rsu.on_ack(&mut self.radio, &mut self.rng, &self.config).await;
            }
            other => {
                log::warn!("node {}: frame on unrecognized port {:?}", self.id, other);
            }
        }
    }

    /// Run this node's event loop forever. Intended to back an
    /// `#[embassy_executor::task]`-spawned future per node.
    pub async fn run(&mut self) -> ! {
        loop {
            let rsu_pending = self.rsu.next_deadline();
            let rsu_kind = rsu_pending.map(|(kind, _)| kind);
            let rsu_at = rsu_pending
                .map(|(_, at)| at)
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            match select3(Timer::at(self.next_period_at), Timer::at(rsu_at), self.radio.recv()).await {
                Either3::First(_) => self.run_round().await,
                Either3::Second(_) => match rsu_kind {
                    Some(TimerKind::TransmitHead) => self.rsu.transmit_head(&mut self.radio, &self.config).await,
                    Some(TimerKind::AckTimeout) => {
                        self.rsu.on_ack_timeout(&mut self.radio, &mut self.rng, &self.config).await
                    }
                    None => {}
                },
                Either3::Third(event) => self.dispatch_radio_event(event).await,
            }
        }
    }
}

impl<R, C, RND> Node<crate::mlst::EnergyAwareVariant, R, C, RND>
where
    R: Radio,
    C: Clock,
    RND: RandomSource,
{
    /// EA-only: change this node's energy tier at runtime
    /// (`eamlst_set_energy_state`, §6's public API surface).
    pub fn set_energy_state(&mut self, state: crate::pvn::EnergyState) {
        self.mlst.set_energy_state(state);
    }
}

impl<V, R, C, RND> Node<V, R, C, RND>
where
    V: MlstVariant,
    R: Radio + crate::harness::NonBlockingRadio,
    C: Clock,
    RND: RandomSource,
{
    /// Non-blocking drain of this node's inbox, for deterministic
    /// test/demo stepping in place of `run`'s blocking `select3`.
    pub fn try_recv_event(&mut self) -> Option<RadioEvent> {
        self.radio.try_recv()
    }
}
