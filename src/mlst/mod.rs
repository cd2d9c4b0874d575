//! The MLST parent-election state machine (§4.2).
//!
//! One algorithm, parameterized by an energy-tier policy (§9's `admits`
//! note): [`plain::PlainVariant`] and [`energy_aware::EnergyAwareVariant`]
//! both implement [`MlstVariant`], and [`Mlst`] drives the shared
//! recompute/change-detection/tie-break logic over whichever variable type
//! the variant publishes.

pub mod energy_aware;
pub mod plain;

use crate::config::MeshConfig;
use crate::node_id::NodeId;
use crate::pvn::PublicVariable;
use crate::random::{uniform, RandomSource};

pub use energy_aware::EnergyAwareVariant;
pub use plain::PlainVariant;

/// Whether this node is the tree sink or an ordinary member (§4.2 "Root
/// special case" — a configuration flag here rather than a compile-time
/// build selection, since this is a library).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Root,
    Member,
}

/// The outcome of one recompute pass over a variant's parent-selection
/// rule, before tie-break and change detection are applied.
pub struct RecomputeOutcome {
    pub parent: Option<NodeId>,
    /// Per-tier best distance (index 0 is the only slot the plain variant
    /// uses; the energy-aware variant fills all three independently, §4.2
    /// "maintain three parallel best-distances").
    pub distances: [u8; 3],
    /// How many neighbors tied for the winning key at the tier that
    /// actually decided `parent`.
    pub tie_count: usize,
}

/// A parent-selection policy over one public-variable wire type.
pub trait MlstVariant {
    type Variable: PublicVariable;

    fn root_variable(&self) -> Self::Variable;
    fn undefined_variable(&self, children_count: u8) -> Self::Variable;
    fn build_variable(&self, parent: NodeId, distances: [u8; 3], children_count: u8) -> Self::Variable;

    fn parent_id(&self, var: &Self::Variable) -> NodeId;

    /// Does `var` name `me` as parent, publish no parent at all, or (EA
    /// only) an undefined energy tier that must be treated as a child to
    /// stay safe (§4.2 "recompute (non-root)")?
    fn counts_as_child(&self, var: &Self::Variable, me: NodeId) -> bool;

    /// Whether `old` and `new` differ enough to count as PVN "activity"
    /// (§4.2): by `parent_id`/`children_count` only, ignoring the volatile
    /// distance (and EA energy) fields a neighbor republishes every round
    /// regardless of whether its own topology changed. Matches `pvnCmp`.
    fn topology_changed(old: &Self::Variable, new: &Self::Variable) -> bool;

    /// Scan non-child neighbors and choose a best-parent candidate
    /// (§4.2's ordering rule, applied per energy tier for the EA variant).
    fn recompute<'a>(
        &self,
        candidates: impl Iterator<Item = (NodeId, &'a Self::Variable)>,
    ) -> RecomputeOutcome
    where
        Self::Variable: 'a;
}

/// Per-node MLST state: the published variable, the chosen parent, and the
/// convergence-acceleration counters (§4.2).
pub struct Mlst<V: MlstVariant> {
    id: NodeId,
    role: NodeRole,
    variant: V,
    own_variable: V::Variable,
    parent: NodeId,
    children_count: u8,
    stay_active_for_next_n_periods: u8,
    divisor: u8,
}

impl<V: MlstVariant> Mlst<V> {
    pub fn new(id: NodeId, role: NodeRole, variant: V) -> Self {
        let own_variable = match role {
            NodeRole::Root => variant.root_variable(),
            NodeRole::Member => variant.undefined_variable(0),
        };
        Mlst {
            id,
            role,
            variant,
            own_variable,
            parent: NodeId::UNDEFINED,
            children_count: 0,
            stay_active_for_next_n_periods: 0,
            divisor: 1,
        }
    }

    pub fn own_variable(&self) -> &V::Variable {
        &self.own_variable
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    pub fn children_count(&self) -> u8 {
        self.children_count
    }

    pub fn is_root(&self) -> bool {
        matches!(self.role, NodeRole::Root)
    }

    /// `mlst_is_undefined()` (§6): true iff this is a non-root node with no
    /// chosen parent.
    pub fn is_undefined(&self) -> bool {
        !self.is_root() && self.parent.is_undefined()
    }

    /// A node is a leaf iff it is defined and has no children (§4.2 "Leaf
    /// definition").
    pub fn is_leaf(&self) -> bool {
        !self.is_undefined() && !self.is_root() && self.children_count == 0
    }

    pub fn stay_active_for_next_n_periods(&self) -> u8 {
        self.stay_active_for_next_n_periods
    }

    pub fn period_divisor(&self) -> u8 {
        self.divisor
    }

    /// §4.2 "On any PVN on_new/on_change/on_delete, set
    /// stay_active_for_next_n_periods = 3."
    pub fn mark_pvn_activity(&mut self, config: &MeshConfig) {
        self.stay_active_for_next_n_periods = config.if_change_stay_active_for_n_periods;
    }

    /// §4.2 "On on_delete of the current parent's entry, reset MLST state
    /// to undefined." §3 "Parent pointer ... valid only while the
    /// corresponding PVN entry is alive."
    pub fn on_parent_entry_deleted(&mut self, deleted_id: NodeId, config: &MeshConfig) {
        if !self.is_root() && deleted_id == self.parent {
            self.parent = NodeId::UNDEFINED;
            self.own_variable = self.variant.undefined_variable(self.children_count);
            self.mark_pvn_activity(config);
        }
    }

    /// §8's "decrement the stay active counter and the period divisor
    /// toward their floors" (step 8 of the round).
    pub fn decay_counters(&mut self) {
        self.stay_active_for_next_n_periods = self.stay_active_for_next_n_periods.saturating_sub(1);
        if self.divisor > 1 {
            self.divisor -= 1;
        }
    }

    /// Recompute this node's parent and published variable from a fresh
    /// PVN snapshot (§4.2 "recompute"). The root branch is unconditional
    /// (§4.2 "Root special case").
    pub fn recompute(
        &mut self,
        neighbors: impl Iterator<Item = (NodeId, V::Variable)>,
        rng: &mut dyn RandomSource,
        config: &MeshConfig,
    ) {
        if self.is_root() {
            self.own_variable = self.variant.root_variable();
            self.parent = NodeId::UNDEFINED;
            self.children_count = 0;
            return;
        }

        let neighbors: Vec<(NodeId, V::Variable)> = neighbors.collect();
        let children_count = neighbors
            .iter()
            .filter(|(_, var)| self.variant.counts_as_child(var, self.id))
            .count()
            .min(u8::MAX as usize) as u8;

        let candidates = neighbors
            .iter()
            .filter(|(_, var)| !self.variant.counts_as_child(var, self.id))
            .map(|(id, var)| (*id, var));
        let outcome = self.variant.recompute(candidates);

        let deferred = outcome.parent.is_some()
            && outcome.tie_count > 1
            && uniform(rng, 0.0, 1.0) < 0.5;

        let new_variable = match outcome.parent {
            Some(parent_id) if !deferred => {
                self.variant.build_variable(parent_id, outcome.distances, children_count)
            }
            _ => self.variant.undefined_variable(children_count),
        };

        let changed = new_variable != self.own_variable;
        self.parent = self.variant.parent_id(&new_variable);
        self.children_count = children_count;
        self.own_variable = new_variable;

        if changed {
            self.stay_active_for_next_n_periods = config.if_change_stay_active_for_n_periods;
            self.divisor = config.if_change_stay_active_for_n_periods;
        }
    }
}

impl Mlst<EnergyAwareVariant> {
    /// EA-only: change this node's energy tier at runtime
    /// (`eamlst_set_energy_state`, §6's public API surface).
    pub fn set_energy_state(&mut self, state: crate::pvn::EnergyState) {
        self.variant.set_energy_state(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvn::PlainVariable;

    struct FixedRng(u32);
    impl RandomSource for FixedRng {
        fn next_u32(&mut self) -> u32 {
            self.0
        }
    }

    fn root_var() -> PlainVariable {
        PlainVariable::root()
    }

    /// Scenario 1: a lone neighbor publishing root's variable is adopted
    /// as parent at distance 1.
    #[test]
    fn two_node_tree_elects_root_as_parent() {
        let mut mlst = Mlst::new(NodeId(2), NodeRole::Member, PlainVariant);
        let mut rng = FixedRng(0);
        let config = MeshConfig::default();
        mlst.recompute(std::iter::once((NodeId(1), root_var())), &mut rng, &config);
        assert_eq!(mlst.parent(), NodeId(1));
        assert_eq!(mlst.own_variable().distance_to_root, 1);
        assert!(mlst.is_leaf());
    }

    /// Scenario 3: D sees B(2) and C(3), both publishing distance 1 with
    /// zero children. A non-deferring coin flip must settle on the lowest
    /// id.
    #[test]
    fn tie_break_prefers_lowest_id_when_not_deferred() {
        let mut mlst = Mlst::new(NodeId(4), NodeRole::Member, PlainVariant);
        let neighbors = vec![
            (
                NodeId(3),
                PlainVariable {
                    distance_to_root: 1,
                    parent_id: NodeId(1),
                    children_count: 0,
                },
            ),
            (
                NodeId(2),
                PlainVariable {
                    distance_to_root: 1,
                    parent_id: NodeId(1),
                    children_count: 0,
                },
            ),
        ];
        // next_u32 / u32::MAX >= 0.5 so the tie is committed, not deferred.
        let mut rng = FixedRng(u32::MAX);
        let config = MeshConfig::default();
        mlst.recompute(neighbors.into_iter(), &mut rng, &config);
        assert_eq!(mlst.parent(), NodeId(2));
    }

    #[test]
    fn tie_defers_when_coin_flip_is_low() {
        let mut mlst = Mlst::new(NodeId(4), NodeRole::Member, PlainVariant);
        let neighbors = vec![
            (
                NodeId(3),
                PlainVariable {
                    distance_to_root: 1,
                    parent_id: NodeId(1),
                    children_count: 0,
                },
            ),
            (
                NodeId(2),
                PlainVariable {
                    distance_to_root: 1,
                    parent_id: NodeId(1),
                    children_count: 0,
                },
            ),
        ];
        let mut rng = FixedRng(0);
        let config = MeshConfig::default();
        mlst.recompute(neighbors.into_iter(), &mut rng, &config);
        assert!(mlst.is_undefined());
    }

    #[test]
    fn deleting_parent_entry_resets_to_undefined() {
        let mut mlst = Mlst::new(NodeId(2), NodeRole::Member, PlainVariant);
        let mut rng = FixedRng(0);
        let config = MeshConfig::default();
        mlst.recompute(std::iter::once((NodeId(1), root_var())), &mut rng, &config);
        assert!(!mlst.is_undefined());
        mlst.on_parent_entry_deleted(NodeId(1), &config);
        assert!(mlst.is_undefined());
        assert_eq!(mlst.stay_active_for_next_n_periods(), config.if_change_stay_active_for_n_periods);
    }

    #[test]
    fn root_always_publishes_root_variable() {
        let mut mlst = Mlst::new(NodeId(1), NodeRole::Root, PlainVariant);
        let mut rng = FixedRng(0);
        let config = MeshConfig::default();
        mlst.recompute(std::iter::empty(), &mut rng, &config);
        assert_eq!(mlst.own_variable(), &PlainVariable::root());
        assert!(!mlst.is_undefined());
        assert!(!mlst.is_leaf());
    }
}
