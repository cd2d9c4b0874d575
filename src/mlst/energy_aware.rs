//! The energy-aware MLST variant: three parallel distance tiers with a
//! tier-admission policy (§4.2 "Parent selection ordering (energy-aware
//! variant)", §9 "Three compile-time MLST variants ... a single algorithm
//! parameterized by an energy-tier policy").

use crate::mlst::{MlstVariant, RecomputeOutcome};
use crate::node_id::NodeId;
use crate::pvn::{EnergyAwareVariable, EnergyState};

#[derive(Clone, Copy)]
enum Tier {
    High,
    Middle,
    Low,
}

impl Tier {
    const ALL: [Tier; 3] = [Tier::High, Tier::Middle, Tier::Low];

    /// Does a neighbor at `state` admit routing through it at this tier
    /// ("high: state==1; middle: state∈{1,2}; low: any state")?
    fn admits(self, state: EnergyState) -> bool {
        match self {
            Tier::High => state == EnergyState::High,
            Tier::Middle => state == EnergyState::High || state == EnergyState::Middle,
            Tier::Low => true,
        }
    }

    fn distance(self, var: &EnergyAwareVariable) -> u8 {
        match self {
            Tier::High => var.distance_high,
            Tier::Middle => var.distance_middle,
            Tier::Low => var.distance_low,
        }
    }

    fn slot(self) -> usize {
        match self {
            Tier::High => 0,
            Tier::Middle => 1,
            Tier::Low => 2,
        }
    }
}

/// This node's own energy tier, used both to publish `energy_state` and to
/// decide which tiers it is itself eligible to serve as a relay for.
pub struct EnergyAwareVariant {
    pub energy_state: EnergyState,
}

impl EnergyAwareVariant {
    pub fn new(energy_state: EnergyState) -> Self {
        EnergyAwareVariant { energy_state }
    }

    /// `eamlst_set_energy_state`: change this node's energy tier. Takes
    /// effect on the next recompute/broadcast.
    pub fn set_energy_state(&mut self, state: EnergyState) {
        self.energy_state = state;
    }
}

impl MlstVariant for EnergyAwareVariant {
    type Variable = EnergyAwareVariable;

    fn root_variable(&self) -> EnergyAwareVariable {
        EnergyAwareVariable::root()
    }

    fn undefined_variable(&self, children_count: u8) -> EnergyAwareVariable {
        EnergyAwareVariable::undefined(children_count, self.energy_state)
    }

    fn build_variable(
        &self,
        parent: NodeId,
        distances: [u8; 3],
        children_count: u8,
    ) -> EnergyAwareVariable {
        EnergyAwareVariable {
            distance_high: distances[0],
            distance_middle: distances[1],
            distance_low: distances[2],
            parent_id: parent,
            children_count,
            energy_state: self.energy_state,
        }
    }

    fn parent_id(&self, var: &EnergyAwareVariable) -> NodeId {
        var.parent_id
    }

    fn counts_as_child(&self, var: &EnergyAwareVariable, me: NodeId) -> bool {
        var.parent_id.is_undefined()
            || var.parent_id == me
            || var.energy_state == EnergyState::Undefined
    }

    fn topology_changed(old: &EnergyAwareVariable, new: &EnergyAwareVariable) -> bool {
        old.parent_id != new.parent_id || old.children_count != new.children_count
    }

    fn recompute<'a>(
        &self,
        candidates: impl Iterator<Item = (NodeId, &'a EnergyAwareVariable)>,
    ) -> RecomputeOutcome
    where
        EnergyAwareVariable: 'a,
    {
        let candidates: Vec<(NodeId, &EnergyAwareVariable)> = candidates.collect();
        let mut distances = [EnergyAwareVariable::UNKNOWN_DISTANCE; 3];
        let mut chosen: Option<(NodeId, usize)> = None;
        let mut tie_count = 0usize;

        for tier in Tier::ALL {
            let mut best: Option<(NodeId, u8, u8)> = None;
            let mut tier_tie_count = 0usize;
            for (id, var) in &candidates {
                if !tier.admits(var.energy_state) {
                    continue;
                }
                let raw = tier.distance(var);
                if raw == EnergyAwareVariable::UNKNOWN_DISTANCE {
                    continue;
                }
                let distance = raw.saturating_add(1);
                let key = (distance, u8::MAX - var.children_count, id.0);
                match best {
                    None => {
                        best = Some((*id, distance, var.children_count));
                        tier_tie_count = 1;
                    }
                    Some((best_id, best_distance, best_children)) => {
                        let best_key = (best_distance, u8::MAX - best_children, best_id.0);
                        if key < best_key {
                            best = Some((*id, distance, var.children_count));
                            tier_tie_count = 1;
                        } else if key == best_key {
                            tier_tie_count += 1;
                        }
                    }
                }
            }
            if let Some((id, distance, _children)) = best {
                distances[tier.slot()] = distance;
                if chosen.is_none() {
                    chosen = Some((id, tier.slot()));
                    tie_count = tier_tie_count;
                }
            }
        }

        match chosen {
            Some((id, _slot)) => RecomputeOutcome {
                parent: Some(id),
                distances,
                tie_count,
            },
            None => RecomputeOutcome {
                parent: None,
                distances: [EnergyAwareVariable::UNKNOWN_DISTANCE; 3],
                tie_count: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(parent: u16, high: u8, middle: u8, low: u8, children: u8, state: EnergyState) -> EnergyAwareVariable {
        EnergyAwareVariable {
            distance_high: high,
            distance_middle: middle,
            distance_low: low,
            parent_id: NodeId(parent),
            children_count: children,
            energy_state: state,
        }
    }

    /// A high-energy route must win over an equally-short low-tier-only one.
    #[test]
    fn high_tier_preferred_over_low() {
        let variant = EnergyAwareVariant::new(EnergyState::High);
        let high_neighbor = var(1, 0, 0, 0, 0, EnergyState::High);
        let low_only = var(1, 0xFF, 0xFF, 0, 0, EnergyState::Low);
        let candidates = [(NodeId(10), &high_neighbor), (NodeId(11), &low_only)];
        let outcome = variant.recompute(candidates.into_iter());
        assert_eq!(outcome.parent, Some(NodeId(10)));
        assert_eq!(outcome.distances[0], 1);
    }

    #[test]
    fn falls_back_to_low_tier_when_no_high_or_middle_candidate() {
        let variant = EnergyAwareVariant::new(EnergyState::Low);
        let low_only = var(1, 0xFF, 0xFF, 0, 0, EnergyState::Low);
        let candidates = [(NodeId(10), &low_only)];
        let outcome = variant.recompute(candidates.into_iter());
        assert_eq!(outcome.parent, Some(NodeId(10)));
        assert_eq!(outcome.distances[2], 1);
        assert_eq!(outcome.distances[0], EnergyAwareVariable::UNKNOWN_DISTANCE);
    }

    #[test]
    fn undefined_energy_neighbor_counts_as_child() {
        let variant = EnergyAwareVariant::new(EnergyState::High);
        let undefined = var(0, 0xFF, 0xFF, 0xFF, 0, EnergyState::Undefined);
        assert!(variant.counts_as_child(&undefined, NodeId(2)));
    }
}
