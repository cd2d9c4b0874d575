//! The plain MLST variant: a single distance-to-root metric (§4.2 "Parent
//! selection ordering (plain variant)").

use crate::mlst::{MlstVariant, RecomputeOutcome};
use crate::node_id::NodeId;
use crate::pvn::PlainVariable;

/// Zero-sized: the plain variant carries no per-node state beyond what
/// [`crate::mlst::Mlst`] already tracks.
pub struct PlainVariant;

impl MlstVariant for PlainVariant {
    type Variable = PlainVariable;

    fn root_variable(&self) -> PlainVariable {
        PlainVariable::root()
    }

    fn undefined_variable(&self, children_count: u8) -> PlainVariable {
        PlainVariable::undefined(children_count)
    }

    fn build_variable(&self, parent: NodeId, distances: [u8; 3], children_count: u8) -> PlainVariable {
        PlainVariable {
            distance_to_root: distances[0],
            parent_id: parent,
            children_count,
        }
    }

    fn parent_id(&self, var: &PlainVariable) -> NodeId {
        var.parent_id
    }

    fn counts_as_child(&self, var: &PlainVariable, me: NodeId) -> bool {
        var.parent_id.is_undefined() || var.parent_id == me
    }

    fn topology_changed(old: &PlainVariable, new: &PlainVariable) -> bool {
        old.parent_id != new.parent_id || old.children_count != new.children_count
    }

    fn recompute<'a>(
        &self,
        candidates: impl Iterator<Item = (NodeId, &'a PlainVariable)>,
    ) -> RecomputeOutcome
    where
        PlainVariable: 'a,
    {
        let mut best: Option<(NodeId, u8, u8)> = None;
        let mut tie_count = 0usize;

        for (id, var) in candidates {
            if var.distance_to_root == PlainVariable::UNKNOWN_DISTANCE {
                continue;
            }
            let distance = var.distance_to_root.saturating_add(1);
            let key = (distance, u8::MAX - var.children_count, id.0);
            match best {
                None => {
                    best = Some((id, distance, var.children_count));
                    tie_count = 1;
                }
                Some((best_id, best_distance, best_children)) => {
                    let best_key = (best_distance, u8::MAX - best_children, best_id.0);
                    if key < best_key {
                        best = Some((id, distance, var.children_count));
                        tie_count = 1;
                    } else if key == best_key {
                        tie_count += 1;
                    }
                }
            }
        }

        match best {
            Some((id, distance, _children)) => RecomputeOutcome {
                parent: Some(id),
                distances: [distance, PlainVariable::UNKNOWN_DISTANCE, PlainVariable::UNKNOWN_DISTANCE],
                tie_count,
            },
            None => RecomputeOutcome {
                parent: None,
                distances: [PlainVariable::UNKNOWN_DISTANCE; 3],
                tie_count: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(parent: u16, dist: u8, children: u8) -> PlainVariable {
        PlainVariable {
            distance_to_root: dist,
            parent_id: NodeId(parent),
            children_count: children,
        }
    }

    #[test]
    fn prefers_shorter_distance() {
        let variant = PlainVariant;
        let a = var(1, 1, 0);
        let b = var(1, 2, 0);
        let candidates = [(NodeId(10), &a), (NodeId(11), &b)];
        let outcome = variant.recompute(candidates.into_iter());
        assert_eq!(outcome.parent, Some(NodeId(10)));
        assert_eq!(outcome.distances[0], 2);
    }

    #[test]
    fn ties_on_distance_prefer_higher_children_count() {
        let variant = PlainVariant;
        let a = var(1, 1, 0);
        let b = var(1, 1, 3);
        let candidates = [(NodeId(10), &a), (NodeId(11), &b)];
        let outcome = variant.recompute(candidates.into_iter());
        assert_eq!(outcome.parent, Some(NodeId(11)));
        assert_eq!(outcome.tie_count, 1);
    }

    #[test]
    fn full_ties_are_reported() {
        let variant = PlainVariant;
        let a = var(1, 1, 0);
        let b = var(1, 1, 0);
        let candidates = [(NodeId(10), &a), (NodeId(11), &b)];
        let outcome = variant.recompute(candidates.into_iter());
        assert_eq!(outcome.tie_count, 2);
    }

    #[test]
    fn unknown_distance_candidates_are_skipped() {
        let variant = PlainVariant;
        let undefined = PlainVariable::undefined(0);
        let candidates = [(NodeId(10), &undefined)];
        let outcome = variant.recompute(candidates.into_iter());
        assert_eq!(outcome.parent, None);
    }
}
