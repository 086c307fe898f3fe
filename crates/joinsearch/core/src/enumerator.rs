// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Bitmask dynamic programming over admissible join results
//!
//! A [`JoinEnumerator`] belongs to one worker. It seeds the singleton slots
//! of its [`DpTable`] with the input relations, then walks the worker's
//! admissible label-sets from smallest to largest. Each set is split into an
//! outer and an inner part whose best relations are already in the table, and
//! the planner is asked to join them. The cheapest result per set wins.
//!
//! Smaller sets must be resolved before larger ones. Feeding the sets in any
//! other order leaves operands missing and the full set unreachable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::TreeShape;
use crate::error::{JoinSearchError, JoinSearchResult};
use crate::partition::{ConstraintPartitioner, OrderingConstraint};
use crate::planner::{JoinPlanner, Relation};
use crate::relids::{LabelSet, RelMask, cardinality, full_mask, mask_of, singleton};
use crate::set_algebra::{cartesian_product, sort_by_cardinality};

/// Best known relation per set of base relations
///
/// Only reachable sets get a slot, so memory follows the admissible results
/// rather than `2^N`.
#[derive(Debug, Clone, Default)]
pub struct DpTable {
    slots: HashMap<RelMask, Arc<Relation>>,
}

impl DpTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts input relation `i` into slot `1 << i`
    pub fn seed(&mut self, initial_rels: &[Arc<Relation>]) {
        for (i, rel) in initial_rels.iter().enumerate() {
            self.slots.insert(singleton(i), rel.clone());
        }
    }

    pub fn get(&self, mask: RelMask) -> Option<&Arc<Relation>> {
        self.slots.get(&mask)
    }

    /// Stores the candidate if the slot is empty or holds a strictly more expensive relation
    ///
    /// Singleton slots belong to the inputs and are never replaced. A
    /// candidate without a cheapest path, or whose cost is NaN, is refused.
    pub fn offer(&mut self, mask: RelMask, candidate: Arc<Relation>) -> bool {
        if cardinality(mask) <= 1 {
            return false;
        }
        let Some(cost) = candidate.cheapest_total_cost().filter(|cost| !cost.is_nan()) else {
            return false;
        };

        if let Some(current) = self.slots.get(&mask)
            && current.cheapest_total_cost().is_some_and(|current| current <= cost)
        {
            return false;
        }
        self.slots.insert(mask, candidate);
        true
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationState {
    Empty,
    Seeded,
    Enumerating,
    Complete,
}

/// Counters for one enumeration run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerationStats {
    pub sets_processed: usize,
    pub splits_tried: usize,
    /// Splits whose outer or inner slot was still empty
    pub splits_skipped: usize,
    pub joins_rejected: usize,
    pub improvements: usize,
}

pub struct JoinEnumerator<'p, P: JoinPlanner> {
    planner: &'p mut P,
    levels_needed: usize,
    shape: TreeShape,
    constraints: Vec<OrderingConstraint>,
    table: DpTable,
    state: EnumerationState,
    stats: EnumerationStats,
    worker: Option<usize>,
}

impl<'p, P: JoinPlanner> JoinEnumerator<'p, P> {
    pub fn new(planner: &'p mut P, levels_needed: usize, shape: TreeShape, constraints: Vec<OrderingConstraint>) -> Self {
        Self {
            planner,
            levels_needed,
            shape,
            constraints,
            table: DpTable::new(),
            state: EnumerationState::Empty,
            stats: EnumerationStats::default(),
            worker: None,
        }
    }

    pub fn for_partition(planner: &'p mut P, levels_needed: usize, partitioner: &ConstraintPartitioner) -> Self {
        Self::new(planner, levels_needed, partitioner.shape, partitioner.constraints.clone()).with_worker(partitioner.part_id)
    }

    pub fn with_worker(mut self, worker: usize) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn state(&self) -> EnumerationState {
        self.state
    }

    pub fn stats(&self) -> &EnumerationStats {
        &self.stats
    }

    pub fn table(&self) -> &DpTable {
        &self.table
    }

    pub fn seed(&mut self, initial_rels: &[Arc<Relation>]) -> JoinSearchResult<()> {
        if initial_rels.len() != self.levels_needed {
            return Err(JoinSearchError::RelationCountMismatch {
                expected: self.levels_needed,
                actual: initial_rels.len(),
            });
        }
        self.table.seed(initial_rels);
        self.state = EnumerationState::Seeded;
        Ok(())
    }

    /// Sorts the admissible sets by ascending size and processes them
    pub fn run(&mut self, mut admissible: Vec<LabelSet>) {
        sort_by_cardinality(&mut admissible);
        self.process(&admissible);
    }

    /// Processes label-sets in exactly the given order
    pub fn process(&mut self, label_sets: &[LabelSet]) {
        self.state = EnumerationState::Enumerating;
        for sub_rels in label_sets {
            if sub_rels.len() < 2 {
                continue;
            }
            self.stats.sets_processed += 1;
            match self.shape {
                TreeShape::LeftDeep => self.try_split(sub_rels),
                TreeShape::Bushy => self.try_split_bushy(sub_rels),
            }
        }
    }

    /// Left-deep splits: everything but one relation on the outer side, that relation as the inner
    ///
    /// For a constraint `(q1, q2)` with both relations present, `q1` may not
    /// be the inner relation.
    pub fn try_split(&mut self, sub_rels: &[usize]) {
        let mask = mask_of(sub_rels);
        let pinned = self
            .constraints
            .iter()
            .filter(|c| mask & singleton(c.first) != 0 && mask & singleton(c.second) != 0)
            .fold(0, |pinned, c| pinned | singleton(c.first));

        for &u in sub_rels {
            let inner = singleton(u);
            if pinned & inner != 0 {
                continue;
            }
            self.consider_split(mask, mask & !inner, inner);
        }
    }

    /// Bushy splits: the outer side is any combination of per-group candidates
    ///
    /// Group `i` is the worker's `i`-th constraint triple, or the implicit
    /// triple `(3i, 3i+1, 3i+2)` past the end of the constraint list.
    pub fn try_split_bushy(&mut self, sub_rels: &[usize]) {
        let mask = mask_of(sub_rels);

        let mut combined: Vec<LabelSet> = Vec::new();
        let mut i = 0;
        while 3 * i + 2 < self.levels_needed {
            let group = match self.constraints.get(i) {
                Some(c) => split_candidates(mask, c.first, c.second, c.third.unwrap_or(3 * i + 2), false),
                None => split_candidates(mask, 3 * i, 3 * i + 1, 3 * i + 2, true),
            };
            combined = cartesian_product(&combined, &group);
            i += 1;
        }

        for outer in &combined {
            let outer = mask_of(outer);
            if outer == 0 || outer == mask {
                continue;
            }
            self.consider_split(mask, outer, mask & !outer);
        }
    }

    fn consider_split(&mut self, mask: RelMask, outer_mask: RelMask, inner_mask: RelMask) {
        self.stats.splits_tried += 1;

        let (Some(outer), Some(inner)) = (self.table.get(outer_mask).cloned(), self.table.get(inner_mask).cloned()) else {
            self.stats.splits_skipped += 1;
            tracing::trace!(mask, outer = outer_mask, inner = inner_mask, "Operand not yet resolved");
            return;
        };

        let Some(mut rel) = self.planner.make_join_rel(&outer, &inner) else {
            self.stats.joins_rejected += 1;
            tracing::trace!(mask, outer = outer_mask, inner = inner_mask, "Planner rejected join");
            return;
        };

        self.planner.generate_partitionwise_join_paths(&mut rel);
        if cardinality(mask) != self.levels_needed {
            self.planner.generate_gather_paths(&mut rel, false);
        }
        self.planner.set_cheapest(&mut rel);
        if rel.cheapest_total_path.is_none() {
            self.stats.joins_rejected += 1;
            return;
        }

        let rel = Arc::new(rel);
        self.planner.record_join_rel(rel.clone());
        if self.table.offer(mask, rel) {
            self.stats.improvements += 1;
            tracing::trace!(mask, outer = outer_mask, inner = inner_mask, "Improved join");
        }
    }

    /// Best relation for the full set of inputs
    pub fn finish(&mut self) -> JoinSearchResult<Arc<Relation>> {
        self.state = EnumerationState::Complete;
        tracing::debug!(
            worker = ?self.worker,
            sets = self.stats.sets_processed,
            splits = self.stats.splits_tried,
            skipped = self.stats.splits_skipped,
            rejected = self.stats.joins_rejected,
            improvements = self.stats.improvements,
            slots = self.table.len(),
            "Enumeration finished"
        );

        self.table
            .get(full_mask(self.levels_needed))
            .cloned()
            .ok_or(JoinSearchError::UnreachableJoin {
                relations: self.levels_needed,
                worker: self.worker,
            })
    }
}

/// Outer-side candidates of one triple, restricted to the relations present in `mask`
///
/// `{q2, q3}` is only a candidate for implicit triples.
fn split_candidates(mask: RelMask, q1: usize, q2: usize, q3: usize, implicit: bool) -> Vec<LabelSet> {
    let has = |q: usize| mask & singleton(q) != 0;
    match (has(q3), has(q2), has(q1)) {
        (true, true, true) => {
            let mut sets = vec![vec![q3], vec![q2]];
            if implicit {
                sets.push(vec![q2, q3]);
            }
            sets.extend([vec![q1], vec![q1, q2], vec![q1, q3], vec![q1, q2, q3]]);
            sets
        }
        (true, true, false) => {
            let mut sets = vec![vec![q3], vec![q2]];
            if implicit {
                sets.push(vec![q2, q3]);
            }
            sets
        }
        (true, false, true) => vec![vec![q3], vec![q1], vec![q1, q3]],
        (true, false, false) => vec![vec![q3]],
        (false, true, true) => vec![vec![q2], vec![q1], vec![q1, q2]],
        (false, true, false) => vec![vec![q2]],
        (false, false, true) => vec![vec![q1]],
        (false, false, false) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{admissible_join_results, admissible_join_results_bushy, part_constraints};
    use crate::planner::{CostEstimate, Path, PathKind};

    /// Costs every join at the number of relations on both sides
    #[derive(Clone, Default)]
    struct RecordingPlanner {
        joins: Vec<(RelMask, RelMask)>,
        gathers: Vec<RelMask>,
        reject_all: bool,
    }

    impl JoinPlanner for RecordingPlanner {
        fn make_join_rel(&mut self, outer: &Arc<Relation>, inner: &Arc<Relation>) -> Option<Relation> {
            if self.reject_all {
                return None;
            }
            self.joins.push((outer.relids, inner.relids));
            let cost = (outer.relation_count() + inner.relation_count()) as f64;
            let mut rel = Relation::new(outer.relids | inner.relids, "join", 1.0);
            let path = Path::join(
                PathKind::NestLoop,
                1.0,
                CostEstimate::flat(cost),
                outer.cheapest_total_path.clone()?,
                inner.cheapest_total_path.clone()?,
            );
            rel.add_path(path);
            Some(rel)
        }

        fn generate_gather_paths(&mut self, rel: &mut Relation, _override_rows: bool) {
            self.gathers.push(rel.relids);
        }
    }

    fn base_rels(count: usize) -> Vec<Arc<Relation>> {
        (0..count)
            .map(|i| {
                let mut rel = Relation::base(i, format!("r{i}"), 1.0);
                rel.add_path(Path::scan(i, 1.0, CostEstimate::flat(1.0)));
                rel.set_cheapest();
                Arc::new(rel)
            })
            .collect()
    }

    fn flat_rel(relids: RelMask, cost: f64) -> Arc<Relation> {
        let mut rel = Relation::new(relids, "candidate", 1.0);
        rel.add_path(Path::scan(0, 1.0, CostEstimate::flat(cost)));
        rel.set_cheapest();
        Arc::new(rel)
    }

    #[test]
    fn test_dp_table_offer_is_strict() {
        let mut table = DpTable::new();
        table.seed(&base_rels(2));
        assert_eq!(table.len(), 2);

        assert!(table.offer(0b11, flat_rel(0b11, 5.0)));
        // equal cost keeps the first writer
        let tie = flat_rel(0b11, 5.0);
        assert!(!table.offer(0b11, tie.clone()));
        assert!(!Arc::ptr_eq(table.get(0b11).unwrap(), &tie));
        assert!(!table.offer(0b11, flat_rel(0b11, 7.0)));
        assert!(table.offer(0b11, flat_rel(0b11, 3.0)));
        assert_eq!(table.get(0b11).and_then(|r| r.cheapest_total_cost()), Some(3.0));
    }

    #[test]
    fn test_dp_table_refuses_nan_cost() {
        let mut table = DpTable::new();
        table.seed(&base_rels(3));

        assert!(!table.offer(0b011, flat_rel(0b011, f64::NAN)));
        assert!(table.get(0b011).is_none());

        let incumbent = flat_rel(0b110, 1.0);
        assert!(table.offer(0b110, incumbent.clone()));
        assert!(!table.offer(0b110, flat_rel(0b110, f64::NAN)));
        assert!(Arc::ptr_eq(table.get(0b110).unwrap(), &incumbent));
        assert!(table.offer(0b110, flat_rel(0b110, 0.5)));
    }

    #[test]
    fn test_dp_table_singletons_are_fixed() {
        let mut table = DpTable::new();
        let rels = base_rels(2);
        table.seed(&rels);
        assert!(!table.offer(0b01, flat_rel(0b01, 0.0)));
        assert!(Arc::ptr_eq(table.get(0b01).unwrap(), &rels[0]));
    }

    #[test]
    fn test_seed_checks_relation_count() {
        let mut planner = RecordingPlanner::default();
        let mut enumerator = JoinEnumerator::new(&mut planner, 3, TreeShape::LeftDeep, Vec::new());
        assert_eq!(enumerator.state(), EnumerationState::Empty);
        let err = enumerator.seed(&base_rels(2)).unwrap_err();
        assert!(matches!(err, JoinSearchError::RelationCountMismatch { expected: 3, actual: 2 }));
        enumerator.seed(&base_rels(3)).unwrap();
        assert_eq!(enumerator.state(), EnumerationState::Seeded);
    }

    #[test]
    fn test_left_deep_four_relations() {
        let mut planner = RecordingPlanner::default();
        let mut enumerator = JoinEnumerator::new(&mut planner, 4, TreeShape::LeftDeep, Vec::new());
        enumerator.seed(&base_rels(4)).unwrap();
        enumerator.run(admissible_join_results(4, &[]));
        let best = enumerator.finish().unwrap();
        assert_eq!(enumerator.state(), EnumerationState::Complete);
        assert_eq!(best.relids, 0b1111);
        assert_eq!(best.cheapest_total_cost(), Some(4.0));
        assert!(best.cheapest_total_path.as_ref().is_some_and(|p| p.is_left_deep()));
    }

    #[test]
    fn test_constraint_pins_relation_to_outer_side() {
        let mut planner = RecordingPlanner::default();
        let constraints = part_constraints(0, 2);
        let admissible = admissible_join_results(4, &constraints);
        let mut enumerator = JoinEnumerator::new(&mut planner, 4, TreeShape::LeftDeep, constraints);
        enumerator.seed(&base_rels(4)).unwrap();
        enumerator.run(admissible);
        enumerator.finish().unwrap();

        // relation 0 is never the inner side once relation 1 is present
        for (outer, inner) in &planner.joins {
            assert!(!(*inner == 0b0001 && outer & 0b0010 != 0), "0 placed inner against {outer:#b}");
        }
    }

    #[test]
    fn test_full_join_skips_gather() {
        let mut planner = RecordingPlanner::default();
        let mut enumerator = JoinEnumerator::new(&mut planner, 2, TreeShape::LeftDeep, Vec::new());
        enumerator.seed(&base_rels(2)).unwrap();
        enumerator.run(admissible_join_results(2, &[]));
        enumerator.finish().unwrap();
        assert_eq!(planner.joins.len(), 2);
        assert!(planner.gathers.is_empty());

        let mut planner = RecordingPlanner::default();
        let mut enumerator = JoinEnumerator::new(&mut planner, 4, TreeShape::LeftDeep, Vec::new());
        enumerator.seed(&base_rels(4)).unwrap();
        enumerator.run(admissible_join_results(4, &[]));
        enumerator.finish().unwrap();
        assert!(!planner.gathers.is_empty());
        assert!(planner.gathers.iter().all(|&mask| mask != 0b1111));
    }

    #[test]
    fn test_descending_order_leaves_full_set_empty() {
        let mut admissible = admissible_join_results(4, &[]);
        sort_by_cardinality(&mut admissible);
        admissible.reverse();

        let mut planner = RecordingPlanner::default();
        let mut enumerator = JoinEnumerator::new(&mut planner, 4, TreeShape::LeftDeep, Vec::new());
        enumerator.seed(&base_rels(4)).unwrap();
        enumerator.process(&admissible);
        assert!(enumerator.table().get(0b1111).is_none());
        assert!(enumerator.stats().splits_skipped > 0);
        assert!(matches!(enumerator.finish(), Err(JoinSearchError::UnreachableJoin { relations: 4, .. })));
    }

    #[test]
    fn test_rejecting_planner_is_unreachable() {
        let mut planner = RecordingPlanner {
            reject_all: true,
            ..RecordingPlanner::default()
        };
        let mut enumerator = JoinEnumerator::new(&mut planner, 4, TreeShape::LeftDeep, Vec::new()).with_worker(3);
        enumerator.seed(&base_rels(4)).unwrap();
        enumerator.run(admissible_join_results(4, &[]));
        assert!(enumerator.stats().joins_rejected > 0);
        let err = enumerator.finish().unwrap_err();
        assert_eq!(err.to_string(), "Failed to build any 4-way join in worker 3");
    }

    #[test]
    fn test_bushy_three_relations() {
        let mut planner = RecordingPlanner::default();
        let mut enumerator = JoinEnumerator::new(&mut planner, 3, TreeShape::Bushy, Vec::new());
        enumerator.seed(&base_rels(3)).unwrap();
        enumerator.run(admissible_join_results_bushy(3, &[]));
        let best = enumerator.finish().unwrap();
        assert_eq!(best.relids, 0b111);
        assert_eq!(best.cheapest_total_cost(), Some(3.0));
    }

    #[test]
    fn test_bushy_six_relations_joins_two_triples() {
        let mut planner = RecordingPlanner::default();
        let mut enumerator = JoinEnumerator::new(&mut planner, 6, TreeShape::Bushy, Vec::new());
        enumerator.seed(&base_rels(6)).unwrap();
        enumerator.run(admissible_join_results_bushy(6, &[]));
        enumerator.finish().unwrap();
        assert!(planner.joins.contains(&(0b000_111, 0b111_000)));
    }

    #[test]
    fn test_split_candidates_table() {
        let all = 0b111;
        assert_eq!(
            split_candidates(all, 0, 1, 2, true),
            vec![vec![2], vec![1], vec![1, 2], vec![0], vec![0, 1], vec![0, 2], vec![0, 1, 2]]
        );
        assert_eq!(
            split_candidates(all, 0, 1, 2, false),
            vec![vec![2], vec![1], vec![0], vec![0, 1], vec![0, 2], vec![0, 1, 2]]
        );
        assert_eq!(split_candidates(0b110, 0, 1, 2, true), vec![vec![2], vec![1], vec![1, 2]]);
        assert_eq!(split_candidates(0b110, 0, 1, 2, false), vec![vec![2], vec![1]]);
        assert_eq!(split_candidates(0b101, 0, 1, 2, false), vec![vec![2], vec![0], vec![0, 2]]);
        assert_eq!(split_candidates(0b011, 0, 1, 2, false), vec![vec![1], vec![0], vec![0, 1]]);
        assert_eq!(split_candidates(0b001, 0, 1, 2, true), vec![vec![0]]);
        assert!(split_candidates(0, 0, 1, 2, true).is_empty());
    }
}
