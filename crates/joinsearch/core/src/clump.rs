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

//! Grouping-tree driven clump merging
//!
//! A heuristic alternative to the DP search. A binary grouping tree names
//! which relations should be joined together. Walking it bottom-up, two
//! single clumps are joined when the join is desirable, and otherwise left
//! side by side. Whatever clumps remain are then force-merged, largest first,
//! in any order the planner accepts.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{JoinSearchError, JoinSearchResult};
use crate::planner::{JoinPlanner, Relation};
use crate::relids::{RelMask, cardinality};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupingTree {
    Leaf(usize),
    Node(Box<GroupingTree>, Box<GroupingTree>),
}

impl GroupingTree {
    pub fn leaf(index: usize) -> Self {
        GroupingTree::Leaf(index)
    }

    pub fn node(left: GroupingTree, right: GroupingTree) -> Self {
        GroupingTree::Node(Box::new(left), Box::new(right))
    }

    /// Left-deep tree joining the relations in the given order
    pub fn left_deep(order: &[usize]) -> Option<Self> {
        let (&first, rest) = order.split_first()?;
        Some(rest.iter().fold(Self::leaf(first), |tree, &i| Self::node(tree, Self::leaf(i))))
    }

    /// Relations named by the leaves, `None` when a leaf is past the widest mask
    pub fn relids(&self) -> Option<RelMask> {
        match self {
            GroupingTree::Leaf(index) => u32::try_from(*index).ok().and_then(|index| (1 as RelMask).checked_shl(index)),
            GroupingTree::Node(left, right) => Some(left.relids()? | right.relids()?),
        }
    }

    pub fn relation_count(&self) -> Option<usize> {
        self.relids().map(cardinality)
    }

    fn max_leaf(&self) -> usize {
        match self {
            GroupingTree::Leaf(index) => *index,
            GroupingTree::Node(left, right) => left.max_leaf().max(right.max_leaf()),
        }
    }
}

/// Joins the inputs following the grouping tree, `None` when no single relation results
pub fn construct_rel_based_on_plan<P: JoinPlanner>(
    planner: &mut P,
    levels_needed: usize,
    initial_rels: &[Arc<Relation>],
    tree: &GroupingTree,
) -> JoinSearchResult<Option<Arc<Relation>>> {
    if tree.max_leaf() >= initial_rels.len() {
        return Err(JoinSearchError::InvalidConfiguration(format!(
            "grouping tree names relation {} but only {} relations are given",
            tree.max_leaf(),
            initial_rels.len()
        )));
    }

    let mut clumps = try_merge_clump(planner, levels_needed, initial_rels, tree);
    if clumps.len() > 1 {
        tracing::trace!(clumps = clumps.len(), "Force-merging remaining clumps");
        let mut merged = Vec::with_capacity(clumps.len());
        for rel in clumps {
            merged = force_merge_clump(planner, levels_needed, merged, rel);
        }
        clumps = merged;
    }

    match clumps.as_slice() {
        [single] => Ok(Some(single.clone())),
        _ => Ok(None),
    }
}

/// Resolves a subtree to one joined clump, or to the unjoined clumps of both sides
pub fn try_merge_clump<P: JoinPlanner>(
    planner: &mut P,
    levels_needed: usize,
    initial_rels: &[Arc<Relation>],
    tree: &GroupingTree,
) -> Vec<Arc<Relation>> {
    match tree {
        GroupingTree::Leaf(index) => initial_rels.get(*index).cloned().into_iter().collect(),
        GroupingTree::Node(left, right) => {
            let mut outer = try_merge_clump(planner, levels_needed, initial_rels, left);
            let inner = try_merge_clump(planner, levels_needed, initial_rels, right);

            if let ([a], [b]) = (outer.as_slice(), inner.as_slice())
                && desirable_join(planner, a, b)
                && let Some(joined) = build_join(planner, levels_needed, a, b)
            {
                return vec![joined];
            }
            outer.extend(inner);
            outer
        }
    }
}

/// Merges `rel` into the first clump it joins with, repeatedly, then files it by size
///
/// The list stays sorted by descending relation count. Single relations go
/// to the end.
pub fn force_merge_clump<P: JoinPlanner>(
    planner: &mut P,
    levels_needed: usize,
    mut clumps: Vec<Arc<Relation>>,
    rel: Arc<Relation>,
) -> Vec<Arc<Relation>> {
    let mut rel = rel;
    'merge: loop {
        for i in 0..clumps.len() {
            if let Some(joined) = build_join(planner, levels_needed, &clumps[i], &rel) {
                clumps.remove(i);
                rel = joined;
                continue 'merge;
            }
        }
        break;
    }

    let size = rel.relation_count();
    if clumps.is_empty() || size == 1 {
        clumps.push(rel);
        return clumps;
    }
    let position = clumps.iter().position(|c| c.relation_count() < size).unwrap_or(clumps.len());
    clumps.insert(position, rel);
    clumps
}

/// A join clause links the two relations, or an ordering restriction forces the join
pub fn desirable_join<P: JoinPlanner>(planner: &P, outer: &Relation, inner: &Relation) -> bool {
    planner.have_relevant_joinclause(outer, inner) || planner.have_join_order_restriction(outer, inner)
}

/// Total cost of the tree's plan, evaluated on a scratch copy of the planner
///
/// Returns `f64::MAX` when the tree does not produce a single relation. The
/// planner passed in is not modified.
pub fn clump_eval<P: JoinPlanner>(planner: &P, levels_needed: usize, initial_rels: &[Arc<Relation>], tree: &GroupingTree) -> f64 {
    let mut scratch = planner.clone();
    match construct_rel_based_on_plan(&mut scratch, levels_needed, initial_rels, tree) {
        Ok(Some(rel)) => rel.cheapest_total_cost().unwrap_or(f64::MAX),
        Ok(None) => f64::MAX,
        Err(err) => {
            tracing::warn!(error = %err, "Grouping tree could not be evaluated");
            f64::MAX
        }
    }
}

fn build_join<P: JoinPlanner>(planner: &mut P, levels_needed: usize, outer: &Arc<Relation>, inner: &Arc<Relation>) -> Option<Arc<Relation>> {
    let mut rel = planner.make_join_rel(outer, inner)?;
    planner.generate_partitionwise_join_paths(&mut rel);
    if rel.relation_count() < levels_needed {
        planner.generate_gather_paths(&mut rel, false);
    }
    planner.set_cheapest(&mut rel);
    rel.cheapest_total_path.as_ref()?;

    let rel = Arc::new(rel);
    planner.record_join_rel(rel.clone());
    Some(rel)
}
