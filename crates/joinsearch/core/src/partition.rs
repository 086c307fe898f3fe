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

//! Search-space partitioning
//!
//! Every worker receives a part id in `[0, workers)`. Bit `i` of the part id
//! orients the `i`-th group of relations: for left-deep plans the pair
//! `(2i, 2i+1)`, for bushy plans the triple `(3i, 3i+1, 3i+2)`. The workers
//! together see every orientation of every group exactly once, so the union
//! of their admissible join results covers the whole join-order space.
//!
//! For example with four workers and part id 2:
//!
//! - bit 0 = 0: relation 0 is joined before relation 1
//! - bit 1 = 1: relation 3 is joined before relation 2

use serde::{Deserialize, Serialize};

use crate::config::TreeShape;
use crate::relids::LabelSet;
use crate::set_algebra::{cartesian_product, constrained_power_set, constrained_power_set_bushy};

/// Join-order constraint between the relations of one group
///
/// For pairs, `first` must be part of any intermediate result that holds
/// `second`. For triples, `first` is joined with `third` before the result
/// meets `second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderingConstraint {
    pub first: usize,
    pub second: usize,
    pub third: Option<usize>,
}

impl OrderingConstraint {
    pub fn pair(first: usize, second: usize) -> Self {
        Self { first, second, third: None }
    }

    pub fn triple(first: usize, second: usize, third: usize) -> Self {
        Self { first, second, third: Some(third) }
    }

    /// Largest relation index the constraint mentions
    pub fn max_index(&self) -> usize {
        self.first.max(self.second).max(self.third.unwrap_or(0))
    }
}

/// Number of groups a worker count orients: one per bit `i` with `2^i < workers`
pub fn constrained_groups(workers: usize) -> usize {
    match workers.checked_next_power_of_two() {
        Some(rounded) => rounded.trailing_zeros() as usize,
        None => usize::BITS as usize,
    }
}

/// Left-deep constraints for the worker with the given part id
pub fn part_constraints(part_id: usize, workers: usize) -> Vec<OrderingConstraint> {
    (0..constrained_groups(workers))
        .map(|i| {
            if part_id & (1 << i) != 0 {
                OrderingConstraint::pair(2 * i + 1, 2 * i)
            } else {
                OrderingConstraint::pair(2 * i, 2 * i + 1)
            }
        })
        .collect()
}

/// Bushy constraints for the worker with the given part id
pub fn part_constraints_bushy(part_id: usize, workers: usize) -> Vec<OrderingConstraint> {
    (0..constrained_groups(workers))
        .map(|i| {
            if part_id & (1 << i) != 0 {
                OrderingConstraint::triple(3 * i + 1, 3 * i, 3 * i + 2)
            } else {
                OrderingConstraint::triple(3 * i, 3 * i + 1, 3 * i + 2)
            }
        })
        .collect()
}

/// Intermediate join results of a left-deep plan that respect the constraints
///
/// A constraint `a < b` means `b` never appears in an intermediate result
/// without `a`. Pairs `(0,1), (2,3), ...` are expanded to their constrained
/// power sets and composed group by group.
pub fn admissible_join_results(levels_needed: usize, constraints: &[OrderingConstraint]) -> Vec<LabelSet> {
    let mut join_results = Vec::new();
    let mut i = 0;
    while 2 * i + 1 < levels_needed {
        let group = constrained_power_set(constraints, 2 * i, 2 * i + 1);
        join_results = cartesian_product(&join_results, &group);
        i += 1;
    }
    join_results
}

/// Intermediate join results of a bushy plan that respect the constraints
pub fn admissible_join_results_bushy(levels_needed: usize, constraints: &[OrderingConstraint]) -> Vec<LabelSet> {
    let mut join_results = Vec::new();
    let mut i = 0;
    while 3 * i + 2 < levels_needed {
        let group = constrained_power_set_bushy(constraints, 3 * i, 3 * i + 1, 3 * i + 2);
        join_results = cartesian_product(&join_results, &group);
        i += 1;
    }
    join_results
}

/// Constraint set and admissible join results of one worker
#[derive(Debug, Clone)]
pub struct ConstraintPartitioner {
    pub part_id: usize,
    pub shape: TreeShape,
    pub constraints: Vec<OrderingConstraint>,
    pub admissible: Vec<LabelSet>,
}

impl ConstraintPartitioner {
    pub fn for_worker(levels_needed: usize, part_id: usize, workers: usize, shape: TreeShape) -> Self {
        let (constraints, admissible) = match shape {
            TreeShape::LeftDeep => {
                let constraints = part_constraints(part_id, workers);
                let admissible = admissible_join_results(levels_needed, &constraints);
                (constraints, admissible)
            }
            TreeShape::Bushy => {
                let constraints = part_constraints_bushy(part_id, workers);
                let admissible = admissible_join_results_bushy(levels_needed, &constraints);
                (constraints, admissible)
            }
        };

        Self {
            part_id,
            shape,
            constraints,
            admissible,
        }
    }
}
