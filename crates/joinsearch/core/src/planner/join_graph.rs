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

use serde::{Deserialize, Serialize};

use crate::relids::{RelMask, overlaps, singleton};

/// Equi-join predicate between two base relations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinClause {
    pub left: usize,
    pub right: usize,
    pub selectivity: f64,
}

impl JoinClause {
    fn connects(&self, a: RelMask, b: RelMask) -> bool {
        let left = singleton(self.left);
        let right = singleton(self.right);
        (overlaps(left, a) && overlaps(right, b)) || (overlaps(left, b) && overlaps(right, a))
    }
}

/// Relations that must be joined as a unit, as outer joins require
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRestriction {
    pub min_lefthand: RelMask,
    pub min_righthand: RelMask,
}

/// Join predicates and ordering restrictions between the relations of one query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinGraph {
    pub clauses: Vec<JoinClause>,
    pub restrictions: Vec<OrderRestriction>,
}

impl JoinGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clause(mut self, left: usize, right: usize, selectivity: f64) -> Self {
        self.clauses.push(JoinClause {
            left,
            right,
            selectivity: selectivity.clamp(0.0, 1.0),
        });
        self
    }

    pub fn with_restriction(mut self, min_lefthand: RelMask, min_righthand: RelMask) -> Self {
        self.restrictions.push(OrderRestriction {
            min_lefthand,
            min_righthand,
        });
        self
    }

    /// Chain `0 - 1 - ... - (count-1)` with the same selectivity on every edge
    pub fn chain(count: usize, selectivity: f64) -> Self {
        (1..count).fold(Self::new(), |graph, i| graph.with_clause(i - 1, i, selectivity))
    }

    /// Star with relation 0 at the center
    pub fn star(count: usize, selectivity: f64) -> Self {
        (1..count).fold(Self::new(), |graph, i| graph.with_clause(0, i, selectivity))
    }

    /// Whether some clause references one relation from each side
    pub fn has_clause_between(&self, a: RelMask, b: RelMask) -> bool {
        self.clauses.iter().any(|c| c.connects(a, b))
    }

    /// Combined selectivity of every clause crossing the two sides
    pub fn selectivity_between(&self, a: RelMask, b: RelMask) -> f64 {
        self.clauses
            .iter()
            .filter(|c| c.connects(a, b))
            .map(|c| c.selectivity)
            .product()
    }

    /// Whether a restriction has its left-hand side in one input and its right-hand side in the other
    pub fn has_restriction_between(&self, a: RelMask, b: RelMask) -> bool {
        self.restrictions.iter().any(|r| {
            (overlaps(r.min_lefthand, a) && overlaps(r.min_righthand, b)) || (overlaps(r.min_lefthand, b) && overlaps(r.min_righthand, a))
        })
    }
}
