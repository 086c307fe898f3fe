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

//! Stub planner shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use joinsearch_core::relids::{RelMask, singleton};
use joinsearch_core::{CostEstimate, JoinPlanner, Path, PathKind, Relation};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Base relations `0..count`, each with one scan path of cost 1
pub fn base_rels(count: usize) -> Vec<Arc<Relation>> {
    (0..count)
        .map(|i| {
            let mut rel = Relation::base(i, format!("r{i}"), 1.0);
            rel.add_path(Path::scan(i, 1.0, CostEstimate::flat(1.0)));
            rel.set_cheapest();
            Arc::new(rel)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Costing {
    /// Relation count of the outer side plus that of the inner side
    SizeSum,
    /// Both input costs plus a per-join weight, so whole trees are compared
    Cumulative,
}

/// Records every join it is asked for and the relations reported back
#[derive(Debug, Clone)]
pub struct StubPlanner {
    pub costing: Costing,
    pub joins: Vec<(RelMask, RelMask)>,
    pub recorded: Vec<RelMask>,
    pub reject_all: bool,
    /// `(inner, member, amount)`: extra cost when `inner` alone joins an outer side holding `member`
    pub penalty: Option<(usize, usize, f64)>,
    /// Varies the per-join weight of cumulative costing
    pub seed: u64,
}

impl StubPlanner {
    pub fn size_sum() -> Self {
        Self {
            costing: Costing::SizeSum,
            joins: Vec::new(),
            recorded: Vec::new(),
            reject_all: false,
            penalty: None,
            seed: 0,
        }
    }

    pub fn cumulative() -> Self {
        Self {
            costing: Costing::Cumulative,
            ..Self::size_sum()
        }
    }

    pub fn rejecting() -> Self {
        Self {
            reject_all: true,
            ..Self::size_sum()
        }
    }

    pub fn with_penalty(mut self, inner: usize, member: usize, amount: f64) -> Self {
        self.penalty = Some((inner, member, amount));
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn weight(&self, outer: RelMask, inner: RelMask) -> f64 {
        if self.seed == 0 {
            return 1.0;
        }
        let mixed = (outer.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ inner.rotate_left(17) ^ self.seed).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        (mixed >> 59) as f64 + 1.0
    }
}

impl JoinPlanner for StubPlanner {
    fn make_join_rel(&mut self, outer: &Arc<Relation>, inner: &Arc<Relation>) -> Option<Relation> {
        if self.reject_all || outer.relids & inner.relids != 0 {
            return None;
        }
        self.joins.push((outer.relids, inner.relids));

        let outer_path = outer.cheapest_total_path.clone()?;
        let inner_path = inner.cheapest_total_path.clone()?;
        let mut cost = match self.costing {
            Costing::SizeSum => (outer.relation_count() + inner.relation_count()) as f64,
            Costing::Cumulative => outer_path.total_cost() + inner_path.total_cost() + self.weight(outer.relids, inner.relids),
        };
        if let Some((pinned, member, amount)) = self.penalty
            && inner.relids == singleton(pinned)
            && outer.relids & singleton(member) != 0
        {
            cost += amount;
        }

        let mut rel = Relation::new(outer.relids | inner.relids, format!("{}{}", outer.name, inner.name), 1.0);
        rel.add_path(Path::join(PathKind::HashJoin, 1.0, CostEstimate::flat(cost), outer_path, inner_path));
        Some(rel)
    }

    fn record_join_rel(&mut self, rel: Arc<Relation>) {
        self.recorded.push(rel.relids);
    }
}
