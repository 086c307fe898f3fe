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

//! Planner collaborator
//!
//! The join search never costs a join itself. It hands every candidate pair
//! of relations to a [`JoinPlanner`], which decides whether the pair can be
//! joined and which paths the result gets. [`CostBasedPlanner`] is a complete
//! implementation over a [`JoinGraph`] and a [`CostModel`].

pub mod cost_based;
pub mod cost_model;
pub mod join_graph;
pub mod relation;

use std::sync::Arc;

// Re-export commonly used types
pub use cost_based::{CostBasedPlanner, PlannerSettings};
pub use cost_model::{CostEstimate, CostModel, OperationCost};
pub use join_graph::{JoinClause, JoinGraph, OrderRestriction};
pub use relation::{Path, PathKind, Relation};

/// Join-and-cost oracle consumed by every search strategy
///
/// Each worker of a parallel search owns a clone, so whatever bookkeeping an
/// implementation keeps is private to that worker until the coordinator hands
/// the winning clone back to the caller.
pub trait JoinPlanner: Clone + Send {
    /// Joins two disjoint relations, or `None` when the pair may not be joined
    fn make_join_rel(&mut self, outer: &Arc<Relation>, inner: &Arc<Relation>) -> Option<Relation>;

    fn generate_partitionwise_join_paths(&mut self, _rel: &mut Relation) {}

    fn generate_gather_paths(&mut self, _rel: &mut Relation, _override_rows: bool) {}

    fn set_cheapest(&mut self, rel: &mut Relation) {
        rel.set_cheapest();
    }

    /// Called with every finished join relation the search builds
    fn record_join_rel(&mut self, _rel: Arc<Relation>) {}

    fn have_relevant_joinclause(&self, _a: &Relation, _b: &Relation) -> bool {
        true
    }

    fn have_join_order_restriction(&self, _a: &Relation, _b: &Relation) -> bool {
        false
    }
}
