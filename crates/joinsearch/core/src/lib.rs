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

//! Join Search Library
//!
//! This crate finds the cheapest order in which to join the relations of a
//! query. The join-order space is split between workers by per-worker
//! ordering constraints derived from the worker id, each worker runs a
//! bitmask dynamic-programming search over its slice, and the cheapest full
//! join across workers wins.
//!
//! Costing is delegated to a [`JoinPlanner`]. [`CostBasedPlanner`] is a
//! ready-made implementation.

pub mod clump;
pub mod config;
pub mod coordinator;
pub mod enumerator;
pub mod error;
pub mod partition;
pub mod planner;
pub mod relids;
pub mod set_algebra;
pub mod standard;

// Re-export commonly used types
pub use clump::{GroupingTree, clump_eval, construct_rel_based_on_plan};
pub use config::{JoinSearchConfig, TreeShape, WorkerExecution};
pub use coordinator::{JoinSearchReport, WorkerStats, parallel_join_search, parallel_join_search_report};
pub use enumerator::{DpTable, EnumerationState, EnumerationStats, JoinEnumerator};
pub use error::{JoinSearchError, JoinSearchResult};
pub use partition::{ConstraintPartitioner, OrderingConstraint};
pub use planner::{CostBasedPlanner, CostEstimate, CostModel, JoinGraph, JoinPlanner, Path, PathKind, PlannerSettings, Relation};
pub use relids::{LabelSet, MAX_JOIN_RELATIONS, RelMask};
pub use standard::{join_search, standard_join_search};
