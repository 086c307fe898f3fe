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
use std::collections::BTreeMap;
use std::sync::Arc;

use super::JoinPlanner;
use super::cost_model::{CostEstimate, CostModel, OperationCost};
use super::join_graph::JoinGraph;
use super::relation::{Path, PathKind, Relation};
use crate::relids::{RelMask, overlaps};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Join relations that share no clause
    pub allow_cartesian: bool,
    pub enable_nestloop: bool,
    pub enable_hashjoin: bool,
    pub enable_mergejoin: bool,
    pub enable_partitionwise_join: bool,
    pub enable_parallel: bool,
    pub parallel_workers: usize,
    pub min_parallel_rows: f64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            allow_cartesian: false,
            enable_nestloop: true,
            enable_hashjoin: true,
            enable_mergejoin: true,
            enable_partitionwise_join: true,
            enable_parallel: false,
            parallel_workers: 2,
            min_parallel_rows: 10_000.0,
        }
    }
}

/// Reference planner costing joins with a [`CostModel`]
///
/// Built join relations are cached by relation set. A later join of the same
/// set starts from the cached relation, so its path list only ever grows
/// cheaper.
#[derive(Debug, Clone)]
pub struct CostBasedPlanner {
    graph: Arc<JoinGraph>,
    settings: PlannerSettings,
    cost_model: CostModel,
    join_cache: BTreeMap<RelMask, Arc<Relation>>,
}

impl CostBasedPlanner {
    pub fn new(graph: JoinGraph) -> Self {
        Self {
            graph: Arc::new(graph),
            settings: PlannerSettings::default(),
            cost_model: CostModel::default(),
            join_cache: BTreeMap::new(),
        }
    }

    pub fn with_settings(mut self, settings: PlannerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cost_model(mut self, cost_model: CostModel) -> Self {
        self.cost_model = cost_model;
        self
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    pub fn graph(&self) -> &JoinGraph {
        &self.graph
    }

    /// Scanned base relation with its sequential and, when eligible, partial paths
    pub fn base_rel(&self, index: usize, name: &str, rows: f64) -> Arc<Relation> {
        self.partitioned_base_rel(index, name, rows, 0)
    }

    pub fn partitioned_base_rel(&self, index: usize, name: &str, rows: f64, partitions: usize) -> Arc<Relation> {
        let mut rel = Relation::base(index, name, rows).with_partitions(partitions);
        let cost = self.cost_model.estimate_operation_cost(&OperationCost::SeqScan { rows });
        rel.add_path(Path::scan(index, rows, cost));

        if self.settings.enable_parallel {
            rel.consider_parallel = true;
            if rows >= self.settings.min_parallel_rows {
                let workers = self.settings.parallel_workers.max(1);
                let partial_cost = CostEstimate::new(cost.startup_cost, cost.cpu_cost / workers as f64, cost.io_cost);
                rel.add_partial_path(Path::scan(index, rows / workers as f64, partial_cost).with_parallel_workers(workers));
            }
        }

        rel.set_cheapest();
        Arc::new(rel)
    }

    /// Cheapest cached join relation for the given set
    pub fn join_rel(&self, relids: RelMask) -> Option<&Arc<Relation>> {
        self.join_cache.get(&relids)
    }

    pub fn join_rels(&self) -> &BTreeMap<RelMask, Arc<Relation>> {
        &self.join_cache
    }

    pub fn clear_join_cache(&mut self) {
        self.join_cache.clear();
    }

    fn join_cost(&self, kind: PathKind, outer: &Path, inner: &Path, rows: f64) -> CostEstimate {
        let operation = match kind {
            PathKind::HashJoin => OperationCost::HashJoin {
                build_rows: inner.rows,
                probe_rows: outer.rows,
                output_rows: rows,
            },
            PathKind::MergeJoin => OperationCost::MergeJoin {
                left_rows: outer.rows,
                right_rows: inner.rows,
                output_rows: rows,
            },
            _ => OperationCost::NestLoop {
                outer_rows: outer.rows,
                inner_rows: inner.rows,
            },
        };
        outer.cost.add(&inner.cost).add(&self.cost_model.estimate_operation_cost(&operation))
    }

    fn add_join_paths(&self, rel: &mut Relation, outer: &Arc<Path>, inner: &Arc<Path>, has_clause: bool) {
        let mut kinds = Vec::with_capacity(3);
        if self.settings.enable_nestloop {
            kinds.push(PathKind::NestLoop);
        }
        // hash and merge joins need an equi-join clause
        if has_clause && self.settings.enable_hashjoin {
            kinds.push(PathKind::HashJoin);
        }
        if has_clause && self.settings.enable_mergejoin {
            kinds.push(PathKind::MergeJoin);
        }

        for kind in kinds {
            let cost = self.join_cost(kind, outer, inner, rel.rows);
            rel.add_path(Path::join(kind, rel.rows, cost, outer.clone(), inner.clone()));
        }
    }
}

fn scale(cost: &CostEstimate, factor: f64) -> CostEstimate {
    CostEstimate::new(cost.startup_cost * factor, cost.cpu_cost * factor, cost.io_cost * factor)
}

impl JoinPlanner for CostBasedPlanner {
    fn make_join_rel(&mut self, outer: &Arc<Relation>, inner: &Arc<Relation>) -> Option<Relation> {
        if overlaps(outer.relids, inner.relids) {
            return None;
        }

        let has_clause = self.graph.has_clause_between(outer.relids, inner.relids);
        if !has_clause && !self.settings.allow_cartesian && !self.graph.has_restriction_between(outer.relids, inner.relids) {
            tracing::trace!(outer = outer.relids, inner = inner.relids, "No join clause, skipping cartesian product");
            return None;
        }

        let outer_path = outer.cheapest_total_path.clone()?;
        let inner_path = inner.cheapest_total_path.clone()?;
        let relids = outer.relids | inner.relids;

        let mut rel = match self.join_cache.get(&relids) {
            Some(cached) => Relation::clone(cached),
            None => {
                let rows = (outer.rows * inner.rows * self.graph.selectivity_between(outer.relids, inner.relids)).max(1.0);
                Relation::new(relids, format!("({} JOIN {})", outer.name, inner.name), rows)
            }
        };

        self.add_join_paths(&mut rel, &outer_path, &inner_path, has_clause);
        self.add_join_paths(&mut rel, &inner_path, &outer_path, has_clause);
        if rel.paths.is_empty() {
            return None;
        }

        if self.settings.enable_parallel && outer.consider_parallel && inner.consider_parallel {
            rel.consider_parallel = true;
            if has_clause && self.settings.enable_hashjoin && let Some(partial) = outer.cheapest_partial_path() {
                let workers = partial.parallel_workers.max(1);
                let rows = rel.rows / workers as f64;
                let cost = self.join_cost(PathKind::HashJoin, partial, &inner_path, rows);
                let path = Path::join(PathKind::HashJoin, rows, cost, partial.clone(), inner_path.clone()).with_parallel_workers(workers);
                rel.add_partial_path(path);
            }
        }

        if self.settings.enable_partitionwise_join && has_clause && outer.partitions > 1 && outer.partitions == inner.partitions {
            rel.partitions = outer.partitions;
            rel.partition_pair = Some((outer_path, inner_path));
        } else {
            rel.partition_pair = None;
        }

        Some(rel)
    }

    fn generate_partitionwise_join_paths(&mut self, rel: &mut Relation) {
        if rel.partitions < 2 {
            return;
        }
        let Some((outer, inner)) = rel.partition_pair.take() else {
            return;
        };

        let share = 1.0 / rel.partitions as f64;
        let child_rows = rel.rows * share;
        let inputs = scale(&outer.cost.add(&inner.cost), share);
        let hash = self.cost_model.estimate_operation_cost(&OperationCost::HashJoin {
            build_rows: inner.rows * share,
            probe_rows: outer.rows * share,
            output_rows: child_rows,
        });
        let child_cost = inputs.add(&hash);

        let children: Vec<Arc<Path>> = (0..rel.partitions)
            .map(|_| Arc::new(Path::join(PathKind::HashJoin, child_rows, child_cost, outer.clone(), inner.clone())))
            .collect();
        let append = self.cost_model.estimate_operation_cost(&OperationCost::Append {
            rows: rel.rows,
            children: children.len(),
        });
        let cost = children.iter().fold(append, |acc, child| acc.add(&child.cost));

        rel.add_path(Path {
            kind: PathKind::Append,
            rows: rel.rows,
            cost,
            parallel_workers: 0,
            children,
        });
    }

    fn generate_gather_paths(&mut self, rel: &mut Relation, override_rows: bool) {
        let Some(partial) = rel.cheapest_partial_path().cloned() else {
            return;
        };

        let workers = partial.parallel_workers.max(1);
        let rows = if override_rows { partial.rows * workers as f64 } else { rel.rows };
        let gather = self.cost_model.estimate_operation_cost(&OperationCost::Gather { rows, workers });
        rel.add_path(Path {
            kind: PathKind::Gather,
            rows,
            cost: partial.cost.add(&gather),
            parallel_workers: workers,
            children: vec![partial],
        });
    }

    fn record_join_rel(&mut self, rel: Arc<Relation>) {
        let Some(cost) = rel.cheapest_total_cost() else {
            return;
        };
        // the newest relation for a set carries every path built so far
        let replace = match self.join_cache.get(&rel.relids).and_then(|cached| cached.cheapest_total_cost()) {
            Some(cached) => cost <= cached,
            None => true,
        };
        if replace {
            self.join_cache.insert(rel.relids, rel);
        }
    }

    fn have_relevant_joinclause(&self, a: &Relation, b: &Relation) -> bool {
        self.graph.has_clause_between(a.relids, b.relids)
    }

    fn have_join_order_restriction(&self, a: &Relation, b: &Relation) -> bool {
        self.graph.has_restriction_between(a.relids, b.relids)
    }
}
