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

//! Parallel join search
//!
//! One worker runs per part id. Each worker owns a clone of the caller's
//! planner and its own DP table, so nothing mutable is shared while they run.
//! When every worker is done the cheapest full join wins and its planner
//! clone replaces the caller's planner, carrying the join relations that
//! worker built.

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{JoinSearchConfig, TreeShape, WorkerExecution};
use crate::enumerator::{EnumerationStats, JoinEnumerator};
use crate::error::{JoinSearchError, JoinSearchResult};
use crate::partition::{ConstraintPartitioner, OrderingConstraint};
use crate::planner::{JoinPlanner, Relation};

/// Everything one worker needs, built before dispatch
pub struct WorkerPartition<P> {
    pub planner: P,
    pub initial_rels: Arc<[Arc<Relation>]>,
    pub levels_needed: usize,
    pub part_id: usize,
    pub workers: usize,
    pub shape: TreeShape,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStats {
    pub part_id: usize,
    pub constraints: Vec<OrderingConstraint>,
    pub admissible_sets: usize,
    pub enumeration: EnumerationStats,
    pub cost: f64,
    pub elapsed: Duration,
}

pub struct WorkerOutcome<P> {
    pub planner: P,
    pub best: Arc<Relation>,
    pub stats: WorkerStats,
}

/// Result of a parallel search with per-worker details
#[derive(Debug, Clone)]
pub struct JoinSearchReport {
    pub best: Arc<Relation>,
    pub winner: usize,
    pub workers: Vec<WorkerStats>,
}

impl<P: JoinPlanner> WorkerPartition<P> {
    pub fn run(self) -> JoinSearchResult<WorkerOutcome<P>> {
        let started = Instant::now();
        let WorkerPartition {
            mut planner,
            initial_rels,
            levels_needed,
            part_id,
            workers,
            shape,
        } = self;

        let mut partitioner = ConstraintPartitioner::for_worker(levels_needed, part_id, workers, shape);
        let admissible = std::mem::take(&mut partitioner.admissible);
        let admissible_sets = admissible.len();
        tracing::debug!(
            worker = part_id,
            constraints = ?partitioner.constraints,
            admissible_sets,
            "Worker started"
        );

        let (best, enumeration) = {
            let mut enumerator = JoinEnumerator::for_partition(&mut planner, levels_needed, &partitioner);
            enumerator.seed(&initial_rels)?;
            enumerator.run(admissible);
            let best = enumerator.finish()?;
            (best, enumerator.stats().clone())
        };

        let stats = WorkerStats {
            part_id,
            constraints: partitioner.constraints,
            admissible_sets,
            enumeration,
            cost: total_cost(&best),
            elapsed: started.elapsed(),
        };
        Ok(WorkerOutcome { planner, best, stats })
    }
}

fn total_cost(rel: &Relation) -> f64 {
    rel.cheapest_total_cost().unwrap_or(f64::INFINITY)
}

/// Runs every worker and returns the cheapest full join
///
/// The caller's planner is replaced by the winning worker's clone. Any
/// worker failure aborts the whole search.
pub fn parallel_join_search<P: JoinPlanner>(
    planner: &mut P,
    levels_needed: usize,
    initial_rels: &[Arc<Relation>],
    config: &JoinSearchConfig,
) -> JoinSearchResult<Arc<Relation>> {
    parallel_join_search_report(planner, levels_needed, initial_rels, config).map(|report| report.best)
}

pub fn parallel_join_search_report<P: JoinPlanner>(
    planner: &mut P,
    levels_needed: usize,
    initial_rels: &[Arc<Relation>],
    config: &JoinSearchConfig,
) -> JoinSearchResult<JoinSearchReport> {
    if initial_rels.len() != levels_needed {
        return Err(JoinSearchError::RelationCountMismatch {
            expected: levels_needed,
            actual: initial_rels.len(),
        });
    }
    config.validate(levels_needed)?;

    tracing::info!(
        relations = levels_needed,
        workers = config.workers,
        shape = %config.tree_shape,
        execution = ?config.execution,
        "Starting parallel join search"
    );

    let shared: Arc<[Arc<Relation>]> = initial_rels.to_vec().into();
    let partitions: Vec<WorkerPartition<P>> = (0..config.workers)
        .map(|part_id| WorkerPartition {
            planner: planner.clone(),
            initial_rels: shared.clone(),
            levels_needed,
            part_id,
            workers: config.workers,
            shape: config.tree_shape,
        })
        .collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.pool_threads())
        .thread_name(|i| format!("join-search-{i}"))
        .build()?;

    let serial = Mutex::new(());
    let execution = config.execution;
    let outcomes: Vec<JoinSearchResult<WorkerOutcome<P>>> = pool.install(|| {
        partitions
            .into_par_iter()
            .map(|partition| match execution {
                WorkerExecution::Serialized => {
                    let _guard = serial.lock();
                    partition.run()
                }
                WorkerExecution::Concurrent => partition.run(),
            })
            .collect()
    });

    let mut stats = Vec::with_capacity(outcomes.len());
    let mut winner: Option<WorkerOutcome<P>> = None;
    for outcome in outcomes {
        let outcome = outcome?;
        tracing::debug!(
            worker = outcome.stats.part_id,
            cost = outcome.stats.cost,
            elapsed_us = outcome.stats.elapsed.as_micros() as u64,
            "Worker finished"
        );
        stats.push(outcome.stats.clone());

        // ties keep the lower worker id
        let replace = match &winner {
            Some(current) => outcome.stats.cost < current.stats.cost,
            None => true,
        };
        if replace {
            winner = Some(outcome);
        }
    }

    let winner = winner.ok_or(JoinSearchError::UnreachableJoin {
        relations: levels_needed,
        worker: None,
    })?;
    tracing::info!(winner = winner.stats.part_id, cost = winner.stats.cost, "Parallel join search finished");

    *planner = winner.planner;
    Ok(JoinSearchReport {
        best: winner.best,
        winner: winner.stats.part_id,
        workers: stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{CostEstimate, Path, PathKind};
    use crate::relids::RelMask;

    /// Equal cost for every join order, records what it built
    #[derive(Clone, Default)]
    struct FlatPlanner {
        built: Vec<RelMask>,
    }

    impl JoinPlanner for FlatPlanner {
        fn make_join_rel(&mut self, outer: &Arc<Relation>, inner: &Arc<Relation>) -> Option<Relation> {
            let relids = outer.relids | inner.relids;
            self.built.push(relids);
            let mut rel = Relation::new(relids, "join", 1.0);
            let path = Path::join(
                PathKind::HashJoin,
                1.0,
                CostEstimate::flat(relids.count_ones() as f64),
                outer.cheapest_total_path.clone()?,
                inner.cheapest_total_path.clone()?,
            );
            rel.add_path(path);
            Some(rel)
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

    #[test]
    fn test_tie_goes_to_first_worker() {
        let mut planner = FlatPlanner::default();
        let config = JoinSearchConfig::new(4, TreeShape::LeftDeep);
        let report = parallel_join_search_report(&mut planner, 4, &base_rels(4), &config).unwrap();
        assert_eq!(report.winner, 0);
        assert_eq!(report.workers.len(), 4);
        assert!(report.workers.iter().all(|w| w.cost == 4.0));
        assert_eq!(report.best.relids, 0b1111);
    }

    #[test]
    fn test_winner_planner_is_handed_back() {
        let mut planner = FlatPlanner::default();
        let config = JoinSearchConfig::new(2, TreeShape::LeftDeep);
        parallel_join_search(&mut planner, 4, &base_rels(4), &config).unwrap();
        assert!(planner.built.contains(&0b1111));
    }

    #[test]
    fn test_relation_count_mismatch() {
        let mut planner = FlatPlanner::default();
        let config = JoinSearchConfig::default();
        let err = parallel_join_search(&mut planner, 4, &base_rels(3), &config).unwrap_err();
        assert!(matches!(err, JoinSearchError::RelationCountMismatch { expected: 4, actual: 3 }));
        assert!(planner.built.is_empty());
    }

    #[test]
    fn test_serialized_matches_concurrent() {
        let config = JoinSearchConfig::new(4, TreeShape::LeftDeep).with_threads(2);
        let mut concurrent = FlatPlanner::default();
        let a = parallel_join_search_report(&mut concurrent, 6, &base_rels(6), &config).unwrap();

        let mut serialized = FlatPlanner::default();
        let config = config.with_execution(WorkerExecution::Serialized);
        let b = parallel_join_search_report(&mut serialized, 6, &base_rels(6), &config).unwrap();

        assert_eq!(a.winner, b.winner);
        assert_eq!(a.best.cheapest_total_cost(), b.best.cheapest_total_cost());
    }

    #[test]
    fn test_worker_stats_serialize() {
        let mut planner = FlatPlanner::default();
        let config = JoinSearchConfig::new(2, TreeShape::LeftDeep);
        let report = parallel_join_search_report(&mut planner, 4, &base_rels(4), &config).unwrap();

        let json = serde_json::to_string(&report.workers).unwrap();
        let workers: Vec<WorkerStats> = serde_json::from_str(&json).unwrap();
        assert_eq!(workers.len(), 2);
        assert_eq!(workers[1].constraints, vec![OrderingConstraint::pair(1, 0)]);
        assert_eq!(workers[0].enumeration, report.workers[0].enumeration);
        assert_eq!(workers[0].cost, 4.0);

        let kind = report.best.cheapest_total_path.as_ref().map(|p| p.kind);
        assert_eq!(serde_json::to_string(&kind).unwrap(), r#""HashJoin""#);
    }
}
