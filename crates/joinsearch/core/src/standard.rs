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

//! Level-by-level join search and the planner-facing entry point

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::JoinSearchConfig;
use crate::coordinator::parallel_join_search;
use crate::error::{JoinSearchError, JoinSearchResult};
use crate::planner::{JoinPlanner, Relation};
use crate::relids::{MAX_JOIN_RELATIONS, RelMask, overlaps};

/// Finds the cheapest join of all inputs
///
/// A single input is returned as is. When the inputs split into whole
/// groups of the configured tree shape the parallel search runs. Otherwise
/// the level-by-level search takes over, unless the fallback is disabled.
pub fn join_search<P: JoinPlanner>(
    planner: &mut P,
    initial_rels: &[Arc<Relation>],
    config: &JoinSearchConfig,
) -> JoinSearchResult<Arc<Relation>> {
    let levels_needed = initial_rels.len();
    match initial_rels {
        [] => return Err(JoinSearchError::InvalidConfiguration("no relations to join".to_string())),
        [only] => return Ok(only.clone()),
        _ => {}
    }

    let group_size = config.tree_shape.group_size();
    if levels_needed % group_size == 0 || !config.standard_fallback {
        parallel_join_search(planner, levels_needed, initial_rels, config)
    } else {
        tracing::debug!(
            relations = levels_needed,
            group_size,
            "Relations do not split into whole groups, using level-by-level search"
        );
        standard_join_search(planner, levels_needed, initial_rels)
    }
}

/// Exhaustive bottom-up search building every join level in turn
///
/// Level `k` holds the cheapest relation for every reachable set of `k`
/// inputs. It is built by joining each level `j` relation with each disjoint
/// level `k - j` relation. An empty level means no plan exists.
pub fn standard_join_search<P: JoinPlanner>(
    planner: &mut P,
    levels_needed: usize,
    initial_rels: &[Arc<Relation>],
) -> JoinSearchResult<Arc<Relation>> {
    if initial_rels.len() != levels_needed {
        return Err(JoinSearchError::RelationCountMismatch {
            expected: levels_needed,
            actual: initial_rels.len(),
        });
    }
    if levels_needed > MAX_JOIN_RELATIONS {
        return Err(JoinSearchError::TooManyRelations {
            count: levels_needed,
            max: MAX_JOIN_RELATIONS,
        });
    }
    if let [only] = initial_rels {
        return Ok(only.clone());
    }

    tracing::info!(relations = levels_needed, "Starting level-by-level join search");

    let mut levels: Vec<Vec<Arc<Relation>>> = vec![Vec::new(); levels_needed + 1];
    levels[1] = initial_rels.to_vec();

    for level in 2..=levels_needed {
        let mut built: BTreeMap<RelMask, Relation> = BTreeMap::new();

        for outer_level in 1..=level / 2 {
            let inner_level = level - outer_level;
            for (i, outer) in levels[outer_level].iter().enumerate() {
                // same-size levels would otherwise visit every pair twice
                let skip = if outer_level == inner_level { i + 1 } else { 0 };
                for inner in levels[inner_level].iter().skip(skip) {
                    if overlaps(outer.relids, inner.relids) {
                        continue;
                    }
                    let Some(candidate) = planner.make_join_rel(outer, inner) else {
                        continue;
                    };
                    match built.get_mut(&candidate.relids) {
                        Some(existing) => merge_paths(existing, candidate),
                        None => {
                            built.insert(candidate.relids, candidate);
                        }
                    }
                }
            }
        }

        let mut finished = Vec::with_capacity(built.len());
        for (_, mut rel) in built {
            planner.generate_partitionwise_join_paths(&mut rel);
            if level != levels_needed {
                planner.generate_gather_paths(&mut rel, false);
            }
            planner.set_cheapest(&mut rel);
            if rel.cheapest_total_path.is_none() {
                continue;
            }
            let rel = Arc::new(rel);
            planner.record_join_rel(rel.clone());
            finished.push(rel);
        }

        tracing::debug!(level, relations = finished.len(), "Join level built");
        if finished.is_empty() {
            return Err(JoinSearchError::UnreachableJoin {
                relations: level,
                worker: None,
            });
        }
        levels[level] = finished;
    }

    levels
        .pop()
        .and_then(|mut top| top.pop())
        .ok_or(JoinSearchError::UnreachableJoin {
            relations: levels_needed,
            worker: None,
        })
}

/// Folds the paths of another build of the same set into `existing`
fn merge_paths(existing: &mut Relation, other: Relation) {
    for path in other.paths {
        existing.add_path(Arc::unwrap_or_clone(path));
    }
    for path in other.partial_paths {
        existing.add_partial_path(Arc::unwrap_or_clone(path));
    }
    if existing.partition_pair.is_none() && other.partition_pair.is_some() {
        existing.partitions = other.partitions;
        existing.partition_pair = other.partition_pair;
    }
    existing.consider_parallel |= other.consider_parallel;
}
