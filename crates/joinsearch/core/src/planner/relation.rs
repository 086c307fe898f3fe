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
use std::fmt;
use std::sync::Arc;

use super::cost_model::CostEstimate;
use crate::relids::{RelMask, singleton};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathKind {
    SeqScan { relation: usize },
    NestLoop,
    HashJoin,
    MergeJoin,
    Append,
    Gather,
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKind::SeqScan { relation } => write!(f, "SeqScan({relation})"),
            PathKind::NestLoop => write!(f, "NestLoop"),
            PathKind::HashJoin => write!(f, "HashJoin"),
            PathKind::MergeJoin => write!(f, "MergeJoin"),
            PathKind::Append => write!(f, "Append"),
            PathKind::Gather => write!(f, "Gather"),
        }
    }
}

/// One way of producing the rows of a relation
///
/// Join paths hold their outer input first and their inner input second.
#[derive(Debug, Clone)]
pub struct Path {
    pub kind: PathKind,
    pub rows: f64,
    pub cost: CostEstimate,
    pub parallel_workers: usize,
    pub children: Vec<Arc<Path>>,
}

impl Path {
    pub fn scan(relation: usize, rows: f64, cost: CostEstimate) -> Self {
        Self {
            kind: PathKind::SeqScan { relation },
            rows,
            cost,
            parallel_workers: 0,
            children: Vec::new(),
        }
    }

    pub fn join(kind: PathKind, rows: f64, cost: CostEstimate, outer: Arc<Path>, inner: Arc<Path>) -> Self {
        Self {
            kind,
            rows,
            cost,
            parallel_workers: 0,
            children: vec![outer, inner],
        }
    }

    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers;
        self
    }

    pub fn total_cost(&self) -> f64 {
        self.cost.total_cost
    }

    pub fn startup_cost(&self) -> f64 {
        self.cost.startup_cost
    }

    pub fn is_join(&self) -> bool {
        matches!(self.kind, PathKind::NestLoop | PathKind::HashJoin | PathKind::MergeJoin)
    }

    /// Base relations in the order the plan reads them, outer before inner
    ///
    /// An append over partition-wise joins lists the relations of its first
    /// child, since every child joins the same relations.
    pub fn leaf_relations(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<usize>) {
        match self.kind {
            PathKind::SeqScan { relation } => out.push(relation),
            PathKind::Append | PathKind::Gather => {
                if let Some(child) = self.children.first() {
                    child.collect_leaves(out);
                }
            }
            _ => {
                for child in &self.children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Whether every join in the tree has a single base relation as its inner input
    pub fn is_left_deep(&self) -> bool {
        match self.kind {
            PathKind::SeqScan { .. } => true,
            PathKind::Append | PathKind::Gather => self.children.first().is_none_or(|c| c.is_left_deep()),
            _ => match self.children.as_slice() {
                [outer, inner] => inner.leaf_relations().len() == 1 && outer.is_left_deep(),
                _ => false,
            },
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if self.children.is_empty() {
            return Ok(());
        }
        write!(f, "(")?;
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{child}")?;
        }
        write!(f, ")")
    }
}

/// A base relation or the result of joining a set of base relations
#[derive(Debug, Clone)]
pub struct Relation {
    pub relids: RelMask,
    pub name: String,
    pub rows: f64,
    pub paths: Vec<Arc<Path>>,
    pub partial_paths: Vec<Arc<Path>>,
    pub cheapest_total_path: Option<Arc<Path>>,
    pub consider_parallel: bool,
    /// Number of matching partitions, 0 when the relation is not partitioned
    pub partitions: usize,
    /// Cheapest outer and inner inputs, kept for partition-wise joins
    pub partition_pair: Option<(Arc<Path>, Arc<Path>)>,
}

impl Relation {
    pub fn new(relids: RelMask, name: impl Into<String>, rows: f64) -> Self {
        Self {
            relids,
            name: name.into(),
            rows,
            paths: Vec::new(),
            partial_paths: Vec::new(),
            cheapest_total_path: None,
            consider_parallel: false,
            partitions: 0,
            partition_pair: None,
        }
    }

    /// Base relation `index` with no paths yet
    pub fn base(index: usize, name: impl Into<String>, rows: f64) -> Self {
        Self::new(singleton(index), name, rows)
    }

    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    /// Adds a path unless an existing one is at least as cheap on both startup and total cost
    ///
    /// Paths the new one dominates are dropped.
    pub fn add_path(&mut self, path: Path) {
        if self.paths.iter().any(|p| dominates(p, &path)) {
            return;
        }
        self.paths.retain(|p| !dominates(&path, p));
        self.paths.push(Arc::new(path));
    }

    pub fn add_partial_path(&mut self, path: Path) {
        if self.partial_paths.iter().any(|p| dominates(p, &path)) {
            return;
        }
        self.partial_paths.retain(|p| !dominates(&path, p));
        self.partial_paths.push(Arc::new(path));
    }

    /// Picks the path with the lowest total cost; the earliest path wins ties
    pub fn set_cheapest(&mut self) {
        let mut cheapest: Option<&Arc<Path>> = None;
        for path in &self.paths {
            match cheapest {
                Some(best) if best.total_cost() <= path.total_cost() => {}
                _ => cheapest = Some(path),
            }
        }
        self.cheapest_total_path = cheapest.cloned();
    }

    pub fn cheapest_partial_path(&self) -> Option<&Arc<Path>> {
        self.partial_paths
            .iter()
            .reduce(|best, path| if path.total_cost() < best.total_cost() { path } else { best })
    }

    /// Total cost of the cheapest path, `None` before `set_cheapest` found one
    pub fn cheapest_total_cost(&self) -> Option<f64> {
        self.cheapest_total_path.as_ref().map(|p| p.total_cost())
    }

    pub fn relation_count(&self) -> usize {
        self.relids.count_ones() as usize
    }
}

fn dominates(a: &Path, b: &Path) -> bool {
    a.total_cost() <= b.total_cost() && a.startup_cost() <= b.startup_cost()
}
