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

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub startup_cost: f64,
    pub cpu_cost: f64,
    pub io_cost: f64,
    pub total_cost: f64,
}

impl CostEstimate {
    pub fn new(startup: f64, cpu: f64, io: f64) -> Self {
        Self {
            startup_cost: startup,
            cpu_cost: cpu,
            io_cost: io,
            total_cost: startup + cpu + io,
        }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Cost with only a total component, for synthetic planners
    pub fn flat(total: f64) -> Self {
        Self::new(0.0, total, 0.0)
    }

    pub fn add(&self, other: &CostEstimate) -> CostEstimate {
        CostEstimate::new(
            self.startup_cost + other.startup_cost,
            self.cpu_cost + other.cpu_cost,
            self.io_cost + other.io_cost,
        )
    }
}

impl Default for CostEstimate {
    fn default() -> Self {
        Self::zero()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OperationCost {
    SeqScan { rows: f64 },
    NestLoop { outer_rows: f64, inner_rows: f64 },
    HashJoin { build_rows: f64, probe_rows: f64, output_rows: f64 },
    MergeJoin { left_rows: f64, right_rows: f64, output_rows: f64 },
    Append { rows: f64, children: usize },
    Gather { rows: f64, workers: usize },
}

/// Per-operator cost factors
///
/// The defaults follow the usual relational-planner calibration: a sequential
/// page read costs 1.0 and every other factor is relative to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostModel {
    pub seq_page_cost: f64,
    pub cpu_tuple_cost: f64,
    pub cpu_operator_cost: f64,
    pub parallel_setup_cost: f64,
    pub parallel_tuple_cost: f64,
    /// Rows a hash table may hold before the build side spills
    pub work_mem_rows: f64,
    pub rows_per_page: f64,
}

impl CostModel {
    pub fn new() -> Self {
        Self {
            seq_page_cost: 1.0,
            cpu_tuple_cost: 0.01,
            cpu_operator_cost: 0.0025,
            parallel_setup_cost: 1000.0,
            parallel_tuple_cost: 0.1,
            work_mem_rows: 100_000.0,
            rows_per_page: 100.0,
        }
    }

    pub fn estimate_operation_cost(&self, operation: &OperationCost) -> CostEstimate {
        match operation {
            OperationCost::SeqScan { rows } => {
                let io_cost = (rows / self.rows_per_page).ceil() * self.seq_page_cost;
                let cpu_cost = rows * self.cpu_tuple_cost;
                CostEstimate::new(0.0, cpu_cost, io_cost)
            }
            OperationCost::NestLoop { outer_rows, inner_rows } => {
                let cpu_cost = outer_rows * inner_rows * (self.cpu_tuple_cost + self.cpu_operator_cost);
                CostEstimate::new(0.0, cpu_cost, 0.0)
            }
            OperationCost::HashJoin {
                build_rows,
                probe_rows,
                output_rows,
            } => {
                let startup = build_rows * (self.cpu_operator_cost + self.cpu_tuple_cost);
                let cpu_cost = probe_rows * self.cpu_operator_cost + output_rows * self.cpu_tuple_cost;
                // batches that do not fit in memory are written out and read back
                let io_cost = if *build_rows > self.work_mem_rows {
                    2.0 * ((build_rows + probe_rows) / self.rows_per_page).ceil() * self.seq_page_cost
                } else {
                    0.0
                };
                CostEstimate::new(startup, cpu_cost, io_cost)
            }
            OperationCost::MergeJoin {
                left_rows,
                right_rows,
                output_rows,
            } => {
                let sort_cost = |rows: f64| {
                    let rows = rows.max(2.0);
                    rows * rows.log2() * self.cpu_operator_cost * 2.0
                };
                let startup = sort_cost(*left_rows) + sort_cost(*right_rows);
                let cpu_cost = (left_rows + right_rows) * self.cpu_operator_cost + output_rows * self.cpu_tuple_cost;
                CostEstimate::new(startup, cpu_cost, 0.0)
            }
            OperationCost::Append { rows, children } => {
                let cpu_cost = rows * self.cpu_tuple_cost * 0.5 + *children as f64 * self.cpu_operator_cost;
                CostEstimate::new(0.0, cpu_cost, 0.0)
            }
            OperationCost::Gather { rows, workers } => {
                let workers = (*workers).max(1) as f64;
                let cpu_cost = rows * self.parallel_tuple_cost / workers;
                CostEstimate::new(self.parallel_setup_cost, cpu_cost, 0.0)
            }
        }
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_estimate_creation() {
        let cost = CostEstimate::new(10.0, 20.0, 5.0);
        assert_eq!(cost.total_cost, 35.0);
        assert_eq!(CostEstimate::flat(4.0).total_cost, 4.0);
    }

    #[test]
    fn test_cost_estimate_add() {
        let cost1 = CostEstimate::new(10.0, 20.0, 5.0);
        let cost2 = CostEstimate::new(5.0, 10.0, 3.0);
        let total = cost1.add(&cost2);
        assert_eq!(total.total_cost, 53.0);
        assert_eq!(total.startup_cost, 15.0);
    }

    #[test]
    fn test_seq_scan_cost() {
        let model = CostModel::new();
        let cost = model.estimate_operation_cost(&OperationCost::SeqScan { rows: 1000.0 });
        assert_eq!(cost.io_cost, 10.0);
        assert!(cost.cpu_cost > 0.0);
    }

    #[test]
    fn test_hash_join_spills_past_work_mem() {
        let model = CostModel::new();
        let small = model.estimate_operation_cost(&OperationCost::HashJoin {
            build_rows: 1000.0,
            probe_rows: 1000.0,
            output_rows: 1000.0,
        });
        let large = model.estimate_operation_cost(&OperationCost::HashJoin {
            build_rows: 1_000_000.0,
            probe_rows: 1000.0,
            output_rows: 1000.0,
        });
        assert_eq!(small.io_cost, 0.0);
        assert!(large.io_cost > 0.0);
    }

    #[test]
    fn test_nest_loop_grows_with_product() {
        let model = CostModel::new();
        let a = model.estimate_operation_cost(&OperationCost::NestLoop {
            outer_rows: 10.0,
            inner_rows: 10.0,
        });
        let b = model.estimate_operation_cost(&OperationCost::NestLoop {
            outer_rows: 100.0,
            inner_rows: 10.0,
        });
        assert!(b.total_cost > a.total_cost);
    }

    #[test]
    fn test_gather_pays_setup() {
        let model = CostModel::new();
        let cost = model.estimate_operation_cost(&OperationCost::Gather { rows: 100.0, workers: 4 });
        assert_eq!(cost.startup_cost, model.parallel_setup_cost);
    }
}
