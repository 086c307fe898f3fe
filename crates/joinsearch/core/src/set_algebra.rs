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

//! Label-set algebra
//!
//! Pure helpers over lists of label-sets. Nothing here mutates its inputs:
//! every composition returns a freshly allocated list.

use std::cmp::Ordering;

use crate::partition::OrderingConstraint;
use crate::relids::LabelSet;

/// Whether `index` is the element some constraint forbids from standing alone
///
/// The scan mirrors the pairwise rule: a constraint matching `a` stops the
/// check for `b`, so at most one of the two is excluded per constraint.
fn exclusions(constraints: &[OrderingConstraint], a: usize, b: usize) -> (bool, bool) {
    let mut exclude_a = false;
    let mut exclude_b = false;
    for constraint in constraints {
        if constraint.second == a {
            exclude_a = true;
        } else if constraint.second == b {
            exclude_b = true;
        }
    }
    (exclude_a, exclude_b)
}

/// Power set of `{a, b}` that respects the ordering constraints
///
/// If `a < b` is a constraint then no intermediate join result may hold `b`
/// without `a`, so `{b}` is dropped. `{a, b}` is always admissible.
pub fn constrained_power_set(constraints: &[OrderingConstraint], a: usize, b: usize) -> Vec<LabelSet> {
    let (exclude_a, exclude_b) = exclusions(constraints, a, b);
    let mut sets = Vec::with_capacity(3);
    if !exclude_a {
        sets.push(vec![a]);
    }
    if !exclude_b {
        sets.push(vec![b]);
    }
    sets.push(vec![a, b]);
    sets
}

/// Power set of `{a, b, c}` for bushy groupings
///
/// Singletons and `{a, b}` are always present. `{a, c}` and `{b, c}` are
/// dropped when their first element is a constrained follower.
pub fn constrained_power_set_bushy(constraints: &[OrderingConstraint], a: usize, b: usize, c: usize) -> Vec<LabelSet> {
    let (exclude_ac, exclude_bc) = exclusions(constraints, a, b);
    let mut sets = vec![vec![a], vec![b], vec![c], vec![a, b]];
    if !exclude_ac {
        sets.push(vec![a, c]);
    }
    if !exclude_bc {
        sets.push(vec![b, c]);
    }
    sets.push(vec![a, b, c]);
    sets
}

/// Copy of `first` followed by `second`
pub fn concat_label_sets(first: &[usize], second: &[usize]) -> LabelSet {
    let mut out = Vec::with_capacity(first.len() + second.len());
    out.extend_from_slice(first);
    out.extend_from_slice(second);
    out
}

/// Appends a copy of every label-set in `from` to `into`
pub fn append_copies(into: &mut Vec<LabelSet>, from: &[LabelSet]) {
    into.extend(from.iter().cloned());
}

/// Composes two groups of candidate label-sets
///
/// An empty side is the identity ("no group composed yet"). Otherwise the
/// result keeps every set of `left`, then every set of `right`, then for each
/// set of `right` its concatenation with each set of `left`. Keeping the two
/// sides on their own is what lets a combined grouping take nothing from one
/// of the groups.
pub fn cartesian_product(left: &[LabelSet], right: &[LabelSet]) -> Vec<LabelSet> {
    if left.is_empty() {
        return right.to_vec();
    }
    if right.is_empty() {
        return left.to_vec();
    }

    let mut product = Vec::with_capacity(left.len() + right.len() + left.len() * right.len());
    append_copies(&mut product, left);
    append_copies(&mut product, right);
    for r in right {
        for l in left {
            product.push(concat_label_sets(r, l));
        }
    }
    product
}

/// Orders label-sets by ascending cardinality
pub fn cmp_by_cardinality(x: &LabelSet, y: &LabelSet) -> Ordering {
    x.len().cmp(&y.len())
}

/// Stable sort by ascending cardinality
///
/// Subset DP requires every strictly smaller subset to be resolved before a
/// larger one is split.
pub fn sort_by_cardinality(sets: &mut [LabelSet]) {
    sets.sort_by(cmp_by_cardinality);
}
