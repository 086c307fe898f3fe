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

//! Relation identifiers and subset bitmasks
//!
//! Relation `i` of the join problem owns bit `i` of a [`RelMask`]. The mask
//! doubles as the key of the dynamic-programming table and of the planner's
//! join-relation cache.

/// Subset of relations, bit `i` set iff relation `i` is a member
pub type RelMask = u64;

/// Ordered sequence of relation indices forming one candidate grouping
pub type LabelSet = Vec<usize>;

/// Largest number of relations a single join search accepts
pub const MAX_JOIN_RELATIONS: usize = 32;

/// Mask holding only relation `index`
pub fn singleton(index: usize) -> RelMask {
    debug_assert!(index < RelMask::BITS as usize);
    1 << index
}

/// Mask holding relations `0..count`
pub fn full_mask(count: usize) -> RelMask {
    if count >= RelMask::BITS as usize { RelMask::MAX } else { (1 << count) - 1 }
}

/// OR of `1 << i` over every index of the label-set
pub fn mask_of(label_set: &[usize]) -> RelMask {
    label_set.iter().fold(0, |mask, &index| mask | singleton(index))
}

/// Indices of the set bits, ascending
pub fn members(mask: RelMask) -> Vec<usize> {
    let mut rest = mask;
    let mut out = Vec::with_capacity(mask.count_ones() as usize);
    while rest != 0 {
        let index = rest.trailing_zeros() as usize;
        out.push(index);
        rest &= rest - 1;
    }
    out
}

/// Number of relations in the mask
pub fn cardinality(mask: RelMask) -> usize {
    mask.count_ones() as usize
}

/// Whether the two masks share a relation
pub fn overlaps(a: RelMask, b: RelMask) -> bool {
    a & b != 0
}
