//! Max-min-fair distribution of a global budget across bucket occurrences.
//!
//! Each position of an index array names a bucket. The bucket's demand is looked up,
//! and a single water level is found such that every demand at or below the level is
//! granted in full while every larger demand is granted exactly the level, with the
//! total never exceeding the budget. Auxiliary values (e.g. a bucket's base offset)
//! are gathered alongside and passed through unmodified.
//!
//! All arithmetic happens in `i64` regardless of the [Element] type of the tables.

use crate::common::Element;

use itertools::Itertools;
use log::{debug, trace};
use std::fmt;

/// Capped demands and passed-through auxiliary values, in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationResult<T> {
    pub capped_demand: Vec<T>,
    pub passthrough_aux: Vec<T>,
    /// The level every over-demanding position was capped to.
    pub water_level: i64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("Budget must be non-negative, but was {0}")]
    InvalidBudget(i64),
    #[error("Index {value} at position {position} is outside the {table} table (length {bound})")]
    OutOfRange {
        position: usize,
        value: i64,
        bound: usize,
        table: Table,
    },
    #[error("Bucket {bucket} referenced at position {position} has negative demand {value}")]
    NegativeDemand {
        position: usize,
        bucket: usize,
        value: i64,
    },
    #[error("Expected output of length {expected}, but got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Names the lookup table whose bound an index violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Demand,
    Aux,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Table::Demand => write!(f, "demand"),
            Table::Aux => write!(f, "aux"),
        }
    }
}

impl<T: Element> AllocationResult<T> {
    pub fn len(&self) -> usize {
        self.capped_demand.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capped_demand.is_empty()
    }

    /// Sum of all capped demands.
    pub fn total(&self) -> i64 {
        self.capped_demand.iter().map(|&c| c.widen()).sum()
    }

    /// Iterate over `(capped_demand, passthrough_aux)` pairs.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (T, T)> + '_ {
        self.capped_demand
            .iter()
            .copied()
            .zip(self.passthrough_aux.iter().copied())
    }
}

/// Distribute `budget` over the buckets named by `index`.
///
/// Returns, for every position `i`, `min(demand_table[index[i]], L)` and
/// `aux_table[index[i]]`, where `L` is the max-min-fair water level (see
/// [water_level]). Fails without a partial result if any index is out of range of
/// either table, any referenced demand is negative, or `budget` is negative.
pub fn allocate<T: Element>(
    index: &[T],
    demand_table: &[T],
    aux_table: &[T],
    budget: i64,
) -> Result<AllocationResult<T>, AllocError> {
    let mut capped_demand = vec![T::default(); index.len()];
    let mut passthrough_aux = vec![T::default(); index.len()];
    let water_level = allocate_inner(
        index,
        demand_table,
        aux_table,
        budget,
        &mut capped_demand,
        &mut passthrough_aux,
    )?;
    Ok(AllocationResult {
        capped_demand,
        passthrough_aux,
        water_level,
    })
}

/// Like [allocate], but writes into caller-provided output slices.
///
/// Both outputs must have the same length as `index`. On error, neither output is
/// modified.
pub fn allocate_into<T: Element>(
    index: &[T],
    demand_table: &[T],
    aux_table: &[T],
    budget: i64,
    capped_out: &mut [T],
    aux_out: &mut [T],
) -> Result<i64, AllocError> {
    for actual in [capped_out.len(), aux_out.len()] {
        if actual != index.len() {
            return Err(AllocError::SizeMismatch {
                expected: index.len(),
                actual,
            });
        }
    }
    allocate_inner(index, demand_table, aux_table, budget, capped_out, aux_out)
}

/// Compute the water level for demands sorted in ascending order.
///
/// Scans the demands smallest-first, satisfying each one that fits under an even split
/// of what remains. The level is the even split at the first demand which does not fit
/// or, if all fit, the split computed for the last demand. An empty slice yields 0.
pub fn water_level(sorted_demand: &[i64], budget: i64) -> i64 {
    debug_assert!(sorted_demand.iter().tuple_windows().all(|(a, b)| a <= b));
    debug_assert!(budget >= 0);

    let n = sorted_demand.len();
    let mut rest = budget;
    let mut cap = 0;
    for (k, &demand) in sorted_demand.iter().enumerate() {
        let remaining_count = i64::try_from(n - k).unwrap_or(i64::MAX);
        cap = rest / remaining_count;
        if demand > cap {
            trace!("Demand {demand} at sorted position {k} exceeds level {cap}");
            break;
        }
        rest -= demand;
    }
    cap
}

fn allocate_inner<T: Element>(
    index: &[T],
    demand_table: &[T],
    aux_table: &[T],
    budget: i64,
    capped_out: &mut [T],
    aux_out: &mut [T],
) -> Result<i64, AllocError> {
    debug_assert_eq!(capped_out.len(), index.len());
    debug_assert_eq!(aux_out.len(), index.len());

    if budget < 0 {
        return Err(AllocError::InvalidBudget(budget));
    }

    // Gather and validate everything before touching the outputs.
    let mut demand = Vec::with_capacity(index.len());
    let mut aux = Vec::with_capacity(index.len());
    for (position, &raw) in index.iter().enumerate() {
        let value = raw.widen();
        let bucket = checked_bucket(position, value, demand_table.len(), Table::Demand)?;
        checked_bucket(position, value, aux_table.len(), Table::Aux)?;
        let d = demand_table[bucket];
        if d.widen() < 0 {
            return Err(AllocError::NegativeDemand {
                position,
                bucket,
                value: d.widen(),
            });
        }
        demand.push(d);
        aux.push(aux_table[bucket]);
    }

    let sorted_demand = demand
        .iter()
        .map(|d| d.widen())
        .sorted_unstable()
        .collect::<Vec<_>>();
    let cap = water_level(&sorted_demand, budget);
    debug!("Water level {cap} for {} positions and budget {budget}", index.len());

    for (out, d) in capped_out.iter_mut().zip(demand) {
        *out = if d.widen() > cap {
            // cap is below a demand of type T and non-negative, so it fits in T.
            T::narrow(cap).unwrap_or(d)
        } else {
            d
        };
    }
    aux_out.copy_from_slice(&aux);
    Ok(cap)
}

fn checked_bucket(
    position: usize,
    value: i64,
    bound: usize,
    table: Table,
) -> Result<usize, AllocError> {
    usize::try_from(value)
        .ok()
        .filter(|&b| b < bound)
        .ok_or(AllocError::OutOfRange {
            position,
            value,
            bound,
            table,
        })
}

#[cfg(test)]
pub(crate) fn arb_allocation_problem(
    max_buckets: usize,
    max_positions: usize,
    max_demand: i64,
) -> impl proptest::strategy::Strategy<Value = (Vec<i64>, Vec<i64>, Vec<i64>, i64)> {
    use proptest::prelude::*;

    (1..=max_buckets)
        .prop_flat_map(move |m| {
            (
                prop::collection::vec(0..m as i64, 0..=max_positions),
                prop::collection::vec(0..=max_demand, m),
                prop::collection::vec(any::<i32>().prop_map(i64::from), m),
                0..=(max_demand * max_positions as i64 + 1),
            )
        })
}
