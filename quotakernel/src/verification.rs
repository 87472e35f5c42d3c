//! Checks an [AllocationResult] against its inputs.
//!
//! This is a little extra defense against bugs in the sort-and-scan allocator: the
//! result is compared with an independently formulated water-fill and with the
//! properties any max-min-fair allocation must have.

use crate::allocator::AllocationResult;
use crate::common::Element;

use itertools::izip;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Violation {
    #[error("Expected {expected} positions, but the result has {actual}")]
    Length { expected: usize, actual: usize },
    #[error("Position {0} references a bucket outside the tables")]
    Unresolvable(usize),
    #[error("Total allocation {total} exceeds the budget {budget}")]
    OverBudget { total: i64, budget: i64 },
    #[error("Position {position} was allocated {capped}, outside [0, {demand}]")]
    OverDemand {
        position: usize,
        capped: i64,
        demand: i64,
    },
    #[error("Position {position} has aux {actual}, but its bucket's aux is {expected}")]
    AuxChanged {
        position: usize,
        expected: i64,
        actual: i64,
    },
    #[error("Capped positions do not share one level (found {0} and {1})")]
    UnevenLevel(i64, i64),
    #[error("Level {0} could be raised without exceeding the budget")]
    LevelNotMaximal(i64),
    #[error("Position {position} was allocated {actual}, but the reference gives {expected}")]
    ReferenceMismatch {
        position: usize,
        expected: i64,
        actual: i64,
    },
}

/// Max-min-fair allocation by repeated locking.
///
/// Splits the pool evenly over the unlocked demands. Every demand that fits under the
/// split is locked at its full value and removed from the pool. This repeats until no
/// further demand fits, at which point each remaining demand receives the split.
pub fn reference_water_fill(demands: &[i64], budget: i64) -> Vec<i64> {
    let mut result = vec![0; demands.len()];
    let mut locked = vec![false; demands.len()];
    let mut pool = budget;

    loop {
        let competing = (0..demands.len())
            .filter(|&i| !locked[i])
            .collect::<Vec<_>>();
        if competing.is_empty() {
            break;
        }
        let share = pool / i64::try_from(competing.len()).unwrap_or(i64::MAX);

        let mut newly_locked = false;
        for &i in &competing {
            if demands[i] <= share {
                result[i] = demands[i];
                locked[i] = true;
                pool -= demands[i];
                newly_locked = true;
            }
        }

        if !newly_locked {
            for &i in &competing {
                result[i] = share;
            }
            break;
        }
    }
    result
}

/// Check that `result` is the max-min-fair allocation of `budget` for these inputs.
pub fn check_allocation<T: Element>(
    index: &[T],
    demand_table: &[T],
    aux_table: &[T],
    budget: i64,
    result: &AllocationResult<T>,
) -> Result<(), Violation> {
    let outcome = check_inner(index, demand_table, aux_table, budget, result);
    match &outcome {
        Ok(()) => log::debug!("Allocation passed correctness check"),
        Err(violation) => log::debug!("Allocation failed correctness check: {violation}"),
    }
    outcome
}

fn check_inner<T: Element>(
    index: &[T],
    demand_table: &[T],
    aux_table: &[T],
    budget: i64,
    result: &AllocationResult<T>,
) -> Result<(), Violation> {
    for actual in [result.capped_demand.len(), result.passthrough_aux.len()] {
        if actual != index.len() {
            return Err(Violation::Length {
                expected: index.len(),
                actual,
            });
        }
    }

    let mut demands = Vec::with_capacity(index.len());
    for (position, (&b, &capped, &aux)) in
        izip!(index, &result.capped_demand, &result.passthrough_aux).enumerate()
    {
        let bucket = usize::try_from(b.widen()).map_err(|_| Violation::Unresolvable(position))?;
        let (Some(&demand), Some(&expected_aux)) =
            (demand_table.get(bucket), aux_table.get(bucket))
        else {
            return Err(Violation::Unresolvable(position));
        };
        let (demand, capped) = (demand.widen(), capped.widen());
        if capped < 0 || capped > demand {
            return Err(Violation::OverDemand {
                position,
                capped,
                demand,
            });
        }
        if aux != expected_aux {
            return Err(Violation::AuxChanged {
                position,
                expected: expected_aux.widen(),
                actual: aux.widen(),
            });
        }
        demands.push(demand);
    }

    let total = result.total();
    if total > budget {
        return Err(Violation::OverBudget { total, budget });
    }

    let mut level = None;
    for (&demand, capped) in demands.iter().zip(&result.capped_demand) {
        let capped = capped.widen();
        if capped < demand {
            match level {
                None => level = Some(capped),
                Some(l) if l != capped => return Err(Violation::UnevenLevel(l, capped)),
                Some(_) => {}
            }
        }
    }
    if let Some(l) = level {
        // A sum past i64::MAX is past any budget.
        let raised = demands
            .iter()
            .try_fold(0i64, |acc, &d| acc.checked_add(d.min(l + 1)));
        if raised.is_some_and(|r| r <= budget) {
            return Err(Violation::LevelNotMaximal(l));
        }
    }

    let reference = reference_water_fill(&demands, budget);
    for (position, (&expected, capped)) in
        reference.iter().zip(&result.capped_demand).enumerate()
    {
        if expected != capped.widen() {
            return Err(Violation::ReferenceMismatch {
                position,
                expected,
                actual: capped.widen(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{allocate, arb_allocation_problem};
    use proptest::prelude::*;

    #[test]
    fn test_reference_water_fill_scenarios() {
        assert_eq!(reference_water_fill(&[10, 10, 10], 15), vec![5, 5, 5]);
        assert_eq!(reference_water_fill(&[2, 10, 10], 15), vec![2, 6, 6]);
        assert_eq!(reference_water_fill(&[5, 5, 5], 100), vec![5, 5, 5]);
        assert_eq!(reference_water_fill(&[], 100), Vec::<i64>::new());
        assert_eq!(reference_water_fill(&[3, 0, 2], 0), vec![0, 0, 0]);
    }

    #[test]
    fn test_check_rejects_over_budget_result() {
        let tampered = AllocationResult {
            capped_demand: vec![5i32, 5, 6],
            passthrough_aux: vec![0, 0, 0],
            water_level: 5,
        };
        let err = check_allocation(&[0, 1, 2], &[10, 10, 10], &[0, 0, 0], 15, &tampered);
        assert_eq!(err, Err(Violation::OverBudget { total: 16, budget: 15 }));
    }

    #[test]
    fn test_check_rejects_wasteful_result() {
        let tampered = AllocationResult {
            capped_demand: vec![2i32, 5, 5],
            passthrough_aux: vec![0, 0, 0],
            water_level: 5,
        };
        let err = check_allocation(&[0, 1, 2], &[2, 10, 10], &[0, 0, 0], 15, &tampered);
        assert_eq!(err, Err(Violation::LevelNotMaximal(5)));
    }

    #[test]
    fn test_check_rejects_altered_aux() {
        let tampered = AllocationResult {
            capped_demand: vec![1i64],
            passthrough_aux: vec![8],
            water_level: 1,
        };
        let err = check_allocation(&[0], &[1], &[7], 1, &tampered);
        assert_eq!(
            err,
            Err(Violation::AuxChanged {
                position: 0,
                expected: 7,
                actual: 8
            })
        );
    }

    #[test]
    fn test_check_rejects_uneven_levels() {
        let tampered = AllocationResult {
            capped_demand: vec![4u32, 6],
            passthrough_aux: vec![0, 0],
            water_level: 6,
        };
        let err = check_allocation(&[0, 1], &[10, 10], &[0, 0], 10, &tampered);
        assert_eq!(err, Err(Violation::UnevenLevel(4, 6)));
    }

    #[test]
    fn test_check_accepts_allocation_near_i64_max() {
        let (index, demand, aux) = ([0i64, 1], [i64::MAX, i64::MAX], [0, 0]);
        let result = allocate(&index, &demand, &aux, i64::MAX).unwrap();
        assert_eq!(result.water_level, i64::MAX / 2);
        assert_eq!(check_allocation(&index, &demand, &aux, i64::MAX, &result), Ok(()));
    }

    proptest! {
        #[test]
        fn test_allocate_passes_check(
            (index, demand, aux, budget) in arb_allocation_problem(8, 24, 50)
        ) {
            let result = allocate(&index, &demand, &aux, budget).unwrap();
            prop_assert_eq!(check_allocation(&index, &demand, &aux, budget, &result), Ok(()));
        }
    }
}
