use crate::allocator::AllocationResult;
use crate::common::Element;

use prettytable::{self, format, row};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum PrintStyle {
    Full,
    Compact,
}

/// Pretty-print an [AllocationResult] to stdout.
///
/// `index` and `demand_table` are only consulted by [PrintStyle::Full].
pub fn pprint<T: Element>(
    index: &[T],
    demand_table: &[T],
    result: &AllocationResult<T>,
    style: PrintStyle,
) {
    pprint_table(index, demand_table, result, style).printstd()
}

/// Pretty-print an [AllocationResult] to a given [fmt::Write].
pub fn pprint_write<T, W>(
    out: &mut W,
    index: &[T],
    demand_table: &[T],
    result: &AllocationResult<T>,
    style: PrintStyle,
) -> fmt::Result
where
    T: Element,
    W: fmt::Write,
{
    write!(out, "{}", pprint_table(index, demand_table, result, style))
}

pub fn pprint_string<T: Element>(
    index: &[T],
    demand_table: &[T],
    result: &AllocationResult<T>,
    style: PrintStyle,
) -> String {
    format!("{}", pprint_table(index, demand_table, result, style))
}

fn pprint_table<T: Element>(
    index: &[T],
    demand_table: &[T],
    result: &AllocationResult<T>,
    style: PrintStyle,
) -> prettytable::Table {
    let mut table = prettytable::Table::new();
    let titles = match style {
        PrintStyle::Full => row!["Position", "Bucket", "Demand", "Capped", "Aux"],
        PrintStyle::Compact => row!["Position", "Capped", "Aux"],
    };
    table.set_titles(titles);

    for (position, (capped, aux)) in result.iter().enumerate() {
        let r = match style {
            PrintStyle::Full => {
                let bucket = index.get(position);
                let demand = bucket
                    .and_then(|b| usize::try_from(b.widen()).ok())
                    .and_then(|b| demand_table.get(b));
                let bucket_str = bucket.map_or_else(|| "?".to_string(), ToString::to_string);
                let demand_str = demand.map_or_else(|| "?".to_string(), ToString::to_string);
                row![position, bucket_str, demand_str, capped, aux]
            }
            PrintStyle::Compact => row![position, capped, aux],
        };
        table.add_row(r);
    }

    // Format and print the table.
    let format = format::FormatBuilder::new()
        .separator(
            format::LinePosition::Title,
            format::LineSeparator::new('-', ' ', ' ', ' '),
        )
        .column_separator(' ')
        .build();
    table.set_format(format);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::allocate;
    use proptest::prelude::*;

    #[test]
    fn test_full_style_shows_demand_and_capped() {
        let index = [2i32, 0];
        let demand_table = [10i32, 0, 3];
        let result = allocate(&index, &demand_table, &[7, 8, 9], 8).unwrap();
        let s = pprint_string(&index, &demand_table, &result, PrintStyle::Full);
        let lines = split_cells(&s);
        assert_eq!(lines[0], ["Position", "Bucket", "Demand", "Capped", "Aux"]);
        assert_eq!(lines[2], ["0", "2", "3", "3", "9"]);
        assert_eq!(lines[3], ["1", "0", "10", "5", "7"]);
    }

    #[test]
    fn test_compact_style_omits_bucket_columns() {
        let result = allocate(&[0i64], &[4], &[1], 9).unwrap();
        let mut s = String::new();
        pprint_write(&mut s, &[0i64], &[4], &result, PrintStyle::Compact).unwrap();
        let lines = split_cells(&s);
        assert_eq!(lines[0], ["Position", "Capped", "Aux"]);
        assert_eq!(lines[2], ["0", "4", "1"]);
    }

    fn split_cells(s: &str) -> Vec<Vec<&str>> {
        s.lines()
            .map(|line| line.split_whitespace().collect())
            .collect()
    }

    proptest! {
        #[test]
        fn test_one_line_per_position(style in any::<PrintStyle>(), n in 0..16usize) {
            let index = vec![0i32; n];
            let result = allocate(&index, &[3], &[0], 10).unwrap();
            let s = pprint_string(&index, &[3], &result, style);
            prop_assert_eq!(s.lines().count(), n + 2);
        }
    }
}
