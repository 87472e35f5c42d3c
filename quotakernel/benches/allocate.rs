use iai_callgrind::{library_benchmark, library_benchmark_group, main, LibraryBenchmarkConfig};
use std::hint::black_box;

use quotakernel::allocator::{allocate, AllocationResult};

#[export_name = "quotakernel_bench_allocate::init_tables"]
fn init_tables(n: u32) -> (Vec<i32>, Vec<i32>, Vec<i32>) {
    // Generate some "random" buckets, each referenced several times.
    let buckets = n / 4 + 1;
    let index = (0..n)
        .map(|i| i32::try_from((i * 7 + 3) % buckets).unwrap())
        .collect();
    let demand = (0..buckets)
        .map(|b| i32::try_from((b * 13 + 5) % 97).unwrap())
        .collect();
    let offsets = (0..buckets)
        .map(|b| i32::try_from(b * 128).unwrap())
        .collect();
    (index, demand, offsets)
}

#[library_benchmark]
#[bench::small(init_tables(16))]
#[bench::medium(init_tables(1024))]
#[bench::large(init_tables(8192))]
fn allocate_tables(tables: (Vec<i32>, Vec<i32>, Vec<i32>)) -> AllocationResult<i32> {
    let (index, demand, offsets) = tables;
    let budget = i64::try_from(index.len()).unwrap() * 24;
    black_box(allocate(&index, &demand, &offsets, budget).unwrap())
}

library_benchmark_group!(
    name = allocate_group;
    benchmarks = allocate_tables
);

main!(
    config = LibraryBenchmarkConfig::default()
                .raw_callgrind_args([
                    "--simulate-wb=no", "--simulate-hwpref=yes",
                    "--I1=32768,8,64", "--D1=32768,8,64", "--LL=8388608,16,64",
                ]);
    library_benchmark_groups = allocate_group
);
