#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use serde::Serialize;

use std::path;

use quotakernel::allocator::AllocationResult;
use quotakernel::common::Dtype;
use quotakernel::kernel::{BucketLimitKernel, BufferElement, HostBuffer, KernelOutputs};
use quotakernel::pprint::{pprint, PrintStyle};
use quotakernel::problem::Problem;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Table style
    #[arg(long, value_enum, default_value_t = PrintStyle::Compact)]
    style: PrintStyle,

    /// Disable verification
    #[cfg(feature = "verification")]
    #[arg(long, default_value_t = false)]
    skip_check: bool,

    #[command(subcommand)]
    subcmd: Subcommand,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand)]
enum Subcommand {
    /// Allocate the budget described by a JSON problem file
    Run { problem: path::PathBuf },

    /// Allocate a budget given on the command line
    Inline {
        #[arg(long, allow_hyphen_values = true)]
        budget: i64,
        /// Bucket referenced by each position
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        index: Vec<i64>,
        /// Demand of each bucket
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        demand: Vec<i64>,
        /// Auxiliary value (e.g. offset) of each bucket
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        aux: Vec<i64>,
        /// Element type of the buffers
        #[arg(long, value_enum, default_value_t = Dtype::default())]
        dtype: Dtype,
    },
}

#[derive(Serialize)]
struct JsonOutput<'a, T> {
    water_level: i64,
    total: i64,
    capped_demand: &'a [T],
    passthrough_aux: &'a [T],
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let problem = match &args.subcmd {
        Subcommand::Run { problem } => Problem::load(problem)
            .with_context(|| format!("Failed to load problem {}", problem.display()))?,
        Subcommand::Inline {
            budget,
            index,
            demand,
            aux,
            dtype,
        } => Problem {
            dtype: *dtype,
            index: index.clone(),
            demand: demand.clone(),
            aux: aux.clone(),
            budget: *budget,
        },
    };
    match problem.dtype {
        Dtype::Sint32 => main_per_dtype::<i32>(&args, &problem),
        Dtype::Uint32 => main_per_dtype::<u32>(&args, &problem),
        Dtype::Sint64 => main_per_dtype::<i64>(&args, &problem),
    }
}

fn main_per_dtype<T>(args: &Args, problem: &Problem) -> Result<()>
where
    T: BufferElement + Serialize,
{
    info!(
        "Allocating budget {} over {} positions ({})",
        problem.budget,
        problem.index.len(),
        problem.dtype
    );

    let kernel = BucketLimitKernel::from_attrs(&problem.attrs())?;
    let inputs = problem.to_inputs()?;
    let mut outputs = KernelOutputs::for_inputs(&inputs)?;
    let water_level = kernel.compute(&inputs, &mut outputs)?;

    let index = typed::<T>(inputs.index.as_ref(), "index")?;
    let count = typed::<T>(inputs.count.as_ref(), "count")?;
    let result = AllocationResult {
        capped_demand: typed_vec::<T>(outputs.limited_count, "limited_count")?,
        passthrough_aux: typed_vec::<T>(outputs.offset, "offset")?,
        water_level,
    };

    #[cfg(feature = "verification")]
    if !args.skip_check {
        let offset = typed::<T>(inputs.offset.as_ref(), "offset")?;
        quotakernel::verification::check_allocation(index, count, offset, problem.budget, &result)
            .context("Allocation failed correctness check")?;
    }

    match args.format {
        OutputFormat::Table => pprint(index, count, &result, args.style),
        OutputFormat::Json => {
            let out = JsonOutput {
                water_level: result.water_level,
                total: result.total(),
                capped_demand: &result.capped_demand,
                passthrough_aux: &result.passthrough_aux,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

fn typed<'a, T: BufferElement>(buffer: Option<&'a HostBuffer>, name: &str) -> Result<&'a [T]> {
    buffer
        .and_then(HostBuffer::as_slice)
        .with_context(|| format!("Buffer '{name}' does not hold {}", T::DTYPE))
}

fn typed_vec<T: BufferElement>(buffer: HostBuffer, name: &str) -> Result<Vec<T>> {
    buffer
        .into_vec()
        .with_context(|| format!("Buffer '{name}' does not hold {}", T::DTYPE))
}
