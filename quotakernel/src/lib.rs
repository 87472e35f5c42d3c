pub mod allocator;
pub mod common;
pub mod kernel;
pub mod pprint;
pub mod problem;
#[cfg(feature = "verification")]
pub mod verification;

pub use allocator::{allocate, allocate_into, water_level, AllocError, AllocationResult};
