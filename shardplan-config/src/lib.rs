// Submodules
pub mod core;
pub mod error;
pub mod general;
pub mod tables;
pub mod workers;

pub use core::Config;
pub use error::Error;
pub use general::General;
pub use tables::{DistributedTable, FlexibleType, Hasher, PartitionMethod, ShardRange};
pub use workers::Worker;
