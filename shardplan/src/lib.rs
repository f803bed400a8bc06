//! Router planner for sharded PostgreSQL tables.

pub mod catalog;
pub mod cli;
pub mod logger;
pub mod query;
pub mod router;

pub use router::{Error, Job, RouterPlanner, Task};
