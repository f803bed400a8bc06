//! Mapping distribution column values and predicates to shards.

pub mod equivalence;
pub mod fast_path;
pub mod hasher;
pub mod pruning;

pub use equivalence::{derive_equalities, equivalent_vars, make_ands};
pub use fast_path::{fast_path_possible, find_shard_interval};
pub use hasher::token;
pub use pruning::prune_shard_list;
