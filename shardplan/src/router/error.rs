//! Router planning errors.

use thiserror::Error;

use crate::catalog::{RelationId, ShardId};

/// Statement constructs the router refuses to plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Unsupported {
    #[error("Subqueries are not supported in distributed modifications.")]
    Subqueries,

    #[error("Common table expressions are not supported in distributed modifications.")]
    CommonTableExpressions,

    #[error("Joins are not supported in distributed modifications.")]
    Joins,

    #[error("Functions must not appear in the FROM clause of a distributed modifications.")]
    FunctionInFrom,

    #[error("Unrecognized range table entry.")]
    UnrecognizedRangeTableEntry,

    #[error("Multi-row INSERTs to distributed tables are not supported.")]
    MultiRowInsert,

    #[error("functions used in UPDATE queries on distributed tables must not be VOLATILE")]
    VolatileUpdate,

    #[error("values given for the partition column must be constants or constant expressions")]
    NonConstantPartitionValue,

    #[error(
        "functions used in the WHERE clause of modification queries on distributed tables must not be VOLATILE"
    )]
    VolatileWhere,

    #[error("STABLE functions used in UPDATE queries cannot be called with column references")]
    StableWithColumnReference,

    #[error("non-IMMUTABLE functions are not allowed in CASE or COALESCE statements")]
    BadCoalesce,

    #[error("non-IMMUTABLE functions are not allowed in the RETURNING clause")]
    MutableReturning,

    #[error(
        "functions used in the DO UPDATE SET clause of INSERTs on distributed tables must be marked IMMUTABLE"
    )]
    MutableOnConflictSet,

    #[error(
        "functions used in the WHERE clause of the ON CONFLICT clause of INSERTs on distributed tables must be marked IMMUTABLE"
    )]
    MutableOnConflictWhere,

    #[error("modifying the partition value of rows is not allowed")]
    PartitionValueChanged,

    #[error("Volatile functions are not allowed in INSERT ... SELECT queries")]
    InsertSelectVolatile,

    #[error("LIMIT clauses are not allowed in INSERT ... SELECT queries")]
    InsertSelectLimit,

    #[error("OFFSET clauses are not allowed in INSERT ... SELECT queries")]
    InsertSelectOffset,

    #[error("Window functions are not allowed in INSERT ... SELECT queries")]
    InsertSelectWindow,

    #[error("Set operations are not allowed in INSERT ... SELECT queries")]
    InsertSelectSetOperations,

    #[error("Grouping sets are not allowed in INSERT ... SELECT queries")]
    InsertSelectGroupingSets,

    #[error("DISTINCT ON clauses are not allowed in INSERT ... SELECT queries")]
    InsertSelectDistinctOn,

    #[error(
        "If data inserted into a reference table, all of the participating tables in the INSERT INTO ... SELECT query should be reference tables."
    )]
    ReferenceTargetSource,

    #[error(
        "SELECT query should return bare partition column on the same ordinal position as the INSERT's partition column"
    )]
    PartitionColumnMismatch,

    #[error(
        "INSERT target table and the source relation of the SELECT partition column value must be colocated"
    )]
    NotColocated,

    #[error("Select query cannot be pushed down to the worker.")]
    SelectNotPushable,

    #[error("Insert query cannot be executed on all placements for shard {0}")]
    PlacementMismatch(ShardId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Statement uses something the router never supports.
    Unsupported,
    /// A value required for routing is missing.
    Data,
    /// Distribution metadata is missing or incomplete.
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("cannot perform distributed planning for the given modification: {0}")]
    Modification(Unsupported),

    #[error("distributed modifications must target exactly one shard")]
    ExactlyOneShard {
        detail: Option<String>,
        hint: String,
    },

    #[error("cannot plan INSERT using row with NULL value in partition column")]
    NullPartitionValue,

    #[error("could not find any shards")]
    NoShards { table: String },

    #[error("relation {0} is not a distributed table")]
    UnknownRelation(RelationId),

    #[error("modification has no target relation")]
    NoTargetRelation,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Modification(_) | Self::ExactlyOneShard { .. } => ErrorKind::Unsupported,
            Self::NullPartitionValue => ErrorKind::Data,
            Self::NoShards { .. } | Self::UnknownRelation(_) | Self::NoTargetRelation => {
                ErrorKind::Metadata
            }
        }
    }

    /// Additional context shown below the message.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::ExactlyOneShard { detail, .. } => detail.clone(),
            Self::NoShards { table } => {
                Some(format!("No shards exist for distributed table \"{}\".", table))
            }
            _ => None,
        }
    }

    /// How to work around the error.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::ExactlyOneShard { hint, .. } => Some(hint.clone()),
            Self::NoShards { .. } => {
                Some("Run master_create_worker_shards to create shards and try again.".into())
            }
            _ => None,
        }
    }
}

impl From<Unsupported> for Error {
    fn from(value: Unsupported) -> Self {
        Self::Modification(value)
    }
}
