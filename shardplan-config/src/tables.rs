use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How rows of a distributed table are spread over its shards.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PartitionMethod {
    /// Hash of the distribution column, split into equal token ranges.
    #[default]
    Hash,
    /// Explicit value ranges of the distribution column.
    Range,
    /// Value ranges assigned as data is appended.
    Append,
    /// Unpartitioned table replicated as a single shard.
    Reference,
}

/// Hash function used to turn distribution column values into tokens.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Hasher {
    /// Same hash PostgreSQL uses for hash partitioning.
    #[default]
    Postgres,
    /// First four bytes of the SHA-1 digest.
    Sha1,
}

/// Bound value of a range shard.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Eq, Hash, JsonSchema)]
#[serde(untagged)]
pub enum FlexibleType {
    Integer(i64),
    Uuid(uuid::Uuid),
    String(String),
}

impl From<i64> for FlexibleType {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<uuid::Uuid> for FlexibleType {
    fn from(value: uuid::Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<String> for FlexibleType {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for FlexibleType {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// Inclusive bounds of one range or append shard.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ShardRange {
    pub min: FlexibleType,
    pub max: FlexibleType,
}

/// Distributed table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct DistributedTable {
    /// Table name.
    pub name: String,
    /// Identifier statements use to reference this table.
    pub relation_id: u32,
    /// Partition method.
    #[serde(default)]
    pub method: PartitionMethod,
    /// Distribution column. Ignored for reference tables.
    #[serde(default)]
    pub column: Option<String>,
    /// Attribute number (1-based) of the distribution column.
    #[serde(default)]
    pub column_attno: Option<u16>,
    /// Number of shards. Hash tables only; range and append tables
    /// take it from `ranges`, reference tables always have one.
    #[serde(default = "DistributedTable::shard_count")]
    pub shard_count: usize,
    /// Number of placements per shard.
    #[serde(default = "DistributedTable::replication_factor")]
    pub replication_factor: usize,
    /// Tables in the same group are co-located: same shard count and
    /// identical placements for shards at the same position.
    #[serde(default)]
    pub colocation_group: Option<String>,
    /// Explicit shard bounds for range and append tables.
    #[serde(default)]
    pub ranges: Vec<ShardRange>,
    /// Hash function.
    #[serde(default)]
    pub hasher: Hasher,
}

impl Default for DistributedTable {
    fn default() -> Self {
        Self {
            name: String::new(),
            relation_id: 0,
            method: PartitionMethod::default(),
            column: None,
            column_attno: None,
            shard_count: Self::shard_count(),
            replication_factor: Self::replication_factor(),
            colocation_group: None,
            ranges: vec![],
            hasher: Hasher::default(),
        }
    }
}

impl DistributedTable {
    fn shard_count() -> usize {
        4
    }

    fn replication_factor() -> usize {
        1
    }

    /// Number of shards this table will be created with.
    pub fn effective_shard_count(&self) -> usize {
        match self.method {
            PartitionMethod::Hash => self.shard_count,
            PartitionMethod::Range | PartitionMethod::Append => self.ranges.len(),
            PartitionMethod::Reference => 1,
        }
    }
}
