use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::read_to_string;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

use super::error::Error;
use super::general::General;
use super::tables::{DistributedTable, PartitionMethod};
use super::workers::Worker;

/// Configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// General configuration.
    #[serde(default)]
    pub general: General,

    /// Distributed tables.
    #[serde(default)]
    pub tables: Vec<DistributedTable>,

    /// Worker nodes.
    #[serde(default)]
    pub workers: Vec<Worker>,
}

impl Config {
    /// Load configuration from disk or use defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();

        let config = match read_to_string(path) {
            Ok(source) => {
                let config: Config = match toml::from_str(&source) {
                    Ok(config) => config,
                    Err(err) => return Err(Error::config(&source, err)),
                };
                info!("loaded \"{}\"", path.display());
                config
            }

            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(
                    "\"{}\" doesn't exist, loading defaults instead",
                    path.display()
                );
                Config::default()
            }

            Err(err) => return Err(Error::Io(err)),
        };

        Ok(config)
    }

    /// Find a table by name.
    pub fn table(&self, name: &str) -> Option<&DistributedTable> {
        self.tables.iter().find(|table| table.name == name)
    }

    /// Active workers, in configuration order.
    pub fn active_workers(&self) -> impl Iterator<Item = &Worker> {
        self.workers.iter().filter(|worker| worker.active)
    }

    /// Check the configuration for mistakes the catalog can't recover from.
    pub fn check(&self) -> Result<(), Error> {
        let mut relations = HashSet::new();
        let workers = self.active_workers().count();

        if !self.tables.is_empty() && workers == 0 {
            return Err(Error::NoWorkers);
        }

        for table in &self.tables {
            if !relations.insert(table.relation_id) {
                return Err(Error::DuplicateRelation(table.relation_id));
            }

            match table.method {
                PartitionMethod::Reference => {
                    if !table.ranges.is_empty() {
                        return Err(Error::table(
                            &table.name,
                            "reference tables can't have shard ranges",
                        ));
                    }
                }

                PartitionMethod::Hash => {
                    if table.shard_count == 0 {
                        return Err(Error::table(&table.name, "shard_count must be positive"));
                    }
                    if table.column_attno.is_none() {
                        return Err(Error::table(&table.name, "column_attno is required"));
                    }
                }

                PartitionMethod::Range | PartitionMethod::Append => {
                    if table.ranges.is_empty() {
                        return Err(Error::table(
                            &table.name,
                            "range and append tables need at least one range",
                        ));
                    }
                    if table.column_attno.is_none() {
                        return Err(Error::table(&table.name, "column_attno is required"));
                    }
                }
            }

            if table.replication_factor == 0 {
                return Err(Error::table(
                    &table.name,
                    "replication_factor must be positive",
                ));
            }

            let replicas = if table.method == PartitionMethod::Reference {
                1
            } else {
                table.replication_factor
            };

            if replicas > workers {
                return Err(Error::table(
                    &table.name,
                    format!(
                        "replication_factor {} exceeds the {} active workers",
                        replicas, workers
                    ),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;
    use crate::{FlexibleType, ShardRange};

    const CONFIG: &str = r#"
[general]
enable_router_execution = false

[[workers]]
host = "10.0.0.1"

[[workers]]
host = "10.0.0.2"
port = 6432

[[tables]]
name = "events"
relation_id = 16384
column = "id"
column_attno = 1
shard_count = 8
replication_factor = 2
colocation_group = "default"

[[tables]]
name = "countries"
relation_id = 16390
method = "reference"

[[tables]]
name = "logs"
relation_id = 16400
method = "range"
column = "ts"
column_attno = 2
ranges = [
    { min = 0, max = 99 },
    { min = 100, max = 199 },
]
"#;

    #[test]
    fn test_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert!(!config.general.enable_router_execution);
        assert_eq!(config.general.shard_id_start, 102008);
        assert_eq!(config.workers.len(), 2);
        assert_eq!(config.workers[0].port, 5432);
        assert_eq!(config.workers[1].port, 6432);

        let events = config.table("events").unwrap();
        assert_eq!(events.method, PartitionMethod::Hash);
        assert_eq!(events.effective_shard_count(), 8);

        let countries = config.table("countries").unwrap();
        assert_eq!(countries.effective_shard_count(), 1);

        let logs = config.table("logs").unwrap();
        assert_eq!(
            logs.ranges[1],
            ShardRange {
                min: FlexibleType::Integer(100),
                max: FlexibleType::Integer(199),
            }
        );

        config.check().unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("shardplan.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.general.enable_router_execution);
    }

    #[test]
    fn test_load_unreadable_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_parse_error_points_at_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[general]\nenable_router_execution = \"maybe\"\n")
            .unwrap();

        let err = Config::load(file.path()).unwrap_err();
        match err {
            Error::Parse { line, snippet, .. } => {
                assert_eq!(line, 2);
                assert!(snippet.contains("maybe"));
            }
            err => panic!("unexpected error: {}", err),
        }
    }

    #[test]
    fn test_check() {
        let mut config: Config = toml::from_str(CONFIG).unwrap();
        config.tables[1].relation_id = 16384;
        assert!(matches!(
            config.check(),
            Err(Error::DuplicateRelation(16384))
        ));

        let mut config: Config = toml::from_str(CONFIG).unwrap();
        config.tables[0].replication_factor = 3;
        assert!(matches!(config.check(), Err(Error::Table(..))));

        let mut config: Config = toml::from_str(CONFIG).unwrap();
        config.workers.iter_mut().for_each(|w| w.active = false);
        assert!(matches!(config.check(), Err(Error::NoWorkers)));
    }
}
