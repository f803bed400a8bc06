use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use shardplan_config::Config;
use thiserror::Error;
use tracing::{error, info};

use crate::catalog::{self, Catalog, LockManager, ShardLocks};
use crate::query::Query;
use crate::router::{self, RestrictionContext, RouterPlanner};

/// Router planner for sharded PostgreSQL tables.
#[derive(Parser, Debug)]
#[command(name = "", version = concat!("shardplan v", env!("CARGO_PKG_VERSION")))]
pub struct Cli {
    /// Path to the configuration file. Default: "shardplan.toml"
    #[arg(short, long, default_value = "shardplan.toml")]
    pub config: PathBuf,
    /// Log in JSON format.
    #[arg(long)]
    pub json_logs: bool,
    /// Subcommand.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Plan an analyzed statement and print the resulting job.
    Plan {
        /// JSON file with the analyzed statement.
        #[arg(short, long)]
        statement: PathBuf,

        /// JSON file with the restrictions of the relations the statement reads.
        #[arg(short, long)]
        restrictions: Option<PathBuf>,
    },

    /// Check the configuration file for errors.
    Configcheck,

    /// Print the JSON schema of the configuration file.
    Schema,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Config(#[from] shardplan_config::Error),

    #[error("{0}")]
    Catalog(#[from] catalog::Error),

    #[error("{0}")]
    Router(#[from] router::Error),

    #[error("I/O error on `{0}`: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("JSON error in `{0}`: {1}")]
    Json(PathBuf, #[source] serde_json::Error),

    #[error("{0}")]
    Output(#[from] serde_json::Error),
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let source = read_to_string(path).map_err(|err| Error::Io(path.to_owned(), err))?;
    serde_json::from_str(&source).map_err(|err| Error::Json(path.to_owned(), err))
}

/// Plan one statement against the configured tables.
#[allow(clippy::print_stdout)]
pub fn plan(
    config_path: &Path,
    statement: &Path,
    restrictions: Option<&Path>,
) -> Result<(), Error> {
    let config = Config::load(config_path)?;
    let catalog = Catalog::from_config(&config)?;

    let query: Query = read_json(statement)?;
    let context: RestrictionContext = match restrictions {
        Some(path) => read_json(path)?,
        None => RestrictionContext::default(),
    };

    let locks = ShardLocks::new(LockManager::new());
    let planner = RouterPlanner::new(&catalog, &locks, &config.general);

    match planner.plan(&query, &context) {
        Ok(Some(job)) => {
            info!(
                "planned {} tasks, holding {} shard locks",
                job.tasks.len(),
                locks.held().len()
            );
            println!("{}", serde_json::to_string_pretty(&job)?);
        }

        Ok(None) => println!("not routable"),

        Err(err) => {
            if let Some(detail) = err.detail() {
                error!("detail: {}", detail);
            }
            if let Some(hint) = err.hint() {
                error!("hint: {}", hint);
            }
            return Err(err.into());
        }
    }

    Ok(())
}

/// Confirm the configuration file parses and describes a valid cluster.
pub fn config_check(config_path: &Path) -> Result<(), Error> {
    let source =
        read_to_string(config_path).map_err(|err| Error::Io(config_path.to_owned(), err))?;
    let config: Config = toml::from_str(&source)
        .map_err(|err| shardplan_config::Error::config(&source, err))?;

    let catalog = Catalog::from_config(&config)?;
    info!(
        "\"{}\" is valid: {} tables",
        config_path.display(),
        catalog.tables().count()
    );

    Ok(())
}

#[allow(clippy::print_stdout)]
pub fn schema() -> Result<(), Error> {
    let schema = schemars::schema_for!(Config);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    const CONFIG: &str = r#"
[[workers]]
host = "10.0.0.1"

[[workers]]
host = "10.0.0.2"

[[tables]]
name = "t"
relation_id = 1
column = "id"
column_attno = 1
shard_count = 4
replication_factor = 2
"#;

    fn file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_config_check() {
        let config = file(CONFIG);
        config_check(config.path()).unwrap();

        let broken = file("[[tables]]\nname = \"t\"\nrelation_id = \"one\"\n");
        assert!(matches!(
            config_check(broken.path()),
            Err(Error::Config(shardplan_config::Error::Parse { line: 3, .. }))
        ));

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            config_check(&dir.path().join("missing.toml")),
            Err(Error::Io(..))
        ));
    }

    #[test]
    fn test_plan_from_files() {
        let config = file(CONFIG);
        let statement = file(
            r#"{
                "command": "insert",
                "range_table": [{ "kind": "relation", "relation_id": 1 }],
                "result_relation": 1,
                "target_list": [
                    { "resno": 1, "expr": { "const": { "integer": 5 } } }
                ]
            }"#,
        );

        plan(config.path(), statement.path(), None).unwrap();

        let broken = file("{");
        assert!(matches!(
            plan(config.path(), broken.path(), None),
            Err(Error::Json(..))
        ));
    }
}
