//! shardplan, a router planner for sharded PostgreSQL tables.

use std::process::exit;

use clap::Parser;
use shardplan::cli::{self, Cli, Commands};
use shardplan::logger;
use tracing::{error, info};

fn main() {
    let args = Cli::parse();
    logger::init(args.json_logs);

    let result = match args.command {
        Some(Commands::Plan {
            statement,
            restrictions,
        }) => cli::plan(&args.config, &statement, restrictions.as_deref()),

        Some(Commands::Configcheck) => cli::config_check(&args.config),

        Some(Commands::Schema) => cli::schema(),

        None => {
            info!("nothing to do, see --help");
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("{}", err);
        exit(1);
    }
}
