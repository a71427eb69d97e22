//! ItemSQL Shell Entry Point

use itemsql_shell::command::CONFIG_ENV;
use itemsql_shell::{
    OutputFormat, ShellCommand, VirtualDataStore, load_config, render_json, render_text,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let config = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = match ShellCommand::from_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let store = match VirtualDataStore::new(&config) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to create data store: {}", e);
            std::process::exit(1);
        }
    };

    info!("{}", command.request);

    let result = match command.run(&store) {
        Ok(result) => result,
        Err(e) => {
            error!("Query failed: {}", e);
            std::process::exit(1);
        }
    };

    match command.format {
        OutputFormat::Text => println!("{}", render_text(&result)),
        OutputFormat::Json => match render_json(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        },
    }
}
