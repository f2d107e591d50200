use std::process::ExitCode;

use brayns_config::{Config, ConfigError};
use braynsd::{TaskDispatcher, builtin_registry, run_daemon};

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(ConfigError::Arguments(error)) => error.exit(),
        Err(error) => {
            eprintln!("braynsd: {error}");
            return ExitCode::FAILURE;
        }
    };

    match run_daemon(&config, TaskDispatcher::new(builtin_registry())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("braynsd: {error}");
            ExitCode::FAILURE
        }
    }
}
