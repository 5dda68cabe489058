//! `logwire-server`: the collector binary.

use std::{process::ExitCode, sync::Arc};

use log::{error, info};

use logwire::{
    FormattedLogAdapter, LoggerServer, ServerConfig, ViewerDispatcher,
    server::{ArgsConfigSource, EnvConfigSource},
};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = ArgsConfigSource::new(std::env::args().skip(1));
    let config = match ServerConfig::resolve(&args, &EnvConfigSource::process()) {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {err}");
            return ExitCode::from(2);
        }
    };
    let adapter = match FormattedLogAdapter::open_with_format(&config.log_file, config.log_format) {
        Ok(adapter) => Arc::new(adapter),
        Err(err) => {
            error!("cannot open {}: {err}", config.log_file.display());
            return ExitCode::from(2);
        }
    };
    info!(
        "writing {} records to {}",
        config.log_format,
        config.log_file.display()
    );

    let dispatcher = Arc::new(ViewerDispatcher::new());
    let server = match LoggerServer::start(&config, adapter, Arc::clone(&dispatcher)) {
        Ok(server) => server,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    server.wait();
    dispatcher.shutdown();
    ExitCode::SUCCESS
}
