mod logger;
mod server;

use clap::Parser;
use log::{error, info};
use server::HttpServer;
use server::config::ServerConfig;
use server::error::StartupError;
use server::root::ServedRoot;

fn main() {
    let config = ServerConfig::parse();

    if let Err(e) = run(&config) {
        match e {
            StartupError::Logger { .. } => eprintln!("{}", e),
            _ => error!("{}", e),
        }
        std::process::exit(1);
    }
}

fn run(config: &ServerConfig) -> Result<(), StartupError> {
    logger::init(config)?;
    info!("Starting portal server with config: {:?}", config);

    let root = match &config.root {
        Some(dir) => ServedRoot::from_dir(dir)?,
        None => ServedRoot::resolve()?,
    };
    root.verify_required(&config.required_files)?;

    let server = HttpServer::new(config, root)?;
    server.run();

    Ok(())
}
