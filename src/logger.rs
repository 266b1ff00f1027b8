use ansi_term::Colour;
use env_logger::{Builder, Env};
use std::{fmt::Display, fs::OpenOptions, io::Write};

use crate::server::config::ServerConfig;
use crate::server::error::StartupError;

/// Logs to stderr with coloured levels and appends plain lines to the log file.
pub fn init(config: &ServerConfig) -> Result<(), StartupError> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .map_err(|source| StartupError::Logger {
            path: config.log_file.clone(),
            source,
        })?;
    let timezone = config.log_timezone;

    Builder::from_env(Env::default().default_filter_or("info"))
        .format(move |buf, record| {
            let timestamp = chrono::Utc::now()
                .with_timezone(&timezone)
                .format("%Y-%m-%dT%H:%M:%S%:z");

            let colour = match record.level() {
                log::Level::Error => Colour::Red,
                log::Level::Warn => Colour::Yellow,
                log::Level::Info => Colour::Green,
                log::Level::Debug => Colour::Blue,
                log::Level::Trace => Colour::Purple,
            };
            let level = colour.paint(record.level().to_string());

            let line = |level: &dyn Display| {
                format!(
                    "[{} {} {}] {}",
                    timestamp,
                    level,
                    record.module_path().unwrap_or_default(),
                    record.args()
                )
            };

            writeln!(&log_file, "{}", line(&record.level()))?;
            writeln!(buf, "{}", line(&level))
        })
        .init();

    Ok(())
}
