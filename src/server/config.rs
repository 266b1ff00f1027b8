use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Host to bind (all interfaces by default)
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8787)]
    pub port: u16,

    /// Number of worker threads in the pool
    #[arg(short, long, default_value_t = 10)]
    pub threads: usize,

    /// Serve this directory instead of discovering the portal root
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// File that must exist under the served root (repeatable)
    #[arg(long = "require", value_name = "REL_PATH")]
    pub required_files: Vec<PathBuf>,

    /// Largest accepted request head in bytes
    #[arg(long, default_value_t = 8192)]
    pub max_request_size: usize,

    /// Read/write timeout per connection in seconds
    #[arg(long, default_value_t = 5)]
    pub io_timeout: u64,

    /// Log file, appended to
    #[arg(long, default_value = "server.log")]
    pub log_file: PathBuf,

    /// IANA timezone for log timestamps
    #[arg(long, default_value = "UTC", value_parser = parse_timezone)]
    pub log_timezone: Tz,
}

fn parse_timezone(name: &str) -> Result<Tz, String> {
    name.parse::<Tz>()
        .map_err(|_| format!("unknown timezone: {}", name))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            threads: 10,
            root: None,
            required_files: Vec::new(),
            max_request_size: 8192,
            io_timeout: 5,
            log_file: PathBuf::from("server.log"),
            log_timezone: Tz::UTC,
        }
    }
}
