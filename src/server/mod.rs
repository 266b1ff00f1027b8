pub mod config;
pub mod error;
pub mod http_status;
pub mod mime;
pub mod path_mapper;
mod request_handler;
pub mod responder;
pub mod root;

use log::{debug, error, info, warn};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use threadpool::ThreadPool;

use config::ServerConfig;
use error::StartupError;
use request_handler::handle_client;
use root::ServedRoot;

pub struct HttpServer {
    config: ServerConfig,
    root: Arc<ServedRoot>,
    listener: TcpListener,
    thread_pool: ThreadPool,
}

impl HttpServer {
    pub fn new(config: &ServerConfig, root: ServedRoot) -> Result<Self, StartupError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).map_err(|source| StartupError::Bind {
            addr: addr.clone(),
            source,
        })?;

        info!("Server started on {}", addr);

        let thread_pool = ThreadPool::new(config.threads.max(1));

        Ok(Self {
            config: config.clone(),
            root: Arc::new(root),
            listener,
            thread_pool,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the process is terminated.
    pub fn run(&self) {
        let port = self
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or(self.config.port);

        info!(
            "Server running with {} threads, serving {}",
            self.thread_pool.max_count(),
            self.root
        );
        info!("Portal running at http://localhost:{}/index.html", port);

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => self.dispatch(stream),
                Err(e) => error!("Error accepting connection: {}", e),
            }
        }
    }

    fn dispatch(&self, stream: TcpStream) {
        if let Ok(addr) = stream.peer_addr() {
            debug!("New connection from {}", addr);
        }

        let timeout = Duration::from_secs(self.config.io_timeout.max(1));
        if let Err(e) = stream.set_write_timeout(Some(timeout)) {
            warn!("Failed to set connection write timeout: {}", e);
        }

        let root = Arc::clone(&self.root);
        let max_request_size = self.config.max_request_size;

        self.thread_pool.execute(move || {
            handle_client(stream, &root, max_request_size, timeout);
        });
    }
}
