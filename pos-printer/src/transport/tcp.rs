//! Network printer transport (raw TCP, port 9100)
//!
//! Most thermal and label printers accept raw ESC/POS or ZPL on port 9100.
//! Every job opens its own socket; nothing is pooled.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpStream, lookup_host};
use tracing::{debug, info, instrument, warn};

use super::{Connection, Destination, StreamConnection, Transport, TransportKind, wrong_destination};
use crate::error::TransportError;

/// Default raw printing port
pub const DEFAULT_PORT: u16 = 9100;

/// Connect timeout applied to every open
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Raw TCP transport
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Resolve and connect, both bounded by the connect timeout
    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, TransportError> {
        let target = format!("{}:{}", host, port);
        with_deadline(
            self.connect_timeout,
            &target,
            resolve_and_connect(host, port, &target),
        )
        .await
    }
}

async fn with_deadline<T>(
    limit: Duration,
    target: &str,
    fut: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| TransportError::timeout(format!("Connection timeout: {}", target)))?
}

/// Try every resolved address in order; the last failure is reported
async fn resolve_and_connect(
    host: &str,
    port: u16,
    target: &str,
) -> Result<TcpStream, TransportError> {
    let addrs = lookup_host((host, port))
        .await
        .map_err(|e| TransportError::not_found(format!("{}: {}", target, e)))?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "Connect attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(match last_err {
        Some(e) => TransportError::from_open_io(target, &e),
        None => TransportError::not_found(format!("{}: no address", target)),
    })
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Network
    }

    #[instrument(skip(self), fields(destination = %destination))]
    async fn open(&self, destination: &Destination) -> Result<Box<dyn Connection>, TransportError> {
        let Destination::Network { host, port } = destination else {
            return Err(wrong_destination(TransportKind::Network, destination));
        };

        info!("Connecting to printer");
        let stream = self.connect(host, *port).await?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }
        info!("Connected");

        Ok(Box::new(StreamConnection::new(destination.to_string(), stream)))
    }
}
