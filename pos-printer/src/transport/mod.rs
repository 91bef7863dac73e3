//! Printer transports
//!
//! A [`Transport`] knows how to reach one family of devices and hands out
//! a [`Connection`] per print job. Supports:
//! - Network printers (raw TCP, port 9100)
//! - Bluetooth serial printers (SPP over RFCOMM)
//! - USB printers (bulk-out endpoint)

mod bluetooth;
mod stream;
mod tcp;
mod usb;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::TransportError;

pub use bluetooth::{BluetoothAdapter, BluetoothTransport, RfcommAdapter, SPP_UUID, is_valid_mac};
pub use stream::StreamConnection;
pub use tcp::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, TcpTransport};
pub use usb::{UsbBackend, UsbLpBackend, UsbTransport};

/// Physical link used to reach a printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportKind {
    Bluetooth,
    Network,
    Usb,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportKind::Bluetooth => "bluetooth",
            TransportKind::Network => "network",
            TransportKind::Usb => "usb",
        };
        f.write_str(s)
    }
}

/// Where a job is printed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Bluetooth MAC address (XX:XX:XX:XX:XX:XX)
    Bluetooth { address: String },
    /// Host name or IP plus TCP port
    Network { host: String, port: u16 },
    /// Reference to an enumerated USB device
    Usb { device: String },
}

impl Destination {
    /// MAC addresses are kept upper case
    pub fn bluetooth(address: impl Into<String>) -> Self {
        Destination::Bluetooth {
            address: address.into().to_ascii_uppercase(),
        }
    }

    /// Host names are case-insensitive and kept lower case
    pub fn network(host: impl Into<String>, port: u16) -> Self {
        Destination::Network {
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    pub fn usb(device: impl Into<String>) -> Self {
        Destination::Usb {
            device: device.into(),
        }
    }

    /// Parse a destination string for the given transport kind
    ///
    /// Network destinations accept `host` or `host:port`; a missing port
    /// falls back to `default_port`.
    pub fn parse(kind: TransportKind, raw: &str, default_port: u16) -> Result<Self, TransportError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TransportError::not_found(format!(
                "empty {} destination",
                kind
            )));
        }

        match kind {
            TransportKind::Bluetooth => Ok(Destination::bluetooth(raw)),
            TransportKind::Usb => Ok(Destination::usb(raw)),
            TransportKind::Network => {
                // IPv6 literals carry colons of their own, only split "[..]:port"
                // or a single trailing ":port".
                if let Some(rest) = raw.strip_prefix('[') {
                    let (host, tail) = rest.split_once(']').ok_or_else(|| {
                        TransportError::not_found(format!("invalid address: {}", raw))
                    })?;
                    let port = match tail.strip_prefix(':') {
                        Some(p) => parse_port(p, raw)?,
                        None => default_port,
                    };
                    return Ok(Destination::network(host, port));
                }
                match raw.rsplit_once(':') {
                    Some((host, port)) if !host.contains(':') => {
                        Ok(Destination::network(host, parse_port(port, raw)?))
                    }
                    _ => Ok(Destination::network(raw, default_port)),
                }
            }
        }
    }

    /// Canonical form; two destinations naming the same device compare equal
    pub fn normalized(&self) -> Destination {
        match self {
            Destination::Bluetooth { address } => Destination::bluetooth(address.trim()),
            Destination::Network { host, port } => Destination::network(host.trim(), *port),
            Destination::Usb { device } => Destination::usb(device.trim()),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Destination::Bluetooth { .. } => TransportKind::Bluetooth,
            Destination::Network { .. } => TransportKind::Network,
            Destination::Usb { .. } => TransportKind::Usb,
        }
    }
}

fn parse_port(port: &str, raw: &str) -> Result<u16, TransportError> {
    port.parse()
        .map_err(|_| TransportError::not_found(format!("invalid port in address: {}", raw)))
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Bluetooth { address } => write!(f, "bt://{}", address),
            Destination::Network { host, port } => write!(f, "tcp://{}:{}", host, port),
            Destination::Usb { device } => write!(f, "usb://{}", device),
        }
    }
}

/// An open byte link to one printer
///
/// Exclusively owned by one session; writes are all-or-nothing.
#[async_trait]
pub trait Connection: Send {
    /// Write every byte or fail
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Flush and shut down the output stream
    async fn close_stream(&mut self) -> Result<(), TransportError>;

    /// Release the underlying link
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Close the stream, then the link
    ///
    /// Each step is guarded on its own, so a failed stream close still
    /// releases the link. Never fails and may be called repeatedly.
    async fn close(&mut self) {
        if let Err(e) = self.close_stream().await {
            warn!(error = %e, "Closing output stream failed");
        }
        if let Err(e) = self.disconnect().await {
            warn!(error = %e, "Closing connection failed");
        }
    }
}

/// Opens connections to one family of devices
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn open(&self, destination: &Destination) -> Result<Box<dyn Connection>, TransportError>;
}

/// Transport lookup by kind
#[derive(Clone, Default)]
pub struct TransportSet {
    transports: HashMap<TransportKind, Arc<dyn Transport>>,
}

impl TransportSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport under its own kind, replacing any previous one
    pub fn with(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.insert(transport.kind(), transport);
        self
    }

    pub fn insert(&mut self, transport: Arc<dyn Transport>) {
        self.transports.insert(transport.kind(), transport);
    }

    pub fn get(&self, kind: TransportKind) -> Option<Arc<dyn Transport>> {
        self.transports.get(&kind).cloned()
    }
}

impl fmt::Debug for TransportSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSet")
            .field("kinds", &self.transports.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Reject a destination that belongs to another transport
pub(crate) fn wrong_destination(expected: TransportKind, got: &Destination) -> TransportError {
    TransportError::not_found(format!(
        "{} transport cannot reach {}",
        expected, got
    ))
}
