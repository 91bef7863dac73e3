//! USB printer transport
//!
//! Device enumeration happens elsewhere; this transport only opens the
//! bulk-out endpoint of an already known device reference.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tracing::{info, instrument};

use super::{Connection, Destination, StreamConnection, Transport, TransportKind, wrong_destination};
use crate::error::TransportError;

/// Platform USB access
#[async_trait]
pub trait UsbBackend: Send + Sync {
    /// Open the bulk-out endpoint of `device`
    async fn open_bulk_out(&self, device: &str) -> Result<Box<dyn Connection>, TransportError>;
}

/// USB transport
pub struct UsbTransport<B> {
    backend: B,
}

impl<B: UsbBackend> UsbTransport<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: UsbBackend> Transport for UsbTransport<B> {
    fn kind(&self) -> TransportKind {
        TransportKind::Usb
    }

    #[instrument(skip(self), fields(destination = %destination))]
    async fn open(&self, destination: &Destination) -> Result<Box<dyn Connection>, TransportError> {
        let Destination::Usb { device } = destination else {
            return Err(wrong_destination(TransportKind::Usb, destination));
        };

        let conn = self.backend.open_bulk_out(device).await?;
        info!("Opened USB printer");
        Ok(conn)
    }
}

/// Linux `usblp` backend
///
/// The kernel printer class driver exposes each printer's bulk-out endpoint
/// as `/dev/usb/lpN`. A device reference is either `lpN` or a full path.
#[derive(Debug, Clone)]
pub struct UsbLpBackend {
    dev_dir: PathBuf,
}

impl UsbLpBackend {
    pub fn new() -> Self {
        Self {
            dev_dir: PathBuf::from("/dev/usb"),
        }
    }

    pub fn with_dev_dir(dev_dir: impl Into<PathBuf>) -> Self {
        Self {
            dev_dir: dev_dir.into(),
        }
    }

    fn resolve(&self, device: &str) -> PathBuf {
        let path = PathBuf::from(device);
        if path.is_absolute() {
            path
        } else {
            self.dev_dir.join(device)
        }
    }
}

impl Default for UsbLpBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsbBackend for UsbLpBackend {
    async fn open_bulk_out(&self, device: &str) -> Result<Box<dyn Connection>, TransportError> {
        let path = self.resolve(device);
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .map_err(|e| TransportError::from_open_io(&path.display().to_string(), &e))?;

        Ok(Box::new(StreamConnection::new(format!("usb://{}", device), file)))
    }
}
