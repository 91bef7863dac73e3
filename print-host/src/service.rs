//! Print service - the host-facing facade
//!
//! Validates requests, turns them into jobs and hands them to the
//! dispatcher. Also answers discovery and status queries.

use std::sync::Arc;

use pos_printer::{
    BluetoothTransport, Destination, PrintError, RfcommAdapter, TcpTransport, TransportKind,
    TransportSet, UsbLpBackend, UsbTransport,
};
use tracing::{info, instrument};

use crate::config::Config;
use crate::discovery::{
    BluetoothDevice, BluetoothDiscovery, BluetoothctlDiscovery, DiscoveryError, NetworkDiscovery,
    NetworkState, SysfsNetworkDiscovery, SysfsUsbDiscovery, UsbDevice, UsbDiscovery,
};
use crate::dispatcher::{Dispatcher, JobHandle, PrinterStatus};
use crate::job::{JobRequest, Payload, PrintJob, decode_base64, pdf_not_implemented};
use crate::receipt::{ReceiptRenderer, Sale};

/// Discovery backends used by [`PrintService`]
#[derive(Clone)]
pub struct DiscoverySet {
    pub bluetooth: Arc<dyn BluetoothDiscovery>,
    pub usb: Arc<dyn UsbDiscovery>,
    pub network: Arc<dyn NetworkDiscovery>,
}

impl DiscoverySet {
    /// BlueZ and sysfs backed discovery
    pub fn linux() -> Self {
        Self {
            bluetooth: Arc::new(BluetoothctlDiscovery::new()),
            usb: Arc::new(SysfsUsbDiscovery::new()),
            network: Arc::new(SysfsNetworkDiscovery::new()),
        }
    }
}

/// Print service
pub struct PrintService {
    config: Config,
    dispatcher: Dispatcher,
    discovery: DiscoverySet,
}

impl PrintService {
    /// Build with the Linux transports (raw TCP, RFCOMM, usblp)
    pub fn from_config(config: Config) -> Self {
        let transports = TransportSet::new()
            .with(Arc::new(
                TcpTransport::new().with_timeout(config.tcp_connect_timeout()),
            ))
            .with(Arc::new(BluetoothTransport::new(RfcommAdapter::new())))
            .with(Arc::new(UsbTransport::new(UsbLpBackend::new())));
        Self::new(config, transports, DiscoverySet::linux())
    }

    pub fn new(config: Config, transports: TransportSet, discovery: DiscoverySet) -> Self {
        info!(
            policy = ?config.serialization,
            encoding = ?config.text_encoding,
            "Print service created"
        );
        let dispatcher = Dispatcher::new(transports, config.dispatch_options());
        Self {
            config,
            dispatcher,
            discovery,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate a request and queue it
    #[instrument(skip(self, request), fields(kind = ?request.payload_kind))]
    pub fn submit(&self, request: JobRequest) -> Result<JobHandle, PrintError> {
        let job = request.into_job(self.config.default_port)?;
        Ok(self.submit_job(job))
    }

    /// Queue an already built job
    pub fn submit_job(&self, job: PrintJob) -> JobHandle {
        info!(
            job_id = %job.id(),
            name = job.name().unwrap_or("-"),
            destination = %job.destination(),
            "Print job submitted"
        );
        self.dispatcher.submit(job)
    }

    /// Print a base64 ESC/POS stream on a network printer
    pub fn print_escpos(
        &self,
        host: &str,
        port: Option<u16>,
        data: &str,
    ) -> Result<JobHandle, PrintError> {
        let destination = self.network_destination(host, port)?;
        let bytes = require_bytes(data)?;
        Ok(self.submit_job(PrintJob::new(destination, Payload::EscPosRaw(bytes))))
    }

    /// Print a ZPL label on a network printer
    pub fn print_zpl(&self, host: &str, port: Option<u16>, zpl: &str) -> Result<JobHandle, PrintError> {
        let destination = self.network_destination(host, port)?;
        if zpl.is_empty() {
            return Err(PrintError::InvalidArgument("ZPL data is required".to_string()));
        }
        Ok(self.submit_job(PrintJob::new(destination, Payload::Zpl(zpl.to_string()))))
    }

    /// Print a base64 ESC/POS stream on a bonded Bluetooth printer
    pub fn print_via_bluetooth(&self, address: &str, data: &str) -> Result<JobHandle, PrintError> {
        if address.trim().is_empty() {
            return Err(PrintError::InvalidArgument(
                "Bluetooth address is required".to_string(),
            ));
        }
        let bytes = require_bytes(data)?;
        Ok(self.submit_job(PrintJob::new(
            Destination::bluetooth(address.trim()),
            Payload::EscPosRaw(bytes),
        )))
    }

    /// Render a sale at the configured paper width and queue it
    pub fn print_receipt(&self, destination: Destination, sale: &Sale) -> JobHandle {
        let intents = ReceiptRenderer::new(self.config.paper_width, self.config.receipt.clone())
            .with_text_encoding(self.config.text_encoding)
            .render(sale);
        let job = PrintJob::new(destination, Payload::EscPosStructured(intents))
            .with_name(format!("receipt-{}", sale.id));
        self.submit_job(job)
    }

    pub fn print_pdf(&self, job_name: Option<&str>) -> Result<JobHandle, PrintError> {
        Err(pdf_not_implemented(job_name))
    }

    pub async fn discover_bluetooth(&self) -> Result<Vec<BluetoothDevice>, DiscoveryError> {
        self.discovery.bluetooth.bonded_devices().await
    }

    pub async fn discover_usb(&self) -> Result<Vec<UsbDevice>, DiscoveryError> {
        self.discovery.usb.devices().await
    }

    pub async fn discover_network(&self) -> Result<NetworkState, DiscoveryError> {
        self.discovery.network.state().await
    }

    pub fn status(&self) -> PrinterStatus {
        self.dispatcher.status()
    }

    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }

    fn network_destination(&self, host: &str, port: Option<u16>) -> Result<Destination, PrintError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(PrintError::InvalidArgument("IP address is required".to_string()));
        }
        match port {
            Some(port) => Ok(Destination::network(host, port)),
            None => Destination::parse(TransportKind::Network, host, self.config.default_port)
                .map_err(|e| PrintError::InvalidArgument(e.message)),
        }
    }
}

fn require_bytes(data: &str) -> Result<Vec<u8>, PrintError> {
    if data.trim().is_empty() {
        return Err(PrintError::InvalidArgument("data is required".to_string()));
    }
    decode_base64(data)
}
