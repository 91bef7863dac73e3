//! Printer discovery
//!
//! Lists candidate printers per transport. Discovery never scans: Bluetooth
//! returns bonded devices only, USB returns attached devices, and network
//! only reports whether the host has a live link.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pos_printer::transport::is_valid_mac;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Discovery failure
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Bluetooth not available: {0}")]
    BluetoothUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bonded Bluetooth device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BluetoothDevice {
    pub name: String,
    pub address: String,
}

/// An attached USB device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsbDevice {
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    pub connected: bool,
}

#[async_trait]
pub trait BluetoothDiscovery: Send + Sync {
    /// Devices already bonded with this host
    async fn bonded_devices(&self) -> Result<Vec<BluetoothDevice>, DiscoveryError>;
}

#[async_trait]
pub trait UsbDiscovery: Send + Sync {
    async fn devices(&self) -> Result<Vec<UsbDevice>, DiscoveryError>;
}

#[async_trait]
pub trait NetworkDiscovery: Send + Sync {
    async fn state(&self) -> Result<NetworkState, DiscoveryError>;
}

/// Bonded devices from BlueZ via `bluetoothctl`
#[derive(Debug, Clone)]
pub struct BluetoothctlDiscovery {
    program: String,
}

impl BluetoothctlDiscovery {
    pub fn new() -> Self {
        Self {
            program: "bluetoothctl".to_string(),
        }
    }
}

impl Default for BluetoothctlDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BluetoothDiscovery for BluetoothctlDiscovery {
    #[instrument(skip(self))]
    async fn bonded_devices(&self) -> Result<Vec<BluetoothDevice>, DiscoveryError> {
        let output = Command::new(&self.program)
            .args(["devices", "Paired"])
            .output()
            .await
            .map_err(|e| DiscoveryError::BluetoothUnavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DiscoveryError::BluetoothUnavailable(stderr.trim().to_string()));
        }

        let devices = parse_bluetoothctl_devices(&String::from_utf8_lossy(&output.stdout));
        debug!(count = devices.len(), "Bonded Bluetooth devices");
        Ok(devices)
    }
}

/// Parse `bluetoothctl devices` output
///
/// Lines look like `Device 00:11:22:33:44:55 PT-210`; anything else is skipped.
pub fn parse_bluetoothctl_devices(output: &str) -> Vec<BluetoothDevice> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Device ")?;
            let (address, name) = rest.split_once(' ').unwrap_or((rest, ""));
            if !is_valid_mac(address) {
                return None;
            }
            let name = match name.trim() {
                "" => address.to_string(),
                n => n.to_string(),
            };
            Some(BluetoothDevice {
                name,
                address: address.to_uppercase(),
            })
        })
        .collect()
}

/// USB devices from `/sys/bus/usb/devices`
#[derive(Debug, Clone)]
pub struct SysfsUsbDiscovery {
    root: PathBuf,
}

impl SysfsUsbDiscovery {
    pub fn new() -> Self {
        Self::with_root("/sys/bus/usb/devices")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsUsbDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsbDiscovery for SysfsUsbDiscovery {
    async fn devices(&self) -> Result<Vec<UsbDevice>, DiscoveryError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut devices = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let dir = entry.path();
            let (Some(vendor_id), Some(product_id)) = (
                read_hex_id(&dir.join("idVendor")).await,
                read_hex_id(&dir.join("idProduct")).await,
            ) else {
                // Interfaces and hubs without ids
                continue;
            };

            let name = read_trimmed(&dir.join("product"))
                .await
                .unwrap_or_else(|| format!("USB Device {:04x}:{:04x}", vendor_id, product_id));
            devices.push(UsbDevice {
                name,
                vendor_id,
                product_id,
            });
        }

        devices.sort_by(|a, b| (a.vendor_id, a.product_id).cmp(&(b.vendor_id, b.product_id)));
        Ok(devices)
    }
}

/// Link state from `/sys/class/net`
///
/// Connected when any interface other than loopback is `up`.
#[derive(Debug, Clone)]
pub struct SysfsNetworkDiscovery {
    root: PathBuf,
}

impl SysfsNetworkDiscovery {
    pub fn new() -> Self {
        Self::with_root("/sys/class/net")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsNetworkDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkDiscovery for SysfsNetworkDiscovery {
    async fn state(&self) -> Result<NetworkState, DiscoveryError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name() == "lo" {
                continue;
            }
            if read_trimmed(&entry.path().join("operstate")).await.as_deref() == Some("up") {
                return Ok(NetworkState { connected: true });
            }
        }
        Ok(NetworkState { connected: false })
    }
}

async fn read_trimmed(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Some(s.trim().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read sysfs attribute");
            None
        }
    }
}

async fn read_hex_id(path: &Path) -> Option<u16> {
    let raw = read_trimmed(path).await?;
    u16::from_str_radix(&raw, 16).ok()
}
