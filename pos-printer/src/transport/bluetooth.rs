//! # Bluetooth serial transport
//!
//! Talks to printers over the Serial Port Profile (SPP) via RFCOMM. The
//! platform radio is reached through a [`BluetoothAdapter`], so the connect
//! sequence (radio check, discovery cancel, RFCOMM connect) can run against
//! a fake adapter in tests.
//!
//! ## Linux
//!
//! [`RfcommAdapter`] writes to the RFCOMM tty bound to the printer:
//!
//! ```bash
//! $ bluetoothctl pair 00:11:62:XX:XX:XX
//! $ sudo rfcomm bind 0 00:11:62:XX:XX:XX 1
//! # This creates /dev/rfcomm0
//! ```
//!
//! Inquiry state is read from `bluetoothctl show` and stopped with
//! `bluetoothctl scan off`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::{Connection, Destination, StreamConnection, Transport, TransportKind, wrong_destination};
use crate::error::TransportError;

/// Standard Serial Port Profile service UUID
pub const SPP_UUID: &str = "00001101-0000-1000-8000-00805f9b34fb";

/// Platform Bluetooth radio
#[async_trait]
pub trait BluetoothAdapter: Send + Sync {
    /// Whether the radio is present and switched on
    async fn is_enabled(&self) -> bool;

    /// Whether a device inquiry is running
    async fn is_discovering(&self) -> bool;

    async fn cancel_discovery(&self) -> Result<(), TransportError>;

    /// Open a connection-oriented serial channel to `address` for `service_uuid`
    async fn connect(
        &self,
        address: &str,
        service_uuid: &str,
    ) -> Result<Box<dyn Connection>, TransportError>;
}

/// Bluetooth SPP transport
pub struct BluetoothTransport<A> {
    adapter: A,
}

impl<A: BluetoothAdapter> BluetoothTransport<A> {
    pub fn new(adapter: A) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }
}

#[async_trait]
impl<A: BluetoothAdapter> Transport for BluetoothTransport<A> {
    fn kind(&self) -> TransportKind {
        TransportKind::Bluetooth
    }

    #[instrument(skip(self), fields(destination = %destination))]
    async fn open(&self, destination: &Destination) -> Result<Box<dyn Connection>, TransportError> {
        let Destination::Bluetooth { address } = destination else {
            return Err(wrong_destination(TransportKind::Bluetooth, destination));
        };

        if !is_valid_mac(address) {
            return Err(TransportError::not_found(format!(
                "Invalid Bluetooth address: {}",
                address
            )));
        }

        if !self.adapter.is_enabled().await {
            return Err(TransportError::unavailable(
                "Bluetooth is not available or not enabled",
            ));
        }

        // Inquiry and RFCOMM connect share the radio.
        if self.adapter.is_discovering().await {
            info!("Cancelling device discovery before connect");
            if let Err(e) = self.adapter.cancel_discovery().await {
                warn!(error = %e, "Failed to cancel discovery");
            }
        }

        let conn = self.adapter.connect(address, SPP_UUID).await?;
        info!("Connected to printer");
        Ok(conn)
    }
}

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Find the RFCOMM device name bound to `mac` in a `/proc/net/rfcomm` table
///
/// Lines look like `rfcomm0: 00:11:22:33:44:55 channel 1 clean`.
pub fn find_rfcomm_device(table: &str, mac: &str) -> Option<String> {
    let mac_upper = mac.to_uppercase();
    table.lines().find_map(|line| {
        let (dev_name, rest) = line.split_once(':')?;
        if rest.to_uppercase().contains(&mac_upper) {
            Some(dev_name.trim().to_string())
        } else {
            None
        }
    })
}

/// Whether `bluetoothctl show` reports a running inquiry
pub fn parse_discovering(output: &str) -> bool {
    output.lines().any(|line| {
        line.trim()
            .strip_prefix("Discovering:")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("yes"))
    })
}

const BLUETOOTHCTL_TIMEOUT: Duration = Duration::from_secs(5);

/// BlueZ adapter using kernel-bound RFCOMM ttys
#[derive(Debug, Clone)]
pub struct RfcommAdapter {
    sysfs_dir: PathBuf,
    rfcomm_table: PathBuf,
    dev_dir: PathBuf,
    bluetoothctl: Vec<String>,
}

impl RfcommAdapter {
    pub fn new() -> Self {
        Self {
            sysfs_dir: PathBuf::from("/sys/class/bluetooth"),
            rfcomm_table: PathBuf::from("/proc/net/rfcomm"),
            dev_dir: PathBuf::from("/dev"),
            bluetoothctl: vec!["bluetoothctl".to_string()],
        }
    }

    /// Use alternate system paths
    pub fn with_paths(
        sysfs_dir: impl Into<PathBuf>,
        rfcomm_table: impl Into<PathBuf>,
        dev_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sysfs_dir: sysfs_dir.into(),
            rfcomm_table: rfcomm_table.into(),
            dev_dir: dev_dir.into(),
            bluetoothctl: vec!["bluetoothctl".to_string()],
        }
    }

    /// Replace the `bluetoothctl` command line; `args` go before the subcommand
    pub fn with_bluetoothctl<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bluetoothctl = std::iter::once(program.into())
            .chain(args.into_iter().map(Into::into))
            .collect();
        self
    }

    /// Run a `bluetoothctl` subcommand and return its stdout
    async fn bluetoothctl(&self, subcommand: &[&str]) -> Result<String, TransportError> {
        let (program, base) = self
            .bluetoothctl
            .split_first()
            .ok_or_else(|| TransportError::unavailable("bluetoothctl not configured"))?;

        let mut command = Command::new(program);
        command.args(base).args(subcommand).kill_on_drop(true);

        let output = tokio::time::timeout(BLUETOOTHCTL_TIMEOUT, command.output())
            .await
            .map_err(|_| TransportError::timeout(format!("{} timed out", program)))?
            .map_err(|e| TransportError::unavailable(format!("{}: {}", program, e)))?;

        if !output.status.success() {
            return Err(TransportError::io(format!(
                "{} {} failed: {}",
                program,
                subcommand.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn device_path(&self, address: &str) -> Result<PathBuf, TransportError> {
        let table = tokio::fs::read_to_string(&self.rfcomm_table)
            .await
            .map_err(|e| TransportError::from_open_io(&self.rfcomm_table.display().to_string(), &e))?;

        let name = find_rfcomm_device(&table, address).ok_or_else(|| {
            TransportError::not_found(format!("No RFCOMM device bound to {}", address))
        })?;
        Ok(self.dev_dir.join(name))
    }
}

impl Default for RfcommAdapter {
    fn default() -> Self {
        Self::new()
    }
}

async fn dir_has_entries(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

#[async_trait]
impl BluetoothAdapter for RfcommAdapter {
    async fn is_enabled(&self) -> bool {
        dir_has_entries(&self.sysfs_dir).await
    }

    async fn is_discovering(&self) -> bool {
        match self.bluetoothctl(&["show"]).await {
            Ok(output) => parse_discovering(&output),
            Err(e) => {
                debug!(error = %e, "Discovery state unknown");
                false
            }
        }
    }

    async fn cancel_discovery(&self) -> Result<(), TransportError> {
        self.bluetoothctl(&["scan", "off"]).await.map(|_| ())
    }

    async fn connect(
        &self,
        address: &str,
        service_uuid: &str,
    ) -> Result<Box<dyn Connection>, TransportError> {
        let path = self.device_path(address).await?;
        debug!(device = %path.display(), service_uuid, "Opening RFCOMM device");

        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .map_err(|e| TransportError::from_open_io(&path.display().to_string(), &e))?;

        Ok(Box::new(StreamConnection::new(
            format!("bt://{}", address),
            file,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorKind;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeAdapter {
        enabled: bool,
        discovering: AtomicBool,
        cancelled: AtomicBool,
    }

    impl FakeAdapter {
        fn new(enabled: bool, discovering: bool) -> Self {
            Self {
                enabled,
                discovering: AtomicBool::new(discovering),
                cancelled: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl BluetoothAdapter for FakeAdapter {
        async fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn is_discovering(&self) -> bool {
            self.discovering.load(Ordering::SeqCst)
        }

        async fn cancel_discovery(&self) -> Result<(), TransportError> {
            self.discovering.store(false, Ordering::SeqCst);
            self.cancelled.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn connect(
            &self,
            address: &str,
            service_uuid: &str,
        ) -> Result<Box<dyn Connection>, TransportError> {
            assert_eq!(service_uuid, SPP_UUID);
            assert!(
                !self.discovering.load(Ordering::SeqCst),
                "connect while discovering"
            );
            Ok(Box::new(StreamConnection::new(address, Vec::<u8>::new())))
        }
    }

    const MAC: &str = "00:11:22:33:44:55";

    #[tokio::test]
    async fn test_radio_off_is_unavailable() {
        let transport = BluetoothTransport::new(FakeAdapter::new(false, false));
        let err = transport
            .open(&Destination::bluetooth(MAC))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, TransportErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_discovery_cancelled_before_connect() {
        let transport = BluetoothTransport::new(FakeAdapter::new(true, true));
        let conn = transport.open(&Destination::bluetooth(MAC)).await.unwrap();
        assert!(conn.is_open());
        assert!(transport.adapter().cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_invalid_mac_rejected() {
        let transport = BluetoothTransport::new(FakeAdapter::new(true, false));
        let err = transport
            .open(&Destination::bluetooth("00-11-22-33-44-55"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, TransportErrorKind::NotFound);
    }

    #[test]
    fn test_valid_mac_addresses() {
        assert!(is_valid_mac("00:11:22:33:44:55"));
        assert!(is_valid_mac("aa:bb:cc:dd:ee:ff"));
        assert!(!is_valid_mac("00:11:22:33:44"));
        assert!(!is_valid_mac("GG:HH:II:JJ:KK:LL"));
        assert!(!is_valid_mac(""));
    }

    #[test]
    fn test_find_rfcomm_device() {
        let table = "rfcomm0: 00:11:22:33:44:55 channel 1 clean\n\
                     rfcomm1: AA:BB:CC:DD:EE:FF channel 1 connected\n";
        assert_eq!(
            find_rfcomm_device(table, "aa:bb:cc:dd:ee:ff"),
            Some("rfcomm1".to_string())
        );
        assert_eq!(find_rfcomm_device(table, "11:11:11:11:11:11"), None);
    }

    #[tokio::test]
    async fn test_rfcomm_adapter_writes_to_bound_device() {
        let root = tempfile::tempdir().unwrap();
        let sysfs = root.path().join("sys");
        let dev = root.path().join("dev");
        std::fs::create_dir_all(sysfs.join("hci0")).unwrap();
        std::fs::create_dir_all(&dev).unwrap();
        std::fs::write(dev.join("rfcomm0"), b"").unwrap();
        let table = root.path().join("rfcomm");
        std::fs::write(&table, format!("rfcomm0: {} channel 1 clean\n", MAC)).unwrap();

        let adapter =
            RfcommAdapter::with_paths(&sysfs, &table, &dev).with_bluetoothctl("true", [""; 0]);
        let transport = BluetoothTransport::new(adapter);
        let mut conn = transport.open(&Destination::bluetooth(MAC)).await.unwrap();
        conn.write_all(b"\x1B@").await.unwrap();
        conn.close().await;

        assert_eq!(std::fs::read(dev.join("rfcomm0")).unwrap(), b"\x1B@");
    }

    #[tokio::test]
    async fn test_rfcomm_adapter_without_radio() {
        let root = tempfile::tempdir().unwrap();
        let adapter = RfcommAdapter::with_paths(
            root.path().join("missing"),
            root.path().join("rfcomm"),
            root.path(),
        );
        assert!(!adapter.is_enabled().await);
    }

    #[test]
    fn test_parse_discovering() {
        let show = "Controller 00:1A:7D:DA:71:13 (public)\n\
                    \tPowered: yes\n\
                    \tDiscoverable: no\n\
                    \tDiscovering: yes\n";
        assert!(parse_discovering(show));
        assert!(!parse_discovering(&show.replace("Discovering: yes", "Discovering: no")));
        assert!(!parse_discovering(""));
    }

    #[tokio::test]
    async fn test_bluetoothctl_scan_stopped_before_connect() {
        let root = tempfile::tempdir().unwrap();
        let log = root.path().join("calls");
        let script = root.path().join("bluetoothctl.sh");
        std::fs::write(
            &script,
            format!(
                "echo \"$@\" >> {log}\n\
                 if [ \"$1\" = show ]; then printf 'Controller X\\n\\tDiscovering: yes\\n'; fi\n",
                log = log.display()
            ),
        )
        .unwrap();

        let sysfs = root.path().join("sys");
        let dev = root.path().join("dev");
        std::fs::create_dir_all(sysfs.join("hci0")).unwrap();
        std::fs::create_dir_all(&dev).unwrap();
        std::fs::write(dev.join("rfcomm0"), b"").unwrap();
        let table = root.path().join("rfcomm");
        std::fs::write(&table, format!("rfcomm0: {} channel 1 clean\n", MAC)).unwrap();

        let adapter = RfcommAdapter::with_paths(&sysfs, &table, &dev)
            .with_bluetoothctl("sh", [script.display().to_string()]);
        assert!(adapter.is_discovering().await);

        let transport = BluetoothTransport::new(adapter);
        let mut conn = transport.open(&Destination::bluetooth(MAC)).await.unwrap();
        conn.close().await;

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().collect::<Vec<_>>(), vec!["show", "show", "scan off"]);
    }

    #[tokio::test]
    async fn test_missing_bluetoothctl_reports_idle() {
        let adapter = RfcommAdapter::new().with_bluetoothctl("/nonexistent/bluetoothctl", [""; 0]);
        assert!(!adapter.is_discovering().await);
        let err = adapter.cancel_discovery().await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Unavailable);
    }
}
