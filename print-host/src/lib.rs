//! Print host - job dispatch for receipt and label printers
//!
//! # Module layout
//!
//! ```text
//! print-host/src/
//! ├── config.rs      # Environment configuration
//! ├── logger.rs      # tracing subscriber setup
//! ├── job.rs         # Jobs, payloads and host requests
//! ├── dispatcher.rs  # FIFO queue and lane workers
//! ├── service.rs     # PrintService facade
//! ├── discovery.rs   # Bonded Bluetooth / USB / network discovery
//! ├── receipt.rs     # Sales receipt renderer
//! └── stdio.rs       # NDJSON line protocol for the binary
//! ```

pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod job;
pub mod logger;
pub mod receipt;
pub mod service;
pub mod stdio;

pub use config::Config;
pub use dispatcher::{DispatchOptions, Dispatcher, JobHandle, PrinterStatus, SerializationPolicy};
pub use job::{JobReport, JobRequest, JobResult, Payload, PayloadKind, PrintJob};
pub use logger::init_logger_with_file;
pub use receipt::{ReceiptRenderer, ReceiptSettings, Sale, SaleItem};
pub use service::{DiscoverySet, PrintService};
