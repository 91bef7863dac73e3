//! # pos-printer
//!
//! Receipt/label printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ESC/POS command encoding from formatting intents
//! - UTF-8 / GBK text encoding, two-column layout
//! - Transports: raw TCP (port 9100), Bluetooth SPP, USB
//! - Printer sessions with guaranteed teardown
//!
//! Queueing and job dispatch (WHEN to print) live in `print-host`.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pos_printer::{Destination, EscPosBuilder, INIT, Session, TcpTransport};
//!
//! let mut builder = EscPosBuilder::new();
//! builder.large_line("KITCHEN");
//! builder.separator();
//! builder.line("Table: 100");
//! builder.feed(3);
//!
//! let session = Session::new(
//!     Arc::new(TcpTransport::new()),
//!     Destination::network("192.168.1.100", 9100),
//!     Some(&INIT),
//! );
//! session.execute(&builder.build()?, true).await?;
//! ```

mod encoding;
mod error;
mod escpos;
mod session;
pub mod transport;

// Re-exports
pub use encoding::{TextEncoding, format_two_column, gbk_width};
pub use error::{EncodeError, PrintError, PrintResult, TransportError, TransportErrorKind};
pub use escpos::{
    ALIGN_CENTER, ALIGN_LEFT, ALIGN_RIGHT, Alignment, BOLD_OFF, BOLD_ON, CUT, CommandLanguage,
    EscPosBuilder, EscPosEncoder, FONT_LARGE, FONT_NORMAL, INIT, Intent, LF, SEPARATOR_WIDTH,
    encode,
};
pub use session::{Session, SessionOutcome, SessionState};
pub use transport::{
    BluetoothAdapter, BluetoothTransport, Connection, Destination, RfcommAdapter, TcpTransport,
    Transport, TransportKind, TransportSet, UsbBackend, UsbLpBackend, UsbTransport,
};
