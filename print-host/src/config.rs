use std::time::Duration;

use pos_printer::TextEncoding;

use crate::dispatcher::{DispatchOptions, SerializationPolicy};
use crate::receipt::ReceiptSettings;

/// Print host configuration
///
/// # Environment variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | PRINTER_TCP_CONNECT_TIMEOUT_MS | 5000 | TCP connect timeout |
/// | PRINTER_DEFAULT_PORT | 9100 | Port used when a network destination has none |
/// | PRINTER_PAPER_WIDTH | 32 | Characters per line (58mm: 32, 80mm: 48) |
/// | PRINTER_FEED_BEFORE_CUT | 3 | Line feeds before cutting raw ESC/POS jobs |
/// | PRINTER_TEXT_ENCODING | utf8 | `utf8` or `gbk` |
/// | PRINTER_SERIALIZATION | global | `global` or `per_destination` |
/// | RECEIPT_APP_NAME | POS SYSTEM | Receipt header |
/// | RECEIPT_CURRENCY_SYMBOL | Rp | Prefix for receipt amounts |
/// | LOG_LEVEL | info | Log filter |
/// | LOG_DIR | (unset) | Directory for daily rolling log files |
///
/// # Example
///
/// ```ignore
/// PRINTER_TEXT_ENCODING=gbk PRINTER_SERIALIZATION=per_destination cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub tcp_connect_timeout_ms: u64,
    pub default_port: u16,
    pub paper_width: usize,
    pub feed_before_cut: usize,
    pub text_encoding: TextEncoding,
    pub serialization: SerializationPolicy,
    pub receipt: ReceiptSettings,
    pub log_level: String,
    pub log_dir: Option<String>,
}

impl Config {
    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            tcp_connect_timeout_ms: env_parse("PRINTER_TCP_CONNECT_TIMEOUT_MS").unwrap_or(5000),
            default_port: env_parse("PRINTER_DEFAULT_PORT").unwrap_or(9100),
            paper_width: env_parse("PRINTER_PAPER_WIDTH").unwrap_or(32),
            feed_before_cut: env_parse("PRINTER_FEED_BEFORE_CUT").unwrap_or(3),
            text_encoding: env_parse("PRINTER_TEXT_ENCODING").unwrap_or_default(),
            serialization: env_parse("PRINTER_SERIALIZATION").unwrap_or_default(),
            receipt: receipt_from_env(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
        }
    }

    pub fn tcp_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.tcp_connect_timeout_ms)
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            text_encoding: self.text_encoding,
            feed_before_cut: self.feed_before_cut,
            policy: self.serialization,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tcp_connect_timeout_ms: 5000,
            default_port: 9100,
            paper_width: 32,
            feed_before_cut: 3,
            text_encoding: TextEncoding::Utf8,
            serialization: SerializationPolicy::Global,
            receipt: ReceiptSettings::default(),
            log_level: "info".into(),
            log_dir: None,
        }
    }
}

fn receipt_from_env() -> ReceiptSettings {
    let defaults = ReceiptSettings::default();
    ReceiptSettings {
        app_name: std::env::var("RECEIPT_APP_NAME").unwrap_or(defaults.app_name),
        currency_symbol: std::env::var("RECEIPT_CURRENCY_SYMBOL")
            .unwrap_or(defaults.currency_symbol),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tcp_connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.default_port, 9100);

        let options = config.dispatch_options();
        assert_eq!(options.feed_before_cut, 3);
        assert_eq!(options.policy, SerializationPolicy::Global);
        assert_eq!(options.text_encoding, TextEncoding::Utf8);
    }
}
