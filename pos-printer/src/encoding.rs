//! Text encoding utilities for thermal printers
//!
//! Content strings are UTF-8 by default. Most Chinese thermal printers
//! expect GBK instead, so the encoder can be switched to GBK, which only
//! ever touches content strings and never control codes.

use serde::{Deserialize, Serialize};

/// FS & + FS C 1: enter Chinese mode and select the GBK code page
pub const CHINESE_MODE_ON: [u8; 5] = [0x1C, 0x26, 0x1C, 0x43, 0x01];

/// FS .: leave Chinese mode
pub const CHINESE_MODE_OFF: [u8; 2] = [0x1C, 0x2E];

/// Character encoding used for printed content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Gbk,
}

impl TextEncoding {
    /// Encode a content string
    pub fn encode(&self, s: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => s.as_bytes().to_vec(),
            TextEncoding::Gbk => {
                let (cow, _, _) = encoding_rs::GBK.encode(s);
                cow.into_owned()
            }
        }
    }

    /// Bytes to emit before the first content of a document
    pub fn prologue(&self) -> &'static [u8] {
        match self {
            TextEncoding::Utf8 => &[],
            TextEncoding::Gbk => &CHINESE_MODE_ON,
        }
    }

    /// Bytes to emit after the last content of a document
    pub fn epilogue(&self) -> &'static [u8] {
        match self {
            TextEncoding::Utf8 => &[],
            TextEncoding::Gbk => &CHINESE_MODE_OFF,
        }
    }

    /// Printed columns taken by `s`
    ///
    /// In GBK mode a Chinese character occupies two columns.
    pub fn display_width(&self, s: &str) -> usize {
        match self {
            TextEncoding::Utf8 => s.chars().count(),
            TextEncoding::Gbk => gbk_width(s),
        }
    }

    /// Two-column layout measured in printed columns for this encoding
    pub fn format_two_column(&self, left: &str, right: &str, total_width: usize) -> String {
        let used = self.display_width(left) + self.display_width(right);
        join_padded(left, right, used, total_width)
    }
}

impl std::str::FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            "gbk" => Ok(TextEncoding::Gbk),
            other => Err(format!("unknown text encoding: {}", other)),
        }
    }
}

/// Get the GBK byte width of a string
///
/// Chinese characters are 2 bytes in GBK, ASCII is 1 byte.
pub fn gbk_width(s: &str) -> usize {
    let (cow, _, _) = encoding_rs::GBK.encode(s);
    cow.len()
}

/// Lay out `left` and `right` on one line of `total_width` characters
///
/// When the two strings do not fit, exactly one space separates them and
/// neither side is truncated.
pub fn format_two_column(left: &str, right: &str, total_width: usize) -> String {
    TextEncoding::Utf8.format_two_column(left, right, total_width)
}

fn join_padded(left: &str, right: &str, used: usize, total_width: usize) -> String {
    let spaces = if used >= total_width {
        1
    } else {
        total_width - used
    };

    let mut line = String::with_capacity(left.len() + spaces + right.len());
    line.push_str(left);
    line.extend(std::iter::repeat_n(' ', spaces));
    line.push_str(right);
    line
}
