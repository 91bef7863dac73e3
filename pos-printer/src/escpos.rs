//! ESC/POS command encoder
//!
//! Converts an ordered list of formatting intents into the byte stream a
//! printer understands. Encoding is stateless and deterministic: the same
//! intents always give the same bytes, and every intent that changes printer
//! state (bold, font size) restores it before the intent ends.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use tracing::instrument;

use crate::encoding::TextEncoding;
use crate::error::EncodeError;

pub const ESC: u8 = 0x1B;
pub const GS: u8 = 0x1D;
pub const LF: u8 = 0x0A;

/// ESC @ - Initialize printer
pub const INIT: [u8; 2] = [ESC, 0x40];
pub const ALIGN_LEFT: [u8; 3] = [ESC, 0x61, 0x00];
pub const ALIGN_CENTER: [u8; 3] = [ESC, 0x61, 0x01];
pub const ALIGN_RIGHT: [u8; 3] = [ESC, 0x61, 0x02];
pub const BOLD_ON: [u8; 3] = [ESC, 0x45, 0x01];
pub const BOLD_OFF: [u8; 3] = [ESC, 0x45, 0x00];
/// ESC ! 0 - Select print mode: normal
pub const FONT_NORMAL: [u8; 3] = [ESC, 0x21, 0x00];
/// ESC ! 0x30 - Select print mode: double height + double width
pub const FONT_LARGE: [u8; 3] = [ESC, 0x21, 0x30];
/// GS V 66 0 - Feed to cutter and full cut
pub const CUT: [u8; 4] = [GS, 0x56, 0x42, 0x00];

/// Separator width in characters, calibrated for 58mm paper
pub const SEPARATOR_WIDTH: usize = 32;

/// Command language spoken by the target printer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandLanguage {
    #[default]
    EscPos,
    Zpl,
    Raw,
}

impl fmt::Display for CommandLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandLanguage::EscPos => "ESC/POS",
            CommandLanguage::Zpl => "ZPL",
            CommandLanguage::Raw => "raw",
        };
        f.write_str(s)
    }
}

/// Text alignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl Alignment {
    /// Numeric alignment code as used by ESC a n; anything unknown is left
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Alignment::Center,
            2 => Alignment::Right,
            _ => Alignment::Left,
        }
    }

    /// Alignment by name; anything unknown is left
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "center" | "centre" => Alignment::Center,
            "right" => Alignment::Right,
            _ => Alignment::Left,
        }
    }

    fn command(&self) -> &'static [u8] {
        match self {
            Alignment::Left => &ALIGN_LEFT,
            Alignment::Center => &ALIGN_CENTER,
            Alignment::Right => &ALIGN_RIGHT,
        }
    }
}

impl Serialize for Alignment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let s = match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        };
        serializer.serialize_str(s)
    }
}

impl<'de> Deserialize<'de> for Alignment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AlignmentVisitor;

        impl Visitor<'_> for AlignmentVisitor {
            type Value = Alignment;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an alignment name or code")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Alignment, E> {
                Ok(Alignment::from_name(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Alignment, E> {
                Ok(Alignment::from_code(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Alignment, E> {
                Ok(i64::try_from(v).map_or(Alignment::Left, Alignment::from_code))
            }
        }

        deserializer.deserialize_any(AlignmentVisitor)
    }
}

/// A single formatting intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    Text {
        content: String,
        #[serde(default)]
        align: Alignment,
    },
    BoldLine {
        content: String,
    },
    LargeLine {
        content: String,
    },
    Separator,
    Feed {
        lines: i32,
    },
    Cut,
    RawBytes {
        data: Vec<u8>,
    },
}

impl Intent {
    fn name(&self) -> &'static str {
        match self {
            Intent::Text { .. } => "text",
            Intent::BoldLine { .. } => "bold_line",
            Intent::LargeLine { .. } => "large_line",
            Intent::Separator => "separator",
            Intent::Feed { .. } => "feed",
            Intent::Cut => "cut",
            Intent::RawBytes { .. } => "raw_bytes",
        }
    }
}

/// Intent encoder for one command language
#[derive(Debug, Clone, Copy, Default)]
pub struct EscPosEncoder {
    language: CommandLanguage,
    text_encoding: TextEncoding,
}

impl EscPosEncoder {
    pub fn new(language: CommandLanguage) -> Self {
        Self {
            language,
            text_encoding: TextEncoding::Utf8,
        }
    }

    /// Encode content strings with the given code page
    pub fn with_text_encoding(mut self, text_encoding: TextEncoding) -> Self {
        self.text_encoding = text_encoding;
        self
    }

    pub fn language(&self) -> CommandLanguage {
        self.language
    }

    /// Encode a whole intent sequence
    ///
    /// For GBK output the document is wrapped in Chinese mode on/off.
    #[instrument(skip(self, intents), fields(language = %self.language, intents = intents.len()))]
    pub fn encode(&self, intents: &[Intent]) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::with_capacity(intents.len() * 16);
        let wrap = self.language == CommandLanguage::EscPos;

        if wrap {
            buf.extend_from_slice(self.text_encoding.prologue());
        }
        for intent in intents {
            self.encode_intent(intent, &mut buf)?;
        }
        if wrap {
            buf.extend_from_slice(self.text_encoding.epilogue());
        }

        Ok(buf)
    }

    /// Append the bytes of one intent to `buf`
    pub fn encode_intent(&self, intent: &Intent, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        if self.language != CommandLanguage::EscPos {
            return match intent {
                Intent::RawBytes { data } => {
                    buf.extend_from_slice(data);
                    Ok(())
                }
                other => Err(EncodeError::InvalidArgument(format!(
                    "{} intent cannot be encoded for {} printers",
                    other.name(),
                    self.language
                ))),
            };
        }

        match intent {
            Intent::Text { content, align } => self.text(buf, content, *align),
            Intent::BoldLine { content } => {
                buf.extend_from_slice(&BOLD_ON);
                buf.extend_from_slice(&self.text_encoding.encode(content));
                buf.extend_from_slice(&BOLD_OFF);
                buf.push(LF);
            }
            Intent::LargeLine { content } => {
                buf.extend_from_slice(&FONT_LARGE);
                buf.extend_from_slice(&self.text_encoding.encode(content));
                buf.extend_from_slice(&FONT_NORMAL);
                buf.push(LF);
            }
            Intent::Separator => {
                self.text(buf, &"-".repeat(SEPARATOR_WIDTH), Alignment::Left);
            }
            Intent::Feed { lines } => {
                let count = usize::try_from(*lines).map_err(|_| {
                    EncodeError::InvalidArgument(format!(
                        "feed line count must not be negative: {}",
                        lines
                    ))
                })?;
                buf.extend(std::iter::repeat_n(LF, count));
            }
            Intent::Cut => buf.extend_from_slice(&CUT),
            Intent::RawBytes { data } => buf.extend_from_slice(data),
        }
        Ok(())
    }

    fn text(&self, buf: &mut Vec<u8>, content: &str, align: Alignment) {
        buf.extend_from_slice(align.command());
        buf.extend_from_slice(&self.text_encoding.encode(content));
        buf.push(LF);
    }
}

/// Encode intents as UTF-8 for the given language
pub fn encode(intents: &[Intent], language: CommandLanguage) -> Result<Vec<u8>, EncodeError> {
    EscPosEncoder::new(language).encode(intents)
}

/// ESC/POS intent builder
///
/// Fluent API for composing a print document in code.
///
/// ```ignore
/// let mut b = EscPosBuilder::new();
/// b.large_line("SHOP").center("SALES RECEIPT").separator().feed(3).cut();
/// let bytes = b.build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct EscPosBuilder {
    intents: Vec<Intent>,
    encoder: EscPosEncoder,
}

impl EscPosBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder whose content strings are encoded with `text_encoding`
    pub fn with_text_encoding(text_encoding: TextEncoding) -> Self {
        Self {
            intents: Vec::new(),
            encoder: EscPosEncoder::new(CommandLanguage::EscPos).with_text_encoding(text_encoding),
        }
    }

    /// Push any intent
    pub fn push(&mut self, intent: Intent) -> &mut Self {
        self.intents.push(intent);
        self
    }

    // === Text Output ===

    /// Write text with the given alignment followed by newline
    pub fn text(&mut self, s: &str, align: Alignment) -> &mut Self {
        self.push(Intent::Text {
            content: s.to_string(),
            align,
        })
    }

    /// Write left-aligned text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s, Alignment::Left)
    }

    pub fn center(&mut self, s: &str) -> &mut Self {
        self.text(s, Alignment::Center)
    }

    pub fn right(&mut self, s: &str) -> &mut Self {
        self.text(s, Alignment::Right)
    }

    pub fn bold_line(&mut self, s: &str) -> &mut Self {
        self.push(Intent::BoldLine {
            content: s.to_string(),
        })
    }

    pub fn large_line(&mut self, s: &str) -> &mut Self {
        self.push(Intent::LargeLine {
            content: s.to_string(),
        })
    }

    // === Paper Control ===

    pub fn separator(&mut self) -> &mut Self {
        self.push(Intent::Separator)
    }

    pub fn feed(&mut self, lines: i32) -> &mut Self {
        self.push(Intent::Feed { lines })
    }

    pub fn cut(&mut self) -> &mut Self {
        self.push(Intent::Cut)
    }

    // === Raw Commands ===

    /// Write raw bytes directly
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.push(Intent::RawBytes {
            data: bytes.to_vec(),
        })
    }

    // === Build ===

    pub fn intents(&self) -> &[Intent] {
        &self.intents
    }

    pub fn into_intents(self) -> Vec<Intent> {
        self.intents
    }

    /// Encode the accumulated intents
    pub fn build(&self) -> Result<Vec<u8>, EncodeError> {
        self.encoder.encode(&self.intents)
    }
}
