//! Print job types

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pos_printer::{CommandLanguage, Destination, Intent, PrintError, TransportKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload family as named by the host surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadKind {
    EscposStructured,
    EscposRaw,
    Zpl,
    Raw,
    Pdf,
}

/// Job content, tagged with its command language
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Formatting intents, encoded at execution time
    EscPosStructured(Vec<Intent>),
    /// Pre-encoded ESC/POS stream
    EscPosRaw(Vec<u8>),
    /// ZPL label program
    Zpl(String),
    /// Bytes the printer understands natively
    Raw(Vec<u8>),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::EscPosStructured(_) => PayloadKind::EscposStructured,
            Payload::EscPosRaw(_) => PayloadKind::EscposRaw,
            Payload::Zpl(_) => PayloadKind::Zpl,
            Payload::Raw(_) => PayloadKind::Raw,
        }
    }

    pub fn language(&self) -> CommandLanguage {
        match self {
            Payload::EscPosStructured(_) | Payload::EscPosRaw(_) => CommandLanguage::EscPos,
            Payload::Zpl(_) => CommandLanguage::Zpl,
            Payload::Raw(_) => CommandLanguage::Raw,
        }
    }
}

/// A print job; immutable once built
#[derive(Debug, Clone)]
pub struct PrintJob {
    id: Uuid,
    name: Option<String>,
    destination: Destination,
    payload: Payload,
    cut: bool,
}

impl PrintJob {
    /// Create a job
    ///
    /// Raw ESC/POS jobs are cut by default. Structured jobs are cut when the
    /// intent list ends with `Cut`; ZPL and raw jobs are never cut.
    pub fn new(destination: Destination, payload: Payload) -> Self {
        let cut = match &payload {
            Payload::EscPosStructured(intents) => matches!(intents.last(), Some(Intent::Cut)),
            Payload::EscPosRaw(_) => true,
            Payload::Zpl(_) | Payload::Raw(_) => false,
        };
        Self {
            id: Uuid::new_v4(),
            name: None,
            destination,
            payload,
            cut,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the cut step; ignored for non ESC/POS payloads
    pub fn with_cut(mut self, cut: bool) -> Self {
        self.cut = cut && self.payload.language() == CommandLanguage::EscPos;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.destination.kind()
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn cut(&self) -> bool {
        self.cut
    }
}

/// Successful job result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job_id: Uuid,
    pub bytes_written: usize,
    pub cut_performed: bool,
}

pub type JobResult = Result<JobReport, PrintError>;

/// Job submission as received from a host
///
/// `payload` is base64 for `ESCPOS_RAW`/`RAW`, plain text for `ZPL` and a
/// JSON intent array for `ESCPOS_STRUCTURED`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub transport_kind: TransportKind,
    pub destination: String,
    pub payload_kind: PayloadKind,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub job_name: Option<String>,
}

impl JobRequest {
    /// Validate and decode into a job
    pub fn into_job(self, default_port: u16) -> Result<PrintJob, PrintError> {
        if self.payload_kind == PayloadKind::Pdf {
            return Err(pdf_not_implemented(self.job_name.as_deref()));
        }

        let destination = Destination::parse(self.transport_kind, &self.destination, default_port)
            .map_err(|e| PrintError::InvalidArgument(e.message))?;

        if self.payload.is_empty() {
            return Err(PrintError::InvalidArgument("payload is required".to_string()));
        }

        let payload = match self.payload_kind {
            PayloadKind::EscposStructured => {
                let intents: Vec<Intent> = serde_json::from_str(&self.payload)
                    .map_err(|e| PrintError::InvalidArgument(format!("invalid intents: {}", e)))?;
                Payload::EscPosStructured(intents)
            }
            PayloadKind::EscposRaw => Payload::EscPosRaw(decode_base64(&self.payload)?),
            PayloadKind::Raw => Payload::Raw(decode_base64(&self.payload)?),
            PayloadKind::Zpl => Payload::Zpl(self.payload),
            PayloadKind::Pdf => return Err(pdf_not_implemented(self.job_name.as_deref())),
        };

        let job = PrintJob::new(destination, payload);
        Ok(match self.job_name {
            Some(name) => job.with_name(name),
            None => job,
        })
    }
}

/// PDF jobs need the host's document renderer
pub fn pdf_not_implemented(job_name: Option<&str>) -> PrintError {
    PrintError::NotImplemented(format!(
        "PDF printing requires a host document renderer ({})",
        job_name.unwrap_or("PDF Document")
    ))
}

/// Decode base64, tolerating whitespace and line breaks
pub fn decode_base64(data: &str) -> Result<Vec<u8>, PrintError> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| PrintError::InvalidArgument(format!("invalid base64 payload: {}", e)))
}
