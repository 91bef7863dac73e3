//! Printer session
//!
//! One session drives one connection to one device for one job:
//! open (+ INIT) → send → optional cut → close. A session is either fully
//! open and ready to write, or closed; it never exposes a half-opened link.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::error::{PrintError, PrintResult};
use crate::escpos::CUT;
use crate::transport::{Connection, Destination, Transport};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Ready,
}

/// What a completed session did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionOutcome {
    pub bytes_written: usize,
    pub cut_performed: bool,
}

/// A single-use session on one printer
pub struct Session {
    transport: Arc<dyn Transport>,
    destination: Destination,
    init: Option<&'static [u8]>,
    connection: Option<Box<dyn Connection>>,
    state: SessionState,
    used: bool,
    bytes_written: usize,
}

impl Session {
    /// Create a closed session
    ///
    /// `init` is written once right after the link opens (ESC @ for ESC/POS
    /// printers, nothing for ZPL/raw).
    pub fn new(
        transport: Arc<dyn Transport>,
        destination: Destination,
        init: Option<&'static [u8]>,
    ) -> Self {
        Self {
            transport,
            destination,
            init,
            connection: None,
            state: SessionState::Closed,
            used: false,
            bytes_written: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Ready
            && self.connection.as_ref().is_some_and(|c| c.is_open())
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Acquire the link and initialize the printer
    ///
    /// Any failure leaves the session closed with the link released.
    #[instrument(skip(self), fields(destination = %self.destination))]
    pub async fn open(&mut self) -> PrintResult<()> {
        if self.used {
            return Err(PrintError::InvalidState(format!(
                "session for {} already used",
                self.destination
            )));
        }
        self.used = true;
        self.state = SessionState::Opening;

        let mut conn = match self.transport.open(&self.destination).await {
            Ok(c) => c,
            Err(e) => {
                self.state = SessionState::Closed;
                warn!(error = %e, "Connection failed");
                return Err(PrintError::from_open(e));
            }
        };

        if let Some(init) = self.init
            && let Err(e) = conn.write_all(init).await
        {
            warn!(error = %e, "Printer init failed");
            conn.close().await;
            self.state = SessionState::Closed;
            return Err(PrintError::from_write(e));
        }

        self.connection = Some(conn);
        self.state = SessionState::Ready;
        debug!("Session ready");
        Ok(())
    }

    /// Write bytes verbatim
    pub async fn send(&mut self, data: &[u8]) -> PrintResult<()> {
        let conn = self.ready_connection("send")?;
        conn.write_all(data).await.map_err(PrintError::from_write)?;
        self.bytes_written += data.len();
        Ok(())
    }

    /// Cut the paper
    ///
    /// Never fails: printers without a cutter are common, so any error is
    /// logged and reported as `false`.
    pub async fn cut(&mut self) -> bool {
        let result = match self.ready_connection("cut") {
            Ok(conn) => conn.write_all(&CUT).await.map_err(|e| {
                PrintError::CutUnsupported(e.to_string())
            }),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                info!(error = %e, "Paper cut not supported or failed");
                false
            }
        }
    }

    /// Release the link; safe in every state and on repeat
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            conn.close().await;
            debug!(destination = %self.destination, "Session closed");
        }
        self.state = SessionState::Closed;
    }

    /// Run a whole print on a fresh session
    ///
    /// Opens, sends `data`, cuts when asked, and closes on every exit path.
    pub async fn execute(mut self, data: &[u8], cut: bool) -> PrintResult<SessionOutcome> {
        self.open().await?;

        let result = async {
            self.send(data).await?;
            let cut_performed = if cut { self.cut().await } else { false };
            Ok(SessionOutcome {
                bytes_written: self.bytes_written,
                cut_performed,
            })
        }
        .await;

        self.close().await;
        result
    }

    fn ready_connection(&mut self, op: &str) -> PrintResult<&mut Box<dyn Connection>> {
        match (self.state, self.connection.as_mut()) {
            (SessionState::Ready, Some(conn)) if conn.is_open() => Ok(conn),
            (SessionState::Ready, _) => Err(PrintError::NotConnected(format!(
                "{} on {}: link is down",
                op, self.destination
            ))),
            (state, _) => Err(PrintError::InvalidState(format!(
                "{} called in {:?} state",
                op, state
            ))),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.connection.is_some() {
            // The connection drop still releases the OS handle.
            warn!(destination = %self.destination, "Session dropped without close");
        }
    }
}
