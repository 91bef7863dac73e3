//! Line protocol for the `print-host` binary
//!
//! Input is newline-delimited JSON [`JobRequest`]s. Every non-empty input
//! line produces exactly one JSON output line, in input order, once that job
//! has finished (or was rejected).

use anyhow::Context;
use pos_printer::PrintError;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dispatcher::JobHandle;
use crate::job::{JobRequest, JobResult};
use crate::service::PrintService;

enum Pending {
    Queued(JobHandle),
    Rejected(PrintError),
}

/// Serve requests from `input` until EOF
///
/// Returns the number of result lines written.
pub async fn serve<R, W>(service: &PrintService, input: R, mut output: W) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Pending>();

    let read = async move {
        let mut lines = input.lines();
        let mut line_no = 0usize;
        while let Some(line) = lines.next_line().await.context("Failed to read request")? {
            line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let pending = match serde_json::from_str::<JobRequest>(line) {
                Ok(request) => match service.submit(request) {
                    Ok(handle) => Pending::Queued(handle),
                    Err(e) => Pending::Rejected(e),
                },
                Err(e) => {
                    warn!(line = line_no, error = %e, "Malformed request");
                    Pending::Rejected(PrintError::InvalidArgument(format!(
                        "line {}: {}",
                        line_no, e
                    )))
                }
            };
            if tx.send(pending).is_err() {
                break;
            }
        }
        debug!(lines = line_no, "Input closed");
        anyhow::Ok(())
    };

    let write = async move {
        let mut written = 0usize;
        while let Some(pending) = rx.recv().await {
            let line = match pending {
                Pending::Queued(handle) => {
                    let job_id = handle.job_id();
                    result_line(Some(job_id.to_string()), handle.await)
                }
                Pending::Rejected(e) => result_line(None, Err(e)),
            };
            output
                .write_all(format!("{}\n", line).as_bytes())
                .await
                .context("Failed to write result")?;
            output.flush().await.context("Failed to flush result")?;
            written += 1;
        }
        anyhow::Ok(written)
    };

    let (read, written) = tokio::join!(read, write);
    read?;
    written
}

/// JSON result line for one job
pub fn result_line(job_id: Option<String>, result: JobResult) -> Value {
    match result {
        Ok(report) => json!({
            "ok": true,
            "jobId": report.job_id,
            "bytesWritten": report.bytes_written,
            "cutPerformed": report.cut_performed,
        }),
        Err(e) => json!({
            "ok": false,
            "jobId": job_id,
            "code": e.code(),
            "error": e.to_string(),
        }),
    }
}
