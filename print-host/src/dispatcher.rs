//! Print job dispatcher
//!
//! Jobs are queued on a channel and executed by one worker per
//! serialization lane, strictly in submission order and never two at a time
//! on the same lane. `submit` only enqueues; the caller awaits the returned
//! [`JobHandle`] for the result.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use pos_printer::{
    CommandLanguage, Destination, EscPosEncoder, INIT, Intent, LF, PrintError, Session,
    TextEncoding, TransportSet,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::job::{JobReport, JobResult, Payload, PrintJob};

/// How jobs are grouped into serial lanes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationPolicy {
    /// One lane for the whole process
    #[default]
    Global,
    /// One lane per printer; different printers print in parallel
    PerDestination,
}

impl std::str::FromStr for SerializationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "global" => Ok(SerializationPolicy::Global),
            "per_destination" | "per-destination" => Ok(SerializationPolicy::PerDestination),
            other => Err(format!("unknown serialization policy: {}", other)),
        }
    }
}

/// Payload preparation settings
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub text_encoding: TextEncoding,
    /// Line feeds written before cutting a raw ESC/POS job
    pub feed_before_cut: usize,
    pub policy: SerializationPolicy,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            text_encoding: TextEncoding::Utf8,
            feed_before_cut: 3,
            policy: SerializationPolicy::Global,
        }
    }
}

/// Queue snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterStatus {
    /// Jobs submitted whose result has not been delivered yet
    pub queue_size: usize,
    pub last_error: Option<String>,
}

/// Pending result of a submitted job
pub struct JobHandle {
    job_id: Uuid,
    rx: oneshot::Receiver<JobResult>,
}

impl JobHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }
}

impl Future for JobHandle {
    type Output = JobResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(PrintError::DispatcherClosed)))
    }
}

struct QueueEntry {
    job: PrintJob,
    result_slot: oneshot::Sender<JobResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LaneKey {
    Global,
    Destination(Destination),
}

struct Shared {
    transports: TransportSet,
    options: DispatchOptions,
    pending: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn finish(&self, entry: QueueEntry, result: JobResult) {
        if let Err(e) = &result {
            *self.last_error.lock() = Some(e.to_string());
        }
        self.pending.fetch_sub(1, Ordering::SeqCst);
        // The submitter may have dropped its handle.
        let _ = entry.result_slot.send(result);
    }
}

/// Serializing print job dispatcher
pub struct Dispatcher {
    shared: Arc<Shared>,
    lanes: Mutex<HashMap<LaneKey, mpsc::UnboundedSender<QueueEntry>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(transports: TransportSet, options: DispatchOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                transports,
                options,
                pending: AtomicUsize::new(0),
                last_error: Mutex::new(None),
            }),
            lanes: Mutex::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Queue a job
    ///
    /// Returns immediately. Must be called from within a tokio runtime.
    pub fn submit(&self, job: PrintJob) -> JobHandle {
        let (tx, rx) = oneshot::channel();
        let job_id = job.id();
        let handle = JobHandle { job_id, rx };

        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        let entry = QueueEntry {
            job,
            result_slot: tx,
        };

        if self.shutdown.is_cancelled() {
            self.shared.finish(entry, Err(PrintError::DispatcherClosed));
            return handle;
        }

        let key = match self.shared.options.policy {
            SerializationPolicy::Global => LaneKey::Global,
            SerializationPolicy::PerDestination => {
                LaneKey::Destination(entry.job.destination().normalized())
            }
        };

        let sender = self.lane(key);
        if let Err(mpsc::error::SendError(entry)) = sender.send(entry) {
            self.shared.finish(entry, Err(PrintError::DispatcherClosed));
        } else {
            debug!(job_id = %job_id, "Job queued");
        }
        handle
    }

    /// Current queue size and most recent failure
    pub fn status(&self) -> PrinterStatus {
        PrinterStatus {
            queue_size: self.shared.pending.load(Ordering::SeqCst),
            last_error: self.shared.last_error.lock().clone(),
        }
    }

    /// Stop all workers
    ///
    /// A job already printing finishes; jobs still queued resolve to
    /// `DispatcherClosed`.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.lanes.lock().clear();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Print worker panicked");
            }
        }
        info!("Dispatcher stopped");
    }

    fn lane(&self, key: LaneKey) -> mpsc::UnboundedSender<QueueEntry> {
        let mut lanes = self.lanes.lock();
        if let Some(tx) = lanes.get(&key) {
            return tx.clone();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = LaneWorker {
            shared: self.shared.clone(),
            rx,
            shutdown: self.shutdown.child_token(),
        };
        debug!(lane = ?key, "Starting print worker");
        self.workers.lock().push(tokio::spawn(worker.run()));
        lanes.insert(key, tx.clone());
        tx
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Single consumer of one lane
struct LaneWorker {
    shared: Arc<Shared>,
    rx: mpsc::UnboundedReceiver<QueueEntry>,
    shutdown: CancellationToken,
}

impl LaneWorker {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                entry = self.rx.recv() => {
                    let Some(entry) = entry else {
                        break;
                    };
                    let result = self.run_isolated(&entry.job).await;
                    match &result {
                        Ok(report) => info!(
                            job_id = %report.job_id,
                            bytes = report.bytes_written,
                            cut = report.cut_performed,
                            "Print job completed"
                        ),
                        Err(e) => warn!(job_id = %entry.job.id(), error = %e, "Print job failed"),
                    }
                    self.shared.finish(entry, result);
                }
            }
        }

        self.rx.close();
        while let Ok(entry) = self.rx.try_recv() {
            self.shared.finish(entry, Err(PrintError::DispatcherClosed));
        }
    }

    /// Execute on its own task so a panicking transport fails only its job
    async fn run_isolated(&self, job: &PrintJob) -> JobResult {
        let shared = self.shared.clone();
        let owned = job.clone();
        match tokio::spawn(async move { execute(&shared, &owned).await }).await {
            Ok(result) => result,
            Err(e) => {
                error!(job_id = %job.id(), error = %e, "Print job aborted");
                Err(PrintError::Internal(format!("print job aborted: {}", e)))
            }
        }
    }
}

/// Run one job: encode, open a session, send, cut, close
#[instrument(skip_all, fields(job_id = %job.id(), destination = %job.destination()))]
async fn execute(shared: &Shared, job: &PrintJob) -> JobResult {
    let (data, language) = prepare_payload(job, &shared.options)?;

    let transport = shared.transports.get(job.transport_kind()).ok_or_else(|| {
        PrintError::TransportUnavailable(format!(
            "no {} transport configured",
            job.transport_kind()
        ))
    })?;

    let init = (language == CommandLanguage::EscPos).then_some(&INIT[..]);
    let session = Session::new(transport, job.destination().clone(), init);
    let outcome = session.execute(&data, job.cut()).await?;

    Ok(JobReport {
        job_id: job.id(),
        bytes_written: outcome.bytes_written,
        cut_performed: outcome.cut_performed,
    })
}

/// Bytes to send for a job
///
/// A trailing `Cut` in structured jobs becomes the session's cut step so a
/// printer without a cutter still completes the job.
fn prepare_payload(
    job: &PrintJob,
    options: &DispatchOptions,
) -> Result<(Vec<u8>, CommandLanguage), PrintError> {
    let language = job.payload().language();
    let data = match job.payload() {
        Payload::EscPosStructured(intents) => {
            let body = match intents.split_last() {
                Some((Intent::Cut, rest)) if job.cut() => rest,
                _ => &intents[..],
            };
            EscPosEncoder::new(language)
                .with_text_encoding(options.text_encoding)
                .encode(body)?
        }
        Payload::EscPosRaw(bytes) => {
            let mut data = bytes.clone();
            if job.cut() {
                data.extend(std::iter::repeat_n(LF, options.feed_before_cut));
            }
            data
        }
        Payload::Zpl(program) => program.as_bytes().to_vec(),
        Payload::Raw(bytes) => bytes.clone(),
    };
    Ok((data, language))
}
