//! In-memory printer transport that records every link event

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pos_printer::{
    CUT, Connection, Destination, TransportError, Transport, TransportKind, TransportSet,
};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open(String),
    Write(String, Vec<u8>),
    Close(String),
}

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    /// Every write, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Write(_, data) => Some(data),
                _ => None,
            })
            .collect()
    }
}

/// Fake network transport
pub struct FakeTransport {
    kind: TransportKind,
    recorder: Arc<Recorder>,
    write_delay: Duration,
    refuse: HashSet<String>,
    no_cutter: bool,
    gates: HashMap<String, Arc<Semaphore>>,
    panics: HashSet<String>,
}

impl FakeTransport {
    pub fn new(recorder: Arc<Recorder>) -> Self {
        Self {
            kind: TransportKind::Network,
            recorder,
            write_delay: Duration::from_millis(2),
            refuse: HashSet::new(),
            no_cutter: false,
            gates: HashMap::new(),
            panics: HashSet::new(),
        }
    }

    /// Refuse connections to `destination`
    pub fn refuse(mut self, destination: &Destination) -> Self {
        self.refuse.insert(destination.to_string());
        self
    }

    /// Fail every cut command
    pub fn without_cutter(mut self) -> Self {
        self.no_cutter = true;
        self
    }

    /// Hold every open on `destination` until a permit is added
    pub fn gate(mut self, destination: &Destination) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.insert(destination.to_string(), gate.clone());
        (self, gate)
    }

    /// Panic inside `open` for `destination`
    pub fn panic_on(mut self, destination: &Destination) -> Self {
        self.panics.insert(destination.to_string());
        self
    }

    pub fn into_set(self) -> TransportSet {
        TransportSet::new().with(Arc::new(self))
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open(&self, destination: &Destination) -> Result<Box<dyn Connection>, TransportError> {
        let label = destination.to_string();
        if let Some(gate) = self.gates.get(&label) {
            gate.acquire()
                .await
                .map_err(|_| TransportError::unavailable("gate closed"))?
                .forget();
        }
        if self.panics.contains(&label) {
            panic!("driver crashed on {}", label);
        }
        if self.refuse.contains(&label) {
            return Err(TransportError::not_found(format!("{}: connection refused", label)));
        }

        self.recorder.push(Event::Open(label.clone()));
        Ok(Box::new(FakeConnection {
            label,
            recorder: self.recorder.clone(),
            write_delay: self.write_delay,
            no_cutter: self.no_cutter,
            open: true,
        }))
    }
}

struct FakeConnection {
    label: String,
    recorder: Arc<Recorder>,
    write_delay: Duration,
    no_cutter: bool,
    open: bool,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        tokio::time::sleep(self.write_delay).await;
        if self.no_cutter && data == CUT.as_slice() {
            return Err(TransportError::io("unsupported command"));
        }
        self.recorder
            .push(Event::Write(self.label.clone(), data.to_vec()));
        Ok(())
    }

    async fn close_stream(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.open {
            self.open = false;
            self.recorder.push(Event::Close(self.label.clone()));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
