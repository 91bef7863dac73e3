mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Event, FakeTransport, Recorder};
use pos_printer::{CUT, Destination, INIT, Intent, PrintError};
use print_host::{DispatchOptions, Dispatcher, Payload, PrintJob, SerializationPolicy};

fn raw_job(destination: &Destination, body: &str) -> PrintJob {
    PrintJob::new(destination.clone(), Payload::Raw(body.as_bytes().to_vec()))
}

fn options(policy: SerializationPolicy) -> DispatchOptions {
    DispatchOptions {
        policy,
        ..DispatchOptions::default()
    }
}

/// Each job's events must be a contiguous Open, Write*, Close run
fn assert_no_interleaving(events: &[Event]) {
    let mut open: Option<&str> = None;
    for event in events {
        match (event, open) {
            (Event::Open(label), None) => open = Some(label),
            (Event::Write(label, _), Some(current)) => assert_eq!(label, current),
            (Event::Close(label), Some(current)) => {
                assert_eq!(label, current);
                open = None;
            }
            (event, state) => panic!("unexpected {:?} while {:?} open", event, state),
        }
    }
    assert!(open.is_none(), "link left open");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_jobs_run_in_submission_order() {
    let recorder = Arc::new(Recorder::default());
    let printer = Destination::network("10.0.0.5", 9100);
    let dispatcher = Dispatcher::new(
        FakeTransport::new(recorder.clone()).into_set(),
        DispatchOptions::default(),
    );

    let handles: Vec<_> = ["J1", "J2", "J3"]
        .iter()
        .map(|body| dispatcher.submit(raw_job(&printer, body)))
        .collect();
    for handle in handles {
        let report = handle.await.unwrap();
        assert_eq!(report.bytes_written, 2);
        assert!(!report.cut_performed);
    }

    let events = recorder.events();
    assert_no_interleaving(&events);
    assert_eq!(
        recorder.writes(),
        vec![b"J1".to_vec(), b"J2".to_vec(), b"J3".to_vec()]
    );
    assert_eq!(dispatcher.status().queue_size, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submitters_never_interleave() {
    let recorder = Arc::new(Recorder::default());
    let dispatcher = Arc::new(Dispatcher::new(
        FakeTransport::new(recorder.clone()).into_set(),
        DispatchOptions::default(),
    ));
    let submitted = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let mut tasks = Vec::new();
    for caller in 0..8 {
        let dispatcher = dispatcher.clone();
        let submitted = submitted.clone();
        tasks.push(tokio::spawn(async move {
            let printer = Destination::network(format!("10.0.0.{}", caller % 3), 9100);
            let body = format!("caller-{}", caller);
            let handle = {
                let mut order = submitted.lock();
                order.push(body.clone().into_bytes());
                dispatcher.submit(raw_job(&printer, &body))
            };
            handle.await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    assert_no_interleaving(&recorder.events());
    assert_eq!(recorder.writes(), *submitted.lock());
}

#[tokio::test]
async fn test_escpos_job_writes_init_payload_and_cut() {
    let recorder = Arc::new(Recorder::default());
    let printer = Destination::network("10.0.0.5", 9100);
    let dispatcher = Dispatcher::new(
        FakeTransport::new(recorder.clone()).into_set(),
        DispatchOptions::default(),
    );

    let job = PrintJob::new(
        printer,
        Payload::EscPosStructured(vec![Intent::BoldLine { content: "A".into() }, Intent::Cut]),
    );
    let report = dispatcher.submit(job).await.unwrap();
    assert!(report.cut_performed);

    let writes = recorder.writes();
    assert_eq!(writes.len(), 3);
    assert_eq!(writes[0], INIT.to_vec());
    assert_eq!(writes[1], vec![0x1B, 0x45, 0x01, b'A', 0x1B, 0x45, 0x00, 0x0A]);
    assert_eq!(writes[2], CUT.to_vec());
}

#[tokio::test]
async fn test_open_failure_fails_job_without_writes() {
    let recorder = Arc::new(Recorder::default());
    let down = Destination::network("10.0.0.9", 9100);
    let up = Destination::network("10.0.0.5", 9100);
    let dispatcher = Dispatcher::new(
        FakeTransport::new(recorder.clone()).refuse(&down).into_set(),
        DispatchOptions::default(),
    );

    let failed = dispatcher.submit(raw_job(&down, "lost"));
    let next = dispatcher.submit(raw_job(&up, "kept"));

    let err = failed.await.unwrap_err();
    assert!(matches!(err, PrintError::ConnectionFailed(_)));
    assert!(next.await.is_ok());

    assert_eq!(recorder.writes(), vec![b"kept".to_vec()]);
    let status = dispatcher.status();
    assert_eq!(status.queue_size, 0);
    assert!(status.last_error.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_cut_failure_still_succeeds() {
    let recorder = Arc::new(Recorder::default());
    let printer = Destination::network("10.0.0.5", 9100);
    let dispatcher = Dispatcher::new(
        FakeTransport::new(recorder.clone()).without_cutter().into_set(),
        DispatchOptions::default(),
    );

    let job = PrintJob::new(printer, Payload::EscPosRaw(b"receipt".to_vec()));
    let report = dispatcher.submit(job).await.unwrap();
    assert!(!report.cut_performed);
    assert_eq!(report.bytes_written, 7 + 3);
    assert!(dispatcher.status().last_error.is_none());
    assert!(matches!(recorder.events().last(), Some(Event::Close(_))));
}

#[tokio::test]
async fn test_queue_size_counts_undelivered_jobs() {
    let recorder = Arc::new(Recorder::default());
    let printer = Destination::network("10.0.0.5", 9100);
    let (transport, gate) = FakeTransport::new(recorder.clone()).gate(&printer);
    let dispatcher = Dispatcher::new(transport.into_set(), DispatchOptions::default());

    let handles: Vec<_> = (0..3)
        .map(|i| dispatcher.submit(raw_job(&printer, &format!("J{}", i))))
        .collect();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(dispatcher.status().queue_size, 3);

    gate.add_permits(3);
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(dispatcher.status().queue_size, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_destination_lanes_run_in_parallel() {
    let recorder = Arc::new(Recorder::default());
    let slow = Destination::network("10.0.0.1", 9100);
    let fast = Destination::network("10.0.0.2", 9100);
    let (transport, gate) = FakeTransport::new(recorder.clone()).gate(&slow);
    let dispatcher = Dispatcher::new(
        transport.into_set(),
        options(SerializationPolicy::PerDestination),
    );

    let blocked = dispatcher.submit(raw_job(&slow, "slow"));
    let quick = dispatcher.submit(raw_job(&fast, "fast"));

    let report = tokio::time::timeout(Duration::from_secs(2), quick)
        .await
        .expect("fast printer waited for the slow one");
    assert!(report.is_ok());

    gate.add_permits(1);
    assert!(blocked.await.is_ok());
    assert_eq!(recorder.writes(), vec![b"fast".to_vec(), b"slow".to_vec()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_global_lane_blocks_other_printers() {
    let recorder = Arc::new(Recorder::default());
    let slow = Destination::network("10.0.0.1", 9100);
    let fast = Destination::network("10.0.0.2", 9100);
    let (transport, gate) = FakeTransport::new(recorder.clone()).gate(&slow);
    let dispatcher = Dispatcher::new(transport.into_set(), options(SerializationPolicy::Global));

    let blocked = dispatcher.submit(raw_job(&slow, "slow"));
    let mut quick = dispatcher.submit(raw_job(&fast, "fast"));

    assert!(
        tokio::time::timeout(Duration::from_millis(100), &mut quick)
            .await
            .is_err()
    );

    gate.add_permits(1);
    assert!(blocked.await.is_ok());
    assert!(quick.await.is_ok());
    assert_eq!(recorder.writes(), vec![b"slow".to_vec(), b"fast".to_vec()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_closes_queued_jobs() {
    let recorder = Arc::new(Recorder::default());
    let printer = Destination::network("10.0.0.5", 9100);
    let (transport, gate) = FakeTransport::new(recorder.clone()).gate(&printer);
    let dispatcher = Dispatcher::new(transport.into_set(), DispatchOptions::default());

    let running = dispatcher.submit(raw_job(&printer, "running"));
    let queued = dispatcher.submit(raw_job(&printer, "queued"));
    tokio::time::sleep(Duration::from_millis(20)).await;

    tokio::join!(dispatcher.shutdown(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.add_permits(2);
    });

    assert!(running.await.is_ok());
    assert!(matches!(queued.await, Err(PrintError::DispatcherClosed)));
    assert!(matches!(
        dispatcher.submit(raw_job(&printer, "late")).await,
        Err(PrintError::DispatcherClosed)
    ));
    assert_eq!(recorder.writes(), vec![b"running".to_vec()]);
    assert_eq!(dispatcher.status().queue_size, 0);
}

#[tokio::test]
async fn test_panicking_transport_fails_only_its_job() {
    let recorder = Arc::new(Recorder::default());
    let broken = Destination::network("10.0.0.13", 9100);
    let healthy = Destination::network("10.0.0.5", 9100);
    let dispatcher = Dispatcher::new(
        FakeTransport::new(recorder.clone())
            .panic_on(&broken)
            .into_set(),
        DispatchOptions::default(),
    );

    let crashed = dispatcher.submit(raw_job(&broken, "lost"));
    let next = dispatcher.submit(raw_job(&healthy, "kept"));

    let err = crashed.await.unwrap_err();
    assert_eq!(err.code(), "INTERNAL");
    assert!(next.await.is_ok());

    assert_eq!(recorder.writes(), vec![b"kept".to_vec()]);
    let status = dispatcher.status();
    assert_eq!(status.queue_size, 0);
    assert!(status.last_error.unwrap().contains("aborted"));

    // The lane keeps serving jobs
    assert!(dispatcher.submit(raw_job(&healthy, "again")).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_destination_case_shares_one_lane() {
    let recorder = Arc::new(Recorder::default());
    let lower = Destination::network("printer.local", 9100);
    let upper = Destination::Network {
        host: "PRINTER.LOCAL".into(),
        port: 9100,
    };
    let (transport, gate) = FakeTransport::new(recorder.clone()).gate(&lower);
    let dispatcher = Dispatcher::new(
        transport.into_set(),
        options(SerializationPolicy::PerDestination),
    );

    let first = dispatcher.submit(raw_job(&lower, "first"));
    let mut second = dispatcher.submit(raw_job(&upper, "second"));

    // Same printer, so the second job queues behind the held first one
    assert!(
        tokio::time::timeout(Duration::from_millis(100), &mut second)
            .await
            .is_err()
    );

    gate.add_permits(1);
    assert!(first.await.is_ok());
    assert!(second.await.is_ok());
    assert_eq!(recorder.writes(), vec![b"first".to_vec(), b"second".to_vec()]);
}
