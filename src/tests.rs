use std::fs;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::{
    load_filter, CanFrame, ChannelParams, FrameQueue, IdFilter, RelayWorker, ShouldRetry, VirtualBus,
    WorkerError, WorkerState,
};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(250);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn frame(id: u32, data: &[u8]) -> CanFrame {
    CanFrame::data_frame(id, data).unwrap()
}

fn virtual_worker(channel: &str, filter: IdFilter) -> RelayWorker {
    let (inbound, outbound) = FrameQueue::pair();
    RelayWorker::new(ChannelParams::virtual_bus(channel), filter, inbound, outbound)
        .with_receive_timeout(Duration::from_millis(10))
}

fn shutdown(worker: &mut RelayWorker) {
    worker.stop();
    worker.join();
    assert_eq!(worker.state(), WorkerState::Stopped);
}

#[test]
fn blocked_ids_never_reach_the_inbound_queue() {
    init_logging();
    let mut worker = virtual_worker("scenario-block", IdFilter::new(vec![0xBBBBB]));
    worker.start().unwrap();
    let peer = VirtualBus::open("scenario-block");

    for id in &[0xAAAAA, 0xBBBBB, 0xCCCCC] {
        peer.send(&frame(*id, &[1]));
    }

    assert_eq!(worker.inbound().pop(WAIT), Some(frame(0xAAAAA, &[1])));
    assert_eq!(worker.inbound().pop(WAIT), Some(frame(0xCCCCC, &[1])));
    assert_eq!(worker.inbound().pop(QUIET), None);

    shutdown(&mut worker);
    let stats = worker.stats();
    assert_eq!(stats.forwarded, 2);
    assert_eq!(stats.dropped, 1);
}

#[test]
fn outbound_frame_is_transmitted_once() {
    init_logging();
    let mut worker = virtual_worker("scenario-tx", IdFilter::allow_all());
    worker.start().unwrap();
    let peer = VirtualBus::open("scenario-tx");

    let sent = frame(0xBBBBB, &[1]);
    let pushed = Instant::now();
    worker.outbound().push(sent);

    assert_eq!(peer.recv_timeout(WAIT), Some(sent));
    assert!(pushed.elapsed() < Duration::from_millis(500));
    assert_eq!(peer.recv_timeout(QUIET), None);
    assert!(worker.outbound().is_empty());

    shutdown(&mut worker);
    assert_eq!(worker.stats().transmitted, 1);
}

#[test]
fn forwarded_frames_keep_order_and_bytes() {
    init_logging();
    let mut worker = virtual_worker("scenario-order", IdFilter::new(vec![0x100]));
    worker.start().unwrap();
    let peer = VirtualBus::open("scenario-order");

    let frames: Vec<CanFrame> = (0u32..32)
        .map(|i| {
            let payload: Vec<u8> = (0..(i % 9) as u8).map(|b| b.wrapping_mul(i as u8)).collect();
            frame(0x0F0 + i * 8, &payload)
        })
        .collect();
    for f in &frames {
        peer.send(f);
    }

    let expected: Vec<CanFrame> = frames.iter().copied().filter(|f| f.id() != 0x100).collect();
    let mut received = Vec::new();
    while received.len() < expected.len() {
        match worker.inbound().pop(WAIT) {
            Some(f) => received.push(f),
            None => break,
        }
    }
    assert_eq!(received, expected);

    shutdown(&mut worker);
}

#[test]
fn drain_after_join_empties_both_queues() {
    init_logging();
    let mut worker = virtual_worker("scenario-drain", IdFilter::allow_all());
    worker.start().unwrap();
    let peer = VirtualBus::open("scenario-drain");

    peer.send(&frame(0x1, &[1]));
    peer.send(&frame(0x2, &[2]));
    let deadline = Instant::now() + WAIT;
    while worker.inbound().len() < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    shutdown(&mut worker);
    for id in 0..3 {
        worker.outbound().push(frame(0x10 + id, &[]));
    }

    assert_eq!(worker.drain(), 5);
    assert!(worker.inbound().is_empty());
    assert!(worker.outbound().is_empty());
    assert_eq!(peer.recv_timeout(QUIET), None);
}

#[test]
fn stop_is_idempotent_and_leaves_the_bus() {
    init_logging();
    let mut worker = virtual_worker("scenario-stop", IdFilter::allow_all());
    worker.start().unwrap();
    assert_eq!(VirtualBus::participants("scenario-stop"), 1);

    worker.stop();
    worker.stop();
    let started = Instant::now();
    worker.join();
    worker.stop();
    assert!(started.elapsed() < Duration::from_millis(500));

    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(VirtualBus::participants("scenario-stop"), 0);
}

#[test]
fn dropping_a_running_worker_leaves_the_bus() {
    init_logging();
    let mut worker = virtual_worker("scenario-drop", IdFilter::allow_all());
    worker.start().unwrap();
    assert_eq!(VirtualBus::participants("scenario-drop"), 1);

    drop(worker);

    let deadline = Instant::now() + WAIT;
    while VirtualBus::participants("scenario-drop") > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(VirtualBus::participants("scenario-drop"), 0);
}

#[test]
fn join_waits_for_a_stop_from_another_thread() {
    init_logging();
    let mut worker = virtual_worker("scenario-join", IdFilter::allow_all());
    worker.start().unwrap();

    let handle = worker.stop_handle();
    let stopped = Arc::new(AtomicBool::new(false));
    let stopper = {
        let stopped = Arc::clone(&stopped);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            stopped.store(true, Ordering::SeqCst);
            handle.stop();
        })
    };

    let started = Instant::now();
    worker.join();
    assert!(stopped.load(Ordering::SeqCst));
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(VirtualBus::participants("scenario-join"), 0);
    stopper.join().unwrap();
}

#[test]
fn unavailable_transport_produces_nothing() {
    init_logging();
    let (inbound, outbound) = FrameQueue::pair();
    let mut worker = RelayWorker::new(ChannelParams::socketcan("nosuchcan42"),
                                      IdFilter::allow_all(),
                                      inbound,
                                      outbound);

    assert!(matches!(worker.start(), Err(WorkerError::TransportUnavailable(_))));
    assert_eq!(worker.state(), WorkerState::Created);
    assert!(worker.inbound().is_empty());
    worker.join();
}

#[test]
fn block_list_loaded_from_table() {
    init_logging();
    let path = std::env::temp_dir().join(format!("canrelay-{}-scenario.csv", std::process::id()));
    fs::write(&path, "IDs\naaaaa\nbbbbb\nbbbbb\n").unwrap();
    let filter = load_filter(&path, "IDs").unwrap();
    fs::remove_file(&path).unwrap();

    let mut worker = virtual_worker("scenario-config", filter);
    worker.start().unwrap();
    let peer = VirtualBus::open("scenario-config");

    for id in &[0xAAAAA, 0xBBBBB, 0xCCCCC] {
        peer.send(&frame(*id, &[1]));
    }

    assert_eq!(worker.inbound().pop(WAIT), Some(frame(0xCCCCC, &[1])));
    assert_eq!(worker.inbound().pop(QUIET), None);

    shutdown(&mut worker);
}

#[test]
fn timeouts_should_be_retried() {
    let timeout = io::Error::from(io::ErrorKind::WouldBlock);
    assert!(timeout.should_retry());
    assert!(io::Error::from(io::ErrorKind::TimedOut).should_retry());
    assert!(io::Error::from_raw_os_error(libc::EINPROGRESS).should_retry());
    assert!(!io::Error::from(io::ErrorKind::BrokenPipe).should_retry());

    let pending: io::Result<CanFrame> = Err(timeout);
    assert!(pending.should_retry());
    assert!(!Ok::<_, io::Error>(frame(0x1, &[])).should_retry());
    assert!(!Err::<CanFrame, _>(io::Error::from(io::ErrorKind::BrokenPipe)).should_retry());
}

#[cfg(feature = "vcan_tests")]
#[test]
fn relays_on_vcan0() {
    use crate::{CanSocket, Transport};

    init_logging();
    let (inbound, outbound) = FrameQueue::pair();
    let mut worker = RelayWorker::new(ChannelParams::socketcan("vcan0"), IdFilter::new(vec![0x666]), inbound, outbound);
    worker.start().unwrap();
    let mut peer = CanSocket::open("vcan0").unwrap();

    peer.transmit(&frame(0x666, &[1])).unwrap();
    peer.transmit(&frame(0x123, &[2])).unwrap();
    assert_eq!(worker.inbound().pop(WAIT), Some(frame(0x123, &[2])));

    worker.outbound().push(frame(0x321, &[3]));
    assert_eq!(peer.receive(WAIT).unwrap(), Some(frame(0x321, &[3])));

    shutdown(&mut worker);
}
