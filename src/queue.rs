use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::frame::CanFrame;

/// FrameQueue
///
/// An unbounded FIFO of frames, safe to push and pop from any number of
/// threads at once. Clones are handles to the same queue, so the caller and
/// the relay worker can each hold one.
#[derive(Debug, Clone)]
pub struct FrameQueue {
    tx: Sender<CanFrame>,
    rx: Receiver<CanFrame>,
}

impl FrameQueue {
    pub fn new() -> FrameQueue {
        let (tx, rx) = unbounded();
        FrameQueue { tx, rx }
    }

    /// Two independent queues, `(inbound, outbound)`.
    pub fn pair() -> (FrameQueue, FrameQueue) {
        (FrameQueue::new(), FrameQueue::new())
    }

    /// Append a frame. Never blocks.
    #[inline]
    pub fn push(&self, frame: CanFrame) {
        // Both ends live in `self`, so the channel can never be disconnected.
        let _ = self.tx.send(frame);
    }

    /// Take the oldest frame, or `None` if the queue is empty.
    #[inline]
    pub fn try_pop(&self) -> Option<CanFrame> {
        self.rx.try_recv().ok()
    }

    /// Take the oldest frame, waiting up to `timeout` for one to arrive.
    pub fn pop(&self, timeout: Duration) -> Option<CanFrame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Discard everything currently queued. Returns how many frames were
    /// dropped.
    pub fn drain(&self) -> usize {
        let mut n = 0;
        while self.try_pop().is_some() {
            n += 1;
        }
        n
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for FrameQueue {
    fn default() -> FrameQueue {
        FrameQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    fn frame(id: u32) -> CanFrame {
        CanFrame::data_frame(id, &[id as u8]).unwrap()
    }

    #[test]
    fn fifo_order() {
        let q = FrameQueue::new();
        for id in 1..=3 {
            q.push(frame(id));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.try_pop(), Some(frame(1)));
        assert_eq!(q.try_pop(), Some(frame(2)));
        assert_eq!(q.try_pop(), Some(frame(3)));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn clones_share_one_queue() {
        let a = FrameQueue::new();
        let b = a.clone();
        a.push(frame(7));
        assert_eq!(b.try_pop(), Some(frame(7)));
        assert!(a.is_empty());
    }

    #[test]
    fn pop_times_out_when_empty() {
        let q = FrameQueue::new();
        let start = Instant::now();
        assert_eq!(q.pop(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn pop_wakes_on_push_from_another_thread() {
        let q = FrameQueue::new();
        let producer = q.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.push(frame(9));
        });
        assert_eq!(q.pop(Duration::from_secs(5)), Some(frame(9)));
        t.join().unwrap();
    }

    #[test]
    fn drain_empties_the_queue() {
        let q = FrameQueue::new();
        for id in 0..5 {
            q.push(frame(id));
        }
        assert_eq!(q.drain(), 5);
        assert!(q.is_empty());
        assert_eq!(q.drain(), 0);
    }
}
