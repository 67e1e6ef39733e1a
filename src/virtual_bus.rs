//! In-process CAN bus.
//!
//! Every `VirtualBus` opened with the same channel name joins the same bus.
//! A transmitted frame is delivered to every other participant on that
//! channel, never back to the sender. Useful for tests and for wiring
//! components together without hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::errors::TransportError;
use crate::frame::CanFrame;
use crate::transport::Transport;

type Registry = HashMap<String, Vec<(u64, Sender<CanFrame>)>>;

static NEXT_PARTICIPANT: AtomicU64 = AtomicU64::new(1);

fn registry() -> MutexGuard<'static, Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One participant on a named in-process bus.
#[derive(Debug)]
pub struct VirtualBus {
    channel: String,
    participant: u64,
    rx: Receiver<CanFrame>,
}

impl VirtualBus {
    /// Join the bus called `channel`, creating it if needed.
    pub fn open(channel: &str) -> VirtualBus {
        let participant = NEXT_PARTICIPANT.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded();

        registry()
            .entry(channel.to_owned())
            .or_default()
            .push((participant, tx));

        log::debug!("virtual bus '{}': participant {} joined", channel, participant);

        VirtualBus {
            channel: channel.to_owned(),
            participant,
            rx,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Send a frame to every other participant.
    pub fn send(&self, frame: &CanFrame) {
        let reg = registry();
        if let Some(peers) = reg.get(&self.channel) {
            for (_, tx) in peers.iter().filter(|(id, _)| *id != self.participant) {
                let _ = tx.send(*frame);
            }
        }
    }

    /// Wait up to `timeout` for a frame from another participant.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<CanFrame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Number of participants currently on `channel`.
    pub fn participants(channel: &str) -> usize {
        registry().get(channel).map_or(0, Vec::len)
    }
}

impl Transport for VirtualBus {
    fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>, TransportError> {
        Ok(self.recv_timeout(timeout))
    }

    fn transmit(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
        self.send(frame);
        Ok(())
    }

    fn close(self: Box<Self>) {
        drop(self);
    }
}

impl Drop for VirtualBus {
    fn drop(&mut self) {
        let mut reg = registry();
        if let Some(peers) = reg.get_mut(&self.channel) {
            peers.retain(|(id, _)| *id != self.participant);
            if peers.is_empty() {
                reg.remove(&self.channel);
            }
        }
        log::debug!("virtual bus '{}': participant {} left", self.channel, self.participant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_reach_other_participants_only() {
        let a = VirtualBus::open("vbus-broadcast");
        let b = VirtualBus::open("vbus-broadcast");
        let c = VirtualBus::open("vbus-broadcast");
        assert_eq!(c.channel(), "vbus-broadcast");

        let frame = CanFrame::data_frame(0x42, &[1, 2, 3]).unwrap();
        a.send(&frame);

        assert_eq!(b.recv_timeout(Duration::from_millis(100)), Some(frame));
        assert_eq!(c.recv_timeout(Duration::from_millis(100)), Some(frame));
        assert_eq!(a.recv_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn channels_are_isolated() {
        let a = VirtualBus::open("vbus-isolated-a");
        let b = VirtualBus::open("vbus-isolated-b");
        a.send(&CanFrame::data_frame(0x1, &[]).unwrap());
        assert_eq!(b.recv_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn closing_leaves_the_bus() {
        let a = VirtualBus::open("vbus-close");
        let b: Box<dyn Transport> = Box::new(VirtualBus::open("vbus-close"));
        assert_eq!(VirtualBus::participants("vbus-close"), 2);
        b.close();
        assert_eq!(VirtualBus::participants("vbus-close"), 1);
        drop(a);
        assert_eq!(VirtualBus::participants("vbus-close"), 0);
    }
}
