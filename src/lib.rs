//! CAN bus relay.
//!
//! A relay worker sits between a CAN channel and two queues. Frames received
//! from the bus are checked against a block-list of arbitration IDs; the ones
//! that pass are pushed onto the *inbound* queue. Frames the caller pushes
//! onto the *outbound* queue are transmitted onto the bus.
//!
//! # An introduction to CAN
//!
//! Every frame consists of an ID and a payload of up to 8 bytes. IDs are
//! either 11 bit (standard) or 29 bit (extended). The ID doubles as the
//! priority during arbitration; here it is used purely as a filter key.
//!
//! # Running a relay
//!
//! ```no_run
//! use canrelay::{ChannelParams, FrameQueue, IdFilter, RelayWorker, CanFrame};
//! use std::time::Duration;
//!
//! let (inbound, outbound) = FrameQueue::pair();
//! let filter = IdFilter::new(vec![0x7DF]);
//! let mut worker = RelayWorker::new(ChannelParams::socketcan("can0"), filter, inbound, outbound);
//!
//! worker.start()?;
//! worker.outbound().push(CanFrame::data_frame(0x123, &[1, 2, 3])?);
//! if let Some(frame) = worker.inbound().pop(Duration::from_secs(1)) {
//!     println!("{:X}", frame);
//! }
//!
//! worker.stop();
//! worker.join();
//! worker.drain();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The worker thread owns the transport while it runs. Callers only ever
//! exchange frames through the queues.

pub extern crate libc;
pub extern crate log;
pub extern crate nix;

pub mod config;
mod constants;
mod errors;
mod filter;
mod frame;
mod queue;
mod socket;
mod transport;
#[cfg(target_os = "linux")]
mod util;
mod virtual_bus;
mod worker;

#[cfg(test)]
mod tests;

pub use config::{load_filter, load_ids};
pub use constants::{DEFAULT_RECEIVE_TIMEOUT_MS, EFF_MASK, MAX_DATA_LEN, SFF_MASK};
pub use errors::{ConstructionError, LoadError, ParseFrameError, TransportError, WorkerError};
pub use filter::IdFilter;
pub use frame::CanFrame;
pub use queue::FrameQueue;
pub use socket::CanSocket;
pub use transport::{ChannelParams, Connector, InterfaceKind, Transport};
pub use virtual_bus::VirtualBus;
pub use worker::{Relay, RelayWorker, StatsSnapshot, Step, StopHandle, WorkerState, WorkerStats};

use std::io;

/// Check an error return value for timeouts.
///
/// Due to the fact that timeouts are reported as errors, reading from a
/// socket with a timeout that does not receive a frame in time will result
/// in an error being returned. This trait adds a `should_retry` method to
/// `Error` and `Result` to check for this condition.
pub trait ShouldRetry {
    /// Check for timeout
    ///
    /// If `true`, the error is probably due to a timeout.
    fn should_retry(&self) -> bool;
}

impl ShouldRetry for io::Error {
    fn should_retry(&self) -> bool {
        match self.kind() {
            // EAGAIN, EINPROGRESS and EWOULDBLOCK are the three possible codes
            // returned when a timeout occurs. the stdlib already maps EAGAIN
            // and EWOULDBLOCK os WouldBlock
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => true,
            // however, EINPROGRESS is also valid
            _ => self.raw_os_error() == Some(libc::EINPROGRESS),
        }
    }
}

impl<T> ShouldRetry for io::Result<T> {
    fn should_retry(&self) -> bool {
        match *self {
            Ok(_) => false,
            Err(ref e) => e.should_retry(),
        }
    }
}
