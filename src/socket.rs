//! SocketCAN raw socket transport.
//!
//! Opens a `CAN_RAW` socket bound to a single interface. Receive timeouts are
//! implemented with `SO_RCVTIMEO`, so an idle bus makes `read` fail with
//! `EAGAIN`, which is reported as "no frame" rather than as an error.

use std::io;
use std::time::Duration;

use crate::errors::TransportError;
use crate::frame::CanFrame;
use crate::transport::Transport;

#[cfg(target_os = "linux")]
pub use self::linux::CanSocket;
#[cfg(not(target_os = "linux"))]
pub use self::non_linux::CanSocket;

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use std::mem;
    use std::os::unix::io::{AsRawFd, RawFd};

    use crate::constants::{AF_CAN, CAN_RAW, PF_CAN};
    use crate::util::{set_socket_option, timeval_from_duration};
    use crate::ShouldRetry;

    /// CAN address struct. Used internally for binding.
    #[derive(Debug)]
    #[repr(C)]
    struct CanAddr {
        _af_can: libc::c_short,
        if_index: libc::c_int,
        rx_id: u32,
        tx_id: u32,
    }

    /// A socket for a CAN device.
    ///
    /// Will be closed upon deallocation. To close manually, use `drop()` or
    /// `Transport::close`.
    #[derive(Debug)]
    pub struct CanSocket {
        fd: RawFd,
        ifname: String,
        read_timeout: Option<Duration>,
    }

    impl CanSocket {
        /// Open a named CAN device, e.g. `"vcan0"`.
        pub fn open(ifname: &str) -> Result<CanSocket, TransportError> {
            let if_index = nix::net::if_::if_nametoindex(ifname)
                .map_err(|e| TransportError::unavailable(ifname, io::Error::from(e)))?;
            CanSocket::open_if(ifname, if_index)
                .map_err(|e| TransportError::unavailable(ifname, e))
        }

        fn open_if(ifname: &str, if_index: libc::c_uint) -> io::Result<CanSocket> {
            let addr = CanAddr {
                _af_can: AF_CAN as libc::c_short,
                if_index: if_index as libc::c_int,
                rx_id: 0,
                tx_id: 0,
            };

            let fd = unsafe { libc::socket(PF_CAN, libc::SOCK_RAW, CAN_RAW) };
            if fd == -1 {
                return Err(io::Error::last_os_error());
            }

            let bind_rv = unsafe {
                let sockaddr_ptr = &addr as *const CanAddr;
                libc::bind(fd,
                           sockaddr_ptr as *const libc::sockaddr,
                           mem::size_of::<CanAddr>() as libc::socklen_t)
            };

            if bind_rv == -1 {
                let e = io::Error::last_os_error();
                unsafe {
                    libc::close(fd);
                }
                return Err(e);
            }

            log::debug!("opened CAN socket on {} (index {})", ifname, if_index);

            Ok(CanSocket {
                fd,
                ifname: ifname.to_owned(),
                read_timeout: None,
            })
        }

        /// Sets the read timeout on the socket, skipping the syscall if it
        /// is already set.
        fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
            if self.read_timeout == Some(timeout) {
                return Ok(());
            }
            set_socket_option(self.fd,
                              libc::SOL_SOCKET,
                              libc::SO_RCVTIMEO,
                              &timeval_from_duration(timeout))?;
            self.read_timeout = Some(timeout);
            Ok(())
        }

        /// Blocking read of a single frame, bounded by the read timeout.
        pub fn read_frame(&self) -> io::Result<CanFrame> {
            let mut frame = CanFrame::empty();

            let read_rv = unsafe {
                let frame_ptr = &mut frame as *mut CanFrame;
                libc::read(self.fd, frame_ptr as *mut libc::c_void, mem::size_of::<CanFrame>())
            };

            if read_rv as usize != mem::size_of::<CanFrame>() {
                if read_rv < 0 {
                    return Err(io::Error::last_os_error());
                }
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short CAN frame read"));
            }

            Ok(frame)
        }

        /// Write a single frame to the socket.
        pub fn write_frame(&self, frame: &CanFrame) -> io::Result<()> {
            let write_rv = unsafe {
                let frame_ptr = frame as *const CanFrame;
                libc::write(self.fd, frame_ptr as *const libc::c_void, mem::size_of::<CanFrame>())
            };

            if write_rv as usize != mem::size_of::<CanFrame>() {
                if write_rv < 0 {
                    return Err(io::Error::last_os_error());
                }
                return Err(io::Error::new(io::ErrorKind::WriteZero, "short CAN frame write"));
            }

            Ok(())
        }
    }

    impl Transport for CanSocket {
        fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>, TransportError> {
            self.set_read_timeout(timeout).map_err(TransportError::Receive)?;
            match self.read_frame() {
                Ok(frame) => Ok(Some(frame)),
                Err(ref e) if e.should_retry() || e.kind() == io::ErrorKind::Interrupted => Ok(None),
                Err(e) => Err(TransportError::Receive(e)),
            }
        }

        fn transmit(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
            self.write_frame(frame).map_err(TransportError::Transmit)
        }

        fn close(self: Box<Self>) {
            drop(self);
        }
    }

    impl AsRawFd for CanSocket {
        fn as_raw_fd(&self) -> RawFd {
            self.fd
        }
    }

    impl Drop for CanSocket {
        fn drop(&mut self) {
            unsafe {
                libc::close(self.fd);
            }
            log::debug!("closed CAN socket on {}", self.ifname);
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod non_linux {
    use super::*;

    /// SocketCAN only exists on Linux; opening always fails elsewhere.
    #[derive(Debug)]
    pub struct CanSocket {
        _private: (),
    }

    impl CanSocket {
        pub fn open(ifname: &str) -> Result<CanSocket, TransportError> {
            Err(TransportError::unavailable(
                ifname,
                io::Error::new(io::ErrorKind::Unsupported, "SocketCAN requires Linux"),
            ))
        }
    }

    impl Transport for CanSocket {
        fn receive(&mut self, _timeout: Duration) -> Result<Option<CanFrame>, TransportError> {
            Ok(None)
        }

        fn transmit(&mut self, _frame: &CanFrame) -> Result<(), TransportError> {
            Err(TransportError::Transmit(io::Error::new(io::ErrorKind::Unsupported, "SocketCAN requires Linux")))
        }

        fn close(self: Box<Self>) {}
    }
}
