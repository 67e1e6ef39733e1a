use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::TransportError;
use crate::frame::CanFrame;
use crate::socket::CanSocket;
use crate::virtual_bus::VirtualBus;

/// An open CAN channel.
///
/// The relay worker owns its transport exclusively while running, so
/// implementations only need to be `Send`.
pub trait Transport: Send {
    /// Wait up to `timeout` for a frame. `Ok(None)` means nothing arrived.
    fn receive(&mut self, timeout: Duration) -> Result<Option<CanFrame>, TransportError>;

    /// Send a frame without waiting for it to reach the bus.
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), TransportError>;

    /// Release the channel. Consumes the handle, so it happens once.
    fn close(self: Box<Self>);
}

/// Opens a transport when a worker starts.
pub trait Connector: fmt::Display + Send + 'static {
    fn connect(&self) -> Result<Box<dyn Transport>, TransportError>;
}

/// Which kind of bus a channel lives on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InterfaceKind {
    /// Linux SocketCAN raw socket, channel is an interface name like `can0`.
    SocketCan,

    /// In-process bus, channel is any name shared by the participants.
    Virtual,
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            InterfaceKind::SocketCan => write!(f, "socketcan"),
            InterfaceKind::Virtual => write!(f, "virtual"),
        }
    }
}

impl FromStr for InterfaceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<InterfaceKind, String> {
        match s.to_ascii_lowercase().as_str() {
            "socketcan" => Ok(InterfaceKind::SocketCan),
            "virtual" => Ok(InterfaceKind::Virtual),
            other => Err(format!("unknown interface kind '{}'", other)),
        }
    }
}

/// Interface kind plus channel identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelParams {
    pub kind: InterfaceKind,
    pub channel: String,
}

impl ChannelParams {
    pub fn new<S: Into<String>>(kind: InterfaceKind, channel: S) -> ChannelParams {
        ChannelParams {
            kind,
            channel: channel.into(),
        }
    }

    pub fn socketcan<S: Into<String>>(ifname: S) -> ChannelParams {
        ChannelParams::new(InterfaceKind::SocketCan, ifname)
    }

    pub fn virtual_bus<S: Into<String>>(channel: S) -> ChannelParams {
        ChannelParams::new(InterfaceKind::Virtual, channel)
    }

    /// Open the channel described by these parameters.
    pub fn open(&self) -> Result<Box<dyn Transport>, TransportError> {
        match self.kind {
            InterfaceKind::SocketCan => Ok(Box::new(CanSocket::open(&self.channel)?)),
            InterfaceKind::Virtual => Ok(Box::new(VirtualBus::open(&self.channel))),
        }
    }
}

impl fmt::Display for ChannelParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.channel)
    }
}

impl Connector for ChannelParams {
    fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        self.open()
    }
}
