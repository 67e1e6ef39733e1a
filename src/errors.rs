use std::path::PathBuf;
use std::{error, fmt, io};

use crate::worker::WorkerState;

/// Error building a `CanFrame`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConstructionError {
    /// More than 8 bytes of payload.
    TooMuchData,

    /// The ID does not fit in 29 bits.
    IdTooLarge,
}

impl fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ConstructionError::TooMuchData => write!(f, "CAN frame payload exceeds 8 bytes"),
            ConstructionError::IdTooLarge => write!(f, "CAN ID does not fit in 29 bits"),
        }
    }
}

impl error::Error for ConstructionError {}

/// Error parsing a frame written in `candump` notation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseFrameError {
    /// No `#` separating the ID from the payload.
    MissingSeparator,

    /// The ID part is not hexadecimal.
    InvalidId(String),

    /// The payload part is not an even run of hex digits.
    InvalidData(String),

    /// Parsed fine, but the values do not make a valid frame.
    Construction(ConstructionError),
}

impl fmt::Display for ParseFrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ParseFrameError::MissingSeparator => write!(f, "expected <id>#<data>"),
            ParseFrameError::InvalidId(ref s) => write!(f, "invalid CAN ID '{}'", s),
            ParseFrameError::InvalidData(ref s) => write!(f, "invalid payload '{}'", s),
            ParseFrameError::Construction(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for ParseFrameError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            ParseFrameError::Construction(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConstructionError> for ParseFrameError {
    fn from(e: ConstructionError) -> Self {
        ParseFrameError::Construction(e)
    }
}

/// Failures reported by a bus transport.
///
/// A receive timeout is not an error; transports report it as `Ok(None)`.
#[derive(Debug)]
pub enum TransportError {
    /// The channel could not be opened.
    Unavailable {
        channel: String,
        source: io::Error,
    },

    /// A frame could not be sent. The frame is lost.
    Transmit(io::Error),

    /// Receiving failed for a reason other than a timeout.
    Receive(io::Error),
}

impl TransportError {
    pub fn unavailable<S: Into<String>>(channel: S, source: io::Error) -> Self {
        TransportError::Unavailable {
            channel: channel.into(),
            source,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TransportError::Unavailable { ref channel, ref source } => {
                write!(f, "transport unavailable on '{}': {}", channel, source)
            }
            TransportError::Transmit(ref e) => write!(f, "transmit failed: {}", e),
            TransportError::Receive(ref e) => write!(f, "receive failed: {}", e),
        }
    }
}

impl error::Error for TransportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            TransportError::Unavailable { ref source, .. } => Some(source),
            TransportError::Transmit(ref e) | TransportError::Receive(ref e) => Some(e),
        }
    }
}

/// Errors surfaced synchronously by the relay worker's control surface.
#[derive(Debug)]
pub enum WorkerError {
    /// Opening the bus failed; the worker stays `Created` and may be retried.
    TransportUnavailable(TransportError),

    /// The requested transition is not valid from the current state.
    InvalidState(WorkerState),

    /// The OS refused to spawn the worker thread. The transport was closed.
    Spawn(io::Error),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            WorkerError::TransportUnavailable(ref e) => write!(f, "{}", e),
            WorkerError::InvalidState(state) => {
                write!(f, "worker cannot start from state {:?}", state)
            }
            WorkerError::Spawn(ref e) => write!(f, "failed to spawn relay thread: {}", e),
        }
    }
}

impl error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            WorkerError::TransportUnavailable(ref e) => Some(e),
            WorkerError::InvalidState(_) => None,
            WorkerError::Spawn(ref e) => Some(e),
        }
    }
}

/// Errors loading a block-list from a table.
#[derive(Debug)]
pub enum LoadError {
    /// The path does not resolve to a file.
    FileNotFound(PathBuf),

    /// The header row has no column with the requested name.
    MissingColumn(String),

    /// A cell is not a hexadecimal ID. `row` counts data rows from 1.
    Parse { row: usize, value: String },

    /// The table itself is malformed.
    Csv(csv::Error),

    /// The spreadsheet could not be opened or has no sheets.
    Workbook(calamine::Error),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            LoadError::FileNotFound(ref p) => write!(f, "file not found: {}", p.display()),
            LoadError::MissingColumn(ref c) => write!(f, "no column named '{}'", c),
            LoadError::Parse { row, ref value } => {
                write!(f, "row {}: '{}' is not a hexadecimal CAN ID", row, value)
            }
            LoadError::Csv(ref e) => write!(f, "malformed table: {}", e),
            LoadError::Workbook(ref e) => write!(f, "unreadable workbook: {}", e),
        }
    }
}

impl error::Error for LoadError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            LoadError::Csv(ref e) => Some(e),
            LoadError::Workbook(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<csv::Error> for LoadError {
    fn from(e: csv::Error) -> Self {
        LoadError::Csv(e)
    }
}

impl From<calamine::Error> for LoadError {
    fn from(e: calamine::Error) -> Self {
        LoadError::Workbook(e)
    }
}
