use std::fmt;
use std::str::FromStr;

use itertools::Itertools;

use crate::constants::*;
use crate::errors::{ConstructionError, ParseFrameError};

/// CanFrame
///
/// Uses the same memory layout as the underlying kernel struct for performance
/// reasons. Frames are `Copy`: a frame placed on a queue is always a copy of
/// the receive buffer, never a reference into it.
#[derive(Copy, Clone)]
#[repr(C)]
pub struct CanFrame {
    /// 32 bit CAN_ID + EFF/RTR/ERR flags
    _id: u32,
    /// data length. Bytes beyond are not valid
    _data_len: u8,
    /// padding
    _pad: u8,
    /// reserved
    _res0: u8,
    /// reserved
    _res1: u8,
    /// buffer for data
    _data: [u8; MAX_DATA_LEN],
}

impl CanFrame {
    /// Build a frame. IDs wider than 11 bits are always extended; `extended`
    /// forces the 29 bit format for small IDs too.
    pub fn new(id: u32, data: &[u8], rtr: bool, extended: bool) -> Result<CanFrame, ConstructionError> {
        if data.len() > MAX_DATA_LEN {
            return Err(ConstructionError::TooMuchData);
        }

        if id > EFF_MASK {
            return Err(ConstructionError::IdTooLarge);
        }

        let mut raw_id = id;
        if extended || id > SFF_MASK {
            raw_id |= EFF_FLAG;
        }
        if rtr {
            raw_id |= RTR_FLAG;
        }

        let mut full_data = [0; MAX_DATA_LEN];
        full_data[..data.len()].copy_from_slice(data);

        Ok(CanFrame {
            _id: raw_id,
            _data_len: data.len() as u8,
            _pad: 0,
            _res0: 0,
            _res1: 0,
            _data: full_data,
        })
    }

    /// Shorthand for a data frame with automatic frame format.
    pub fn data_frame(id: u32, data: &[u8]) -> Result<CanFrame, ConstructionError> {
        CanFrame::new(id, data, false, false)
    }

    /// An all-zero frame, used as a receive buffer.
    pub(crate) fn empty() -> CanFrame {
        CanFrame {
            _id: 0,
            _data_len: 0,
            _pad: 0,
            _res0: 0,
            _res1: 0,
            _data: [0; MAX_DATA_LEN],
        }
    }

    /// Return the actual CAN ID (without EFF/RTR/ERR flags)
    #[inline]
    pub fn id(&self) -> u32 {
        if self.is_extended() {
            self._id & EFF_MASK
        } else {
            self._id & SFF_MASK
        }
    }

    /// Check if frame uses 29 bit extended frame format
    #[inline]
    pub fn is_extended(&self) -> bool {
        self._id & EFF_FLAG != 0
    }

    /// Check if frame is an error message
    #[inline]
    pub fn is_error(&self) -> bool {
        self._id & ERR_FLAG != 0
    }

    /// Check if frame is a remote transmission request
    #[inline]
    pub fn is_rtr(&self) -> bool {
        self._id & RTR_FLAG != 0
    }

    /// A slice into the actual data. Slice will always be <= 8 bytes in length
    #[inline]
    pub fn data(&self) -> &[u8] {
        let len = (self._data_len as usize).min(MAX_DATA_LEN);
        &self._data[..len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }
}

impl PartialEq for CanFrame {
    fn eq(&self, other: &CanFrame) -> bool {
        self._id == other._id && self.data() == other.data()
    }
}

impl Eq for CanFrame {}

impl fmt::Debug for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CanFrame")
            .field("id", &format_args!("{:#X}", self.id()))
            .field("extended", &self.is_extended())
            .field("rtr", &self.is_rtr())
            .field("data", &hex::encode_upper(self.data()))
            .finish()
    }
}

impl fmt::UpperHex for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{:X}#", self.id())?;

        if self.is_rtr() {
            return write!(f, "R");
        }

        let mut parts = self.data().iter().map(|v| format!("{:02X}", v));

        let sep = if f.alternate() { " " } else { "" };
        write!(f, "{}", parts.join(sep))
    }
}

/// Parses `candump` notation: `123#DEADBEEF`, `1F334455#11.22`, `123#R`.
///
/// IDs written with more than three hex digits are extended.
impl FromStr for CanFrame {
    type Err = ParseFrameError;

    fn from_str(s: &str) -> Result<CanFrame, ParseFrameError> {
        let (id_part, data_part) = s.trim().split_once('#').ok_or(ParseFrameError::MissingSeparator)?;

        let id = u32::from_str_radix(id_part, 16)
            .map_err(|_| ParseFrameError::InvalidId(id_part.to_owned()))?;
        let extended = id_part.len() > 3;

        if data_part.eq_ignore_ascii_case("r") {
            return Ok(CanFrame::new(id, &[], true, extended)?);
        }

        let digits: String = data_part.chars().filter(|c| *c != '.').collect();
        let data = hex::decode(&digits).map_err(|_| ParseFrameError::InvalidData(data_part.to_owned()))?;

        Ok(CanFrame::new(id, &data, false, extended)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_ids_are_extended() {
        let frame = CanFrame::data_frame(0xAAAAA, &[1]).unwrap();
        assert!(frame.is_extended());
        assert_eq!(frame.id(), 0xAAAAA);

        let frame = CanFrame::data_frame(0x123, &[]).unwrap();
        assert!(!frame.is_extended());
        assert_eq!(frame.id(), 0x123);
    }

    #[test]
    fn rejects_invalid_frames() {
        assert_eq!(CanFrame::data_frame(0x1, &[0; 9]), Err(ConstructionError::TooMuchData));
        assert_eq!(CanFrame::data_frame(0x2000_0000, &[]), Err(ConstructionError::IdTooLarge));
    }

    #[test]
    fn parses_candump_notation() {
        let frame: CanFrame = "123#DEADBEEF".parse().unwrap();
        assert_eq!(frame.id(), 0x123);
        assert!(!frame.is_extended());
        assert_eq!(frame.data(), &[0xDE, 0xAD, 0xBE, 0xEF]);

        let frame: CanFrame = "00000123#11.22".parse().unwrap();
        assert!(frame.is_extended());
        assert_eq!(frame.data(), &[0x11, 0x22]);

        let frame: CanFrame = "7FF#R".parse().unwrap();
        assert!(frame.is_rtr());
        assert!(frame.is_empty());

        assert_eq!("123".parse::<CanFrame>(), Err(ParseFrameError::MissingSeparator));
        assert!(matches!("xyz#00".parse::<CanFrame>(), Err(ParseFrameError::InvalidId(_))));
        assert!(matches!("123#ABC".parse::<CanFrame>(), Err(ParseFrameError::InvalidData(_))));
        assert_eq!(
            "123#000000000000000000".parse::<CanFrame>(),
            Err(ParseFrameError::Construction(ConstructionError::TooMuchData))
        );
    }

    #[test]
    fn formats_as_upper_hex() {
        let frame = CanFrame::data_frame(0x1F1, &[1, 2, 0xAB]).unwrap();
        assert_eq!(format!("{:X}", frame), "1F1#0102AB");
        assert_eq!(format!("{:#X}", frame), "1F1#01 02 AB");
    }

    #[test]
    fn equality_ignores_stale_buffer_bytes() {
        let mut a = CanFrame::data_frame(0x10, &[1, 2]).unwrap();
        let b = CanFrame::data_frame(0x10, &[1, 2]).unwrap();
        a._data[5] = 0xFF;
        assert_eq!(a, b);
    }
}
