// Protocol family for CAN sockets
pub const PF_CAN: libc::c_int = 29;
pub const AF_CAN: libc::c_int = PF_CAN;

// Protocol of the PF_CAN Family: Standard?
pub const CAN_RAW: libc::c_int = 1;

/// Special address description flags for the CAN_ID
///
/// EFF/SFF is set in the MSB
pub const EFF_FLAG: u32 = 0x80000000;
/// remote transmission request
pub const RTR_FLAG: u32 = 0x40000000;
/// error message frame
pub const ERR_FLAG: u32 = 0x20000000;

/// valid bits in CAN ID for frame formats
/// standard frame format (SFF)
pub const SFF_MASK: u32 = 0x000007ff;
/// extended frame format (EFF)
pub const EFF_MASK: u32 = 0x1fffffff;

/// Maximum payload of a classic CAN frame.
pub const MAX_DATA_LEN: usize = 8;

/// Default bound on a single receive call inside the relay loop.
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 100;
