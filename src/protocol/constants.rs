/* Opcode Consts */
//                             0b000ERFPG
pub const GET_OPCODE: u8 = 0b0000_0001;
pub const PUT_OPCODE: u8 = 0b0000_0010;
pub const FIN_OPCODE: u8 = 0b0000_0100;
pub const RSP_OPCODE: u8 = 0b0000_1000;
pub const ERR_OPCODE: u8 = 0b0001_0000;

/// Mask covering the three request bits (GET, PUT, FIN).
pub const REQUEST_MASK: u8 = GET_OPCODE | PUT_OPCODE | FIN_OPCODE;
/// Mask covering the two response bits (RSP, ERR).
pub const RESPONSE_MASK: u8 = RSP_OPCODE | ERR_OPCODE;

/* Framing Constants */
/// Length of the content-length prefix, in bytes.
pub const LENGTH_PREFIX_LENGTH: usize = 4;
/// Length of the opcode field, in bytes.
pub const OPCODE_LENGTH: usize = 1;
pub const HEADER_LENGTH: usize = LENGTH_PREFIX_LENGTH + OPCODE_LENGTH;

/// Default upper bound on the content length of an inbound request frame.
pub const DEFAULT_MAX_FRAME_LENGTH: u32 = 64 * 1024;
/// Default upper bound on the size of a file served in a single frame (~2 GiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = i32::MAX as u64;
/// Largest amount of buffer space reserved at once for a partially received frame.
pub const MAX_RESERVE_LENGTH: usize = 64 * 1024;

/* Response Reasons */
pub const FILE_NOT_FOUND: &str = "File not found";
pub const FILE_READ_ERROR: &str = "Encountered error while reading file";
pub const UNSUPPORTED_COMMAND: &str = "Unsupported command";
