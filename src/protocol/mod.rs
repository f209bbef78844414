pub(crate) mod constants;
mod frame;
mod opcode;
mod stream;

pub use self::{
	constants::{DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_FRAME_LENGTH, HEADER_LENGTH},
	frame::*,
	opcode::*,
	stream::*,
};
