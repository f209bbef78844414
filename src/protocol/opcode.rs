use std::fmt::Display;

use super::constants::{
	ERR_OPCODE, FIN_OPCODE, GET_OPCODE, PUT_OPCODE, REQUEST_MASK, RESPONSE_MASK, RSP_OPCODE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The opcode byte of a [Frame](crate::protocol::Frame).
///
/// Opcodes are a flag set over five independent bits: three request bits
/// (GET, PUT, FIN) and two response bits (RSP, ERR). A request carries exactly
/// one request bit. A response carries the originating request bit together
/// with exactly one of RSP (success) or ERR (failure).
pub struct Opcode(u8);

impl Opcode {
	pub const ERR: Opcode = Opcode(ERR_OPCODE);
	pub const FIN: Opcode = Opcode(FIN_OPCODE);
	pub const GET: Opcode = Opcode(GET_OPCODE);
	pub const GET_ERR: Opcode = Opcode(GET_OPCODE | ERR_OPCODE);
	pub const GET_RSP: Opcode = Opcode(GET_OPCODE | RSP_OPCODE);
	pub const PUT: Opcode = Opcode(PUT_OPCODE);
	pub const PUT_ERR: Opcode = Opcode(PUT_OPCODE | ERR_OPCODE);
	pub const RSP: Opcode = Opcode(RSP_OPCODE);

	pub const fn from_byte(byte: u8) -> Self { Opcode(byte) }

	pub const fn bits(self) -> u8 { self.0 }

	pub fn is_get(self) -> bool { self.0 & GET_OPCODE != 0 }

	pub fn is_put(self) -> bool { self.0 & PUT_OPCODE != 0 }

	pub fn is_fin(self) -> bool { self.0 & FIN_OPCODE != 0 }

	pub fn is_response(self) -> bool { self.0 & RSP_OPCODE != 0 }

	pub fn is_error(self) -> bool { self.0 & ERR_OPCODE != 0 }

	/// The request bits (GET, PUT, FIN) of this opcode, with everything else
	/// cleared.
	pub fn request_bits(self) -> Opcode { Opcode(self.0 & REQUEST_MASK) }

	/// Builds the response opcode for a request: `request | RSP` when `ok`,
	/// `request | ERR` otherwise.
	pub fn response(request: Opcode, ok: bool) -> Opcode {
		let flag = if ok { RSP_OPCODE } else { ERR_OPCODE };
		Opcode(request.request_bits().0 | flag)
	}

	/// Returns false if zero or more than one of GET, PUT and FIN is set, or
	/// if both RSP and ERR are set.
	///
	/// The three high bits are reserved and play no part here.
	pub fn is_well_formed(self) -> bool {
		(self.0 & REQUEST_MASK).count_ones() == 1 && self.0 & RESPONSE_MASK != RESPONSE_MASK
	}
}

impl From<u8> for Opcode {
	fn from(byte: u8) -> Self { Opcode(byte) }
}

impl From<Opcode> for u8 {
	fn from(opcode: Opcode) -> Self { opcode.0 }
}

impl Display for Opcode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{:#04x}", self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The request kind carried by an inbound frame, decoded once from its opcode.
///
/// Only a bare request opcode maps to [Request::Get], [Request::Put] or
/// [Request::Fin]. Everything else, including well-formed response opcodes,
/// is [Request::Unsupported].
pub enum Request {
	Get,
	Put,
	Fin,
	Unsupported(Opcode),
}

impl From<Opcode> for Request {
	fn from(opcode: Opcode) -> Self {
		match opcode.bits() {
			GET_OPCODE => Request::Get,
			PUT_OPCODE => Request::Put,
			FIN_OPCODE => Request::Fin,
			_ => Request::Unsupported(opcode),
		}
	}
}

impl Request {
	/// The opcode used for an error response to this request.
	///
	/// An unsupported opcode only echoes its request bit back when exactly one
	/// is set, otherwise the response is a bare ERR.
	pub fn error_opcode(self) -> Opcode {
		match self {
			Request::Get => Opcode::GET_ERR,
			Request::Put => Opcode::PUT_ERR,
			Request::Fin => Opcode::response(Opcode::FIN, false),
			Request::Unsupported(opcode) if opcode.request_bits().bits().count_ones() == 1 => {
				Opcode::response(opcode, false)
			},
			Request::Unsupported(_) => Opcode::ERR,
		}
	}
}
