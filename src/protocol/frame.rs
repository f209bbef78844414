use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_getters::Getters;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use super::{
	constants::{DEFAULT_MAX_FRAME_LENGTH, HEADER_LENGTH, LENGTH_PREFIX_LENGTH, MAX_RESERVE_LENGTH},
	Opcode,
};

#[derive(Debug, Error)]
pub enum FrameErrors {
	#[error("frame length out of bounds: {length} (limit {limit})")]
	LengthOutOfBounds { length: usize, limit: usize },
	#[error("error reading from the underlying stream: {0}")]
	StreamError(#[from] std::io::Error),
	#[error("the stream has been closed")]
	StreamClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Getters)]
/// The unit of transmission: a 4 byte big-endian content length, a 1 byte
/// [Opcode] and exactly that many bytes of opaque content.
pub struct Frame {
	opcode: Opcode,
	content: Bytes,
}

impl Frame {
	pub fn new(opcode: Opcode, content: impl Into<Bytes>) -> Self {
		Self {
			opcode,
			content: content.into(),
		}
	}

	/// A frame with no content, used for FIN.
	pub fn empty(opcode: Opcode) -> Self { Self::new(opcode, Bytes::new()) }

	/// Creates a response frame carrying a human readable reason.
	pub fn with_reason(opcode: Opcode, reason: impl Into<String>) -> Self {
		let reason: String = reason.into();
		Self::new(opcode, reason)
	}

	pub fn into_content(self) -> Bytes { self.content }

	/// Interprets the content as UTF-8, e.g. the path of a GET request or the
	/// reason carried by an error response.
	pub fn content_str(&self) -> Result<&str, std::str::Utf8Error> { std::str::from_utf8(&self.content) }

	/// Serializes this frame into its wire representation.
	pub fn to_bytes(&self) -> Result<Bytes, FrameErrors> {
		let mut dst = BytesMut::new();
		BftpCodec::unbounded().encode(self.clone(), &mut dst)?;
		Ok(dst.freeze())
	}
}

#[derive(Debug, Clone, Copy)]
/// Length-prefixed codec for [Frame]s.
///
/// The declared content length is checked against `max_frame_length` before
/// any buffer space is reserved for it.
pub struct BftpCodec {
	max_frame_length: usize,
}

impl BftpCodec {
	pub fn new(max_frame_length: u32) -> Self {
		Self {
			max_frame_length: max_frame_length as usize,
		}
	}

	/// A codec accepting any length the 4 byte prefix can express.
	pub fn unbounded() -> Self { Self::new(u32::MAX) }

	pub fn max_frame_length(&self) -> usize { self.max_frame_length }
}

impl Default for BftpCodec {
	fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_LENGTH) }
}

impl Decoder for BftpCodec {
	type Error = FrameErrors;
	type Item = Frame;

	fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		if src.len() < HEADER_LENGTH {
			return Ok(None);
		}

		let mut length_bytes = [0u8; LENGTH_PREFIX_LENGTH];
		length_bytes.copy_from_slice(&src[..LENGTH_PREFIX_LENGTH]);
		let length = u32::from_be_bytes(length_bytes) as usize;

		if length > self.max_frame_length {
			return Err(FrameErrors::LengthOutOfBounds {
				length,
				limit: self.max_frame_length,
			});
		}

		if src.len() < HEADER_LENGTH + length {
			// Grow in bounded steps, the declared length is not backed by any
			// bytes yet.
			let missing = HEADER_LENGTH + length - src.len();
			src.reserve(missing.min(MAX_RESERVE_LENGTH));
			return Ok(None);
		}

		src.advance(LENGTH_PREFIX_LENGTH);
		let opcode = Opcode::from(src.get_u8());
		let content = src.split_to(length).freeze();
		trace!("Decoded frame with opcode {} and {} content bytes", opcode, length);

		Ok(Some(Frame { opcode, content }))
	}

	fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		match self.decode(buf)? {
			Some(frame) => Ok(Some(frame)),
			None if buf.is_empty() => Ok(None),
			// The peer went away part way through a frame.
			None => Err(FrameErrors::StreamClosed),
		}
	}
}

impl Encoder<Frame> for BftpCodec {
	type Error = FrameErrors;

	fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
		let length = u32::try_from(item.content.len()).map_err(|_| FrameErrors::LengthOutOfBounds {
			length: item.content.len(),
			limit: u32::MAX as usize,
		})?;

		dst.reserve(HEADER_LENGTH + item.content.len());
		dst.put_u32(length);
		dst.put_u8(item.opcode.bits());
		dst.extend_from_slice(&item.content);

		Ok(())
	}
}
