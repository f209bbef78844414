use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::{
	net::{
		tcp::{OwnedReadHalf, OwnedWriteHalf},
		TcpStream,
	},
	sync::Mutex,
};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::{BftpCodec, Frame, FrameErrors};

#[derive(Debug)]
/// A TCP stream split into independently locked framed halves.
pub struct BftpStream {
	writer: Mutex<FramedWrite<OwnedWriteHalf, BftpCodec>>,
	reader: Mutex<FramedRead<OwnedReadHalf, BftpCodec>>,
	peer_address: SocketAddr,
}

impl BftpStream {
	/// Splits the socket, bounding inbound frames to `max_frame_length`
	/// content bytes.
	pub fn new(stream: TcpStream, max_frame_length: u32) -> std::io::Result<Self> {
		let peer_address = stream.peer_addr()?;
		let (read_half, write_half) = stream.into_split();
		let codec = BftpCodec::new(max_frame_length);

		Ok(Self {
			writer: Mutex::new(FramedWrite::new(write_half, codec)),
			reader: Mutex::new(FramedRead::new(read_half, codec)),
			peer_address,
		})
	}

	/// Sends a frame and flushes it to the socket.
	pub async fn write(&self, frame: Frame) -> Result<(), FrameErrors> {
		let mut writer = self.writer.lock().await;
		writer.send(frame).await
	}

	/// Reads the next complete frame.
	///
	/// A peer that closes the connection, whether between frames or part way
	/// through one, yields [FrameErrors::StreamClosed].
	pub async fn read(&self) -> Result<Frame, FrameErrors> {
		let mut reader = self.reader.lock().await;
		match reader.next().await {
			Some(result) => result,
			None => Err(FrameErrors::StreamClosed),
		}
	}

	/// Whether no bytes of a following frame have been received yet.
	pub async fn is_idle(&self) -> bool {
		let reader = self.reader.lock().await;
		reader.read_buffer().is_empty()
	}

	/// Flushes and shuts down the write half of the underlying stream.
	pub async fn close(&self) -> Result<(), FrameErrors> {
		let mut writer = self.writer.lock().await;
		writer.close().await
	}

	/* Getters */
	pub fn peer_address(&self) -> SocketAddr { self.peer_address }
}
