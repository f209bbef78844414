use std::{
	net::SocketAddr,
	sync::atomic::{AtomicBool, Ordering},
};

use bytes::Bytes;
use tokio::net::ToSocketAddrs;
use tracing::debug;

use super::ClientBuilder;
use crate::{
	errors::ClientErrors,
	protocol::{BftpStream, Frame, FrameErrors, Opcode},
};

pub type ClientResult<T> = std::result::Result<T, ClientErrors>;

#[derive(Debug)]
/// Client object used to talk to a bftp server.
pub struct Client {
	/// A handle to the underlying socket, wrapped in a [BftpStream] struct.
	stream: BftpStream,
	/// Tracks whether the server is still reachable.
	connection_state: AtomicBool,
}

impl Client {
	/// Connects to a bftp server at the given address with the default
	/// settings. Use [ClientBuilder] to tune them.
	pub async fn connect<A>(addr: A) -> ClientResult<Self>
	where
		A: ToSocketAddrs,
	{
		ClientBuilder::default().connect(addr).await
	}

	pub(crate) fn from_stream(stream: BftpStream) -> Self {
		Self {
			stream,
			connection_state: AtomicBool::new(true),
		}
	}

	/// Sends a single frame to the server.
	pub async fn send(&self, frame: Frame) -> ClientResult<()> {
		if !self.is_connected() {
			return Err(ClientErrors::ConnectionClosed);
		}

		self.stream.write(frame).await.map_err(|e| self.disconnected(e))
	}

	/// Reads a single frame from the server.
	pub async fn receive(&self) -> ClientResult<Frame> { self.stream.read().await.map_err(|e| self.disconnected(e)) }

	/// Requests `path` and returns the server's response frame, which is
	/// either `GET|RSP` carrying the file or `GET|ERR` carrying a reason.
	pub async fn get(&self, path: &str) -> ClientResult<Frame> {
		self.send(Frame::new(Opcode::GET, path.to_string())).await?;

		let response = self.receive().await?;
		let opcode = *response.opcode();

		if opcode == Opcode::FIN {
			self.connection_state.store(false, Ordering::SeqCst);
			return Err(ClientErrors::ConnectionClosed);
		}

		if !opcode.is_well_formed() || !opcode.is_get() || !(opcode.is_response() || opcode.is_error()) {
			return Err(ClientErrors::UnexpectedResponse(opcode));
		}

		Ok(response)
	}

	/// Like [Client::get], but only returns the file contents. An error
	/// response becomes [ClientErrors::Rejected].
	pub async fn fetch(&self, path: &str) -> ClientResult<Bytes> {
		let response = self.get(path).await?;
		let opcode = *response.opcode();

		if opcode.is_error() {
			return Err(ClientErrors::Rejected {
				opcode,
				reason: String::from_utf8_lossy(response.content()).into_owned(),
			});
		}

		Ok(response.into_content())
	}

	/// Ends the session by sending FIN, then reads until the server closes
	/// the connection.
	pub async fn finish(&self) -> ClientResult<()> {
		self.send(Frame::empty(Opcode::FIN)).await?;

		loop {
			match self.receive().await {
				Ok(frame) if *frame.opcode() == Opcode::FIN => debug!("Server acknowledged FIN"),
				Ok(frame) => return Err(ClientErrors::UnexpectedResponse(*frame.opcode())),
				Err(ClientErrors::ConnectionClosed) => break,
				Err(e) => return Err(e),
			}
		}

		// Server has already gone, a failing shutdown changes nothing.
		let _ = self.stream.close().await;
		Ok(())
	}

	/// Marks the client as disconnected when the stream has gone away.
	fn disconnected(&self, error: FrameErrors) -> ClientErrors {
		match error {
			FrameErrors::StreamClosed => {
				self.connection_state.store(false, Ordering::SeqCst);
				ClientErrors::ConnectionClosed
			},
			FrameErrors::StreamError(e) => {
				self.connection_state.store(false, Ordering::SeqCst);
				ClientErrors::Io(e)
			},
			e => ClientErrors::Frame(e),
		}
	}

	/* Getters */
	pub fn server_address(&self) -> SocketAddr { self.stream.peer_address() }

	pub fn is_connected(&self) -> bool { self.connection_state.load(Ordering::SeqCst) }
}
