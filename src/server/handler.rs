use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::registry::{HandlerHandle, HandlerRegistry};
use crate::{
	protocol::{
		constants::{FILE_NOT_FOUND, UNSUPPORTED_COMMAND},
		BftpStream, Frame, FrameErrors, Opcode, Request,
	},
	resolver::FileResolver,
};

/// Settings shared by every handler spawned from one server.
#[derive(Debug)]
pub(crate) struct HandlerSettings {
	pub(crate) resolver: FileResolver,
	pub(crate) max_frame_length: u32,
	pub(crate) idle_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerState {
	Initializing,
	Serving,
	Closing,
	Terminated,
}

/// What to do with the connection once a frame has been handled.
enum Outcome {
	Continue,
	Close,
}

/// Serves a single connection, one request at a time, until the peer sends
/// FIN, misbehaves, goes away, or the server asks it to close.
pub(crate) struct ConnectionHandler {
	socket: Option<TcpStream>,
	stream: Option<BftpStream>,
	handle: Arc<HandlerHandle>,
	registry: Arc<HandlerRegistry>,
	settings: Arc<HandlerSettings>,
	state: HandlerState,
	/// Set once the peer can no longer be written to.
	peer_closed: bool,
}

impl ConnectionHandler {
	pub(crate) fn new(
		socket: TcpStream, handle: Arc<HandlerHandle>, registry: Arc<HandlerRegistry>, settings: Arc<HandlerSettings>,
	) -> Self {
		Self {
			socket: Some(socket),
			stream: None,
			handle,
			registry,
			settings,
			state: HandlerState::Initializing,
			peer_closed: false,
		}
	}

	/// Drives the handler through its states until it has terminated and
	/// removed itself from the registry.
	pub(crate) async fn run(mut self) {
		debug!("Handling client connection");
		loop {
			self.state = match self.state {
				HandlerState::Initializing => self.initialize(),
				HandlerState::Serving => self.serve().await,
				HandlerState::Closing => self.close().await,
				HandlerState::Terminated => break,
			};
		}
	}

	fn initialize(&mut self) -> HandlerState {
		let Some(socket) = self.socket.take() else {
			self.peer_closed = true;
			return HandlerState::Closing;
		};

		let stream = socket
			.set_nodelay(true)
			.and_then(|_| BftpStream::new(socket, self.settings.max_frame_length));

		match stream {
			Ok(stream) => {
				self.stream = Some(stream);
				HandlerState::Serving
			},
			Err(e) => {
				warn!("Failed to set up connection: {:?}", e);
				self.peer_closed = true;
				HandlerState::Closing
			},
		}
	}

	async fn serve(&mut self) -> HandlerState {
		let Some(stream) = self.stream.as_ref() else {
			return HandlerState::Closing;
		};

		loop {
			let frame = match self.next_frame(stream).await {
				Some(Ok(frame)) => frame,
				Some(Err(FrameErrors::StreamClosed)) => {
					debug!("Peer closed the connection");
					self.peer_closed = true;
					return HandlerState::Closing;
				},
				Some(Err(FrameErrors::StreamError(e))) => {
					warn!("Error reading from client: {:?}", e);
					self.peer_closed = true;
					return HandlerState::Closing;
				},
				Some(Err(e)) => {
					warn!("Rejecting frame: {}", e);
					return HandlerState::Closing;
				},
				None => {
					info!("Connection idle for too long");
					return HandlerState::Closing;
				},
			};

			match self.handle_frame(stream, frame).await {
				Ok(Outcome::Continue) => {},
				Ok(Outcome::Close) => return HandlerState::Closing,
				Err(e) => {
					warn!("Error writing response: {}", e);
					self.peer_closed = true;
					return HandlerState::Closing;
				},
			}

			if self.handle.close_requested() {
				info!("Closing after handling current command");
				return HandlerState::Closing;
			}
		}
	}

	/// Waits for the next request. Returns `None` when the connection sat idle
	/// for longer than the configured timeout. A frame that has started to
	/// arrive is always waited for.
	async fn next_frame(&self, stream: &BftpStream) -> Option<Result<Frame, FrameErrors>> {
		let Some(idle_timeout) = self.settings.idle_timeout else {
			return Some(stream.read().await);
		};

		loop {
			if let Ok(result) = tokio::time::timeout(idle_timeout, stream.read()).await {
				return Some(result);
			}

			if stream.is_idle().await {
				return None;
			}
			debug!("Still waiting on the rest of a frame");
		}
	}

	async fn handle_frame(&self, stream: &BftpStream, frame: Frame) -> Result<Outcome, FrameErrors> {
		let opcode = *frame.opcode();
		let request = Request::from(opcode);
		debug!("Received {:?} ({}) with {} content bytes", request, opcode, frame.content().len());

		if !opcode.is_well_formed() {
			warn!("Malformed opcode {}", opcode);
			stream
				.write(Frame::with_reason(request.error_opcode(), UNSUPPORTED_COMMAND))
				.await?;
			return Ok(Outcome::Close);
		}

		match request {
			Request::Get => {
				let response = self.get(frame.content()).await;
				stream.write(response).await?;
				Ok(Outcome::Continue)
			},
			Request::Fin => {
				info!("Client finished the session");
				Ok(Outcome::Close)
			},
			Request::Put | Request::Unsupported(_) => {
				warn!("Unsupported command {}", opcode);
				stream
					.write(Frame::with_reason(request.error_opcode(), UNSUPPORTED_COMMAND))
					.await?;
				Ok(Outcome::Close)
			},
		}
	}

	/// Builds the response to a GET for the path carried in `content`.
	async fn get(&self, content: &Bytes) -> Frame {
		let Ok(path) = std::str::from_utf8(content) else {
			debug!("GET path is not valid UTF-8");
			return Frame::with_reason(Opcode::GET_ERR, FILE_NOT_FOUND);
		};

		match self.settings.resolver.resolve(path).await {
			Ok(bytes) => {
				info!("Serving {:?} ({} bytes)", path, bytes.len());
				Frame::new(Opcode::GET_RSP, bytes)
			},
			Err(e) => {
				info!("Could not serve {:?}: {}", path, e);
				Frame::with_reason(Opcode::GET_ERR, e.reason())
			},
		}
	}

	async fn close(&mut self) -> HandlerState {
		if let Some(stream) = self.stream.take() {
			if !self.peer_closed {
				let result = match stream.write(Frame::empty(Opcode::FIN)).await {
					Ok(()) => stream.close().await,
					Err(e) => Err(e),
				};

				if let Err(e) = result {
					debug!("Could not send FIN: {}", e);
				}
			}
		}

		self.registry.remove(self.handle.id()).await;
		self.handle.mark_terminated();
		info!("Closed connection with client");

		HandlerState::Terminated
	}
}
