use std::{
	io::ErrorKind,
	net::{IpAddr, Ipv4Addr, SocketAddr},
	path::{Path, PathBuf},
	time::Duration,
};

use tokio::net::TcpListener;
use tracing::info;

use super::{handler::HandlerSettings, server_struct::Server, ServerResult};
use crate::{
	errors::ServerErrors,
	protocol::{DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_FRAME_LENGTH},
	resolver::FileResolver,
};

/// Utility Struct to build a [Server] as needed
pub struct ServerBuilder {
	/// The Ip Address to bind the server to.
	address: IpAddr,
	/// The port number to bind to, 0 picks an ephemeral port.
	port: u16,
	/// The directory files are served from.
	root: PathBuf,
	/// The largest file, in bytes, that will be served in a single frame.
	max_file_size: u64,
	/// The largest content length accepted on an inbound frame.
	max_frame_length: u32,
	/// How long a connection may sit without sending a request before it is
	/// closed. Connections never time out when unset.
	idle_timeout: Option<Duration>,
}

impl ServerBuilder {
	fn new() -> Self {
		Self {
			address: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
			port: 7007,
			root: PathBuf::from("."),
			max_file_size: DEFAULT_MAX_FILE_SIZE,
			max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
			idle_timeout: None,
		}
	}

	/// Sets the ip address to bind the server to (localhost loopback by
	/// default).
	pub fn address(mut self, address: impl Into<IpAddr>) -> Self {
		self.address = address.into();
		self
	}

	/// Sets the port number to bind to (7007 by default).
	pub fn port(mut self, port: u16) -> Self {
		self.port = port;
		self
	}

	/// Sets the sandbox root that GET paths are resolved against (the current
	/// directory by default).
	pub fn root(mut self, root: impl AsRef<Path>) -> Self {
		self.root = root.as_ref().to_path_buf();
		self
	}

	/// Sets the largest file that will be served. A response has to fit in one
	/// frame, so values above `u32::MAX` are clamped.
	///
	/// `i32::MAX` bytes (~2 GiB) by default.
	pub fn max_file_size(mut self, max_file_size: u64) -> Self {
		self.max_file_size = max_file_size.min(u32::MAX as u64);
		self
	}

	/// Sets the largest content length accepted on a request frame.
	///
	/// 64 KiB by default.
	pub fn max_frame_length(mut self, max_frame_length: u32) -> Self {
		self.max_frame_length = max_frame_length;
		self
	}

	/// Closes connections that have not sent a request for `idle_timeout`.
	pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
		self.idle_timeout = Some(idle_timeout);
		self
	}

	/// Binds the listening socket.
	///
	/// Fails with [ServerErrors::Bind] when the address is in use or cannot be
	/// bound to, and with [ServerErrors::InvalidRoot] when the root directory
	/// does not exist.
	pub async fn build(self) -> ServerResult<Server> {
		let resolver = FileResolver::open(&self.root, self.max_file_size)
			.await
			.map_err(|source| ServerErrors::InvalidRoot {
				path: self.root.clone(),
				source,
			})?;

		let address = SocketAddr::new(self.address, self.port);
		let listener = TcpListener::bind(address).await.map_err(|source| match source.kind() {
			ErrorKind::AddrInUse | ErrorKind::AddrNotAvailable | ErrorKind::PermissionDenied => {
				ServerErrors::Bind { address, source }
			},
			_ => ServerErrors::Io(source),
		})?;
		let address = listener.local_addr()?;

		info!("bftp server bound to {}, serving {:?}", address, resolver.root());
		Ok(Server::new(
			listener,
			address,
			HandlerSettings {
				resolver,
				max_frame_length: self.max_frame_length,
				idle_timeout: self.idle_timeout,
			},
		))
	}
}

impl Default for ServerBuilder {
	fn default() -> Self { Self::new() }
}
