use tokio::net::{TcpStream, ToSocketAddrs};

use super::{Client, ClientResult};
use crate::protocol::{BftpStream, DEFAULT_MAX_FILE_SIZE};

pub struct ClientBuilder {
	/// The largest content length accepted on a response frame.
	///
	/// Defaults to [DEFAULT_MAX_FILE_SIZE], the largest file a server sends
	/// unless configured otherwise.
	pub(crate) max_frame_length: u32,
}

impl ClientBuilder {
	pub(crate) fn new() -> Self {
		Self {
			max_frame_length: DEFAULT_MAX_FILE_SIZE as u32,
		}
	}

	/// Sets the largest response the client is willing to buffer.
	pub fn max_frame_length(mut self, max_frame_length: u32) -> Self {
		self.max_frame_length = max_frame_length;
		self
	}

	/// Connects to a bftp server at the given address.
	pub async fn connect<A>(self, addr: A) -> ClientResult<Client>
	where
		A: ToSocketAddrs,
	{
		let socket = TcpStream::connect(addr).await?;
		socket.set_nodelay(true)?;
		let stream = BftpStream::new(socket, self.max_frame_length)?;
		Ok(Client::from_stream(stream))
	}
}

impl Default for ClientBuilder {
	fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn test_default_frame_limit_matches_file_size() {
		assert_eq!(ClientBuilder::default().max_frame_length as u64, DEFAULT_MAX_FILE_SIZE);
		assert_eq!(ClientBuilder::default().max_frame_length(16).max_frame_length, 16);
	}
}
