use std::{net::SocketAddr, path::PathBuf, str::Utf8Error};

use thiserror::Error;

use crate::{
	protocol::{FrameErrors, Opcode},
	resolver::FileErrors,
};

/// Error type for the bftp library.
#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error("Invalid UTF-8: {0:?}")]
	InvalidUtf8(#[from] Utf8Error),
	#[error(transparent)]
	Frame(#[from] FrameErrors),
	#[error(transparent)]
	File(#[from] FileErrors),
	#[error(transparent)]
	ServerError(#[from] ServerErrors),
	#[error(transparent)]
	ClientError(#[from] ClientErrors),
}

#[derive(Debug, Error)]
pub enum ClientErrors {
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Frame(#[from] FrameErrors),
	#[error("Server closed the connection")]
	ConnectionClosed,
	#[error("Request rejected ({opcode}): {reason}")]
	Rejected { opcode: Opcode, reason: String },
	#[error("Unexpected response opcode {0}")]
	UnexpectedResponse(Opcode),
}

#[derive(Debug, Error)]
pub enum ServerErrors {
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error("Could not bind to {address}: {source}")]
	Bind {
		address: SocketAddr,
		#[source]
		source: std::io::Error,
	},
	#[error("Invalid root directory {path:?}: {source}")]
	InvalidRoot {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("Server is already running or has been shut down")]
	AlreadyRunning,
}
