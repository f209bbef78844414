use std::{
	io::ErrorKind,
	path::{Component, Path, PathBuf},
};

use bytes::Bytes;
use thiserror::Error;
use tokio::{
	fs::File,
	io::{AsyncRead, AsyncReadExt},
};
use tracing::debug;

use crate::protocol::constants::{FILE_NOT_FOUND, FILE_READ_ERROR};

#[derive(Debug, Error)]
pub enum FileErrors {
	#[error("no such file under the root directory")]
	NotFound,
	#[error("error reading file: {0}")]
	ReadError(std::io::Error),
	#[error("file is {size} bytes, limit is {limit}")]
	TooLarge { size: u64, limit: u64 },
}

impl FileErrors {
	/// The human readable reason sent back to the peer.
	pub fn reason(&self) -> String {
		match self {
			FileErrors::NotFound => FILE_NOT_FOUND.to_string(),
			FileErrors::ReadError(_) => FILE_READ_ERROR.to_string(),
			FileErrors::TooLarge { limit, .. } => format!("Requested file is too large (> {} bytes)", limit),
		}
	}
}

#[derive(Debug, Clone)]
/// Resolves request paths to file contents inside a sandbox root.
///
/// Paths are always relative to the root. Anything that would leave it, be it
/// a `..` component, an absolute path or a symlink pointing elsewhere, is
/// reported as [FileErrors::NotFound] so that a peer cannot tell such files
/// apart from missing ones.
pub struct FileResolver {
	root: PathBuf,
	max_file_size: u64,
}

impl FileResolver {
	/// Creates a resolver for `root`, which must exist.
	pub async fn open(root: impl AsRef<Path>, max_file_size: u64) -> std::io::Result<Self> {
		let root = tokio::fs::canonicalize(root.as_ref()).await?;
		Ok(Self { root, max_file_size })
	}

	/// Reads the whole of `requested` into memory.
	pub async fn resolve(&self, requested: &str) -> Result<Bytes, FileErrors> {
		let relative = Self::sanitize(requested).ok_or(FileErrors::NotFound)?;
		let path = tokio::fs::canonicalize(self.root.join(relative))
			.await
			.map_err(|e| match e.kind() {
				ErrorKind::PermissionDenied => FileErrors::ReadError(e),
				_ => FileErrors::NotFound,
			})?;

		if !path.starts_with(&self.root) {
			debug!("Refusing {:?}, it resolves outside of {:?}", requested, self.root);
			return Err(FileErrors::NotFound);
		}

		let mut file = File::open(&path).await.map_err(|e| match e.kind() {
			ErrorKind::NotFound => FileErrors::NotFound,
			_ => FileErrors::ReadError(e),
		})?;

		let metadata = file.metadata().await.map_err(FileErrors::ReadError)?;
		if !metadata.is_file() {
			return Err(FileErrors::NotFound);
		}

		let size = metadata.len();
		if size > self.max_file_size {
			return Err(FileErrors::TooLarge {
				size,
				limit: self.max_file_size,
			});
		}

		read_bounded(&mut file, size, self.max_file_size).await
	}

	/// Lexically validates a request path, returning it without `.`
	/// components. Returns `None` for empty, absolute or parent-relative paths.
	fn sanitize(requested: &str) -> Option<PathBuf> {
		let mut relative = PathBuf::new();
		for component in Path::new(requested).components() {
			match component {
				Component::Normal(part) => relative.push(part),
				Component::CurDir => {},
				Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
			}
		}

		if relative.as_os_str().is_empty() {
			None
		} else {
			Some(relative)
		}
	}

	/* Getters */
	pub fn root(&self) -> &Path { &self.root }

	pub fn max_file_size(&self) -> u64 { self.max_file_size }
}

/// Reads `reader` to the end, expecting exactly `size` bytes.
///
/// Reads one byte past `limit` so that a file growing underneath us is still
/// caught.
async fn read_bounded<R>(reader: R, size: u64, limit: u64) -> Result<Bytes, FileErrors>
where
	R: AsyncRead + Unpin,
{
	let mut buffer = Vec::with_capacity(size as usize);
	reader
		.take(limit + 1)
		.read_to_end(&mut buffer)
		.await
		.map_err(FileErrors::ReadError)?;

	let read = buffer.len() as u64;
	if read > limit {
		return Err(FileErrors::TooLarge { size: read, limit });
	}
	if read < size {
		return Err(FileErrors::ReadError(std::io::Error::new(
			ErrorKind::UnexpectedEof,
			format!("file shrank from {} to {} bytes while reading", size, read),
		)));
	}

	Ok(Bytes::from(buffer))
}
