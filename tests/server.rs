//! End to end tests driving a live server over loopback TCP.

use std::{io::ErrorKind, path::Path, sync::Arc, time::Duration};

use bftp::{
	client::Client,
	errors::{ClientErrors, ServerErrors},
	protocol::{Frame, Opcode},
	server::{Server, ServerBuilder, ServerResult},
};
use pretty_assertions::assert_eq;
use rand::Rng;
use tempfile::TempDir;
use tokio::{
	io::{AsyncReadExt, AsyncWriteExt},
	net::TcpStream,
	task::JoinHandle,
};

const README: &[u8] = b"# bftp\n\nBasic File Transfer Protocol\n";

/// Creates `<tmp>/public` holding `README.md` and a larger random
/// `blob.bin`, plus `<tmp>/secret.txt` outside of it.
fn setup_root() -> (TempDir, Vec<u8>) {
	let tempdir = tempfile::tempdir().unwrap();
	let public = tempdir.path().join("public");
	std::fs::create_dir(&public).unwrap();
	std::fs::write(public.join("README.md"), README).unwrap();

	let mut rng = rand::thread_rng();
	let blob: Vec<u8> = (0..256 * 1024).map(|_| rng.gen()).collect();
	std::fs::write(public.join("blob.bin"), &blob).unwrap();
	std::fs::write(tempdir.path().join("secret.txt"), b"do not serve me").unwrap();

	(tempdir, blob)
}

async fn start(builder: ServerBuilder, root: &Path) -> (Arc<Server>, JoinHandle<ServerResult<()>>) {
	let server = Arc::new(builder.port(0).root(root.join("public")).build().await.unwrap());
	let task = tokio::task::spawn({
		let server = server.clone();
		async move { server.run().await }
	});
	(server, task)
}

async fn wait_for_connections(server: &Server, count: usize) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while server.connection_count().await != count {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.unwrap();
}

async fn write_raw(stream: &mut TcpStream, opcode: u8, content: &[u8]) {
	let mut buffer = Vec::with_capacity(5 + content.len());
	buffer.extend_from_slice(&(content.len() as u32).to_be_bytes());
	buffer.push(opcode);
	buffer.extend_from_slice(content);
	stream.write_all(&buffer).await.unwrap();
}

/// Reads one frame, `None` once the server has closed the connection.
async fn read_raw(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
	let mut header = [0u8; 5];
	match stream.read_exact(&mut header).await {
		Ok(_) => {},
		Err(e) if matches!(e.kind(), ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset) => return None,
		Err(e) => panic!("unexpected read error: {}", e),
	}

	let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
	let mut content = vec![0u8; length];
	stream.read_exact(&mut content).await.unwrap();
	Some((header[4], content))
}

/// Asserts the server closes the connection, allowing for the courtesy FIN.
async fn assert_closed(stream: &mut TcpStream) {
	let next = tokio::time::timeout(Duration::from_secs(5), read_raw(stream)).await.unwrap();
	if let Some(frame) = next {
		assert_eq!(frame, (0x04, Vec::new()));
		let next = tokio::time::timeout(Duration::from_secs(5), read_raw(stream)).await.unwrap();
		assert_eq!(next, None);
	}
}

#[tokio::test]
async fn test_get_success() {
	let (tempdir, _) = setup_root();
	let (server, _) = start(ServerBuilder::default(), tempdir.path()).await;

	let client = Client::connect(server.address()).await.unwrap();
	let response = client.get("README.md").await.unwrap();

	assert_eq!(response.opcode().bits(), 0x09);
	assert_eq!(&response.content()[..], README);
}

#[tokio::test]
async fn test_get_not_found_keeps_connection_open() {
	let (tempdir, blob) = setup_root();
	let (server, _) = start(ServerBuilder::default(), tempdir.path()).await;

	let client = Client::connect(server.address()).await.unwrap();
	let response = client.get("missing.txt").await.unwrap();
	assert_eq!(response.opcode().bits(), 0x11);
	assert_eq!(response.content_str().unwrap(), "File not found");

	assert_eq!(&client.fetch("blob.bin").await.unwrap()[..], blob.as_slice());
	client.finish().await.unwrap();
	assert!(!client.is_connected());
}

#[tokio::test]
async fn test_path_traversal_is_not_found() {
	let (tempdir, _) = setup_root();
	let (server, _) = start(ServerBuilder::default(), tempdir.path()).await;
	let client = Client::connect(server.address()).await.unwrap();

	for path in ["../secret.txt", "./../secret.txt", "/etc/passwd"] {
		let response = client.get(path).await.unwrap();
		assert_eq!(*response.opcode(), Opcode::GET_ERR);
		assert_eq!(response.content_str().unwrap(), "File not found");
	}
}

#[tokio::test]
async fn test_too_large_is_an_error() {
	let (tempdir, _) = setup_root();
	let (server, _) = start(ServerBuilder::default().max_file_size(16), tempdir.path()).await;
	let client = Client::connect(server.address()).await.unwrap();

	match client.fetch("README.md").await {
		Err(ClientErrors::Rejected { opcode, reason }) => {
			assert_eq!(opcode, Opcode::GET_ERR);
			assert_eq!(reason, "Requested file is too large (> 16 bytes)");
		},
		other => panic!("expected a rejection, got {:?}", other),
	}
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_file_is_an_error() {
	use std::os::unix::fs::PermissionsExt;

	let (tempdir, _) = setup_root();
	let locked = tempdir.path().join("public").join("locked.txt");
	std::fs::write(&locked, b"locked").unwrap();
	std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
	if std::fs::File::open(&locked).is_ok() {
		// Running with privileges that ignore file permissions.
		return;
	}

	let (server, _) = start(ServerBuilder::default(), tempdir.path()).await;
	let client = Client::connect(server.address()).await.unwrap();

	let response = client.get("locked.txt").await.unwrap();
	assert_eq!(*response.opcode(), Opcode::GET_ERR);
	assert_eq!(response.content_str().unwrap(), "Encountered error while reading file");

	// Like a missing file, this does not end the session.
	assert_eq!(&client.fetch("README.md").await.unwrap()[..], README);
}

#[tokio::test]
async fn test_unsupported_opcode_closes_connection() {
	let (tempdir, _) = setup_root();
	let (server, _) = start(ServerBuilder::default(), tempdir.path()).await;

	for opcode in [0x00, 0x03, 0x19, 0x09] {
		let mut stream = TcpStream::connect(server.address()).await.unwrap();
		write_raw(&mut stream, opcode, b"").await;

		let (response, content) = read_raw(&mut stream).await.unwrap();
		assert!(response & 0x10 != 0, "{:#04x} answered with {:#04x}", opcode, response);
		assert!(response & 0x08 == 0);
		assert_eq!(content, b"Unsupported command");
		assert_closed(&mut stream).await;
	}

	wait_for_connections(&server, 0).await;
}

#[tokio::test]
async fn test_put_is_unsupported() {
	let (tempdir, _) = setup_root();
	let (server, _) = start(ServerBuilder::default(), tempdir.path()).await;

	let mut stream = TcpStream::connect(server.address()).await.unwrap();
	write_raw(&mut stream, 0x02, b"upload.txt").await;

	assert_eq!(read_raw(&mut stream).await, Some((0x12, b"Unsupported command".to_vec())));
	assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_fin_handshake() {
	let (tempdir, _) = setup_root();
	let (server, _) = start(ServerBuilder::default(), tempdir.path()).await;

	let mut stream = TcpStream::connect(server.address()).await.unwrap();
	write_raw(&mut stream, 0x04, b"").await;
	assert_closed(&mut stream).await;

	wait_for_connections(&server, 0).await;
}

#[tokio::test]
async fn test_oversized_frame_is_rejected() {
	let (tempdir, _) = setup_root();
	let (server, _) = start(ServerBuilder::default().max_frame_length(16), tempdir.path()).await;

	let mut stream = TcpStream::connect(server.address()).await.unwrap();
	stream.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
	stream.write_all(&[0x01]).await.unwrap();

	assert_closed(&mut stream).await;
}

#[tokio::test]
async fn test_requests_are_answered_in_order() {
	let (tempdir, blob) = setup_root();
	let (server, _) = start(ServerBuilder::default(), tempdir.path()).await;

	// Pipelined requests are still answered one after another.
	let mut stream = TcpStream::connect(server.address()).await.unwrap();
	write_raw(&mut stream, 0x01, b"README.md").await;
	write_raw(&mut stream, 0x01, b"nope").await;
	write_raw(&mut stream, 0x01, b"blob.bin").await;

	assert_eq!(read_raw(&mut stream).await, Some((0x09, README.to_vec())));
	assert_eq!(read_raw(&mut stream).await, Some((0x11, b"File not found".to_vec())));
	assert_eq!(read_raw(&mut stream).await, Some((0x09, blob)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_graceful_shutdown_under_load() {
	const CLIENTS: usize = 8;

	let (tempdir, blob) = setup_root();
	let (server, task) = start(ServerBuilder::default(), tempdir.path()).await;
	let address = server.address();

	let mut streams = Vec::with_capacity(CLIENTS);
	for _ in 0..CLIENTS {
		streams.push(TcpStream::connect(address).await.unwrap());
	}
	wait_for_connections(&server, CLIENTS).await;

	for stream in streams.iter_mut() {
		write_raw(stream, 0x01, b"blob.bin").await;
	}
	server.shutdown().await;
	assert!(!server.is_accepting());

	let readers: Vec<_> = streams
		.into_iter()
		.map(|mut stream| {
			let blob = blob.clone();
			tokio::task::spawn(async move {
				assert_eq!(read_raw(&mut stream).await, Some((0x09, blob)));
				assert_closed(&mut stream).await;
			})
		})
		.collect();
	for reader in readers {
		reader.await.unwrap();
	}

	task.await.unwrap().unwrap();
	assert!(!server.is_accepting());
	assert!(TcpStream::connect(address).await.is_err());

	tokio::time::timeout(Duration::from_secs(5), server.wait_for_handlers())
		.await
		.unwrap();
	assert_eq!(server.connection_count().await, 0);
}

#[tokio::test]
async fn test_close_request_waits_for_response() {
	let (tempdir, _) = setup_root();
	let (server, _) = start(ServerBuilder::default(), tempdir.path()).await;

	let client = Client::connect(server.address()).await.unwrap();
	wait_for_connections(&server, 1).await;

	// The handler is asked to close before its next request arrives, that
	// request must still be answered.
	server.shutdown().await;
	let response = client.get("README.md").await.unwrap();
	assert_eq!(*response.opcode(), Opcode::GET_RSP);
	assert_eq!(&response.content()[..], README);

	assert_eq!(client.receive().await.unwrap(), Frame::empty(Opcode::FIN));
	assert!(matches!(client.receive().await, Err(ClientErrors::ConnectionClosed)));
	assert!(matches!(client.get("README.md").await, Err(ClientErrors::ConnectionClosed)));
}

#[tokio::test]
async fn test_idle_timeout() {
	let (tempdir, _) = setup_root();
	let builder = ServerBuilder::default().idle_timeout(Duration::from_millis(100));
	let (server, _) = start(builder, tempdir.path()).await;

	let mut stream = TcpStream::connect(server.address()).await.unwrap();
	assert_closed(&mut stream).await;
	wait_for_connections(&server, 0).await;
}

#[tokio::test]
async fn test_bind_error() {
	let (tempdir, _) = setup_root();
	let (server, _) = start(ServerBuilder::default(), tempdir.path()).await;

	let result = ServerBuilder::default()
		.port(server.address().port())
		.root(tempdir.path())
		.build()
		.await;
	assert!(matches!(result, Err(ServerErrors::Bind { .. })));
}

#[tokio::test]
async fn test_invalid_root() {
	let tempdir = tempfile::tempdir().unwrap();
	let result = ServerBuilder::default()
		.port(0)
		.root(tempdir.path().join("does-not-exist"))
		.build()
		.await;
	assert!(matches!(result, Err(ServerErrors::InvalidRoot { .. })));
}

#[tokio::test]
async fn test_run_twice() {
	let (tempdir, _) = setup_root();
	let (server, task) = start(ServerBuilder::default(), tempdir.path()).await;
	// Make sure the first run has taken the listener.
	let _client = Client::connect(server.address()).await.unwrap();
	wait_for_connections(&server, 1).await;

	assert!(matches!(server.run().await, Err(ServerErrors::AlreadyRunning)));

	assert!(server.is_accepting());

	server.shutdown().await;
	task.await.unwrap().unwrap();
	assert!(!server.is_accepting());
	assert!(matches!(server.run().await, Err(ServerErrors::AlreadyRunning)));
	assert!(!server.is_accepting());
}
