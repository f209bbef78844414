use std::{
	net::SocketAddr,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	time::Duration,
};

use tokio::{
	net::TcpListener,
	sync::{watch, Mutex},
};
use tracing::{debug, error, info, info_span, Instrument};

use super::{
	handler::{ConnectionHandler, HandlerSettings},
	registry::{HandlerHandle, HandlerRegistry},
	ServerResult,
};
use crate::{errors::ServerErrors, resolver::FileResolver};

/// How long the accept loop pauses after a failed accept, e.g. when the
/// process ran out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
	/// Taken by [Server::run] for as long as the accept loop is running and
	/// dropped once it exits, which closes the socket.
	listener: Mutex<Option<TcpListener>>,
	address: SocketAddr,
	accepting: AtomicBool,
	shutdown_signal: watch::Sender<bool>,
	registry: Arc<HandlerRegistry>,
	settings: Arc<HandlerSettings>,
}

impl Server {
	/// Used internally by the ServerBuilder to create a new [Server] instance.
	pub(super) fn new(listener: TcpListener, address: SocketAddr, settings: HandlerSettings) -> Self {
		let (shutdown_signal, _) = watch::channel(false);

		Self {
			listener: Mutex::new(Some(listener)),
			address,
			accepting: AtomicBool::new(false),
			shutdown_signal,
			registry: Arc::new(HandlerRegistry::default()),
			settings: Arc::new(settings),
		}
	}

	/// Accepts connections until [Server::shutdown] is called, blocking the
	/// current task.
	///
	/// Every accepted connection gets its own handler task. Returns
	/// [ServerErrors::AlreadyRunning] if the server is already running or has
	/// been shut down.
	pub async fn run(&self) -> ServerResult<()> {
		let listener = self.listener.lock().await.take().ok_or(ServerErrors::AlreadyRunning)?;
		let mut shutdown = self.shutdown_signal.subscribe();

		// Set before looking at the signal, a shutdown racing with this is then
		// either seen below or clears the flag again.
		self.accepting.store(true, Ordering::SeqCst);
		if *shutdown.borrow_and_update() {
			self.accepting.store(false, Ordering::SeqCst);
			return Ok(());
		}
		info!("Handling incoming connections on {}", self.address);

		while self.is_accepting() {
			tokio::select! {
				result = listener.accept() => match result {
					Ok((socket, addr)) => self.spawn_handler(socket, addr).await,
					Err(e) => {
						error!("Error accepting connection: {:?}", e);
						if !backoff(&mut shutdown).await {
							break;
						}
					},
				},
				_ = shutdown.changed() => break,
			}
		}

		self.accepting.store(false, Ordering::SeqCst);
		drop(listener);
		info!("No longer handling incoming connections");
		Ok(())
	}

	async fn spawn_handler(&self, socket: tokio::net::TcpStream, addr: SocketAddr) {
		info!("Accepted connection from client at {}", addr);

		let handle = HandlerHandle::new(addr.to_string());
		let span = info_span!("connection", peer = %handle.peer());
		self.registry.insert(handle.clone()).await;

		// Shutdown may have walked the registry just before this insert.
		if !self.is_accepting() {
			handle.request_close();
		}

		let handler = ConnectionHandler::new(socket, handle, self.registry.clone(), self.settings.clone());
		tokio::spawn(handler.run().instrument(span));
	}

	/// Stops accepting new connections and asks every live handler to close
	/// once its current request has been answered.
	///
	/// This does not wait for the handlers to finish, see
	/// [Server::wait_for_handlers].
	pub async fn shutdown(&self) {
		self.accepting.store(false, Ordering::SeqCst);
		self.shutdown_signal.send_replace(true);

		// Only present when the accept loop never started.
		drop(self.listener.lock().await.take());

		let requested = self.registry.request_close_all().await;
		debug!("Requested {} connection handler(s) to close", requested);
	}

	/// Resolves once every connection handler has terminated.
	pub async fn wait_for_handlers(&self) { self.registry.wait_until_empty().await }

	/* Getters */
	/// The address the listener is bound to.
	pub fn address(&self) -> SocketAddr { self.address }

	pub fn is_accepting(&self) -> bool { self.accepting.load(Ordering::SeqCst) }

	/// Number of connection handlers that have not yet terminated.
	pub async fn connection_count(&self) -> usize { self.registry.len().await }

	pub fn resolver(&self) -> &FileResolver { &self.settings.resolver }
}

/// Waits out [ACCEPT_BACKOFF]. Returns `false` if the server was shut down in
/// the meantime.
async fn backoff(shutdown: &mut watch::Receiver<bool>) -> bool {
	tokio::select! {
		_ = tokio::time::sleep(ACCEPT_BACKOFF) => !*shutdown.borrow(),
		_ = shutdown.changed() => false,
	}
}
