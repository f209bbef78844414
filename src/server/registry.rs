use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

#[derive(Debug)]
/// The part of a connection handler that is visible from outside of its task.
pub struct HandlerHandle {
	id: Uuid,
	/// `address:port` of the remote peer.
	peer: String,
	close_requested: AtomicBool,
	terminated: AtomicBool,
}

impl HandlerHandle {
	pub(crate) fn new(peer: impl Into<String>) -> Arc<Self> {
		Arc::new(Self {
			id: Uuid::new_v4(),
			peer: peer.into(),
			close_requested: AtomicBool::new(false),
			terminated: AtomicBool::new(false),
		})
	}

	/// Asks the handler to close once the request it is currently serving, if
	/// any, has been answered.
	pub fn request_close(&self) { self.close_requested.store(true, Ordering::SeqCst); }

	pub(crate) fn mark_terminated(&self) { self.terminated.store(true, Ordering::SeqCst); }

	/* Getters */
	pub fn id(&self) -> &Uuid { &self.id }

	pub fn peer(&self) -> &str { &self.peer }

	pub fn close_requested(&self) -> bool { self.close_requested.load(Ordering::SeqCst) }

	pub fn is_terminated(&self) -> bool { self.terminated.load(Ordering::SeqCst) }
}

#[derive(Debug, Default)]
/// The live set of connection handlers.
///
/// Written by the accept loop (insert) and by each handler (self removal), read
/// by shutdown. All three go through the same mutex.
pub(crate) struct HandlerRegistry {
	handlers: Mutex<HashMap<Uuid, Arc<HandlerHandle>>>,
	drained: Notify,
}

impl HandlerRegistry {
	pub(crate) async fn insert(&self, handle: Arc<HandlerHandle>) {
		self.handlers.lock().await.insert(*handle.id(), handle);
	}

	pub(crate) async fn remove(&self, id: &Uuid) {
		let mut handlers = self.handlers.lock().await;
		if let Some(handle) = handlers.remove(id) {
			// Handlers deregister while closing, before they are marked terminated.
			debug_assert!(!handle.is_terminated(), "{} removed after terminating", handle.peer());
		}
		if handlers.is_empty() {
			self.drained.notify_waiters();
		}
	}

	/// Requests every live handler to close, returning how many were asked.
	pub(crate) async fn request_close_all(&self) -> usize {
		let handlers = self.handlers.lock().await;
		for handle in handlers.values() {
			handle.request_close();
		}
		handlers.len()
	}

	pub(crate) async fn len(&self) -> usize { self.handlers.lock().await.len() }

	/// Resolves once no handlers are left.
	pub(crate) async fn wait_until_empty(&self) {
		loop {
			let notified = self.drained.notified();
			tokio::pin!(notified);
			// Register interest before checking so a removal in between is not missed.
			notified.as_mut().enable();

			if self.handlers.lock().await.is_empty() {
				return;
			}

			notified.await;
		}
	}
}
