//! Session lifecycle events observed by consuming applications.
//!
//! Consumers subscribe to [`SessionEvents`] to learn when the session must be re-established.
//! [`SessionEvent::Terminated`] fires exactly once per failed renewal, no matter how many
//! requests were queued behind it.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::sync::broadcast;
// self
use crate::{_prelude::*, refresh::RefreshFailure};

/// Lifecycle change of the current session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
	/// A credential pair was stored after login (or handed in by the application).
	Established,
	/// The credential pair was renewed.
	Renewed,
	/// Renewal failed, credentials were cleared, and re-authentication is required.
	Terminated {
		/// Failure shared with every request that waited on the renewal.
		reason: RefreshFailure,
	},
	/// The application logged out.
	LoggedOut,
}
impl SessionEvent {
	/// Returns `true` for [`SessionEvent::Terminated`].
	pub fn is_terminated(&self) -> bool {
		matches!(self, Self::Terminated { .. })
	}
}

/// Broadcast hub for [`SessionEvent`]s.
#[derive(Debug)]
pub struct SessionEvents {
	sender: broadcast::Sender<SessionEvent>,
	terminations: AtomicU64,
}
impl SessionEvents {
	const DEFAULT_CAPACITY: usize = 32;

	/// Creates a hub whose subscribers buffer up to `capacity` events.
	pub fn with_capacity(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));

		Self { sender, terminations: AtomicU64::new(0) }
	}

	/// Subscribes to events emitted after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
		self.sender.subscribe()
	}

	/// Number of [`SessionEvent::Terminated`] events emitted so far.
	pub fn terminations(&self) -> u64 {
		self.terminations.load(Ordering::Relaxed)
	}

	pub(crate) fn emit(&self, event: SessionEvent) {
		if event.is_terminated() {
			self.terminations.fetch_add(1, Ordering::Relaxed);
		}

		// No subscribers is not an error.
		let _ = self.sender.send(event);
	}
}
impl Default for SessionEvents {
	fn default() -> Self {
		Self::with_capacity(Self::DEFAULT_CAPACITY)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use tokio::sync::broadcast::error::TryRecvError;
	// self
	use super::*;

	#[test]
	fn subscribers_observe_events_in_order() {
		let events = SessionEvents::default();
		let mut rx = events.subscribe();

		events.emit(SessionEvent::Established);
		events.emit(SessionEvent::Terminated { reason: RefreshFailure::MissingCredential });

		assert_eq!(rx.try_recv(), Ok(SessionEvent::Established));
		assert!(rx.try_recv().expect("Termination should be buffered.").is_terminated());
		assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
		assert_eq!(events.terminations(), 1);
	}

	#[test]
	fn emitting_without_subscribers_is_harmless() {
		let events = SessionEvents::with_capacity(0);

		events.emit(SessionEvent::LoggedOut);

		assert_eq!(events.terminations(), 0);
	}
}
