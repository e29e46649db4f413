// src/session/registry.rs

use crate::error::ZmqError;
use crate::message::Blob;
use crate::runtime::MailboxSender;
use crate::session::{is_transient_identity, ISessionResolver, SessionHandle};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

type SpawnFn = dyn Fn(usize, &Blob) -> Result<MailboxSender, ZmqError> + Send + Sync;

/// Sessions of one socket, keyed by peer identity.
///
/// A named peer that reconnects is handed back to the session it had, which
/// keeps its queued traffic. Peers with a transient identity always get a
/// fresh session that is never registered.
pub struct SessionRegistry {
  sessions: Mutex<HashMap<Blob, SessionHandle>>,
  next_handle: AtomicUsize,
  spawn: Box<SpawnFn>,
}

impl fmt::Debug for SessionRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SessionRegistry")
      .field("sessions", &self.sessions.lock().len())
      .field("next_handle", &self.next_handle.load(Ordering::Relaxed))
      .finish()
  }
}

impl SessionRegistry {
  /// `spawn` starts a session actor for `(handle, peer_identity)` and
  /// returns its mailbox.
  pub fn new<F>(first_handle: usize, spawn: F) -> Self
  where
    F: Fn(usize, &Blob) -> Result<MailboxSender, ZmqError> + Send + Sync + 'static,
  {
    Self {
      sessions: Mutex::new(HashMap::new()),
      next_handle: AtomicUsize::new(first_handle),
      spawn: Box::new(spawn),
    }
  }

  fn spawn_session(&self, peer_identity: &Blob) -> Result<SessionHandle, ZmqError> {
    let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
    let mailbox = (self.spawn)(handle, peer_identity)?;
    tracing::debug!(session_handle = handle, identity = ?peer_identity, "Session spawned");
    Ok(SessionHandle::new(handle, mailbox))
  }

  pub fn len(&self) -> usize {
    self.sessions.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.sessions.lock().is_empty()
  }
}

#[async_trait]
impl ISessionResolver for SessionRegistry {
  async fn resolve_or_create(&self, peer_identity: &Blob) -> Result<SessionHandle, ZmqError> {
    if is_transient_identity(peer_identity) {
      return self.spawn_session(peer_identity);
    }
    let mut sessions = self.sessions.lock();
    if let Some(existing) = sessions.get(peer_identity) {
      if !existing.is_closed() {
        tracing::trace!(session_handle = existing.handle, identity = ?peer_identity, "Session reused");
        return Ok(existing.clone());
      }
      tracing::debug!(session_handle = existing.handle, identity = ?peer_identity, "Registered session has stopped; replacing");
    }
    let session = self.spawn_session(peer_identity)?;
    sessions.insert(peer_identity.clone(), session.clone());
    Ok(session)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::runtime::{mailbox, MailboxReceiver};
  use crate::session::generate_transient_identity;
  use std::sync::Arc;

  fn registry() -> (SessionRegistry, Arc<Mutex<Vec<MailboxReceiver>>>) {
    let receivers = Arc::new(Mutex::new(Vec::new()));
    let keep = receivers.clone();
    let registry = SessionRegistry::new(100, move |_handle, _identity| {
      let (tx, rx) = mailbox();
      keep.lock().push(rx);
      Ok(tx)
    });
    (registry, receivers)
  }

  #[tokio::test]
  async fn named_peers_reuse_their_session() {
    let (registry, _rx) = registry();
    let id = Blob::from_static(b"peer-a");
    let first = registry.resolve_or_create(&id).await.unwrap();
    let second = registry.resolve_or_create(&id).await.unwrap();
    assert_eq!(first.handle, 100);
    assert_eq!(second.handle, 100);
    assert_eq!(registry.len(), 1);

    let other = registry.resolve_or_create(&Blob::from_static(b"peer-b")).await.unwrap();
    assert_eq!(other.handle, 101);
  }

  #[tokio::test]
  async fn transient_peers_are_never_registered() {
    let (registry, _rx) = registry();
    let id = generate_transient_identity();
    let first = registry.resolve_or_create(&id).await.unwrap();
    let second = registry.resolve_or_create(&id).await.unwrap();
    assert_ne!(first.handle, second.handle);
    assert!(registry.is_empty());
  }

  #[tokio::test]
  async fn stopped_session_is_replaced() {
    let (registry, receivers) = registry();
    let id = Blob::from_static(b"peer");
    let first = registry.resolve_or_create(&id).await.unwrap();
    receivers.lock().clear();
    assert!(first.is_closed());

    let second = registry.resolve_or_create(&id).await.unwrap();
    assert_ne!(first.handle, second.handle);
    assert_eq!(registry.len(), 1);
    let third = registry.resolve_or_create(&id).await.unwrap();
    assert_eq!(third.handle, second.handle);
  }

  #[tokio::test]
  async fn spawn_failure_propagates() {
    let registry = SessionRegistry::new(0, |_, _| Err(ZmqError::Internal("no capacity".into())));
    let result = registry.resolve_or_create(&Blob::from_static(b"p")).await;
    assert_eq!(result.map(|s| s.handle), Err(ZmqError::Internal("no capacity".into())));
    assert!(registry.is_empty());
  }
}
