// src/session/mod.rs

//! Session handles and the lookup used to hand an initiated connection to
//! the session that serves its peer.

pub mod registry;

pub use registry::SessionRegistry;

use crate::error::ZmqError;
use crate::message::Blob;
use crate::runtime::MailboxSender;

use async_trait::async_trait;
use rand::RngCore;

/// Number of random bytes in a generated identity.
pub const TRANSIENT_IDENTITY_RANDOM_LEN: usize = 16;

/// Address of a session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
  pub handle: usize,
  pub mailbox: MailboxSender,
}

impl SessionHandle {
  pub fn new(handle: usize, mailbox: MailboxSender) -> Self {
    Self { handle, mailbox }
  }

  /// True if the session actor has stopped reading its mailbox.
  pub fn is_closed(&self) -> bool {
    self.mailbox.is_closed()
  }
}

/// Finds the session that serves a peer identity, creating it if needed.
#[async_trait]
pub trait ISessionResolver: Send + Sync + 'static {
  async fn resolve_or_create(&self, peer_identity: &Blob) -> Result<SessionHandle, ZmqError>;
}

/// True for identities generated for anonymous peers.
/// User-chosen identities may not start with a zero byte.
pub fn is_transient_identity(identity: &[u8]) -> bool {
  identity.first() == Some(&0)
}

/// Generates a unique identity for an anonymous peer: a zero byte followed
/// by random bytes.
pub fn generate_transient_identity() -> Blob {
  let mut bytes = vec![0u8; 1 + TRANSIENT_IDENTITY_RANDOM_LEN];
  rand::rng().fill_bytes(&mut bytes[1..]);
  Blob::from(bytes)
}
