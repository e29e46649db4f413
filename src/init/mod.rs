// src/init/mod.rs

//! Connection initiation: the property exchange that runs on a fresh
//! connection before its engine is handed to a session.

pub mod actor;

pub use actor::spawn_initiator;

use crate::engine::IEngine;
use crate::error::ZmqError;
use crate::message::{Blob, Msg};
use crate::protocol::Property;
use crate::runtime::{Command, InitOutcome, MailboxSender};
use crate::session::{generate_transient_identity, is_transient_identity, ISessionResolver, SessionHandle};
use crate::socket::options::SocketOptions;
use crate::socket::SocketType;

use std::collections::VecDeque;
use std::sync::Arc;

/// What this side advertises during the handshake.
#[derive(Debug, Clone)]
pub struct InitiatorConfig {
  pub socket_type: SocketType,
  /// Empty for anonymous sockets.
  pub identity: Blob,
}

impl InitiatorConfig {
  pub fn from_options(options: &SocketOptions) -> Self {
    Self {
      socket_type: options.socket_type,
      identity: options.routing_id.clone().unwrap_or_default(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
  AwaitingPeerProperties,
  /// The engine was handed to a session.
  Finalized,
  /// Torn down before finalize.
  Aborted,
}

/// Per-connection handshake state machine.
///
/// Sends the local socket type and identity, reads the peer's, then hands
/// the engine to the session serving that identity. Terminates itself by
/// sending exactly one [`Command::InitFinished`] to its owner.
///
/// No I/O context is held: the initiator runs on its own task (see
/// [`spawn_initiator`]) and the session that receives the engine schedules
/// it from then on.
pub struct HandshakeInitiator {
  handle: usize,
  config: InitiatorConfig,
  state: InitState,
  /// Owning socket.
  owner: MailboxSender,
  /// Where the plugged engine delivers inbound frames.
  inbox: MailboxSender,
  /// Known session for outbound connections; `None` when it has to be
  /// resolved from the peer identity.
  session: Option<SessionHandle>,
  resolver: Arc<dyn ISessionResolver>,
  engine: Option<Box<dyn IEngine>>,
  /// Unplugged engine waiting to be dispatched.
  ephemeral_engine: Option<Box<dyn IEngine>>,
  plugged: bool,
  to_send: VecDeque<Msg>,
  peer_type: Option<SocketType>,
  peer_identity: Option<Blob>,
  /// Peer identity was received.
  received: bool,
}

impl std::fmt::Debug for HandshakeInitiator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("HandshakeInitiator")
      .field("handle", &self.handle)
      .field("state", &self.state)
      .field("session", &self.session.as_ref().map(|s| s.handle))
      .field("engine", &self.engine.as_ref().map(|e| e.handle()))
      .field("ephemeral_engine", &self.ephemeral_engine.as_ref().map(|e| e.handle()))
      .field("to_send", &self.to_send.len())
      .field("peer_type", &self.peer_type)
      .field("peer_identity", &self.peer_identity)
      .finish()
  }
}

static_assertions::assert_impl_all!(HandshakeInitiator: Send);

impl HandshakeInitiator {
  pub fn new(
    handle: usize,
    config: InitiatorConfig,
    owner: MailboxSender,
    inbox: MailboxSender,
    engine: Box<dyn IEngine>,
    session: Option<SessionHandle>,
    resolver: Arc<dyn ISessionResolver>,
  ) -> Self {
    tracing::debug!(
      handle,
      engine_handle = engine.handle(),
      session_handle = ?session.as_ref().map(|s| s.handle),
      "Initiator created"
    );
    Self {
      handle,
      config,
      state: InitState::AwaitingPeerProperties,
      owner,
      inbox,
      session,
      resolver,
      engine: Some(engine),
      ephemeral_engine: None,
      plugged: false,
      to_send: VecDeque::new(),
      peer_type: None,
      peer_identity: None,
      received: false,
    }
  }

  pub fn handle(&self) -> usize {
    self.handle
  }

  pub fn state(&self) -> InitState {
    self.state
  }

  /// True once the initiator has finalized or aborted.
  pub fn is_done(&self) -> bool {
    self.state != InitState::AwaitingPeerProperties
  }

  pub fn peer_type(&self) -> Option<SocketType> {
    self.peer_type
  }

  pub fn peer_identity(&self) -> Option<&Blob> {
    self.peer_identity.as_ref()
  }

  /// Starts the handshake: plugs the engine and queues the local properties.
  pub fn plug(&mut self) {
    if self.is_done() || self.plugged {
      tracing::warn!(handle = self.handle, state = ?self.state, "Initiator plug ignored");
      return;
    }
    let Some(engine) = self.engine.as_mut() else {
      return;
    };
    engine.plug(self.inbox.clone());
    self.plugged = true;
    self
      .to_send
      .push_back(Property::SocketType(self.config.socket_type).to_msg());
    self
      .to_send
      .push_back(Property::Identity(self.config.identity.clone()).to_msg());
    tracing::debug!(handle = self.handle, socket_type = %self.config.socket_type, "Initiator plugged");
    self.write_pending();
  }

  /// Processes one property frame from the peer.
  ///
  /// The peer type must come first, then the identity. Anything else is a
  /// protocol violation, which the caller reports through [`fail`](Self::fail).
  pub fn read_property(&mut self, msg: Msg) -> Result<(), ZmqError> {
    if self.is_done() {
      tracing::trace!(handle = self.handle, state = ?self.state, "Initiator ignoring frame after completion");
      return Ok(());
    }
    if self.received {
      return Err(ZmqError::ProtocolViolation(
        "frame received after peer identity".to_string(),
      ));
    }
    match Property::parse(&msg)? {
      Property::SocketType(peer_type) => {
        if self.peer_type.is_some() {
          return Err(ZmqError::ProtocolViolation("duplicate socket type property".to_string()));
        }
        if !self.config.socket_type.is_compatible(peer_type) {
          return Err(ZmqError::ProtocolViolation(format!(
            "{} cannot talk to {}",
            self.config.socket_type, peer_type
          )));
        }
        tracing::trace!(handle = self.handle, peer_type = %peer_type, "Initiator received peer type");
        self.peer_type = Some(peer_type);
      }
      Property::Identity(identity) => {
        if self.peer_type.is_none() {
          return Err(ZmqError::ProtocolViolation(
            "identity received before socket type".to_string(),
          ));
        }
        let identity = if identity.is_empty() {
          generate_transient_identity()
        } else {
          identity
        };
        tracing::debug!(handle = self.handle, identity = ?identity, "Initiator received peer identity");
        self.peer_identity = Some(identity);
        self.received = true;
        self.write_pending();
      }
    }
    Ok(())
  }

  /// Hands queued property frames to the engine and dispatches the engine
  /// once the handshake is complete.
  pub async fn flush(&mut self) {
    if self.is_done() {
      return;
    }
    self.write_pending();
    if self.ephemeral_engine.is_some() {
      self.dispatch_engine().await;
    }
  }

  fn write_pending(&mut self) {
    let Some(engine) = self.engine.as_mut() else {
      return;
    };
    if !self.plugged {
      return;
    }
    let mut written = 0usize;
    while let Some(msg) = self.to_send.front() {
      if !engine.write(msg.clone()) {
        tracing::trace!(handle = self.handle, pending = self.to_send.len(), "Engine refused property frame");
        break;
      }
      self.to_send.pop_front();
      written += 1;
    }
    if written > 0 {
      engine.flush();
    }
    self.maybe_finalize();
  }

  /// Parks the engine for dispatch once the peer identity is known and all
  /// local properties went out.
  fn maybe_finalize(&mut self) {
    if !self.received || !self.to_send.is_empty() || self.ephemeral_engine.is_some() {
      return;
    }
    if let Some(mut engine) = self.engine.take() {
      engine.unplug();
      tracing::trace!(handle = self.handle, engine_handle = engine.handle(), "Engine unplugged for dispatch");
      self.ephemeral_engine = Some(engine);
    }
  }

  async fn dispatch_engine(&mut self) {
    let Some(engine) = self.ephemeral_engine.take() else {
      return;
    };
    let peer_identity = self.peer_identity.clone().unwrap_or_default();
    let transient = is_transient_identity(&peer_identity);

    let session = match self.session.take() {
      Some(session) => session,
      None => match self.resolver.resolve_or_create(&peer_identity).await {
        Ok(session) => session,
        Err(e) => {
          tracing::error!(handle = self.handle, error = %e, "Initiator failed to resolve session");
          engine.terminate();
          self.finish(InitOutcome::Failed(e)).await;
          return;
        }
      },
    };

    let session_handle = session.handle;
    let attach = Command::AttachEngine {
      engine: Some(engine),
      peer_identity: peer_identity.clone(),
      transient,
    };
    match session.mailbox.send(attach).await {
      Ok(()) => {
        tracing::debug!(handle = self.handle, session_handle, transient, "Engine dispatched to session");
        self.finish(InitOutcome::Finalized {
          session_handle,
          peer_identity,
        })
        .await;
      }
      Err(async_channel::SendError(cmd)) => {
        tracing::warn!(handle = self.handle, session_handle, "Session gone before engine dispatch");
        if let Command::AttachEngine {
          engine: Some(engine), ..
        } = cmd
        {
          engine.terminate();
        }
        self.finish(InitOutcome::Failed(ZmqError::ConnectionClosed)).await;
      }
    }
  }

  /// Owner-initiated cancellation before finalize. Idempotent.
  pub async fn unplug(&mut self) {
    if self.is_done() {
      return;
    }
    tracing::debug!(handle = self.handle, "Initiator unplugged");
    self.abort(InitOutcome::Aborted, false).await;
  }

  /// The engine lost its connection. Idempotent.
  pub async fn detach(&mut self) {
    if self.is_done() {
      return;
    }
    tracing::debug!(handle = self.handle, "Initiator engine detached");
    // The engine has already torn itself down.
    self.engine = None;
    self.plugged = false;
    self.abort(InitOutcome::Aborted, true).await;
  }

  /// Aborts the connection after a handshake error.
  pub async fn fail(&mut self, error: ZmqError) {
    if self.is_done() {
      return;
    }
    tracing::warn!(handle = self.handle, error = %error, "Initiator handshake failed");
    self.abort(InitOutcome::Failed(error), true).await;
  }

  async fn abort(&mut self, outcome: InitOutcome, notify_session: bool) {
    self.to_send.clear();
    if let Some(mut engine) = self.engine.take() {
      if self.plugged {
        engine.unplug();
      }
      engine.terminate();
    }
    if let Some(engine) = self.ephemeral_engine.take() {
      engine.terminate();
    }
    if let Some(session) = self.session.take() {
      if notify_session {
        let failed = Command::AttachEngine {
          engine: None,
          peer_identity: Blob::new(),
          transient: false,
        };
        if session.mailbox.send(failed).await.is_err() {
          tracing::trace!(handle = self.handle, session_handle = session.handle, "Session already gone");
        }
      }
    }
    self.finish(outcome).await;
  }

  async fn finish(&mut self, outcome: InitOutcome) {
    self.state = match outcome {
      InitOutcome::Finalized { .. } => InitState::Finalized,
      _ => InitState::Aborted,
    };
    self.plugged = false;
    self.to_send.clear();
    let cmd = Command::InitFinished {
      handle: self.handle,
      outcome,
    };
    if self.owner.send(cmd).await.is_err() {
      tracing::warn!(handle = self.handle, "Initiator owner gone; completion not delivered");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::runtime::{mailbox, MailboxReceiver};
  use crate::session::SessionRegistry;
  use parking_lot::Mutex;

  #[derive(Debug, Default)]
  struct EngineLog {
    written: Vec<Msg>,
    plugged: usize,
    unplugged: usize,
    terminated: bool,
  }

  #[derive(Debug)]
  struct MockEngine {
    log: Arc<Mutex<EngineLog>>,
    /// Number of writes accepted before refusing.
    capacity: usize,
  }

  impl IEngine for MockEngine {
    fn handle(&self) -> usize {
      77
    }
    fn plug(&mut self, _owner: MailboxSender) {
      self.log.lock().plugged += 1;
    }
    fn unplug(&mut self) {
      self.log.lock().unplugged += 1;
    }
    fn write(&mut self, msg: Msg) -> bool {
      if self.capacity == 0 {
        return false;
      }
      self.capacity -= 1;
      self.log.lock().written.push(msg);
      true
    }
    fn flush(&mut self) {}
    fn terminate(self: Box<Self>) {
      self.log.lock().terminated = true;
    }
  }

  struct Fixture {
    init: HandshakeInitiator,
    log: Arc<Mutex<EngineLog>>,
    owner_rx: MailboxReceiver,
    _inbox_rx: MailboxReceiver,
    sessions: Arc<Mutex<Vec<MailboxReceiver>>>,
  }

  fn fixture(capacity: usize, session: Option<SessionHandle>) -> Fixture {
    let log = Arc::new(Mutex::new(EngineLog::default()));
    let (owner_tx, owner_rx) = mailbox();
    let (inbox_tx, inbox_rx) = mailbox();
    let sessions = Arc::new(Mutex::new(Vec::new()));
    let keep = sessions.clone();
    let registry = SessionRegistry::new(500, move |_, _| {
      let (tx, rx) = mailbox();
      keep.lock().push(rx);
      Ok(tx)
    });
    let config = InitiatorConfig {
      socket_type: SocketType::XSub,
      identity: Blob::from_static(b"me"),
    };
    let engine = Box::new(MockEngine {
      log: log.clone(),
      capacity,
    });
    let init = HandshakeInitiator::new(1, config, owner_tx, inbox_tx, engine, session, Arc::new(registry));
    Fixture {
      init,
      log,
      owner_rx,
      _inbox_rx: inbox_rx,
      sessions,
    }
  }

  #[test]
  fn plug_sends_type_then_identity() {
    let mut fx = fixture(usize::MAX, None);
    fx.init.plug();
    let log = fx.log.lock();
    assert_eq!(log.plugged, 1);
    let frames: Vec<&[u8]> = log.written.iter().map(|m| m.data()).collect();
    assert_eq!(frames, vec![&[1u8, 10][..], &b"\x02me"[..]]);
  }

  #[tokio::test]
  async fn full_handshake_dispatches_engine() {
    let mut fx = fixture(usize::MAX, None);
    fx.init.plug();
    fx.init.read_property(Msg::from_static(&[1, 1])).unwrap();
    fx.init.read_property(Msg::from_static(b"\x02publisher")).unwrap();
    assert_eq!(fx.log.lock().unplugged, 1);
    fx.init.flush().await;
    assert_eq!(fx.init.state(), InitState::Finalized);

    let session_rx = fx.sessions.lock().remove(0);
    match session_rx.try_recv().unwrap() {
      Command::AttachEngine {
        engine,
        peer_identity,
        transient,
      } => {
        assert!(engine.is_some());
        assert_eq!(&peer_identity[..], b"publisher");
        assert!(!transient);
      }
      other => panic!("unexpected {:?}", other),
    }
    match fx.owner_rx.try_recv().unwrap() {
      Command::InitFinished { handle, outcome } => {
        assert_eq!(handle, 1);
        assert_eq!(
          outcome,
          InitOutcome::Finalized {
            session_handle: 500,
            peer_identity: Blob::from_static(b"publisher")
          }
        );
      }
      other => panic!("unexpected {:?}", other),
    }
    assert!(!fx.log.lock().terminated);
  }

  #[tokio::test]
  async fn anonymous_peer_gets_transient_identity() {
    let mut fx = fixture(usize::MAX, None);
    fx.init.plug();
    fx.init.read_property(Msg::from_static(&[1, 9])).unwrap();
    fx.init.read_property(Msg::from_static(&[2])).unwrap();
    let identity = fx.init.peer_identity().cloned().unwrap();
    assert!(is_transient_identity(&identity));
    fx.init.flush().await;
    let session_rx = fx.sessions.lock().remove(0);
    assert!(matches!(
      session_rx.try_recv().unwrap(),
      Command::AttachEngine { transient: true, .. }
    ));
  }

  #[test]
  fn properties_out_of_order_are_rejected() {
    let mut fx = fixture(usize::MAX, None);
    fx.init.plug();
    assert!(matches!(
      fx.init.read_property(Msg::from_static(b"\x02peer")),
      Err(ZmqError::ProtocolViolation(_))
    ));
    fx.init.read_property(Msg::from_static(&[1, 1])).unwrap();
    assert!(fx.init.read_property(Msg::from_static(&[1, 1])).is_err());
  }

  #[test]
  fn incompatible_peer_is_rejected() {
    let mut fx = fixture(usize::MAX, None);
    fx.init.plug();
    assert!(matches!(
      fx.init.read_property(Msg::from_static(&[1, 8])),
      Err(ZmqError::ProtocolViolation(_))
    ));
  }

  #[tokio::test]
  async fn finalize_waits_for_own_properties() {
    let mut fx = fixture(1, None);
    fx.init.plug();
    fx.init.read_property(Msg::from_static(&[1, 1])).unwrap();
    fx.init.read_property(Msg::from_static(b"\x02p")).unwrap();
    fx.init.flush().await;
    // Identity frame still queued: nothing dispatched.
    assert_eq!(fx.init.state(), InitState::AwaitingPeerProperties);
    assert_eq!(fx.log.lock().unplugged, 0);
    assert!(fx.sessions.lock().is_empty());
  }

  #[tokio::test]
  async fn unplug_and_detach_are_idempotent() {
    let mut fx = fixture(usize::MAX, None);
    fx.init.plug();
    fx.init.unplug().await;
    fx.init.detach().await;
    fx.init.unplug().await;
    assert_eq!(fx.init.state(), InitState::Aborted);
    assert!(fx.log.lock().terminated);
    assert!(matches!(
      fx.owner_rx.try_recv().unwrap(),
      Command::InitFinished {
        outcome: InitOutcome::Aborted,
        ..
      }
    ));
    assert!(fx.owner_rx.try_recv().is_err());
    // No further frames are processed.
    assert!(fx.init.read_property(Msg::from_static(&[1, 1])).is_ok());
    assert_eq!(fx.init.peer_type(), None);
  }

  #[tokio::test]
  async fn detach_then_unplug_finishes_once() {
    let mut fx = fixture(usize::MAX, None);
    fx.init.plug();
    fx.init.read_property(Msg::from_static(&[1, 1])).unwrap();
    fx.init.detach().await;
    fx.init.unplug().await;
    fx.init.detach().await;
    assert_eq!(fx.init.state(), InitState::Aborted);
    assert!(!fx.log.lock().terminated);
    assert!(matches!(
      fx.owner_rx.try_recv().unwrap(),
      Command::InitFinished {
        outcome: InitOutcome::Aborted,
        ..
      }
    ));
    assert!(fx.owner_rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn detach_notifies_known_session() {
    let (session_tx, session_rx) = mailbox();
    let mut fx = fixture(usize::MAX, Some(SessionHandle::new(9, session_tx)));
    fx.init.plug();
    fx.init.detach().await;
    assert!(matches!(
      session_rx.try_recv().unwrap(),
      Command::AttachEngine { engine: None, .. }
    ));
    // The engine tore itself down; it is dropped, not terminated again.
    assert!(!fx.log.lock().terminated);
  }

  #[tokio::test]
  async fn unplug_after_identity_releases_parked_engine() {
    let mut fx = fixture(usize::MAX, None);
    fx.init.plug();
    fx.init.read_property(Msg::from_static(&[1, 1])).unwrap();
    fx.init.read_property(Msg::from_static(b"\x02p")).unwrap();
    fx.init.unplug().await;
    assert!(fx.log.lock().terminated);
    assert!(fx.sessions.lock().is_empty());
  }
}
