// src/runtime/command.rs

use crate::engine::IEngine;
use crate::error::ZmqError;
use crate::message::{Blob, Msg};

/// How a connection initiator ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
  /// The engine was handed to the session bound to `peer_identity`.
  Finalized { session_handle: usize, peer_identity: Blob },
  /// The connection went away (unplug or engine detach) before finalize.
  Aborted,
  /// The peer broke the handshake protocol.
  Failed(ZmqError),
}

/// Defines messages exchanged between actors (sockets, sessions, initiators, engines).
#[derive(Debug)]
pub enum Command {
  // --- Lifecycle ---
  /// Owner -> initiator: start the handshake on this I/O context.
  Plug,
  /// Owner -> initiator: cancel before the handshake completes.
  Unplug,
  /// Universal signal to shut down an actor task.
  Stop,

  // --- Engine -> plugged owner ---
  /// One frame decoded from the transport.
  EngineFrame { msg: Msg },
  /// The engine refused a write earlier and can accept frames again.
  EngineWritable,
  /// The transport failed or was closed by the peer.
  EngineDetached,

  // --- Initiator -> session ---
  /// Hands the connection's engine to the session.
  /// `engine: None` tells a known session that its connect attempt failed.
  AttachEngine {
    engine: Option<Box<dyn IEngine>>,
    peer_identity: Blob,
    /// The session was created for this connection only.
    transient: bool,
  },

  // --- Initiator -> owner ---
  /// Sent exactly once when an initiator terminates itself.
  InitFinished { handle: usize, outcome: InitOutcome },
}

impl Command {
  pub fn variant_name(&self) -> &'static str {
    match self {
      Command::Plug => "Plug",
      Command::Unplug => "Unplug",
      Command::Stop => "Stop",
      Command::EngineFrame { .. } => "EngineFrame",
      Command::EngineWritable => "EngineWritable",
      Command::EngineDetached => "EngineDetached",
      Command::AttachEngine { .. } => "AttachEngine",
      Command::InitFinished { .. } => "InitFinished",
    }
  }
}
