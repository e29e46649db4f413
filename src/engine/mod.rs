// src/engine/mod.rs

use crate::message::Msg;
use crate::runtime::MailboxSender;
use std::fmt;

/// Wire-protocol engine attached to one connection.
///
/// An engine is plugged into exactly one owner at a time: first the
/// connection initiator while the handshake runs, then the session it is
/// dispatched to. While plugged it delivers decoded frames to the owner as
/// [`Command::EngineFrame`](crate::runtime::Command::EngineFrame) and
/// reports transport loss as
/// [`Command::EngineDetached`](crate::runtime::Command::EngineDetached).
pub trait IEngine: Send + fmt::Debug + 'static {
  /// Identifier used in logs.
  fn handle(&self) -> usize;

  /// Starts I/O on behalf of `owner`.
  fn plug(&mut self, owner: MailboxSender);

  /// Stops delivering to the current owner. The connection stays open.
  fn unplug(&mut self);

  /// Offers one outbound frame. Returns false if the engine cannot take it
  /// now; the owner is sent `Command::EngineWritable` once it can.
  fn write(&mut self, msg: Msg) -> bool;

  /// Pushes accepted frames towards the transport.
  fn flush(&mut self);

  /// Closes the connection and releases the engine.
  fn terminate(self: Box<Self>);
}
