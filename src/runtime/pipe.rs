// src/runtime/pipe.rs

//! Unidirectional, ordered frame channel between two execution contexts.
//!
//! A pipe is created as a `(PipeWriter, PipeReader)` pair. Each end is owned
//! by exactly one context. Frames written to the writer are buffered locally
//! and become visible to the reader only when `flush` publishes them, and
//! only as complete logical messages, so a reader never observes half of a
//! multi-part message unless the writer was torn down mid-message.

use crate::error::ZmqError;
use crate::message::Msg;

use async_channel::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Reason a write was refused. The frame is handed back to the caller.
#[derive(Debug)]
pub enum PushError<T> {
  /// High-water mark reached.
  Full(T),
  /// The reading side is gone.
  Closed(T),
}

#[derive(Debug)]
struct PipeShared {
  id: usize,
  hwm: Option<usize>,
  /// Set on output pipes whose queued traffic is worthless once the
  /// transport drops (see `SocketOptions::disconnect_out`).
  discard_on_disconnect: AtomicBool,
  /// Hard detachment: whatever is still queued must not be delivered.
  hard_closed: AtomicBool,
}

impl PipeShared {
  fn mark_hard_closed(&self) {
    self.hard_closed.store(true, Ordering::Release);
  }

  fn is_hard_closed(&self) -> bool {
    self.hard_closed.load(Ordering::Acquire)
  }
}

/// Creates a new pipe pair.
///
/// `hwm` bounds the number of frames in flight (published plus buffered);
/// `None` means unlimited. The limit is only checked at message boundaries.
pub fn pipe(id: usize, hwm: Option<usize>) -> (PipeWriter, PipeReader) {
  let (tx, rx) = async_channel::unbounded();
  let shared = Arc::new(PipeShared {
    id,
    hwm: hwm.map(|h| h.max(1)),
    discard_on_disconnect: AtomicBool::new(false),
    hard_closed: AtomicBool::new(false),
  });
  tracing::trace!(pipe_id = id, ?hwm, "Pipe created");
  (
    PipeWriter {
      shared: shared.clone(),
      tx,
      pending: Vec::new(),
      in_message: false,
    },
    PipeReader {
      shared,
      rx,
      lookahead: None,
    },
  )
}

/// Writing end of a pipe.
#[derive(Debug)]
pub struct PipeWriter {
  shared: Arc<PipeShared>,
  tx: Sender<Msg>,
  /// Written but not yet flushed.
  pending: Vec<Msg>,
  /// True while the last written frame had `MORE` set.
  in_message: bool,
}

impl PipeWriter {
  pub fn id(&self) -> usize {
    self.shared.id
  }

  /// True if the reading side is gone or the pipe was hard-closed.
  pub fn is_closed(&self) -> bool {
    self.tx.is_closed() || self.shared.is_hard_closed()
  }

  fn has_capacity(&self) -> bool {
    match self.shared.hwm {
      None => true,
      Some(hwm) => self.tx.len() + self.pending.len() < hwm,
    }
  }

  /// Buffers a frame. Nothing is visible to the reader until [`flush`](Self::flush).
  ///
  /// Frames continuing a message already started are never refused for
  /// capacity, so an accepted first frame guarantees the whole message fits.
  pub fn write(&mut self, msg: Msg) -> Result<(), PushError<Msg>> {
    if self.is_closed() {
      return Err(PushError::Closed(msg));
    }
    if !self.in_message && !self.has_capacity() {
      return Err(PushError::Full(msg));
    }
    self.in_message = msg.is_more();
    self.pending.push(msg);
    Ok(())
  }

  /// Publishes every complete buffered message to the reader.
  /// An unfinished trailing message stays buffered.
  pub fn flush(&mut self) {
    let complete = self.complete_prefix_len();
    if complete == 0 {
      return;
    }
    if self.is_closed() {
      self.pending.clear();
      self.in_message = false;
      return;
    }
    for msg in self.pending.drain(..complete) {
      // Unbounded channel: the only possible failure is a closed reader.
      if self.tx.try_send(msg).is_err() {
        tracing::trace!(pipe_id = self.shared.id, "Pipe flush hit closed reader");
        break;
      }
    }
  }

  fn complete_prefix_len(&self) -> usize {
    self
      .pending
      .iter()
      .rposition(|m| !m.is_more())
      .map_or(0, |idx| idx + 1)
  }

  /// Marks this pipe so that a transport failure on the reading side discards
  /// its queue instead of keeping it for a later reconnect.
  pub fn set_discard_on_disconnect(&self, discard: bool) {
    self
      .shared
      .discard_on_disconnect
      .store(discard, Ordering::Release);
  }

  /// Tears the writing side down.
  ///
  /// With a zero linger the pipe is hard-closed: buffered and already
  /// published frames are discarded and the reader observes closure at once.
  /// Otherwise complete buffered messages are published first and the reader
  /// drains them before observing closure; an unfinished message is dropped.
  pub fn terminate(mut self, linger: Option<Duration>) {
    let hard = matches!(linger, Some(d) if d.is_zero());
    if hard {
      tracing::trace!(pipe_id = self.shared.id, "Pipe writer terminated (hard)");
      self.pending.clear();
      self.shared.mark_hard_closed();
      self.tx.close();
    } else {
      tracing::trace!(pipe_id = self.shared.id, ?linger, "Pipe writer terminated (lingering)");
      self.flush();
      self.tx.close();
    }
  }
}

/// Reading end of a pipe.
#[derive(Debug)]
pub struct PipeReader {
  shared: Arc<PipeShared>,
  rx: Receiver<Msg>,
  /// Frame pulled off the channel by `readable` but not yet read.
  lookahead: Option<Msg>,
}

impl PipeReader {
  pub fn id(&self) -> usize {
    self.shared.id
  }

  /// Reads the next frame.
  ///
  /// `Ok(None)` means nothing is available right now. `Err(ConnectionClosed)`
  /// means the writer is gone and everything it published has been read, or
  /// the pipe was hard-closed.
  pub fn read(&mut self) -> Result<Option<Msg>, ZmqError> {
    if self.shared.is_hard_closed() {
      self.lookahead = None;
      return Err(ZmqError::ConnectionClosed);
    }
    if let Some(msg) = self.lookahead.take() {
      return Ok(Some(msg));
    }
    match self.rx.try_recv() {
      Ok(msg) => Ok(Some(msg)),
      Err(TryRecvError::Empty) => Ok(None),
      Err(TryRecvError::Closed) => Err(ZmqError::ConnectionClosed),
    }
  }

  /// Waits until a frame is available or the pipe is closed.
  ///
  /// Cancel-safe: dropping the future loses no frames.
  pub async fn readable(&mut self) -> Result<(), ZmqError> {
    if self.shared.is_hard_closed() {
      return Err(ZmqError::ConnectionClosed);
    }
    if self.lookahead.is_some() {
      return Ok(());
    }
    match self.rx.recv().await {
      Ok(msg) => {
        self.lookahead = Some(msg);
        Ok(())
      }
      Err(_) => Err(ZmqError::ConnectionClosed),
    }
  }

  /// Reports a transport failure on the consuming side.
  ///
  /// A pipe flagged with `set_discard_on_disconnect` is torn down: its queue is
  /// dropped and the writer observes closure. An unflagged pipe keeps its
  /// queue for whoever reads it next. Returns true if the pipe was torn down.
  pub fn disconnect(&mut self) -> bool {
    if !self.shared.discard_on_disconnect.load(Ordering::Acquire) {
      tracing::trace!(pipe_id = self.shared.id, "Pipe disconnect: keeping queued frames");
      return false;
    }
    tracing::debug!(pipe_id = self.shared.id, "Pipe disconnect: discarding queued frames");
    self.lookahead = None;
    self.shared.mark_hard_closed();
    self.rx.close();
    while self.rx.try_recv().is_ok() {}
    true
  }

  /// Closes the reading side; the writer observes closure on its next write.
  pub fn terminate(self) {
    tracing::trace!(pipe_id = self.shared.id, "Pipe reader terminated");
    self.rx.close();
  }
}
