use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::PipeReader;

use tokio_util::sync::CancellationToken;

/// Round-robin multiplexer over inbound pipes.
///
/// Logical messages are never interleaved: once a frame with `MORE` has been
/// handed out, every following receive draws from the same pipe until the
/// final frame. Only then does the rotation move on.
#[derive(Debug)]
pub(crate) struct FairQueue {
  readers: Vec<PipeReader>,
  /// Index of the pipe the next receive starts from.
  current: usize,
  /// True while `readers[current]` is in the middle of a message.
  more: bool,
  terminated: bool,
  term_token: CancellationToken,
}

impl FairQueue {
  pub fn new() -> Self {
    Self {
      readers: Vec::new(),
      current: 0,
      more: false,
      terminated: false,
      term_token: CancellationToken::new(),
    }
  }

  /// Token that terminates this queue when cancelled, from any context.
  pub fn termination_token(&self) -> CancellationToken {
    self.term_token.clone()
  }

  fn check_terminated(&mut self) -> Result<(), ZmqError> {
    if !self.terminated && self.term_token.is_cancelled() {
      self.shutdown_readers();
    }
    if self.terminated {
      return Err(ZmqError::Terminated);
    }
    Ok(())
  }

  /// Adds a pipe to the rotation. Rejected once the queue is terminated.
  pub fn attach(&mut self, reader: PipeReader) -> Result<(), ZmqError> {
    if let Err(e) = self.check_terminated() {
      reader.terminate();
      return Err(e);
    }
    tracing::trace!(pipe_id = reader.id(), active = self.readers.len() + 1, "FairQueue pipe attached");
    self.readers.push(reader);
    Ok(())
  }

  /// Removes a pipe from the rotation and hands it back.
  /// A message being read from that pipe is abandoned.
  pub fn detach(&mut self, pipe_id: usize) -> Option<PipeReader> {
    let index = self.readers.iter().position(|r| r.id() == pipe_id)?;
    if index == self.current && self.more {
      tracing::debug!(pipe_id, "FairQueue detached pipe in the middle of a message");
    }
    let reader = self.remove_at(index);
    tracing::trace!(pipe_id, active = self.readers.len(), "FairQueue pipe detached");
    Some(reader)
  }

  fn remove_at(&mut self, index: usize) -> PipeReader {
    if index == self.current {
      self.more = false;
    }
    let reader = self.readers.remove(index);
    if index < self.current {
      self.current -= 1;
    }
    if self.current >= self.readers.len() {
      self.current = 0;
    }
    reader
  }

  fn advance(&mut self) {
    if !self.readers.is_empty() {
      self.current = (self.current + 1) % self.readers.len();
    }
  }

  /// Stops the queue: every pipe is released, later attaches are rejected and
  /// receives return `Terminated`.
  pub fn terminate(&mut self) {
    if self.terminated {
      return;
    }
    self.term_token.cancel();
    self.shutdown_readers();
  }

  fn shutdown_readers(&mut self) {
    self.terminated = true;
    self.more = false;
    self.current = 0;
    tracing::debug!(pipes = self.readers.len(), "FairQueue terminated");
    for reader in self.readers.drain(..) {
      reader.terminate();
    }
  }

  pub fn len(&self) -> usize {
    self.readers.len()
  }

  /// Pipe whose message is partially delivered, if any.
  pub fn mid_message_pipe(&self) -> Option<usize> {
    if self.more {
      self.readers.get(self.current).map(|r| r.id())
    } else {
      None
    }
  }

  /// Receives the next frame without waiting.
  ///
  /// Returns `NoDataAvailable` when no pipe has a frame ready and
  /// `IncompleteMessage` when the pipe being read closed before the final
  /// frame of the current message.
  pub fn try_recv(&mut self) -> Result<Msg, ZmqError> {
    self.check_terminated()?;

    let mut probed = 0;
    while probed < self.readers.len() {
      let index = self.current;
      match self.readers[index].read() {
        Ok(Some(msg)) => {
          self.more = msg.is_more();
          if !self.more {
            self.advance();
          }
          return Ok(msg);
        }
        Ok(None) => {
          if self.more {
            // Published messages are always complete, so the rest of this
            // message should already be here.
            tracing::error!(
              pipe_id = self.readers[index].id(),
              "FairQueue: pipe ran dry in the middle of a message"
            );
            return Err(ZmqError::NoDataAvailable);
          }
          self.advance();
          probed += 1;
        }
        Err(_closed) => {
          let was_more = self.more;
          let reader = self.remove_at(index);
          tracing::debug!(pipe_id = reader.id(), mid_message = was_more, "FairQueue dropping closed pipe");
          reader.terminate();
          if was_more {
            return Err(ZmqError::IncompleteMessage);
          }
          // `current` now points at the pipe after the removed one.
        }
      }
    }
    Err(ZmqError::NoDataAvailable)
  }

  /// Receives the next frame, waiting until one arrives or the queue is
  /// terminated.
  ///
  /// With no pipes attached this waits for termination, since pipes cannot be
  /// attached while the owner is blocked here.
  pub async fn recv(&mut self) -> Result<Msg, ZmqError> {
    loop {
      match self.try_recv() {
        Err(ZmqError::NoDataAvailable) => {}
        other => return other,
      }
      self.wait_readable().await?;
    }
  }

  async fn wait_readable(&mut self) -> Result<(), ZmqError> {
    let token = self.term_token.clone();
    let cancelled = if self.readers.is_empty() {
      token.cancelled().await;
      true
    } else if self.more {
      // Mid-message we may only wait on the pipe being read.
      let reader = &mut self.readers[self.current];
      tokio::select! {
        _ = token.cancelled() => true,
        _ = reader.readable() => false,
      }
    } else {
      let waits = self
        .readers
        .iter_mut()
        .map(|reader| Box::pin(reader.readable()));
      tokio::select! {
        _ = token.cancelled() => true,
        _ = futures::future::select_all(waits) => false,
      }
    };
    if cancelled {
      self.check_terminated()?;
    }
    Ok(())
  }
}

impl Default for FairQueue {
  fn default() -> Self {
    Self::new()
  }
}
