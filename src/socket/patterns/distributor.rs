// src/socket/patterns/distributor.rs

use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::{PipeWriter, PushError};

use std::time::Duration;

/// Broadcasts frames to every attached output pipe.
#[derive(Debug, Default)]
pub(crate) struct Distributor {
  writers: Vec<PipeWriter>,
  terminated: bool,
}

impl Distributor {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds an output pipe. Rejected once the distributor is terminated.
  pub fn attach(&mut self, writer: PipeWriter) -> Result<(), ZmqError> {
    if self.terminated {
      writer.terminate(Some(Duration::ZERO));
      return Err(ZmqError::Terminated);
    }
    tracing::trace!(pipe_id = writer.id(), active = self.writers.len() + 1, "Distributor added pipe");
    self.writers.push(writer);
    Ok(())
  }

  /// Removes an output pipe and hands it back to the caller.
  pub fn detach(&mut self, pipe_id: usize) -> Option<PipeWriter> {
    let index = self.writers.iter().position(|w| w.id() == pipe_id)?;
    tracing::trace!(pipe_id, "Distributor removed pipe");
    Some(self.writers.swap_remove(index))
  }

  pub fn len(&self) -> usize {
    self.writers.len()
  }

  /// Sends one frame to every attached pipe. The final frame of a message
  /// flushes each pipe.
  ///
  /// Pipes whose reader is gone are dropped from the set.
  ///
  /// # Panics
  /// If a pipe refuses the frame because its high-water mark is reached.
  /// Control traffic must always be accepted.
  pub fn send(&mut self, msg: &Msg) -> Result<(), ZmqError> {
    if self.terminated {
      return Err(ZmqError::Terminated);
    }
    let mut index = 0;
    while index < self.writers.len() {
      let writer = &mut self.writers[index];
      match writer.write(msg.clone()) {
        Ok(()) => index += 1,
        Err(PushError::Closed(_)) => {
          let writer = self.writers.swap_remove(index);
          tracing::debug!(pipe_id = writer.id(), "Distributor dropping closed pipe");
          writer.terminate(Some(Duration::ZERO));
        }
        Err(PushError::Full(_)) => {
          tracing::error!(pipe_id = writer.id(), size = msg.size(), "Distributor: pipe refused frame at high-water mark");
          panic!("distributor pipe {} refused a frame", writer.id());
        }
      }
    }
    if !msg.is_more() {
      self.flush();
    }
    Ok(())
  }

  /// Publishes every complete message buffered on every pipe. A trailing
  /// incomplete message stays buffered.
  pub fn flush(&mut self) {
    for writer in &mut self.writers {
      writer.flush();
    }
  }

  /// Releases every pipe, lingering for `linger` (zero = hard close).
  pub fn terminate(&mut self, linger: Option<Duration>) {
    if self.terminated {
      return;
    }
    self.terminated = true;
    tracing::debug!(pipes = self.writers.len(), ?linger, "Distributor terminated");
    for writer in self.writers.drain(..) {
      writer.terminate(linger);
    }
  }
}
