// src/socket/xsub_socket.rs

use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::{PipeReader, PipeWriter, PushError};
use crate::socket::options::{SocketOptions, SUBSCRIBE, UNSUBSCRIBE};
use crate::socket::patterns::{Distributor, FairQueue, SubscriptionTrie};
use crate::socket::SocketType;

use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// First byte of a subscribe control frame.
pub const SUBSCRIBE_OPCODE: u8 = 1;
/// First byte of an unsubscribe control frame.
pub const UNSUBSCRIBE_OPCODE: u8 = 0;

/// Implements the XSUB (raw subscriber) socket pattern.
///
/// Subscriptions are sent as ordinary single-frame messages: `[1, topic..]`
/// subscribes, `[0, topic..]` unsubscribes. Each is applied to the local
/// filter and forwarded to every connected publisher. Inbound messages are
/// filtered locally on their first frame, and a new publisher connection is
/// first brought up to date with every subscription currently held.
///
/// The socket is owned by one execution context. Only `recv` suspends.
#[derive(Debug)]
pub struct XSubSocket {
  handle: usize,
  options: SocketOptions,
  subscriptions: SubscriptionTrie,
  fair_queue: FairQueue,
  distributor: Distributor,
  /// Inbound pipe id -> outbound pipe id of the same connection.
  pipe_read_to_write_id: HashMap<usize, usize>,
  /// First frame of a matching message pulled by `has_in`.
  prefetched: Option<Msg>,
  /// True while the caller is in the middle of a delivered message.
  more: bool,
  /// True while dropping the remaining frames of a non-matching message.
  discarding: bool,
  /// The pipe of the message being delivered went away before its end.
  truncated: bool,
  /// True while dropping the remaining frames of a multi-frame send.
  discarding_send: bool,
  terminated: bool,
}

static_assertions::assert_impl_all!(XSubSocket: Send);

impl XSubSocket {
  pub fn new(handle: usize) -> Self {
    Self::with_options(handle, SocketOptions::for_socket_type(SocketType::XSub))
  }

  /// Creates the socket with caller-provided options. The pattern's own
  /// defaults (`socket_type`, zero linger, `disconnect_out`) are enforced.
  pub fn with_options(handle: usize, mut options: SocketOptions) -> Self {
    let defaults = SocketOptions::for_socket_type(SocketType::XSub);
    options.socket_type = defaults.socket_type;
    options.linger = defaults.linger;
    options.disconnect_out = defaults.disconnect_out;
    tracing::debug!(handle, "XSUB socket created");
    Self {
      handle,
      options,
      subscriptions: SubscriptionTrie::new(),
      fair_queue: FairQueue::new(),
      distributor: Distributor::new(),
      pipe_read_to_write_id: HashMap::new(),
      prefetched: None,
      more: false,
      discarding: false,
      truncated: false,
      discarding_send: false,
      terminated: false,
    }
  }

  pub fn handle(&self) -> usize {
    self.handle
  }

  pub fn options(&self) -> &SocketOptions {
    &self.options
  }

  /// Token that terminates the socket's inbound side from any context.
  /// A blocked `recv` returns `Terminated` once it is cancelled.
  pub fn termination_token(&self) -> CancellationToken {
    self.fair_queue.termination_token()
  }

  /// Constructs a subscribe or unsubscribe control frame.
  pub fn subscription_message(is_subscribe: bool, topic: &[u8]) -> Msg {
    let mut body = Vec::with_capacity(1 + topic.len());
    body.push(if is_subscribe {
      SUBSCRIBE_OPCODE
    } else {
      UNSUBSCRIBE_OPCODE
    });
    body.extend_from_slice(topic);
    Msg::from_vec(body)
  }

  /// Connects a new peer: `reader` delivers its messages, `writer` carries
  /// subscription traffic to it.
  ///
  /// Every subscription currently held is written to `writer` and flushed
  /// before the pipes join the rotation.
  pub fn attach_pipe(&mut self, reader: PipeReader, mut writer: PipeWriter) -> Result<(), ZmqError> {
    if self.terminated {
      reader.terminate();
      writer.terminate(self.options.linger);
      return Err(ZmqError::Terminated);
    }
    let read_id = reader.id();
    let write_id = writer.id();
    tracing::debug!(handle = self.handle, pipe_read_id = read_id, pipe_write_id = write_id, "XSUB attaching pipe");

    writer.set_discard_on_disconnect(self.options.disconnect_out);

    let handle = self.handle;
    let mut replayed = 0usize;
    if !self.subscriptions.is_empty() {
      self.subscriptions.apply(|topic| {
        let msg = Self::subscription_message(true, topic);
        match writer.write(msg) {
          Ok(()) => replayed += 1,
          Err(PushError::Closed(_)) => {
            tracing::trace!(handle, pipe_id = write_id, "Replay target closed; skipping");
          }
          Err(PushError::Full(_)) => {
            tracing::error!(handle, pipe_id = write_id, "XSUB: pipe refused subscription replay");
            panic!("pipe {} refused subscription replay", write_id);
          }
        }
      });
    }
    writer.flush();
    if replayed > 0 {
      tracing::debug!(handle, pipe_write_id = write_id, num_topics = replayed, "Sent existing subscriptions to newly attached peer.");
    }

    if let Err(e) = self.fair_queue.attach(reader) {
      // The inbound side was terminated through its token.
      writer.terminate(self.options.linger);
      self.terminate();
      return Err(e);
    }
    self.distributor.attach(writer)?;
    self.pipe_read_to_write_id.insert(read_id, write_id);
    tracing::trace!(handle, inbound = self.fair_queue.len(), outbound = self.distributor.len(), "XSUB pipe attached");
    Ok(())
  }

  /// Removes the connection whose inbound pipe is `pipe_read_id`.
  pub fn pipe_detached(&mut self, pipe_read_id: usize) {
    tracing::debug!(handle = self.handle, pipe_read_id, "XSUB detaching pipe");
    if self.fair_queue.mid_message_pipe() == Some(pipe_read_id) {
      if self.more {
        self.truncated = true;
      } else if self.prefetched.take().is_some() {
        // The caller never saw any of this message.
        tracing::debug!(handle = self.handle, pipe_read_id, "XSUB dropping prefetched head of truncated message");
      }
      self.more = false;
      self.discarding = false;
    }
    if let Some(reader) = self.fair_queue.detach(pipe_read_id) {
      reader.terminate();
    }
    match self.pipe_read_to_write_id.remove(&pipe_read_id) {
      Some(write_id) => {
        if let Some(writer) = self.distributor.detach(write_id) {
          writer.terminate(self.options.linger);
        }
      }
      None => {
        tracing::warn!(handle = self.handle, pipe_read_id, "XSUB detach for unknown pipe");
      }
    }
  }

  /// Handles one outbound frame. Only control frames have an effect; any
  /// other frame is dropped and the call still succeeds.
  pub fn send(&mut self, msg: Msg) -> Result<(), ZmqError> {
    if self.terminated {
      return Err(ZmqError::Terminated);
    }
    if self.discarding_send {
      self.discarding_send = msg.is_more();
      return Ok(());
    }
    if msg.is_more() {
      tracing::warn!(handle = self.handle, "XSUB dropping multi-frame subscription message");
      self.discarding_send = true;
      return Ok(());
    }
    match msg.data().split_first() {
      Some((&SUBSCRIBE_OPCODE, topic)) => {
        tracing::debug!(handle = self.handle, topic = ?String::from_utf8_lossy(topic), "Subscribing to topic");
        self.subscriptions.subscribe(topic);
        self.distributor.send(&msg)
      }
      Some((&UNSUBSCRIBE_OPCODE, topic)) => {
        tracing::debug!(handle = self.handle, topic = ?String::from_utf8_lossy(topic), "Unsubscribing from topic");
        self.subscriptions.unsubscribe(topic);
        self.distributor.send(&msg)
      }
      _ => {
        tracing::warn!(handle = self.handle, size = msg.size(), "XSUB dropping malformed subscription message");
        Ok(())
      }
    }
  }

  pub fn subscribe(&mut self, topic: &[u8]) -> Result<(), ZmqError> {
    self.send(Self::subscription_message(true, topic))
  }

  pub fn unsubscribe(&mut self, topic: &[u8]) -> Result<(), ZmqError> {
    self.send(Self::subscription_message(false, topic))
  }

  /// Applies a socket option. `SUBSCRIBE`/`UNSUBSCRIBE` take the topic as
  /// value; the rest go to [`SocketOptions::set_option`].
  pub fn set_option(&mut self, option: i32, value: &[u8]) -> Result<(), ZmqError> {
    match option {
      SUBSCRIBE => self.subscribe(value),
      UNSUBSCRIBE => self.unsubscribe(value),
      _ => self.options.set_option(option, value),
    }
  }

  /// Receives the next frame without waiting.
  ///
  /// Frames of non-matching messages are consumed and dropped. Returns
  /// `NoDataAvailable` when no matching frame is ready.
  pub fn try_recv(&mut self) -> Result<Msg, ZmqError> {
    if let Some(result) = self.take_ready()? {
      return Ok(result);
    }
    loop {
      let pulled = self.fair_queue.try_recv();
      if let Some(result) = self.filter(pulled) {
        return result;
      }
    }
  }

  /// Receives the next frame, waiting for a matching one.
  ///
  /// A steady stream of non-matching traffic keeps this looping without
  /// returning.
  pub async fn recv(&mut self) -> Result<Msg, ZmqError> {
    if let Some(result) = self.take_ready()? {
      return Ok(result);
    }
    loop {
      let pulled = self.fair_queue.recv().await;
      if let Some(result) = self.filter(pulled) {
        return result;
      }
    }
  }

  fn take_ready(&mut self) -> Result<Option<Msg>, ZmqError> {
    if self.terminated {
      return Err(ZmqError::Terminated);
    }
    if self.truncated {
      self.truncated = false;
      return Err(ZmqError::IncompleteMessage);
    }
    match self.prefetched.take() {
      Some(msg) => {
        self.more = msg.is_more();
        Ok(Some(msg))
      }
      None => Ok(None),
    }
  }

  /// Decides what to do with one result from the fair queue. `None` means
  /// the frame was consumed and the caller should pull again.
  fn filter(&mut self, pulled: Result<Msg, ZmqError>) -> Option<Result<Msg, ZmqError>> {
    match pulled {
      Ok(msg) => {
        if self.more {
          self.more = msg.is_more();
          return Some(Ok(msg));
        }
        if self.discarding {
          self.discarding = msg.is_more();
          return None;
        }
        if self.subscriptions.matches(msg.data()) {
          self.more = msg.is_more();
          Some(Ok(msg))
        } else {
          tracing::trace!(handle = self.handle, msg_size = msg.size(), "XSUB dropping unmatched message");
          self.discarding = msg.is_more();
          None
        }
      }
      Err(ZmqError::IncompleteMessage) if self.discarding => {
        self.discarding = false;
        None
      }
      Err(ZmqError::IncompleteMessage) => {
        self.more = false;
        Some(Err(ZmqError::IncompleteMessage))
      }
      Err(ZmqError::Terminated) => {
        self.terminate();
        Some(Err(ZmqError::Terminated))
      }
      Err(e) => Some(Err(e)),
    }
  }

  /// True if a frame can be received without waiting.
  ///
  /// When not in the middle of a message, non-matching messages are drained
  /// and the first matching frame is kept for the next receive.
  pub fn has_in(&mut self) -> bool {
    if self.terminated {
      return false;
    }
    if self.more || self.prefetched.is_some() || self.truncated {
      return true;
    }
    loop {
      match self.fair_queue.try_recv() {
        Ok(msg) => {
          if self.discarding {
            self.discarding = msg.is_more();
          } else if self.subscriptions.matches(msg.data()) {
            self.prefetched = Some(msg);
            return true;
          } else {
            self.discarding = msg.is_more();
          }
        }
        Err(ZmqError::IncompleteMessage) => self.discarding = false,
        Err(ZmqError::Terminated) => {
          self.terminate();
          return false;
        }
        Err(_) => return false,
      }
    }
  }

  /// Subscriptions can be sent at any time.
  pub fn has_out(&self) -> bool {
    true
  }

  /// Whether `msg` matches at least one subscription.
  pub fn matches(&self, msg: &Msg) -> bool {
    self.subscriptions.matches(msg.data())
  }

  /// Distinct topics currently subscribed.
  pub fn topics(&self) -> Vec<Vec<u8>> {
    self.subscriptions.topics()
  }

  pub fn subscription_count(&self) -> usize {
    self.subscriptions.len()
  }

  /// Tears the socket down. Attached pipes are released using the socket's
  /// linger and all subscriptions are dropped.
  pub fn terminate(&mut self) {
    if self.terminated {
      return;
    }
    self.terminated = true;
    tracing::debug!(handle = self.handle, pipes = self.distributor.len(), "XSUB terminating");
    self.fair_queue.terminate();
    self.distributor.terminate(self.options.linger);
    self.pipe_read_to_write_id.clear();
    self.subscriptions.clear();
    self.prefetched = None;
    self.more = false;
    self.discarding = false;
    self.truncated = false;
  }

  pub fn is_terminated(&self) -> bool {
    self.terminated
  }
}
