use crate::message::flags::MsgFlags;
use bytes::Bytes;
use std::fmt;

/// A single frame of a logical message.
///
/// A logical message is the run of frames up to and including the first
/// frame without [`MsgFlags::MORE`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Msg {
  // Bytes keeps fan-out to several pipes a refcount bump, not a copy.
  data: Bytes,
  flags: MsgFlags,
}

impl Msg {
  /// Creates an empty frame.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a frame from a `Vec<u8>`, taking ownership.
  pub fn from_vec(data: Vec<u8>) -> Self {
    Self {
      data: Bytes::from(data),
      flags: MsgFlags::empty(),
    }
  }

  /// Creates a frame from `bytes::Bytes`.
  pub fn from_bytes(data: Bytes) -> Self {
    Self {
      data,
      flags: MsgFlags::empty(),
    }
  }

  /// Creates a frame from a static byte slice (zero-copy).
  pub fn from_static(data: &'static [u8]) -> Self {
    Self {
      data: Bytes::from_static(data),
      flags: MsgFlags::empty(),
    }
  }

  /// Builder-style helper setting or clearing `MORE`.
  pub fn with_more(mut self, more: bool) -> Self {
    self.set_more(more);
    self
  }

  /// Returns the frame payload.
  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// Returns the size of the payload in bytes.
  pub fn size(&self) -> usize {
    self.data.len()
  }

  /// Returns true if the payload is empty.
  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// Returns the flags associated with the frame.
  pub fn flags(&self) -> MsgFlags {
    self.flags
  }

  /// Sets or clears the `MORE` flag.
  pub fn set_more(&mut self, more: bool) {
    self.flags.set(MsgFlags::MORE, more);
  }

  /// Checks if the `MORE` flag is set.
  pub fn is_more(&self) -> bool {
    self.flags.contains(MsgFlags::MORE)
  }
}

impl From<Vec<u8>> for Msg {
  fn from(data: Vec<u8>) -> Self {
    Msg::from_vec(data)
  }
}

impl From<&'static [u8]> for Msg {
  fn from(data: &'static [u8]) -> Self {
    Msg::from_static(data)
  }
}

impl fmt::Debug for Msg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Msg")
      .field("size", &self.size())
      .field("flags", &self.flags)
      .field("preview", &String::from_utf8_lossy(&self.data[..self.data.len().min(16)]))
      .finish()
  }
}
