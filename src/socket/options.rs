// src/socket/options.rs

use std::time::Duration;

use crate::socket::SocketType;
use crate::{Blob, ZmqError};

// Option ids, numbered as in libzmq.
pub const ROUTING_ID: i32 = 5; // ZMQ_IDENTITY
pub const SUBSCRIBE: i32 = 6;
pub const UNSUBSCRIBE: i32 = 7;
pub const LINGER: i32 = 17;

/// Identities longer than this are rejected.
pub const MAX_ROUTING_ID_LEN: usize = 255;

/// Holds parsed and validated socket options.
#[derive(Debug, Clone)]
pub struct SocketOptions {
  pub socket_type: SocketType,
  /// Identity advertised to peers. `None` means anonymous.
  pub routing_id: Option<Blob>,
  /// `None` lingers forever, `Some(0)` drops pending traffic at once.
  pub linger: Option<Duration>,
  /// Output pipes discard queued traffic when their transport drops.
  pub disconnect_out: bool,
}

impl Default for SocketOptions {
  fn default() -> Self {
    Self {
      socket_type: SocketType::Pair,
      routing_id: None,
      linger: None, // -1 in ZMQ
      disconnect_out: false,
    }
  }
}

impl SocketOptions {
  /// Options with the defaults a socket of `socket_type` enforces.
  pub fn for_socket_type(socket_type: SocketType) -> Self {
    let mut options = Self {
      socket_type,
      ..Self::default()
    };
    if matches!(socket_type, SocketType::Sub | SocketType::XSub) {
      // Subscription state is replayed on reconnect, so queued
      // subscription traffic is worthless once a connection drops.
      options.linger = Some(Duration::ZERO);
      options.disconnect_out = true;
    }
    options
  }

  /// Applies one of the generic options. Pattern options such as
  /// `SUBSCRIBE` are handled by the socket and rejected here.
  pub fn set_option(&mut self, option: i32, value: &[u8]) -> Result<(), ZmqError> {
    match option {
      ROUTING_ID => {
        let id = parse_blob_option(value)?;
        self.routing_id = if id.is_empty() { None } else { Some(id) };
      }
      LINGER => self.linger = parse_linger_option(value)?,
      _ => return Err(ZmqError::UnsupportedOption(option)),
    }
    tracing::debug!(option, socket_type = %self.socket_type, "Socket option applied");
    Ok(())
  }
}

// --- Helper functions for parsing option values ---

/// Parses a byte slice representing an integer option (like linger).
/// Native endianness, as the C API passes an `int`.
pub(crate) fn parse_i32_option(option: i32, value: &[u8]) -> Result<i32, ZmqError> {
  let arr: [u8; 4] = value
    .try_into()
    .map_err(|_| ZmqError::InvalidOptionValue(option))?;
  Ok(i32::from_ne_bytes(arr))
}

/// Linger in milliseconds: -1 is infinite, 0 is immediate.
pub(crate) fn parse_linger_option(value: &[u8]) -> Result<Option<Duration>, ZmqError> {
  let val = parse_i32_option(LINGER, value)?;
  match val {
    -1 => Ok(None),
    0.. => Ok(Some(Duration::from_millis(val as u64))),
    _ => Err(ZmqError::InvalidOptionValue(LINGER)),
  }
}

/// Parses a byte slice into a Blob (for ROUTING_ID).
pub(crate) fn parse_blob_option(value: &[u8]) -> Result<Blob, ZmqError> {
  if value.len() > MAX_ROUTING_ID_LEN {
    return Err(ZmqError::InvalidOptionValue(ROUTING_ID));
  }
  // A leading zero byte is reserved for generated identities.
  if value.first() == Some(&0) {
    return Err(ZmqError::InvalidOptionValue(ROUTING_ID));
  }
  Ok(Blob::copy_from_slice(value))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn subscriber_defaults_are_enforced() {
    for socket_type in [SocketType::Sub, SocketType::XSub] {
      let options = SocketOptions::for_socket_type(socket_type);
      assert_eq!(options.linger, Some(Duration::ZERO));
      assert!(options.disconnect_out);
    }
    let options = SocketOptions::for_socket_type(SocketType::Pub);
    assert_eq!(options.linger, None);
    assert!(!options.disconnect_out);
  }

  #[test]
  fn generic_options_parse() {
    let mut options = SocketOptions::for_socket_type(SocketType::XSub);
    options.set_option(LINGER, &250i32.to_ne_bytes()).unwrap();
    assert_eq!(options.linger, Some(Duration::from_millis(250)));
    options.set_option(LINGER, &(-1i32).to_ne_bytes()).unwrap();
    assert_eq!(options.linger, None);
    assert_eq!(
      options.set_option(LINGER, &(-5i32).to_ne_bytes()),
      Err(ZmqError::InvalidOptionValue(LINGER))
    );
    assert_eq!(options.set_option(LINGER, &[1, 2]), Err(ZmqError::InvalidOptionValue(LINGER)));
  }

  #[test]
  fn routing_id_validation() {
    let mut options = SocketOptions::default();
    options.set_option(ROUTING_ID, b"node-1").unwrap();
    assert_eq!(options.routing_id.as_deref(), Some(&b"node-1"[..]));
    assert!(options.set_option(ROUTING_ID, &[0, 1]).is_err());
    assert!(options.set_option(ROUTING_ID, &[b'x'; 256]).is_err());
    options.set_option(ROUTING_ID, b"").unwrap();
    assert!(options.routing_id.is_none());
  }

  #[test]
  fn pattern_options_are_not_generic() {
    let mut options = SocketOptions::default();
    assert_eq!(options.set_option(SUBSCRIBE, b"x"), Err(ZmqError::UnsupportedOption(SUBSCRIBE)));
  }
}
