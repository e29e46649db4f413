// src/protocol/property.rs

//! Property frames exchanged while a connection is being initiated.
//!
//! Each frame is a single message `[id, value..]`. The initiator sends its
//! own socket type first, then its identity, and expects the same from the
//! peer.

use crate::error::ZmqError;
use crate::message::{Blob, Msg};
use crate::socket::SocketType;

pub const PROP_TYPE: u8 = 1;
pub const PROP_IDENTITY: u8 = 2;

/// Known handshake property ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyId {
  SocketType,
  Identity,
}

impl PropertyId {
  pub fn from_byte(id: u8) -> Option<Self> {
    match id {
      PROP_TYPE => Some(PropertyId::SocketType),
      PROP_IDENTITY => Some(PropertyId::Identity),
      _ => None,
    }
  }
}

/// A decoded property frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
  SocketType(SocketType),
  /// May be empty: the peer is anonymous.
  Identity(Blob),
}

impl Property {
  /// Parses one property frame.
  pub fn parse(msg: &Msg) -> Result<Self, ZmqError> {
    if msg.is_more() {
      return Err(ZmqError::ProtocolViolation(
        "multi-frame property".to_string(),
      ));
    }
    let (&id, value) = msg
      .data()
      .split_first()
      .ok_or_else(|| ZmqError::ProtocolViolation("empty property frame".to_string()))?;
    match PropertyId::from_byte(id) {
      Some(PropertyId::SocketType) => match value {
        [code] => Ok(Property::SocketType(SocketType::from_byte(*code)?)),
        _ => Err(ZmqError::ProtocolViolation(format!(
          "socket type property of {} bytes",
          value.len()
        ))),
      },
      Some(PropertyId::Identity) => Ok(Property::Identity(Blob::copy_from_slice(value))),
      None => Err(ZmqError::ProtocolViolation(format!("unknown property id {}", id))),
    }
  }

  /// Encodes the property as a single frame.
  pub fn to_msg(&self) -> Msg {
    let mut body = Vec::new();
    match self {
      Property::SocketType(socket_type) => {
        body.push(PROP_TYPE);
        body.push(socket_type.as_byte());
      }
      Property::Identity(identity) => {
        body.reserve(1 + identity.size());
        body.push(PROP_IDENTITY);
        body.extend_from_slice(identity);
      }
    }
    Msg::from_vec(body)
  }
}
