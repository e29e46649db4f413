// src/socket/types.rs

use crate::error::ZmqError;
use std::fmt;

/// Messaging pattern of a socket, as advertised in the connection handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
  Pair,
  /// Publish messages to subscribers.
  Pub,
  /// Subscribe to messages from publishers.
  Sub,
  Req,
  Rep,
  Dealer,
  Router,
  Pull,
  Push,
  /// Raw publisher, sees subscription traffic.
  XPub,
  /// Raw subscriber, sends subscription traffic as ordinary frames.
  XSub,
}

impl SocketType {
  /// Wire code of the type, in libzmq numbering.
  pub fn as_byte(self) -> u8 {
    match self {
      SocketType::Pair => 0,
      SocketType::Pub => 1,
      SocketType::Sub => 2,
      SocketType::Req => 3,
      SocketType::Rep => 4,
      SocketType::Dealer => 5,
      SocketType::Router => 6,
      SocketType::Pull => 7,
      SocketType::Push => 8,
      SocketType::XPub => 9,
      SocketType::XSub => 10,
    }
  }

  pub fn from_byte(code: u8) -> Result<Self, ZmqError> {
    Ok(match code {
      0 => SocketType::Pair,
      1 => SocketType::Pub,
      2 => SocketType::Sub,
      3 => SocketType::Req,
      4 => SocketType::Rep,
      5 => SocketType::Dealer,
      6 => SocketType::Router,
      7 => SocketType::Pull,
      8 => SocketType::Push,
      9 => SocketType::XPub,
      10 => SocketType::XSub,
      other => {
        return Err(ZmqError::ProtocolViolation(format!(
          "unknown peer socket type {}",
          other
        )))
      }
    })
  }

  /// Whether a socket of this type may talk to a peer of type `peer`.
  pub fn is_compatible(self, peer: SocketType) -> bool {
    use SocketType::*;
    match self {
      Pair => peer == Pair,
      Pub | XPub => matches!(peer, Sub | XSub),
      Sub | XSub => matches!(peer, Pub | XPub),
      Req => matches!(peer, Rep | Router),
      Rep => matches!(peer, Req | Dealer),
      Dealer => matches!(peer, Rep | Dealer | Router),
      Router => matches!(peer, Req | Dealer | Router),
      Pull => peer == Push,
      Push => peer == Pull,
    }
  }
}

impl fmt::Display for SocketType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      SocketType::Pair => "PAIR",
      SocketType::Pub => "PUB",
      SocketType::Sub => "SUB",
      SocketType::Req => "REQ",
      SocketType::Rep => "REP",
      SocketType::Dealer => "DEALER",
      SocketType::Router => "ROUTER",
      SocketType::Pull => "PULL",
      SocketType::Push => "PUSH",
      SocketType::XPub => "XPUB",
      SocketType::XSub => "XSUB",
    };
    f.write_str(name)
  }
}
