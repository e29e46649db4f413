//! rzmq_xsub - the XSUB subscriber pattern and connection initiation for an
//! asynchronous, pure-Rust ZeroMQ implementation using Tokio.

pub mod engine;
pub mod error;
pub mod init;
pub mod message;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod socket;

// Re-export core types for user convenience
pub use engine::IEngine;
pub use error::ZmqError;
pub use init::{spawn_initiator, HandshakeInitiator, InitState, InitiatorConfig};
pub use message::{Blob, Msg, MsgFlags};
pub use runtime::{Command, InitOutcome, MailboxReceiver, MailboxSender};
pub use session::{ISessionResolver, SessionHandle, SessionRegistry};
pub use socket::options::SocketOptions;
pub use socket::{SocketType, XSubSocket};
