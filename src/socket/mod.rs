// src/socket/mod.rs

pub mod options;
pub(crate) mod patterns;
pub mod types;
pub mod xsub_socket;

pub use options::SocketOptions;
pub use types::SocketType;
pub use xsub_socket::XSubSocket;
