use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum ZmqError {
  // --- Flow Conditions ---
  /// Nothing is ready right now; the caller is expected to retry later.
  #[error("Resource temporarily unavailable: no message ready")]
  NoDataAvailable, // EAGAIN equivalent

  /// The pipe delivering a multi-part message closed before its final frame.
  #[error("Logical message truncated: pipe closed before the final frame")]
  IncompleteMessage,

  // --- Lifecycle ---
  #[error("Object has been terminated")]
  Terminated, // ETERM
  #[error("Connection closed by peer or transport")]
  ConnectionClosed, // EPIPE, ECONNRESET?
  #[error("Operation timed out")]
  Timeout, // EAGAIN with timeout

  // --- Options ---
  #[error("Invalid value provided for option ID {0}")]
  InvalidOptionValue(i32), // EINVAL
  #[error("Socket option not supported: {0}")]
  UnsupportedOption(i32), // ENOTSUP

  // --- Protocol Errors ---
  #[error("Protocol violation: {0}")]
  ProtocolViolation(String), // EPROTO

  // --- Internal Errors ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

impl ZmqError {
  /// True for the "try again later" condition returned by non-blocking calls.
  pub fn is_again(&self) -> bool {
    matches!(self, ZmqError::NoDataAvailable)
  }

  /// True for errors after which the object or connection cannot be used again.
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      ZmqError::Terminated | ZmqError::ProtocolViolation(_) | ZmqError::Internal(_)
    )
  }
}
