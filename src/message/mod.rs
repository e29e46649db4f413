//! Frame types (`Msg`, `MsgFlags`) and identity bytes (`Blob`).

mod blob;
mod flags;
mod msg;

pub use blob::Blob;
pub use flags::MsgFlags;
pub use msg::Msg;
