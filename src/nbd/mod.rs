//! Server-side network-block-device framing for write-only backup targets.

mod error;
pub mod proto;
mod server;

pub use error::ProtocolError;
pub use server::{ExportHandler, Server};
