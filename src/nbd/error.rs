use snafu::Snafu;

/// Per-connection fatal errors from the framed block protocol.
#[derive(Debug, Snafu)]
pub enum ProtocolError {
    /// The wire carried fewer bytes than the frame requires, or the peer
    /// disconnected mid-frame.
    #[snafu(display("short read: {source}"))]
    ShortRead { source: std::io::Error },

    /// A client sent an options magic that doesn't match [`super::proto::OPTS_MAGIC`].
    #[snafu(display("bad negotiation magic: {magic:#x}"))]
    BadNegotiationMagic { magic: u64 },

    /// A client requested something other than `OPT_EXPORT_NAME`.
    #[snafu(display("unsupported option: {opt}"))]
    UnsupportedOption { opt: u32 },

    /// A client request's magic didn't match [`super::proto::REQUEST_MAGIC`].
    #[snafu(display("bad request magic: {magic:#x}"))]
    BadRequestMagic { magic: u32 },

    /// A client sent a command type this server doesn't recognize.
    #[snafu(display("unrecognized command type {kind:#x}"))]
    UnrecognizedCommand { kind: u32 },
}

impl From<std::io::Error> for ProtocolError {
    fn from(source: std::io::Error) -> Self {
        ProtocolError::ShortRead { source }
    }
}
