use snafu::Snafu;

/// Error that occurred during calls to [`super::encoder::Encoder`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EncoderError {
    /// `declare_stream` or `add_config` was called after the first `write`.
    #[snafu(display("declare_stream/add_config called after the header was written"))]
    InvalidState,

    /// More than [`super::format::MAX_STREAMS`] streams were declared.
    #[snafu(display("too many streams: limit is {limit}"))]
    TooManyStreams { limit: usize },

    /// More than [`super::format::MAX_CONFIGS`] config entries were added.
    #[snafu(display("too many config entries: limit is {limit}"))]
    TooManyConfigs { limit: usize },

    /// The blob pool would exceed the 16-bit addressable space.
    #[snafu(display("blob pool overflow: offset {offset} exceeds u16 range"))]
    BlobOverflow { offset: usize },

    /// A write targeted a stream id that was never declared.
    #[snafu(display("unknown stream id {stream_id}"))]
    UnknownStream { stream_id: u8 },

    /// The alignment buffer rejected a non-sequential write.
    #[snafu(display("{source}"))]
    Align { source: crate::align::AlignError },

    /// The sink returned an I/O error.
    #[snafu(display("sink I/O error: {source}"))]
    SinkIo { source: std::io::Error },
}

impl From<crate::align::AlignError> for EncoderError {
    fn from(source: crate::align::AlignError) -> Self {
        EncoderError::Align { source }
    }
}

impl From<std::io::Error> for EncoderError {
    fn from(source: std::io::Error) -> Self {
        EncoderError::SinkIo { source }
    }
}
