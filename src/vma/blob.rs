use super::error::{BlobOverflowSnafu, EncoderError};
use snafu::ensure;

/// Append-only, length-prefixed byte pool embedded in the archive header.
///
/// Offset 0 is always the null blob: a single `0x00` byte with no length
/// prefix, so a zero pointer anywhere in the header unambiguously means
/// "absent".
#[derive(Debug, Default)]
pub struct BlobPool {
    buf: Vec<u8>,
}

impl BlobPool {
    pub fn new() -> Self {
        Self { buf: vec![0u8] }
    }

    /// Appends `bytes` to the pool and returns the offset of its length prefix.
    pub fn alloc(&mut self, bytes: &[u8]) -> Result<u16, EncoderError> {
        let offset = self.buf.len();
        ensure!(offset <= u16::MAX as usize, BlobOverflowSnafu { offset });

        let len = bytes.len();
        ensure!(
            len <= u16::MAX as usize,
            BlobOverflowSnafu {
                offset: offset + len
            }
        );

        self.buf.extend_from_slice(&(len as u16).to_le_bytes());
        self.buf.extend_from_slice(bytes);

        let end = self.buf.len();
        ensure!(end <= u16::MAX as usize, BlobOverflowSnafu { offset: end });

        Ok(offset as u16)
    }

    /// Allocates a NUL-terminated string blob, mirroring `alloc_blob_str`.
    pub fn alloc_str(&mut self, s: &[u8]) -> Result<u16, EncoderError> {
        let mut owned = Vec::with_capacity(s.len() + 1);
        owned.extend_from_slice(s);
        owned.push(0);
        self.alloc(&owned)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
