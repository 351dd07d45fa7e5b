use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use snafu::ensure;
use uuid::Uuid;

use crate::align::{AlignmentBuffer, Emission};

use super::error::{EncoderError, InvalidStateSnafu, UnknownStreamSnafu};
use super::extent::ExtentBuilder;
use super::format::CLUSTER_SIZE;
use super::header::HeaderBuilder;

/// Single-owner, stateful VMA archive encoder.
///
/// Bound to an output sink at construction. Streams and config entries must
/// be declared before the first [`Encoder::write`]; the header is then
/// materialized lazily on that first write, after which the encoder accepts
/// only cluster data for declared streams.
pub struct Encoder<W: Write> {
    sink: W,
    header: HeaderBuilder,
    align: AlignmentBuffer,
    extent: ExtentBuilder,
    header_written: bool,
    declared_sizes: Vec<u64>,
}

impl<W: Write> Encoder<W> {
    pub fn new(sink: W) -> Self {
        let creation_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            sink,
            header: HeaderBuilder::new(Uuid::new_v4(), creation_time),
            align: AlignmentBuffer::new(),
            extent: ExtentBuilder::new(),
            header_written: false,
            declared_sizes: Vec::new(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.header.uuid()
    }

    /// Declares a stream, returning its dense 1-based id. Valid only before
    /// the first [`Encoder::write`].
    pub fn declare_stream(&mut self, name: &[u8], size: u64) -> Result<u8, EncoderError> {
        ensure!(!self.header_written, InvalidStateSnafu);
        let id = self.header.declare_stream(name, size)?;
        self.declared_sizes.push(size);
        Ok(id)
    }

    /// Adds a named config payload. Valid only before the first
    /// [`Encoder::write`].
    pub fn add_config(&mut self, name: &[u8], data: &[u8]) -> Result<(), EncoderError> {
        ensure!(!self.header_written, InvalidStateSnafu);
        self.header.add_config(name, data)
    }

    /// Accepts bytes for `stream_id` at `offset`. Must be called in
    /// per-stream offset order (caller obligation).
    pub fn write(&mut self, stream_id: u8, offset: u64, bytes: Bytes) -> Result<(), EncoderError> {
        ensure!(
            stream_id >= 1 && (stream_id as usize) <= self.header.stream_count(),
            UnknownStreamSnafu { stream_id }
        );

        if !self.header_written {
            self.flush_header()?;
        }

        match self.align.accept(stream_id, offset, bytes)? {
            Emission::Buffered => Ok(()),
            Emission::Ready { start_offset, bytes } => {
                self.emit_clusters(stream_id, start_offset, bytes)
            }
        }
    }

    /// Flushes any per-stream residue (zero-padded to a cluster) and the
    /// final partial extent, if any. Idempotent.
    pub fn close(&mut self) -> Result<(), EncoderError> {
        if !self.header_written {
            self.flush_header()?;
        }

        for (stream_id, start, bytes) in self.align.flush() {
            self.append_cluster(stream_id, start, bytes)?;
        }

        if !self.extent.is_empty() {
            self.flush_extent()?;
        }

        self.sink.flush()?;
        Ok(())
    }

    fn flush_header(&mut self) -> Result<(), EncoderError> {
        let bytes = self.header.build();
        self.sink.write_all(&bytes)?;
        self.header_written = true;
        Ok(())
    }

    fn emit_clusters(&mut self, stream_id: u8, mut offset: u64, mut bytes: Bytes) -> Result<(), EncoderError> {
        while bytes.len() >= CLUSTER_SIZE {
            let cluster = bytes.split_to(CLUSTER_SIZE);
            self.append_cluster(stream_id, offset, cluster)?;
            offset += CLUSTER_SIZE as u64;
        }
        debug_assert!(bytes.is_empty(), "aligned emissions are whole-cluster multiples");
        Ok(())
    }

    fn append_cluster(&mut self, stream_id: u8, offset: u64, data: Bytes) -> Result<(), EncoderError> {
        let full = self.extent.push(stream_id, offset, data);
        if full {
            self.flush_extent()?;
        }
        Ok(())
    }

    fn flush_extent(&mut self) -> Result<(), EncoderError> {
        let buf = self.extent.flush(self.header.uuid());
        self.sink.write_all(&buf)?;
        Ok(())
    }
}
