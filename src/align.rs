//! Per-stream cluster alignment buffer.
//!
//! Turns arbitrarily-chunked sequential writes into whole-cluster
//! ([`crate::vma::format::CLUSTER_SIZE`]-byte) emissions, preserving byte
//! order and contiguity.

use std::collections::HashMap;

use bytes::Bytes;
use snafu::Snafu;

use crate::vma::format::CLUSTER_SIZE;

#[derive(Debug, Snafu)]
pub enum AlignError {
    /// A write arrived out of order for its stream: `expected` was the next
    /// contiguous offset, but `got` was supplied instead.
    #[snafu(display(
        "non-sequential write on stream {stream_id}: expected offset {expected}, got {got}"
    ))]
    NonSequentialWrite {
        stream_id: u8,
        expected: u64,
        got: u64,
    },
}

/// Result of [`AlignmentBuffer::accept`].
pub enum Emission {
    /// Nothing to emit yet; bytes were absorbed into per-stream state.
    Buffered,
    /// A cluster-aligned run ready to hand to the extent packer.
    Ready { start_offset: u64, bytes: Bytes },
}

#[derive(Default)]
struct PendingStream {
    bufs: std::collections::VecDeque<Bytes>,
    start: u64,
    total: usize,
}

/// Per-stream byte accumulator. One instance is shared by every stream in an
/// archive; state is only allocated for streams that actually need buffering.
#[derive(Default)]
pub struct AlignmentBuffer {
    pending: HashMap<u8, PendingStream>,
}

impl AlignmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `bytes` arriving at `offset` for `stream_id`.
    ///
    /// Fast path: if this stream has no pending state and `bytes.len()` is
    /// already a multiple of the cluster size, the bytes are handed back
    /// untouched with no allocation — this is the common case for
    /// block-backup writes, which already arrive cluster-aligned.
    pub fn accept(
        &mut self,
        stream_id: u8,
        offset: u64,
        bytes: Bytes,
    ) -> Result<Emission, AlignError> {
        if !self.pending.contains_key(&stream_id) && bytes.len() % CLUSTER_SIZE == 0 {
            if bytes.is_empty() {
                return Ok(Emission::Buffered);
            }
            return Ok(Emission::Ready {
                start_offset: offset,
                bytes,
            });
        }

        let entry = self.pending.entry(stream_id).or_insert_with(|| PendingStream {
            bufs: std::collections::VecDeque::new(),
            start: offset,
            total: 0,
        });

        let expected = entry.start + entry.total as u64;
        if expected != offset {
            return Err(AlignError::NonSequentialWrite {
                stream_id,
                expected,
                got: offset,
            });
        }

        let len = bytes.len();
        entry.bufs.push_back(bytes);
        entry.total += len;

        if entry.total < CLUSTER_SIZE {
            return Ok(Emission::Buffered);
        }

        let emit_len = (entry.total / CLUSTER_SIZE) * CLUSTER_SIZE;
        let start_offset = entry.start;
        let emitted = drain_whole_clusters(entry, emit_len);

        entry.start += emit_len as u64;
        entry.total -= emit_len;

        Ok(Emission::Ready {
            start_offset,
            bytes: emitted,
        })
    }

    /// Flushes residue for every stream with pending (sub-cluster) bytes,
    /// padding each to exactly one final cluster. Call once at close time.
    pub fn flush(&mut self) -> Vec<(u8, u64, Bytes)> {
        let mut out = Vec::new();
        for (stream_id, entry) in self.pending.drain() {
            if entry.total == 0 {
                continue;
            }
            debug_assert!(entry.total < CLUSTER_SIZE);
            let mut buf = Vec::with_capacity(CLUSTER_SIZE);
            for chunk in entry.bufs {
                buf.extend_from_slice(&chunk);
            }
            buf.resize(CLUSTER_SIZE, 0);
            out.push((stream_id, entry.start, Bytes::from(buf)));
        }
        out
    }
}

/// Pops whole buffers off the front of `entry.bufs` until `emit_len` bytes
/// have been collected, splitting the final buffer if it overshoots.
fn drain_whole_clusters(entry: &mut PendingStream, emit_len: usize) -> Bytes {
    let mut collected = 0usize;
    let mut pieces = Vec::new();

    while collected < emit_len {
        let buf = entry.bufs.pop_front().expect("pending total accounted for all queued bytes");
        collected += buf.len();
        pieces.push(buf);
    }

    if collected > emit_len {
        let overshoot = collected - emit_len;
        let last = pieces.pop().expect("at least one piece was collected");
        let keep = last.len() - overshoot;
        let (left, right) = last.split_at(keep);
        pieces.push(Bytes::copy_from_slice(left));
        entry.bufs.push_front(Bytes::copy_from_slice(right));
    }

    if pieces.len() == 1 {
        return pieces.into_iter().next().unwrap();
    }

    let mut out = Vec::with_capacity(emit_len);
    for p in pieces {
        out.extend_from_slice(&p);
    }
    Bytes::from(out)
}
