use bytes::Bytes;
use md5::{Digest, Md5};
use uuid::Uuid;

use super::format::*;

/// One populated cluster slot, pending inclusion in the current extent.
struct Cluster {
    stream_id: u8,
    cluster_index: u64,
    data: Bytes,
}

/// Accumulates up to [`BLOCKS_PER_EXTENT`] clusters and packs them into an
/// extent buffer (header + blockinfo + payloads) on demand.
#[derive(Default)]
pub struct ExtentBuilder {
    clusters: Vec<Cluster>,
}

impl ExtentBuilder {
    pub fn new() -> Self {
        Self { clusters: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.clusters.len() >= BLOCKS_PER_EXTENT
    }

    /// Appends one cluster-aligned payload (must be exactly [`CLUSTER_SIZE`]
    /// bytes). Returns `true` if the extent is now full and should be
    /// flushed.
    pub fn push(&mut self, stream_id: u8, offset: u64, data: Bytes) -> bool {
        debug_assert_eq!(data.len(), CLUSTER_SIZE);
        self.clusters.push(Cluster {
            stream_id,
            cluster_index: offset / CLUSTER_SIZE as u64,
            data,
        });
        self.is_full()
    }

    /// Builds the finished extent buffer (header + blockinfo + clusters) and
    /// clears accumulated state.
    pub fn flush(&mut self, uuid: Uuid) -> Vec<u8> {
        let block_count = (self.clusters.len() as u64) * BLOCKS_PER_CLUSTER;

        let mut blockinfo = Vec::with_capacity(BLOCKS_PER_EXTENT * BLOCKINFO_SIZE);
        for c in &self.clusters {
            let word = BLOCKINFO_TAG | ((c.stream_id as u64) << 32) | c.cluster_index;
            blockinfo.extend_from_slice(&word.to_be_bytes());
        }
        blockinfo.resize(BLOCKS_PER_EXTENT * BLOCKINFO_SIZE, 0);

        let mut buf = Vec::with_capacity(
            EXTENT_HEADER_SIZE + blockinfo.len() + self.clusters.len() * CLUSTER_SIZE,
        );
        buf.extend_from_slice(&VMA_EXTENT_MAGIC.to_be_bytes());
        buf.extend_from_slice(&[0u8; 2]); // reserved
        buf.extend_from_slice(&(block_count as u16).to_be_bytes());
        buf.extend_from_slice(uuid.as_bytes());
        buf.extend_from_slice(&[0u8; 16]); // digest slot, zeroed for hashing
        debug_assert_eq!(buf.len(), EXTENT_HEADER_SIZE);

        buf.extend_from_slice(&blockinfo);

        let digest = Md5::digest(&buf);
        buf[EXTENT_DIGEST_OFFSET..EXTENT_DIGEST_OFFSET + 16].copy_from_slice(&digest);

        for c in &self.clusters {
            buf.extend_from_slice(&c.data);
        }

        self.clusters.clear();
        buf
    }
}
