use md5::{Digest, Md5};
use uuid::Uuid;

use super::blob::BlobPool;
use super::error::{EncoderError, TooManyConfigsSnafu, TooManyStreamsSnafu};
use super::format::*;
use snafu::ensure;

/// A declared stream (device or vmstate channel).
struct Stream {
    name_ptr: u16,
    size: u64,
}

/// A declared config entry: `(name_ptr, data_ptr)`.
struct ConfigEntry {
    name_ptr: u16,
    data_ptr: u16,
}

/// Builds the archive header: magic, uuid, timestamp, device table, config
/// table and blob pool, plus the MD5 digest over the whole thing.
pub struct HeaderBuilder {
    uuid: Uuid,
    creation_time: u64,
    streams: Vec<Stream>,
    configs: Vec<ConfigEntry>,
    blobs: BlobPool,
}

impl HeaderBuilder {
    pub fn new(uuid: Uuid, creation_time: u64) -> Self {
        Self {
            uuid,
            creation_time,
            streams: Vec::new(),
            configs: Vec::new(),
            blobs: BlobPool::new(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Declares a new stream, returning its dense 1-based id.
    pub fn declare_stream(&mut self, name: &[u8], size: u64) -> Result<u8, EncoderError> {
        ensure!(
            self.streams.len() < MAX_STREAMS,
            TooManyStreamsSnafu { limit: MAX_STREAMS }
        );
        let name_ptr = self.blobs.alloc_str(name)?;
        self.streams.push(Stream { name_ptr, size });
        Ok(self.streams.len() as u8)
    }

    /// Adds a config entry.
    ///
    /// Allocates the data blob but records the *name* pointer in both the
    /// name and data slots of the config table, losing the data pointer.
    /// This is a known pre-existing quirk of the format, preserved here for
    /// wire compatibility with existing readers — see DESIGN.md.
    pub fn add_config(&mut self, name: &[u8], data: &[u8]) -> Result<(), EncoderError> {
        ensure!(
            self.configs.len() < MAX_CONFIGS,
            TooManyConfigsSnafu { limit: MAX_CONFIGS }
        );
        let name_ptr = self.blobs.alloc_str(name)?;
        let _data_ptr = self.blobs.alloc(data)?;
        self.configs.push(ConfigEntry {
            name_ptr,
            data_ptr: name_ptr,
        });
        Ok(())
    }

    fn build_config_table(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CONFIG_TABLE_SIZE);
        for c in &self.configs {
            buf.extend_from_slice(&(c.name_ptr as u32).to_be_bytes());
        }
        buf.resize(MAX_CONFIGS * CONFIG_PTR_SIZE, 0);
        for c in &self.configs {
            buf.extend_from_slice(&(c.data_ptr as u32).to_be_bytes());
        }
        buf.resize(MAX_CONFIGS * CONFIG_PTR_SIZE * 2, 0);
        buf
    }

    fn build_device_table(&self) -> Vec<u8> {
        let mut buf = vec![0u8; DEV_INFO_SIZE]; // entry 0: reserved, all-NUL
        for s in &self.streams {
            buf.extend_from_slice(&(s.name_ptr as u32).to_be_bytes()); // name_ptr
            buf.extend_from_slice(&[0u8; 4]); // reserved
            buf.extend_from_slice(&s.size.to_be_bytes()); // size
            buf.extend_from_slice(&[0u8; 16]); // reserved
        }
        buf.resize(DEV_INFO_SLOTS * DEV_INFO_SIZE, 0);
        buf
    }

    /// Returns the number of streams declared so far.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Builds the complete header buffer with the MD5 digest patched in.
    pub fn build(&self) -> Vec<u8> {
        let config = self.build_config_table();
        let dev_info = self.build_device_table();
        let blob_pool = self.blobs.as_bytes();

        let blob_offset =
            HEADER_FIXED_SIZE + HEADER_RESERVED + config.len() + DEV_INFO_PAD + dev_info.len();
        let header_size = blob_offset + blob_pool.len();

        let mut buf = Vec::with_capacity(header_size);
        buf.extend_from_slice(&VMA_MAGIC.to_be_bytes());
        buf.extend_from_slice(&VMA_VERSION.to_be_bytes());
        buf.extend_from_slice(self.uuid.as_bytes());
        buf.extend_from_slice(&self.creation_time.to_be_bytes());
        buf.extend_from_slice(&[0u8; 16]); // digest slot, zeroed for hashing
        buf.extend_from_slice(&(blob_offset as u32).to_be_bytes());
        buf.extend_from_slice(&(blob_pool.len() as u32).to_be_bytes());
        buf.extend_from_slice(&(header_size as u32).to_be_bytes());
        debug_assert_eq!(buf.len(), HEADER_FIXED_SIZE);

        buf.extend_from_slice(&[0u8; HEADER_RESERVED]);
        buf.extend_from_slice(&config);
        buf.extend_from_slice(&[0u8; DEV_INFO_PAD]);
        buf.extend_from_slice(&dev_info);
        buf.extend_from_slice(blob_pool);
        debug_assert_eq!(buf.len(), header_size);

        let digest = Md5::digest(&buf);
        buf[HEADER_DIGEST_OFFSET..HEADER_DIGEST_OFFSET + 16].copy_from_slice(&digest);

        buf
    }
}
