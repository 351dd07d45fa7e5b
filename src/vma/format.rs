//! Wire-format constants for the VMA archive.

/// `VMA_MAGIC` — first 4 bytes of every archive.
pub const VMA_MAGIC: u32 = 0x564d_4100;

/// `VMA_VERSION` — second 4 bytes of the header.
pub const VMA_VERSION: u32 = 1;

/// `VMA_EXTENT_MAGIC` — first 4 bytes of every extent.
pub const VMA_EXTENT_MAGIC: u32 = 0x564d_4145;

/// Size in bytes of one cluster. Every disk payload is a whole number of these.
pub const CLUSTER_SIZE: usize = 65_536;

/// Maximum populated `blockinfo` entries per extent.
pub const BLOCKS_PER_EXTENT: usize = 59;

/// Maximum number of streams (device table has 256 slots, entry 0 reserved).
pub const MAX_STREAMS: usize = 255;

/// Maximum number of config entries.
pub const MAX_CONFIGS: usize = 256;

/// Fixed-size portion of the header before the reserved padding, in bytes:
/// magic(4) + version(4) + uuid(16) + ctime(8) + digest(16) + blob_offset(4)
/// + blob_len(4) + header_size(4).
pub const HEADER_FIXED_SIZE: usize = 4 + 4 + 16 + 8 + 16 + 4 + 4 + 4;

/// Reserved padding immediately following the fixed header fields.
pub const HEADER_RESERVED: usize = 1984;

/// Size of one config-table entry (a blob-offset pointer).
pub const CONFIG_PTR_SIZE: usize = 4;

/// Total size of the config table: 256 name pointers + 256 data pointers.
pub const CONFIG_TABLE_SIZE: usize = MAX_CONFIGS * CONFIG_PTR_SIZE * 2;

/// Known pre-existing misalignment in the header's `dev_info` layout,
/// preserved for wire compatibility with existing readers.
pub const DEV_INFO_PAD: usize = 4;

/// Size of one `dev_info` device-table entry.
pub const DEV_INFO_SIZE: usize = 32;

/// Number of device-table slots (index 0 reserved, 1..=255 usable).
pub const DEV_INFO_SLOTS: usize = 256;

/// Offset of the MD5 digest slot within the header buffer.
pub const HEADER_DIGEST_OFFSET: usize = 32;

/// Offset of the MD5 digest slot within an extent's header.
pub const EXTENT_DIGEST_OFFSET: usize = 24;

/// Size, in bytes, of an extent header before the blockinfo table:
/// magic(4) + reserved(2) + block_count(2) + uuid(16) + digest(16).
pub const EXTENT_HEADER_SIZE: usize = 4 + 2 + 2 + 16 + 16;

/// Size of one `blockinfo` entry.
pub const BLOCKINFO_SIZE: usize = 8;

/// High bits set on every populated `blockinfo` entry.
pub const BLOCKINFO_TAG: u64 = 0xFFFF_0000_0000_0000;

/// `block_count` units: each cluster is this many 4 KiB blocks.
pub const BLOCKS_PER_CLUSTER: u64 = (CLUSTER_SIZE / 4096) as u64;
