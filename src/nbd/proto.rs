//! Wire constants and frame (de)serialization for the network-block-device
//! write-only subset used by block-backup targets.

pub const PASSWD: u64 = 0x4E42_444D_4147_4943;
pub const OPTS_MAGIC: u64 = 0x4948_4156_454F_5054;
pub const OPT_EXPORT_NAME: u32 = 1;

pub const REQUEST_MAGIC: u32 = 0x2560_9513;
pub const REPLY_MAGIC: u32 = 0x6744_6698;

pub const CMD_WRITE: u32 = 1;
pub const CMD_DISCONNECT: u32 = 2;

/// First 18 bytes the server sends: passwd(8) ‖ opts_magic(8) ‖ flags(2, zero).
pub fn negotiation_part1() -> [u8; 18] {
    let mut buf = [0u8; 18];
    buf[0..8].copy_from_slice(&PASSWD.to_be_bytes());
    buf[8..16].copy_from_slice(&OPTS_MAGIC.to_be_bytes());
    // flags left zero
    buf
}

/// The 20-byte export-name option request the client sends.
pub struct ExportNameOption {
    pub magic: u64,
    pub opt: u32,
    pub name_length: u32,
}

impl ExportNameOption {
    pub const WIRE_SIZE: usize = 20;

    pub fn parse(buf: &[u8; Self::WIRE_SIZE]) -> Self {
        // bytes 0..4 are `reserved`, intentionally unread.
        let magic = u64::from_be_bytes(buf[4..12].try_into().unwrap());
        let opt = u32::from_be_bytes(buf[12..16].try_into().unwrap());
        let name_length = u32::from_be_bytes(buf[16..20].try_into().unwrap());
        Self {
            magic,
            opt,
            name_length,
        }
    }
}

/// The 134-byte reply completing negotiation: export_size(8) ‖ flags(2, zero)
/// ‖ 124 NUL bytes.
pub fn negotiation_part2(export_size: u64) -> [u8; 134] {
    let mut buf = [0u8; 134];
    buf[0..8].copy_from_slice(&export_size.to_be_bytes());
    // flags and the 124-byte tail are left zero
    buf
}

/// A 28-byte client command request.
pub struct Request {
    pub magic: u32,
    pub kind: u32,
    pub handle: u64,
    pub offset: u64,
    pub length: u32,
}

impl Request {
    pub const WIRE_SIZE: usize = 28;

    pub fn parse(buf: &[u8; Self::WIRE_SIZE]) -> Self {
        Self {
            magic: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            kind: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            handle: u64::from_be_bytes(buf[8..16].try_into().unwrap()),
            offset: u64::from_be_bytes(buf[16..24].try_into().unwrap()),
            length: u32::from_be_bytes(buf[24..28].try_into().unwrap()),
        }
    }
}

/// The 16-byte server reply to a command request.
pub fn reply(error: u32, handle: u64) -> [u8; 16] {
    let mut buf = [0u8; 16];
    buf[0..4].copy_from_slice(&REPLY_MAGIC.to_be_bytes());
    buf[4..8].copy_from_slice(&error.to_be_bytes());
    buf[8..16].copy_from_slice(&handle.to_be_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_part1_layout() {
        let buf = negotiation_part1();
        assert_eq!(u64::from_be_bytes(buf[0..8].try_into().unwrap()), PASSWD);
        assert_eq!(u64::from_be_bytes(buf[8..16].try_into().unwrap()), OPTS_MAGIC);
        assert_eq!(buf[16..18], [0, 0]);
    }

    #[test]
    fn export_name_option_roundtrip() {
        let mut raw = [0u8; ExportNameOption::WIRE_SIZE];
        raw[4..12].copy_from_slice(&OPTS_MAGIC.to_be_bytes());
        raw[12..16].copy_from_slice(&OPT_EXPORT_NAME.to_be_bytes());
        raw[16..20].copy_from_slice(&5u32.to_be_bytes());

        let parsed = ExportNameOption::parse(&raw);
        assert_eq!(parsed.magic, OPTS_MAGIC);
        assert_eq!(parsed.opt, OPT_EXPORT_NAME);
        assert_eq!(parsed.name_length, 5);
    }

    #[test]
    fn request_roundtrip() {
        let mut raw = [0u8; Request::WIRE_SIZE];
        raw[0..4].copy_from_slice(&REQUEST_MAGIC.to_be_bytes());
        raw[4..8].copy_from_slice(&CMD_WRITE.to_be_bytes());
        raw[8..16].copy_from_slice(&42u64.to_be_bytes());
        raw[16..24].copy_from_slice(&65536u64.to_be_bytes());
        raw[24..28].copy_from_slice(&4096u32.to_be_bytes());

        let req = Request::parse(&raw);
        assert_eq!(req.magic, REQUEST_MAGIC);
        assert_eq!(req.kind, CMD_WRITE);
        assert_eq!(req.handle, 42);
        assert_eq!(req.offset, 65536);
        assert_eq!(req.length, 4096);
    }

    #[test]
    fn reply_layout() {
        let buf = reply(0, 7);
        assert_eq!(u32::from_be_bytes(buf[0..4].try_into().unwrap()), REPLY_MAGIC);
        assert_eq!(u32::from_be_bytes(buf[4..8].try_into().unwrap()), 0);
        assert_eq!(u64::from_be_bytes(buf[8..16].try_into().unwrap()), 7);
    }
}
