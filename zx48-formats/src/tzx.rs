//! TZX: only the "Standard Speed Data Block" (type `0x10`) is
//! supported, which is all real-world 48K-only tapes actually use;
//! every other block type is a load-time error per spec §4.4.
use std::io;

use crate::tap::TapeBlock;

const MAGIC: &[u8] = b"ZXTape!\x1A";
const STANDARD_SPEED_DATA_BLOCK: u8 = 0x10;

pub fn read_tzx(bytes: &[u8]) -> io::Result<Vec<TapeBlock>> {
    if bytes.len() < 10 || &bytes[0..8] != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "not a TZX image (bad header)"));
    }
    let mut cursor = &bytes[10..];
    let mut blocks = Vec::new();

    while !cursor.is_empty() {
        let block_type = cursor[0];
        cursor = &cursor[1..];
        match block_type {
            STANDARD_SPEED_DATA_BLOCK => {
                if cursor.len() < 4 {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated TZX block 0x10 header"));
                }
                let pause_ms = u16::from_le_bytes([cursor[0], cursor[1]]) as u32;
                let length = u16::from_le_bytes([cursor[2], cursor[3]]) as usize;
                cursor = &cursor[4..];
                if cursor.len() < length {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated TZX block 0x10 data"));
                }
                blocks.push(TapeBlock { data: cursor[..length].to_vec(), pause_ms });
                cursor = &cursor[length..];
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unsupported TZX block type 0x{:02X}", other),
                ));
            }
        }
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tzx_header() -> Vec<u8> {
        let mut v = MAGIC.to_vec();
        v.extend_from_slice(&[1, 20]); // version 1.20
        v
    }

    #[test]
    fn reads_a_single_standard_block() {
        let mut bytes = tzx_header();
        bytes.push(0x10);
        bytes.extend_from_slice(&500u16.to_le_bytes()); // pause_ms
        bytes.extend_from_slice(&3u16.to_le_bytes()); // length
        bytes.extend_from_slice(&[0x00, 0xAA, 0xBB]);
        let blocks = read_tzx(&bytes).unwrap();
        assert_eq!(blocks, vec![TapeBlock { data: vec![0x00, 0xAA, 0xBB], pause_ms: 500 }]);
    }

    #[test]
    fn rejects_unsupported_block_types() {
        let mut bytes = tzx_header();
        bytes.push(0x11); // Turbo Speed Data Block, unsupported
        assert!(read_tzx(&bytes).is_err());
    }

    #[test]
    fn rejects_bad_magic() {
        assert!(read_tzx(b"not a tzx file.....").is_err());
    }
}
