//! TAP: the simplest tape image format — a flat run of
//! length-prefixed blocks with no per-block metadata beyond a default
//! inter-block pause.
use std::io::{self, Read, Write};

/// Default pause the Spectrum ROM inserts between TAP blocks when no
/// other timing information is available.
pub const DEFAULT_PAUSE_MS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeBlock {
    pub data: Vec<u8>,
    pub pause_ms: u32,
}

/// Parses a `.tap` image: a repeated `{u16-LE length, length bytes}`.
pub fn read_tap(bytes: &[u8]) -> io::Result<Vec<TapeBlock>> {
    let mut cursor = bytes;
    let mut blocks = Vec::new();
    while !cursor.is_empty() {
        if cursor.len() < 2 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated TAP block length"));
        }
        let len = u16::from_le_bytes([cursor[0], cursor[1]]) as usize;
        cursor = &cursor[2..];
        if cursor.len() < len {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated TAP block data"));
        }
        let data = cursor[..len].to_vec();
        cursor = &cursor[len..];
        blocks.push(TapeBlock { data, pause_ms: DEFAULT_PAUSE_MS });
    }
    Ok(blocks)
}

/// Serializes blocks back to `.tap` form. Pause durations are not
/// representable in TAP and are dropped, matching the format.
pub fn write_tap(blocks: &[TapeBlock]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    for block in blocks {
        let len: u16 = block
            .data
            .len()
            .try_into()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "TAP block exceeds 65535 bytes"))?;
        out.write_all(&len.to_le_bytes())?;
        out.write_all(&block.data)?;
    }
    Ok(out)
}

pub fn read_tap_file(mut r: impl Read) -> io::Result<Vec<TapeBlock>> {
    let mut bytes = Vec::new();
    r.read_to_end(&mut bytes)?;
    read_tap(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_blocks() {
        let blocks = vec![
            TapeBlock { data: vec![0x00, 1, 2, 3], pause_ms: DEFAULT_PAUSE_MS },
            TapeBlock { data: vec![0xFF, 9, 9], pause_ms: DEFAULT_PAUSE_MS },
        ];
        let bytes = write_tap(&blocks).unwrap();
        let parsed = read_tap(&bytes).unwrap();
        assert_eq!(parsed, blocks);
    }

    #[test]
    fn truncated_length_prefix_is_an_error() {
        assert!(read_tap(&[0x01]).is_err());
    }

    #[test]
    fn truncated_payload_is_an_error() {
        assert!(read_tap(&[0x05, 0x00, 1, 2]).is_err());
    }
}
