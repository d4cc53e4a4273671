//! Gzip envelope detection and decompression.
//!
//! Any supported format may arrive gzip-compressed (chip-music rips in
//! particular are commonly shipped that way), so the dispatcher treats the
//! envelope as transparent: detect it, inflate the payload, and substitute a
//! memory reader over the result.

use std::fmt::{Display, Formatter};
use std::io::Read;

use flate2::read::DeflateDecoder;

const ID1: u8 = 31;
const ID2: u8 = 139;
const CM_DEFLATE: u8 = 8;

const FHCRC: u8 = 2;
const FEXTRA: u8 = 4;
const FNAME: u8 = 8;
const FCOMMENT: u8 = 16;

/// Smallest possible member: 10-byte header plus CRC32/ISIZE trailer.
const MIN_MEMBER_LEN: usize = 18;

#[derive(Debug)]
pub enum GzipError {
    Truncated,
    BadHeader,
    Inflate(std::io::Error),
    SizeMismatch { expected: u32, actual: usize },
}

impl Display for GzipError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => write!(f, "gzip member is truncated"),
            Self::BadHeader => write!(f, "malformed gzip header"),
            Self::Inflate(err) => write!(f, "inflate failed: {}", err),
            Self::SizeMismatch { expected, actual } => write!(
                f,
                "decompressed size {} does not match recorded size {}",
                actual, expected
            ),
        }
    }
}

impl std::error::Error for GzipError {}

/// Check whether a stream signature starts with a gzip member header.
pub fn is_envelope(signature: &[u8]) -> bool {
    signature.len() >= 3
        && signature[0] == ID1
        && signature[1] == ID2
        && signature[2] == CM_DEFLATE
}

/// Inflate a complete gzip member into its payload.
///
/// Walks the optional extra/name/comment/hcrc fields to locate the deflate
/// region, inflates it raw, and validates the byte count against the trailing
/// 4-byte uncompressed-size field.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, GzipError> {
    if data.len() < MIN_MEMBER_LEN {
        return Err(GzipError::Truncated);
    }
    if !is_envelope(data) {
        return Err(GzipError::BadHeader);
    }

    let flags = data[3];
    let max = data.len() - 8;
    let mut compstart = 10_usize;

    if flags & FEXTRA != 0 {
        if compstart + 2 > max {
            return Err(GzipError::BadHeader);
        }
        let xlen = u16::from_le_bytes([data[compstart], data[compstart + 1]]) as usize;
        compstart += 2 + xlen;
    }
    if flags & FNAME != 0 {
        compstart = skip_zero_terminated(data, compstart, max)?;
    }
    if flags & FCOMMENT != 0 {
        compstart = skip_zero_terminated(data, compstart, max)?;
    }
    if flags & FHCRC != 0 {
        compstart += 2;
    }
    if compstart >= max {
        return Err(GzipError::BadHeader);
    }

    let isize = u32::from_le_bytes([
        data[data.len() - 4],
        data[data.len() - 3],
        data[data.len() - 2],
        data[data.len() - 1],
    ]);

    let mut payload = Vec::with_capacity(isize as usize);
    let mut decoder = DeflateDecoder::new(&data[compstart..max]);
    decoder
        .read_to_end(&mut payload)
        .map_err(GzipError::Inflate)?;

    if payload.len() != isize as usize {
        return Err(GzipError::SizeMismatch {
            expected: isize,
            actual: payload.len(),
        });
    }
    Ok(payload)
}

fn skip_zero_terminated(data: &[u8], mut pos: usize, max: usize) -> Result<usize, GzipError> {
    while pos < max && data[pos] != 0 {
        pos += 1;
    }
    if pos >= max {
        return Err(GzipError::BadHeader);
    }
    Ok(pos + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(payload: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).expect("compress");
        encoder.finish().expect("finish")
    }

    #[test]
    fn round_trips_compressed_payload() {
        let payload = b"Vgm \x00\x01\x02\x03 some chip music payload".to_vec();
        let member = gzip(&payload);
        assert!(is_envelope(&member));
        assert_eq!(decompress(&member).expect("decompress"), payload);
    }

    #[test]
    fn rejects_truncated_member() {
        let member = gzip(b"payload");
        assert!(matches!(
            decompress(&member[..12]),
            Err(GzipError::Truncated)
        ));
    }

    #[test]
    fn rejects_corrupt_deflate_stream() {
        let mut member = gzip(b"a longer payload so corruption lands in the deflate data");
        let mid = member.len() / 2;
        member[mid] ^= 0xFF;
        member[mid + 1] ^= 0xFF;
        assert!(decompress(&member).is_err());
    }

    #[test]
    fn skips_name_field_when_present() {
        let payload = b"named payload".to_vec();
        let mut member = gzip(&payload);
        // Rewrite the header with FNAME set and a file name spliced in.
        let mut named = member[..10].to_vec();
        named[3] |= FNAME;
        named.extend_from_slice(b"song.vgm\0");
        named.extend_from_slice(&member.split_off(10));
        assert_eq!(decompress(&named).expect("decompress"), payload);
    }
}
