//! Gzip helpers for cached bodies.
//!
//! Both strategies use gzip: the filesystem `.gz` sibling must be gzip so the
//! external router can serve it with `Content-Encoding: gzip`, and the indexed
//! store reuses the same codec.

use std::io::{self, Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};

pub fn gzip(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn gunzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let body = b"<html><body>hello cache</body></html>".repeat(16);
        let packed = gzip(&body, 4).expect("gzip");
        assert!(packed.len() < body.len());
        let unpacked = gunzip(&packed).expect("gunzip");
        assert_eq!(unpacked, body);
    }

    #[test]
    fn gunzip_rejects_garbage() {
        assert!(gunzip(b"definitely not gzip").is_err());
    }
}
