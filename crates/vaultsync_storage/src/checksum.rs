//! SHA-256 content digests.

use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};

/// Copies `reader` into `writer`, returning the byte count and hex digest.
pub fn copy_with_digest<R, W>(reader: &mut R, writer: &mut W) -> io::Result<(u64, String)>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    Ok((total, hex::encode(hasher.finalize())))
}

/// Hex SHA-256 digest of everything `reader` yields.
pub fn sha256_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<String> {
    copy_with_digest(reader, &mut io::sink()).map(|(_, digest)| digest)
}

/// Hex SHA-256 digest of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compares two hex digests, ignoring case.
pub fn digests_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
