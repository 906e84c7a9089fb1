//! Utility functions shared by all commands: timestamps, size units,
//! fixed-width name fields and the on-disk record codec.

use crate::error::{Error, Result};
use bytemuck::Pod;
use rand_core::{OsRng, RngCore};
use std::fmt;
use std::fs::File;
use std::io;
use std::io::{Read, Seek, SeekFrom, Write};
use std::mem::size_of;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current timestamp since the Unix epoch, in seconds.
pub fn timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Same as [`timestamp`], narrowed to the precision of inode time fields.
pub fn timestamp32() -> f32 {
    timestamp() as f32
}

/// Fills `buf` with random bytes from the operating system.
pub fn get_random(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
}

/// Returns a random positive disk signature.
pub fn random_signature() -> i32 {
    let mut buf = [0u8; 4];
    get_random(&mut buf);
    (i32::from_le_bytes(buf)).abs()
}

/// Converts a size with a unit suffix (`B`, `K` or `M`) into bytes.
pub fn to_bytes(size: i64, unit: &str) -> Result<i64> {
    let factor = match unit.to_ascii_uppercase().as_str() {
        "B" => 1,
        "K" => 1024,
        "M" => 1024 * 1024,
        other => {
            return Err(Error::InvalidArgument(format!(
                "unit must be B, K or M, got `{other}`"
            )))
        }
    };
    Ok(size * factor)
}

/// Structure representing a number of bytes.
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = ["bytes", "KiB", "MiB", "GiB", "TiB"];
        let mut order = 0;
        let mut n = self.0;
        while n >= 1024 && order + 1 < units.len() {
            n /= 1024;
            order += 1;
        }
        write!(fmt, "{} {}", n, units[order])
    }
}

/// Encodes `s` into a NUL-padded fixed-width field, truncating if needed.
pub fn fixed<const N: usize>(s: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    let bytes = s.as_bytes();
    let len = bytes.len().min(N);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

/// Decodes a fixed-width field, trimming trailing NULs and spaces.
pub fn field_str(bytes: &[u8]) -> String {
    let s: String = bytes
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| *b as char)
        .collect();
    s.trim_matches(|c| c == ' ' || c == '\0').to_owned()
}

/// Compares a fixed-width name field against `name`, ignoring ASCII case.
pub fn field_eq(bytes: &[u8], name: &str) -> bool {
    field_str(bytes).eq_ignore_ascii_case(name.trim_matches(|c| c == ' ' || c == '\0'))
}

/// Reads a packed record of type `T` at the given absolute offset.
pub fn read_at<T: Pod>(file: &mut File, offset: u64) -> io::Result<T> {
    let mut buf = vec![0u8; size_of::<T>()];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    Ok(bytemuck::pod_read_unaligned(&buf))
}

/// Writes a packed record of type `T` at the given absolute offset.
pub fn write_at<T: Pod>(file: &mut File, offset: u64, value: &T) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytemuck::bytes_of(value))
}

/// Writes `len` zero bytes starting at `offset`.
pub fn write_zeroes(file: &mut File, offset: u64, len: u64) -> io::Result<()> {
    const CHUNK: usize = 1 << 16;
    let zeroes = [0u8; CHUNK];
    file.seek(SeekFrom::Start(offset))?;
    let mut remaining = len as usize;
    while remaining > 0 {
        let n = remaining.min(CHUNK);
        file.write_all(&zeroes[..n])?;
        remaining -= n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytesize() {
        assert_eq!(format!("{}", ByteSize(0)).as_str(), "0 bytes");
        assert_eq!(format!("{}", ByteSize(1023)).as_str(), "1023 bytes");
        assert_eq!(format!("{}", ByteSize(1024)).as_str(), "1 KiB");
        assert_eq!(format!("{}", ByteSize(1024 * 1024)).as_str(), "1 MiB");
    }

    #[test]
    fn unit_conversion() {
        assert_eq!(to_bytes(3, "B").unwrap(), 3);
        assert_eq!(to_bytes(2, "k").unwrap(), 2048);
        assert_eq!(to_bytes(5, "M").unwrap(), 5 * 1048576);
        assert!(to_bytes(1, "G").is_err());
    }

    #[test]
    fn fixed_fields() {
        let f: [u8; 12] = fixed("users.txt");
        assert_eq!(&f[..9], b"users.txt");
        assert_eq!(f[9], 0);
        assert_eq!(field_str(&f), "users.txt");
        assert!(field_eq(&f, "USERS.TXT"));
        assert!(!field_eq(&f, "users"));

        // Truncation at the field width.
        let long: [u8; 4] = fixed("abcdef");
        assert_eq!(&long, b"abcd");
    }
}
