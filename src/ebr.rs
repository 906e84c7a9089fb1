//! Extended Boot Records: the singly-linked chain of headers that carves an
//! extended partition into logical partitions.

use crate::error::{Error, Result};
use crate::util;
use bytemuck::{Pod, Zeroable};
use std::fs::File;
use std::io;
use std::mem::size_of;

/// Size of the encoded EBR in bytes.
pub const EBR_SIZE: i32 = size_of::<Ebr>() as i32;

/// Upper bound on chain length while walking, to stop on corrupted links.
const MAX_CHAIN: usize = 1024;

/// The header of one logical partition.
#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Ebr {
    /// `1` once the record has been created.
    pub mount: u8,
    /// Fit byte (`B`/`F`/`W`).
    pub fit: u8,
    /// Byte offset of this EBR inside the disk.
    pub start: i32,
    /// Size of the logical partition in bytes, EBR header included.
    pub size: i32,
    /// Byte offset of the next EBR, `-1` at the tail.
    pub next: i32,
    /// NUL-padded partition name.
    pub name: [u8; 16],
}

impl Ebr {
    /// Builds a record; `next` is `-1` for a tail entry.
    pub fn new(fit: u8, size: i32, start: i32, next: i32, name: &str) -> Self {
        Self {
            mount: b'1',
            fit,
            start,
            size,
            next,
            name: util::fixed(name),
        }
    }

    /// Decodes the EBR at byte `position`, validating the offset first.
    pub fn read(file: &mut File, position: i64) -> Result<Self> {
        let len = file.metadata()?.len() as i64;
        if position < 0 || position + EBR_SIZE as i64 > len {
            return Err(Error::InvalidState(format!(
                "EBR offset {position} is outside the disk"
            )));
        }
        Ok(util::read_at(file, position as u64)?)
    }

    /// Encodes the EBR at its own `start` offset.
    pub fn write(&self, file: &mut File) -> io::Result<()> {
        util::write_at(file, self.start as u64, self)
    }

    /// The partition name, trimmed.
    pub fn name_str(&self) -> String {
        let name = self.name;
        util::field_str(&name)
    }

    /// Byte offset where the EBR following this one would begin.
    ///
    /// Fails unless the position falls strictly inside the extended partition.
    pub fn next_position(&self, ext_start: i32, ext_size: i32) -> Result<i32> {
        if self.size <= 0 {
            return Err(Error::InvalidState("EBR has no size".into()));
        }
        if self.start < ext_start {
            return Err(Error::InvalidState("EBR lies before its extended partition".into()));
        }
        let next = self.start + self.size;
        if next <= self.start || next >= ext_start + ext_size {
            return Err(Error::InsufficientSpace(
                "next EBR would fall outside the extended partition".into(),
            ));
        }
        Ok(next)
    }
}

/// Writes the head EBR of a freshly created extended partition.
///
/// The head is a zero-size placeholder; the first logical partition rewrites
/// it in place instead of allocating a new record.
pub fn write_head(file: &mut File, ext_start: i32, fit: u8, name: &str) -> io::Result<()> {
    Ebr::new(fit, 0, ext_start, -1, name).write(file)
}

/// Walks the chain starting at `ext_start` and returns the tail EBR.
pub fn last(file: &mut File, ext_start: i32) -> Result<Ebr> {
    let mut current = Ebr::read(file, ext_start as i64)?;
    for _ in 0..MAX_CHAIN {
        if current.next < 0 {
            return Ok(current);
        }
        current = Ebr::read(file, current.next as i64)?;
    }
    Err(Error::InvalidState("EBR chain does not terminate".into()))
}

/// Collects every sized EBR of the chain starting at `ext_start`.
pub fn collect(file: &mut File, ext_start: i32) -> Result<Vec<Ebr>> {
    let mut out = Vec::new();
    let mut position = ext_start as i64;
    for _ in 0..MAX_CHAIN {
        let ebr = Ebr::read(file, position)?;
        if ebr.size > 0 {
            out.push(ebr);
        }
        if ebr.next < 0 {
            return Ok(out);
        }
        position = ebr.next as i64;
    }
    Err(Error::InvalidState("EBR chain does not terminate".into()))
}

/// Appends a logical partition of `size` bytes to the extended partition.
pub fn create_logical(
    file: &mut File,
    ext_start: i32,
    ext_size: i32,
    size: i32,
    fit: u8,
    name: &str,
) -> Result<()> {
    let mut tail = last(file, ext_start)?;
    // The placeholder head gets filled in place by the first logical.
    if tail.size == 0 {
        if size > ext_size {
            return Err(Error::InsufficientSpace(format!(
                "extended partition holds {ext_size} bytes, {size} requested"
            )));
        }
        tail.size = size;
        tail.fit = fit;
        tail.name = util::fixed(name);
        tail.write(file)?;
        return Ok(());
    }
    let next_start = tail.next_position(ext_start, ext_size)?;
    let available = ext_size - (next_start - ext_start);
    if available < size {
        return Err(Error::InsufficientSpace(format!(
            "extended partition has {available} bytes left, {size} requested"
        )));
    }
    let new_ebr = Ebr::new(fit, size, next_start, -1, name);
    new_ebr.write(file)?;
    tail.next = next_start;
    tail.write(file)?;
    Ok(())
}

/// Zeroes the byte range of every logical partition in the chain.
pub fn zero_chain(file: &mut File, ext_start: i32, ext_size: i32) -> Result<()> {
    let chain = match collect(file, ext_start) {
        Ok(chain) => chain,
        // An extended partition that was never initialized has no chain.
        Err(Error::InvalidState(_)) => return Ok(()),
        Err(err) => return Err(err),
    };
    for ebr in chain {
        let size = (ebr.size as i64).min(ext_start as i64 + ext_size as i64 - ebr.start as i64);
        if size > 0 {
            util::write_zeroes(file, ebr.start as u64, size as u64)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TempDisk;

    #[test]
    fn record_size() {
        assert_eq!(size_of::<Ebr>(), 30);
    }

    #[test]
    fn head_then_two_logicals() {
        let disk = TempDisk::create("ebr-chain", 1 << 20);
        let mut file = disk.open();
        let ext_start = 512;
        let ext_size = 512 * 1024;
        write_head(&mut file, ext_start, b'F', "E1").unwrap();

        create_logical(&mut file, ext_start, ext_size, 100 * 1024, b'F', "L1").unwrap();
        create_logical(&mut file, ext_start, ext_size, 100 * 1024, b'F', "L2").unwrap();

        let chain = collect(&mut file, ext_start).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].name_str(), "L1");
        assert_eq!(chain[1].name_str(), "L2");
        // The first logical reuses the head slot at the extended start.
        assert_eq!({ chain[0].start }, ext_start);
        assert_eq!({ chain[1].start }, ext_start + 100 * 1024);
        assert_eq!({ chain[1].next }, -1);
        for e in &chain {
            assert!(e.start >= ext_start);
            assert!(e.start + e.size <= ext_start + ext_size);
        }
    }

    #[test]
    fn chain_rejects_overflow() {
        let disk = TempDisk::create("ebr-overflow", 1 << 20);
        let mut file = disk.open();
        let ext_start = 512;
        let ext_size = 64 * 1024;
        write_head(&mut file, ext_start, b'F', "E1").unwrap();

        create_logical(&mut file, ext_start, ext_size, 60 * 1024, b'F', "L1").unwrap();
        let err = create_logical(&mut file, ext_start, ext_size, 60 * 1024, b'F', "L2");
        assert!(err.is_err());
    }

    #[test]
    fn decode_out_of_range_fails() {
        let disk = TempDisk::create("ebr-range", 4096);
        let mut file = disk.open();
        assert!(Ebr::read(&mut file, -8).is_err());
        assert!(Ebr::read(&mut file, 4095).is_err());
    }
}
