//! The EXT3 journal: an append-only log of mutating operations stored in a
//! reserved region between the superblock and the inode bitmap.

use crate::superblock::{FsKind, Superblock, SUPERBLOCK_SIZE};
use crate::util;
use bytemuck::{Pod, Zeroable};
use std::fs::File;
use std::io;
use std::mem::size_of;

/// Size of one encoded journal record in bytes.
pub const JOURNAL_SIZE: i32 = size_of::<Journal>() as i32;

/// One log record. Record `i` lives at `journal_start + i * JOURNAL_SIZE`.
#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Journal {
    /// Sequential index, taken from the inode counter at append time.
    pub count: i32,
    /// Operation name (`mkdir`, `mkfile`, ...).
    pub operation: [u8; 10],
    /// Absolute path the operation targeted.
    pub path: [u8; 32],
    /// Content written, when the operation carries any.
    pub content: [u8; 64],
    /// Append time, unix seconds.
    pub date: f32,
}

impl Journal {
    /// Builds a record for the given operation.
    pub fn new(count: i32, operation: &str, path: &str, content: &str) -> Self {
        Self {
            count,
            operation: util::fixed(operation),
            path: util::fixed(path),
            content: util::fixed(content),
            date: util::timestamp32(),
        }
    }

    /// The operation name, trimmed.
    pub fn operation_str(&self) -> String {
        let operation = self.operation;
        util::field_str(&operation)
    }

    /// The target path, trimmed.
    pub fn path_str(&self) -> String {
        let path = self.path;
        util::field_str(&path)
    }

    /// The recorded content, trimmed.
    pub fn content_str(&self) -> String {
        let content = self.content;
        util::field_str(&content)
    }
}

/// The byte offset of the journal region, directly after the superblock.
/// `None` for a filesystem without a journal.
pub fn region_start(sb: &Superblock, sb_offset: u64) -> Option<u64> {
    match sb.kind() {
        Ok(FsKind::Ext3) => Some(sb_offset + SUPERBLOCK_SIZE as u64),
        _ => None,
    }
}

/// Appends a record for `operation`.
///
/// The slot index and the record's `count` are the superblock's inode counter
/// at call time; existing records are never rewritten. On an EXT2 volume this
/// is a no-op.
pub fn append(
    file: &mut File,
    sb: &Superblock,
    sb_offset: u64,
    operation: &str,
    path: &str,
    content: &str,
) -> io::Result<()> {
    let Some(start) = region_start(sb, sb_offset) else {
        return Ok(());
    };
    let slot = sb.inodes_count;
    if slot >= sb.total_inodes() {
        // The region holds one slot per inode; past that the log is full.
        return Ok(());
    }
    let record = Journal::new(slot, operation, path, content);
    util::write_at(file, start + (slot * JOURNAL_SIZE) as u64, &record)
}

/// Decodes every record, stopping at the first slot without an operation.
pub fn read_all(file: &mut File, sb: &Superblock, sb_offset: u64) -> io::Result<Vec<Journal>> {
    let Some(start) = region_start(sb, sb_offset) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for slot in 0..sb.total_inodes() {
        let record: Journal = util::read_at(file, start + (slot * JOURNAL_SIZE) as u64)?;
        if record.operation_str().is_empty() {
            break;
        }
        out.push(record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_size() {
        assert_eq!(size_of::<Journal>(), 114);
    }

    #[test]
    fn record_fields() {
        let j = Journal::new(3, "mkdir", "/home/user", "");
        assert_eq!({ j.count }, 3);
        assert_eq!(j.operation_str(), "mkdir");
        assert_eq!(j.path_str(), "/home/user");
        assert_eq!(j.content_str(), "");
    }
}
