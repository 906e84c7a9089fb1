//! The three data-block shapes of the block table: directory entries, raw
//! file bytes and indirect pointers.
//!
//! The owning inode's type selects which codec applies to a block index; a
//! block is never self-describing.

use crate::util;
use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

/// Size of a folder or file block in bytes; the block table is sized in these
/// units.
pub const BLOCK_SIZE: i32 = 64;

/// Number of pointers held by an indirect block.
pub const POINTERS_PER_BLOCK: usize = 16;

/// One directory entry inside a [`FolderBlock`].
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FolderEntry {
    /// NUL-padded entry name.
    pub name: [u8; 12],
    /// Referenced inode index, `-1` for a vacant entry.
    pub inode: i32,
}

impl FolderEntry {
    /// A vacant entry.
    pub fn empty() -> Self {
        Self {
            name: *b"-\0\0\0\0\0\0\0\0\0\0\0",
            inode: -1,
        }
    }

    /// An entry pointing `name` at `inode`.
    pub fn new(name: &str, inode: i32) -> Self {
        Self {
            name: util::fixed(name),
            inode,
        }
    }

    /// Tells whether the entry references an inode.
    pub fn is_used(&self) -> bool {
        self.inode != -1
    }
}

/// A directory data block: four name/inode entries. Entries 0 and 1 of a
/// directory's first block are `.` and `..`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FolderBlock {
    pub entries: [FolderEntry; 4],
}

impl FolderBlock {
    /// A block of four vacant entries.
    pub fn empty() -> Self {
        Self {
            entries: [FolderEntry::empty(); 4],
        }
    }

    /// The first block of a new directory: `.` and `..` set, the rest vacant.
    pub fn for_new_dir(own_inode: i32, parent_inode: i32) -> Self {
        Self {
            entries: [
                FolderEntry::new(".", own_inode),
                FolderEntry::new("..", parent_inode),
                FolderEntry::empty(),
                FolderEntry::empty(),
            ],
        }
    }
}

/// A raw 64-byte data block of a regular file.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FileBlock {
    pub content: [u8; 64],
}

impl FileBlock {
    /// A zeroed block.
    pub fn empty() -> Self {
        Self { content: [0; 64] }
    }

    /// A block holding `chunk`, NUL-padded. `chunk` must fit.
    pub fn from_chunk(chunk: &[u8]) -> Self {
        let mut block = Self::empty();
        block.content[..chunk.len()].copy_from_slice(chunk);
        block
    }
}

/// An indirect block: sixteen pointers to further block indices. `-1` and `0`
/// both mark an unassigned cell.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct PointerBlock {
    pub pointers: [i64; POINTERS_PER_BLOCK],
}

impl PointerBlock {
    /// A block of unassigned pointers.
    pub fn empty() -> Self {
        Self {
            pointers: [-1; POINTERS_PER_BLOCK],
        }
    }

    /// The index of the first unassigned cell.
    pub fn free_cell(&self) -> Option<usize> {
        self.pointers.iter().position(|p| *p == -1 || *p == 0)
    }
}

/// Splits `content` into 64-byte file blocks, the last one NUL-padded.
pub fn split_content(content: &str) -> Vec<FileBlock> {
    content
        .as_bytes()
        .chunks(BLOCK_SIZE as usize)
        .map(FileBlock::from_chunk)
        .collect()
}
