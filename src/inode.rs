//! The inode record: one per file or directory, referencing up to fifteen
//! block slots (twelve direct plus three indirect anchors).

use crate::util;
use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

/// Size of the encoded inode in bytes.
pub const INODE_SIZE: i32 = size_of::<Inode>() as i32;

/// Inode type byte: directory.
pub const TYPE_DIR: u8 = b'0';
/// Inode type byte: regular file.
pub const TYPE_FILE: u8 = b'1';

/// Number of direct block slots.
pub const DIRECT_SLOTS: usize = 12;
/// The slot anchoring the overflow pointer block for large files.
pub const OVERFLOW_SLOT: usize = 14;

/// A file or directory record in the inode table.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Inode {
    /// Owner user id.
    pub uid: i32,
    /// Owner group id.
    pub gid: i32,
    /// Logical size in bytes.
    pub size: i32,
    /// Last access, unix seconds.
    pub atime: f32,
    /// Last permission change, unix seconds.
    pub ctime: f32,
    /// Last content change, unix seconds.
    pub mtime: f32,
    /// Block indices: 12 direct, then single/double/triple indirect anchors.
    /// `-1` marks an unassigned slot.
    pub blocks: [i32; 15],
    /// `0` = directory, `1` = file.
    pub kind: u8,
    /// Three ASCII permission digits (u/g/o).
    pub perm: [u8; 3],
}

impl Inode {
    /// A fresh record with no blocks and current timestamps.
    fn new(kind: u8, size: i32, perm: &[u8; 3]) -> Self {
        let now = util::timestamp32();
        Self {
            uid: 1,
            gid: 1,
            size,
            atime: now,
            ctime: now,
            mtime: now,
            blocks: [-1; 15],
            kind,
            perm: *perm,
        }
    }

    /// A new directory inode.
    pub fn new_dir(perm: &[u8; 3]) -> Self {
        Self::new(TYPE_DIR, 0, perm)
    }

    /// A new regular-file inode of the given logical size.
    pub fn new_file(size: i32, perm: &[u8; 3]) -> Self {
        Self::new(TYPE_FILE, size, perm)
    }

    /// Tells whether this inode is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == TYPE_DIR
    }

    /// Tells whether this inode is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == TYPE_FILE
    }

    /// Stamps the last-access time.
    pub fn touch_atime(&mut self) {
        self.atime = util::timestamp32();
    }

    /// Stamps the modification times.
    pub fn touch_mtime(&mut self) {
        let now = util::timestamp32();
        self.mtime = now;
        self.ctime = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_size() {
        assert_eq!(size_of::<Inode>(), 88);
    }

    #[test]
    fn constructors() {
        let dir = Inode::new_dir(b"664");
        assert!(dir.is_dir());
        assert_eq!({ dir.size }, 0);
        assert!(dir.blocks.iter().all(|b| *b == -1));

        let file = Inode::new_file(123, b"664");
        assert!(file.is_file());
        assert_eq!({ file.size }, 123);
        assert_eq!(&file.perm, b"664");
    }
}
