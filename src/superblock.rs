//! The superblock: the per-partition control record holding the live
//! allocation counters and the byte offsets of every filesystem region.

use crate::bitmap;
use crate::block::{FileBlock, FolderBlock, PointerBlock};
use crate::error::{Error, Result};
use crate::inode::Inode;
use crate::util;
use bytemuck::{Pod, Zeroable};
use std::fs::File;
use std::io;
use std::mem::size_of;

/// Size of the encoded superblock in bytes.
pub const SUPERBLOCK_SIZE: i32 = size_of::<Superblock>() as i32;

/// Filesystem magic number.
pub const MAGIC: i32 = 0xEF53;

/// The two supported filesystem variants.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FsKind {
    /// `2fs`: no journal.
    Ext2,
    /// `3fs`: journal region between the superblock and the inode bitmap.
    Ext3,
}

impl FsKind {
    /// Parses the `-fs` command flag (`2fs` or `3fs`).
    pub fn from_flag(flag: &str) -> Result<Self> {
        match flag.to_ascii_lowercase().as_str() {
            "2fs" => Ok(Self::Ext2),
            "3fs" => Ok(Self::Ext3),
            other => Err(Error::InvalidArgument(format!(
                "filesystem must be 2fs or 3fs, got `{other}`"
            ))),
        }
    }

    /// The `filesystem_type` value stored in the superblock.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ext2 => 2,
            Self::Ext3 => 3,
        }
    }

    /// Decodes the stored `filesystem_type`.
    pub fn from_i32(v: i32) -> Result<Self> {
        match v {
            2 => Ok(Self::Ext2),
            3 => Ok(Self::Ext3),
            other => Err(Error::InvalidState(format!(
                "unknown filesystem type {other}"
            ))),
        }
    }
}

/// The control record written at the start byte of a formatted partition.
///
/// All `*_start` fields are absolute byte offsets into the disk image.
/// `first_ino`/`first_blo` advance by one record size per allocation and move
/// back on release; they track sequential hand-out, not the lowest free slot.
#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Superblock {
    /// 2 = no journal, 3 = journal.
    pub filesystem_type: i32,
    /// Inodes currently allocated.
    pub inodes_count: i32,
    /// Blocks currently allocated.
    pub blocks_count: i32,
    /// Block slots still free.
    pub free_blocks_count: i32,
    /// Inode slots still free.
    pub free_inodes_count: i32,
    /// Last mount time, unix seconds.
    pub mtime: f64,
    /// Last unmount time, unix seconds.
    pub umtime: f64,
    /// Times the filesystem has been mounted.
    pub mnt_count: i32,
    /// Always [`MAGIC`].
    pub magic: i32,
    /// Size of one inode record.
    pub inode_size: i32,
    /// Size of one file block record.
    pub block_size: i32,
    /// Next inode byte offset to hand out.
    pub first_ino: i32,
    /// Next block byte offset to hand out.
    pub first_blo: i32,
    /// Start of the inode bitmap.
    pub bm_inode_start: i32,
    /// Start of the block bitmap.
    pub bm_block_start: i32,
    /// Start of the inode table.
    pub inode_start: i32,
    /// Start of the block table.
    pub block_start: i32,
}

impl Superblock {
    /// Reads the superblock at the given partition start offset.
    pub fn read(file: &mut File, offset: u64) -> io::Result<Self> {
        util::read_at(file, offset)
    }

    /// Writes the superblock back at the given partition start offset.
    pub fn write(&self, file: &mut File, offset: u64) -> io::Result<()> {
        util::write_at(file, offset, self)
    }

    /// The filesystem variant recorded in this superblock.
    pub fn kind(&self) -> Result<FsKind> {
        FsKind::from_i32(self.filesystem_type)
    }

    /// The inode budget `n`.
    pub fn total_inodes(&self) -> i32 {
        self.inodes_count + self.free_inodes_count
    }

    /// The block budget `3n`.
    pub fn total_blocks(&self) -> i32 {
        self.blocks_count + self.free_blocks_count
    }

    /// Absolute byte offset of inode `index`.
    pub fn inode_offset(&self, index: i32) -> u64 {
        (self.inode_start + index * self.inode_size) as u64
    }

    /// Absolute byte offset of block `index`.
    pub fn block_offset(&self, index: i32) -> u64 {
        (self.block_start + index * self.block_size) as u64
    }

    /// Reads inode `index` from the inode table.
    pub fn read_inode(&self, file: &mut File, index: i32) -> io::Result<Inode> {
        util::read_at(file, self.inode_offset(index))
    }

    /// Writes inode `index` to the inode table.
    pub fn write_inode(&self, file: &mut File, index: i32, inode: &Inode) -> io::Result<()> {
        util::write_at(file, self.inode_offset(index), inode)
    }

    /// Reads the folder block at `index`.
    pub fn read_folder_block(&self, file: &mut File, index: i32) -> io::Result<FolderBlock> {
        util::read_at(file, self.block_offset(index))
    }

    /// Writes the folder block at `index`.
    pub fn write_folder_block(
        &self,
        file: &mut File,
        index: i32,
        block: &FolderBlock,
    ) -> io::Result<()> {
        util::write_at(file, self.block_offset(index), block)
    }

    /// Reads the file block at `index`.
    pub fn read_file_block(&self, file: &mut File, index: i32) -> io::Result<FileBlock> {
        util::read_at(file, self.block_offset(index))
    }

    /// Writes the file block at `index`.
    pub fn write_file_block(
        &self,
        file: &mut File,
        index: i32,
        block: &FileBlock,
    ) -> io::Result<()> {
        util::write_at(file, self.block_offset(index), block)
    }

    /// Reads the pointer block at `index`.
    pub fn read_pointer_block(&self, file: &mut File, index: i32) -> io::Result<PointerBlock> {
        util::read_at(file, self.block_offset(index))
    }

    /// Writes the pointer block at `index`.
    pub fn write_pointer_block(
        &self,
        file: &mut File,
        index: i32,
        block: &PointerBlock,
    ) -> io::Result<()> {
        util::write_at(file, self.block_offset(index), block)
    }

    /// Tells whether inode slot `index` is marked allocated in the bitmap.
    pub fn inode_allocated(&self, file: &mut File, index: i32) -> io::Result<bool> {
        bitmap::test(file, self.bm_inode_start as u64, index)
    }

    /// Tells whether block slot `index` is marked allocated in the bitmap.
    pub fn block_allocated(&self, file: &mut File, index: i32) -> io::Result<bool> {
        bitmap::test(file, self.bm_block_start as u64, index)
    }

    /// Allocates the next free inode slot: flips its bitmap bit and updates
    /// the counters. Returns the slot index.
    pub fn allocate_inode(&mut self, file: &mut File) -> Result<i32> {
        let index = match bitmap::first_free(file, self.bm_inode_start as u64, self.total_inodes())
        {
            Err(Error::InsufficientSpace(_)) => {
                return Err(Error::InsufficientSpace("no free inodes left".into()))
            }
            other => other?,
        };
        bitmap::set(file, self.bm_inode_start as u64, index, true)?;
        self.inodes_count = self.inodes_count + 1;
        self.free_inodes_count = self.free_inodes_count - 1;
        self.first_ino = self.first_ino + self.inode_size;
        Ok(index)
    }

    /// Allocates the next free block slot: flips its bitmap bit and updates
    /// the counters. Returns the slot index.
    pub fn allocate_block(&mut self, file: &mut File) -> Result<i32> {
        let index = match bitmap::first_free(file, self.bm_block_start as u64, self.total_blocks())
        {
            Err(Error::InsufficientSpace(_)) => {
                return Err(Error::InsufficientSpace("no free blocks left".into()))
            }
            other => other?,
        };
        bitmap::set(file, self.bm_block_start as u64, index, true)?;
        self.blocks_count = self.blocks_count + 1;
        self.free_blocks_count = self.free_blocks_count - 1;
        self.first_blo = self.first_blo + self.block_size;
        Ok(index)
    }

    /// Releases inode slot `index`.
    pub fn free_inode(&mut self, file: &mut File, index: i32) -> Result<()> {
        bitmap::set(file, self.bm_inode_start as u64, index, false)?;
        self.inodes_count = self.inodes_count - 1;
        self.free_inodes_count = self.free_inodes_count + 1;
        self.first_ino = self.first_ino - self.inode_size;
        Ok(())
    }

    /// Releases block slot `index`.
    pub fn free_block(&mut self, file: &mut File, index: i32) -> Result<()> {
        bitmap::set(file, self.bm_block_start as u64, index, false)?;
        self.blocks_count = self.blocks_count - 1;
        self.free_blocks_count = self.free_blocks_count + 1;
        self.first_blo = self.first_blo - self.block_size;
        Ok(())
    }

    /// Allocates a new block and stores its index in `inode.blocks[slot]`,
    /// which must be unassigned.
    pub fn assign_block_at(
        &mut self,
        file: &mut File,
        inode: &mut Inode,
        slot: usize,
    ) -> Result<i32> {
        if inode.blocks[slot] != -1 {
            return Err(Error::InvalidState(format!(
                "block slot {slot} is already assigned"
            )));
        }
        let index = self.allocate_block(file)?;
        let mut blocks = inode.blocks;
        blocks[slot] = index;
        inode.blocks = blocks;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_size() {
        assert_eq!(size_of::<Superblock>(), 76);
    }

    #[test]
    fn fs_kind_flags() {
        assert_eq!(FsKind::from_flag("2fs").unwrap(), FsKind::Ext2);
        assert_eq!(FsKind::from_flag("3FS").unwrap(), FsKind::Ext3);
        assert!(FsKind::from_flag("4fs").is_err());
        assert_eq!(FsKind::Ext3.as_i32(), 3);
    }
}
