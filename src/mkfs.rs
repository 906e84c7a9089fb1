//! Formatting a mounted partition: the inode-budget calculator, the region
//! layout and the filesystem bootstrap (root directory plus `/users.txt`).

use crate::block::{self, FolderBlock, FolderEntry, BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::inode::{Inode, INODE_SIZE};
use crate::journal::{self, JOURNAL_SIZE};
use crate::mount::MountRegistry;
use crate::superblock::{FsKind, Superblock, MAGIC, SUPERBLOCK_SIZE};
use crate::users;
use crate::{bitmap, util};
use std::fs::File;

/// Number of inodes a partition of `size` bytes can hold under variant
/// `kind`. The block budget is three times this value.
pub fn inode_budget(size: i32, kind: FsKind) -> i32 {
    let numerator = size - SUPERBLOCK_SIZE;
    let mut denominator = 4 + INODE_SIZE + 3 * BLOCK_SIZE;
    if kind == FsKind::Ext3 {
        denominator += JOURNAL_SIZE;
    }
    if numerator <= 0 {
        return 0;
    }
    numerator / denominator
}

/// Byte offsets of every region of a formatted partition.
pub struct Layout {
    pub bm_inode_start: i32,
    pub bm_block_start: i32,
    pub inode_start: i32,
    pub block_start: i32,
}

/// Computes the region offsets for a partition starting at `part_start`.
///
/// EXT3 reserves `n` journal slots directly after the superblock; everything
/// else shifts accordingly.
pub fn layout(part_start: i32, n: i32, kind: FsKind) -> Layout {
    let journal_len = match kind {
        FsKind::Ext2 => 0,
        FsKind::Ext3 => n * JOURNAL_SIZE,
    };
    let bm_inode_start = part_start + SUPERBLOCK_SIZE + journal_len;
    let bm_block_start = bm_inode_start + n;
    let inode_start = bm_block_start + 3 * n;
    let block_start = inode_start + n * INODE_SIZE;
    Layout {
        bm_inode_start,
        bm_block_start,
        inode_start,
        block_start,
    }
}

/// Tells whether the partition at `offset` already carries a filesystem.
pub fn is_formatted(file: &mut File, offset: u64) -> bool {
    Superblock::read(file, offset)
        .map(|sb| sb.magic == MAGIC)
        .unwrap_or(false)
}

/// Formats the mounted partition `id` with the given variant.
///
/// Writes the superblock, zeroes both bitmaps (and the journal region for
/// EXT3), then bootstraps the root directory (inode 0) and `/users.txt`
/// (inode 1) holding the root credentials. For EXT3 the two bootstrap
/// operations are journaled before any bitmap is touched.
pub fn format(registry: &MountRegistry, id: &str, kind: FsKind) -> Result<String> {
    let (mut file, mbr, index) = registry.open(id)?;
    let partition = mbr.partitions[index];
    let part_start = partition.start;
    let n = inode_budget(partition.size, kind);
    if n < 2 {
        return Err(Error::InsufficientSpace(format!(
            "partition of {} bytes is too small to format",
            { partition.size }
        )));
    }

    let now = util::timestamp();
    let regions = layout(part_start, n, kind);
    let mut sb = Superblock {
        filesystem_type: kind.as_i32(),
        inodes_count: 0,
        blocks_count: 0,
        free_blocks_count: 3 * n,
        free_inodes_count: n,
        mtime: now,
        umtime: now,
        mnt_count: 1,
        magic: MAGIC,
        inode_size: INODE_SIZE,
        block_size: BLOCK_SIZE,
        first_ino: regions.inode_start,
        first_blo: regions.block_start,
        bm_inode_start: regions.bm_inode_start,
        bm_block_start: regions.bm_block_start,
        inode_start: regions.inode_start,
        block_start: regions.block_start,
    };

    bitmap::zero(&mut file, sb.bm_inode_start as u64, n)?;
    bitmap::zero(&mut file, sb.bm_block_start as u64, 3 * n)?;
    if kind == FsKind::Ext3 {
        util::write_zeroes(
            &mut file,
            (part_start + SUPERBLOCK_SIZE) as u64,
            (n * JOURNAL_SIZE) as u64,
        )?;
    }

    let sb_offset = part_start as u64;

    // Root directory, inode 0.
    journal::append(&mut file, &sb, sb_offset, "mkdir", "/", "")?;
    let root_index = sb.allocate_inode(&mut file)?;
    let mut root = Inode::new_dir(b"777");
    let root_block = sb.assign_block_at(&mut file, &mut root, 0)?;
    let mut root_dir = FolderBlock::for_new_dir(root_index, root_index);
    sb.write_folder_block(&mut file, root_block, &root_dir)?;
    sb.write_inode(&mut file, root_index, &root)?;

    // /users.txt, inode 1, with the bootstrap credentials.
    journal::append(&mut file, &sb, sb_offset, "mkfile", "/users.txt", users::BOOTSTRAP)?;
    let users_index = sb.allocate_inode(&mut file)?;
    let mut users_inode = Inode::new_file(users::BOOTSTRAP.len() as i32, b"777");
    let users_block = sb.assign_block_at(&mut file, &mut users_inode, 0)?;
    sb.write_file_block(
        &mut file,
        users_block,
        &block::FileBlock::from_chunk(users::BOOTSTRAP.as_bytes()),
    )?;
    sb.write_inode(&mut file, users_index, &users_inode)?;

    root_dir.entries[2] = FolderEntry::new("users.txt", users_index);
    sb.write_folder_block(&mut file, root_block, &root_dir)?;

    sb.write(&mut file, sb_offset)?;
    Ok(format!(
        "formatted `{id}` as {:?}: {n} inodes, {} blocks\n",
        kind,
        3 * n
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mbr::{Fit, Mbr, TYPE_PRIMARY};
    use crate::testutil;
    use crate::{disk, util};
    use std::path::PathBuf;

    pub(crate) fn formatted_volume(tag: &str, kind: FsKind) -> (MountRegistry, String, PathBuf) {
        let path = testutil::temp_path(tag);
        disk::create_disk(&path, 5 << 20, Fit::First).unwrap();
        let mut file = disk::open_disk(&path).unwrap();
        let mut mbr = Mbr::read(&mut file).unwrap();
        mbr.create_partition(1 << 20, TYPE_PRIMARY, "P1").unwrap();
        mbr.write(&mut file).unwrap();
        drop(file);

        let mut registry = MountRegistry::default();
        let id = registry.mount(&path, "P1").unwrap();
        format(&registry, &id, kind).unwrap();
        (registry, id, path)
    }

    #[test]
    fn budget_formula() {
        assert_eq!(inode_budget(1 << 20, FsKind::Ext2), (1048576 - 76) / 284);
        assert_eq!(inode_budget(1 << 20, FsKind::Ext3), (1048576 - 76) / 398);
        assert_eq!(inode_budget(10, FsKind::Ext2), 0);
    }

    #[test]
    fn regions_are_ordered_and_adjacent() {
        let n = 100;
        let l = layout(1000, n, FsKind::Ext2);
        assert_eq!(l.bm_inode_start, 1000 + 76);
        assert_eq!(l.bm_block_start, l.bm_inode_start + n);
        assert_eq!(l.inode_start, l.bm_block_start + 3 * n);
        assert_eq!(l.block_start, l.inode_start + n * 88);

        let l3 = layout(1000, n, FsKind::Ext3);
        assert_eq!(l3.bm_inode_start, 1000 + 76 + n * 114);
    }

    #[test]
    fn bootstrap_state() {
        let (registry, id, path) = formatted_volume("mkfs-bootstrap", FsKind::Ext2);
        let (mut file, mbr, index) = registry.open(&id).unwrap();
        let part = mbr.partitions[index];
        let sb = Superblock::read(&mut file, part.start as u64).unwrap();

        assert_eq!({ sb.magic }, MAGIC);
        assert_eq!({ sb.mnt_count }, 1);
        assert_eq!({ sb.inodes_count }, 2);
        assert_eq!({ sb.blocks_count }, 2);
        let n = sb.total_inodes();
        assert_eq!({ sb.free_inodes_count }, n - 2);
        assert_eq!(sb.total_blocks(), 3 * n);

        let root = sb.read_inode(&mut file, 0).unwrap();
        assert!(root.is_dir());
        assert_eq!({ root.size }, 0);
        assert_eq!(root.blocks[0], 0);
        assert!(root.blocks[1..].iter().all(|b| *b == -1));

        let users = sb.read_inode(&mut file, 1).unwrap();
        assert!(users.is_file());
        assert_eq!({ users.size }, users::BOOTSTRAP.len() as i32);
        assert_eq!(users.blocks[0], 1);

        let dir = sb.read_folder_block(&mut file, 0).unwrap();
        assert_eq!(util::field_str(&dir.entries[0].name), ".");
        assert_eq!(util::field_str(&dir.entries[1].name), "..");
        assert_eq!(util::field_str(&dir.entries[2].name), "users.txt");
        assert_eq!({ dir.entries[2].inode }, 1);
        assert!(!dir.entries[3].is_used());

        assert!(sb.inode_allocated(&mut file, 0).unwrap());
        assert!(sb.inode_allocated(&mut file, 1).unwrap());
        assert!(!sb.inode_allocated(&mut file, 2).unwrap());
        assert!(sb.block_allocated(&mut file, 0).unwrap());
        assert!(sb.block_allocated(&mut file, 1).unwrap());

        let block = sb.read_file_block(&mut file, 1).unwrap();
        let text: String = block.content.iter().take_while(|b| **b != 0).map(|b| *b as char).collect();
        assert_eq!(text, users::BOOTSTRAP);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn ext3_journals_the_bootstrap() {
        let (registry, id, path) = formatted_volume("mkfs-ext3", FsKind::Ext3);
        let (mut file, mbr, index) = registry.open(&id).unwrap();
        let part = mbr.partitions[index];
        let sb = Superblock::read(&mut file, part.start as u64).unwrap();
        assert_eq!(sb.kind().unwrap(), FsKind::Ext3);

        let entries = journal::read_all(&mut file, &sb, part.start as u64).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].operation_str(), "mkdir");
        assert_eq!(entries[0].path_str(), "/");
        assert_eq!({ entries[0].count }, 0);
        assert_eq!(entries[1].operation_str(), "mkfile");
        assert_eq!(entries[1].path_str(), "/users.txt");
        assert_eq!({ entries[1].count }, 1);

        std::fs::remove_file(&path).unwrap();
    }
}
