//! File and directory removal, releasing inodes and blocks back to the
//! bitmaps.

use super::{split_path, FsVolume, MAX_DEPTH};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::inode::DIRECT_SLOTS;

/// Removes the entry at `path`: as a file if it is one, otherwise as a
/// directory together with everything below it.
pub fn remove(ctx: &Context, path: &str) -> Result<String> {
    let mut vol = FsVolume::open_session(ctx)?;
    let (segments, leaf) = split_path(path)?;
    let parent = vol.resolve_dir(&segments)?;
    let entry = vol
        .locate_entry(parent, &leaf)?
        .ok_or_else(|| Error::NotFound(format!("`{path}` does not exist")))?;

    let inode = vol.sb.read_inode(&mut vol.file, entry.inode)?;
    if inode.is_file() {
        release_file(&mut vol, entry.inode)?;
    } else {
        release_dir(&mut vol, entry.inode, 0)?;
    }

    // Detach from the parent directory.
    let mut folder = vol.sb.read_folder_block(&mut vol.file, entry.block)?;
    folder.entries[entry.slot].inode = -1;
    folder.entries[entry.slot].name = [0; 12];
    vol.sb
        .write_folder_block(&mut vol.file, entry.block, &folder)?;

    vol.sync()?;
    Ok(format!("`{path}` removed\n"))
}

/// Frees every assigned direct block of a file inode, then the inode itself.
fn release_file(vol: &mut FsVolume, index: i32) -> Result<()> {
    let inode = vol.sb.read_inode(&mut vol.file, index)?;
    for slot in 0..DIRECT_SLOTS {
        let block = inode.blocks[slot];
        if block != -1 {
            vol.sb.free_block(&mut vol.file, block)?;
        }
    }
    vol.sb.free_inode(&mut vol.file, index)
}

/// Recursively frees a directory: children first, then its own folder blocks
/// and inode.
fn release_dir(vol: &mut FsVolume, index: i32, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::InvalidState("directory tree is too deep".into()));
    }
    let inode = vol.sb.read_inode(&mut vol.file, index)?;
    for slot in 0..DIRECT_SLOTS {
        let block = inode.blocks[slot];
        if block == -1 {
            break;
        }
        let folder = vol.sb.read_folder_block(&mut vol.file, block)?;
        for entry in folder.entries.iter().skip(2) {
            if !entry.is_used() {
                continue;
            }
            let child = vol.sb.read_inode(&mut vol.file, entry.inode)?;
            if child.is_file() {
                release_file(vol, entry.inode)?;
            } else {
                release_dir(vol, entry.inode, depth + 1)?;
            }
        }
        vol.sb.free_block(&mut vol.file, block)?;
    }
    vol.sb.free_inode(&mut vol.file, index)
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::fs::{dir, file, find, FsVolume};
    use crate::superblock::FsKind;
    use crate::testutil::session_context;

    #[test]
    fn remove_file_releases_slots() {
        let (ctx, path) = session_context("remove-file", FsKind::Ext2);
        file::mkfile(&ctx, "/a.txt", false, Some(100), None).unwrap();

        let mut vol = FsVolume::open_session(&ctx).unwrap();
        let index = vol.resolve_file("/a.txt").unwrap();
        let inode = vol.sb.read_inode(&mut vol.file, index).unwrap();
        let blocks: Vec<i32> = inode.blocks[..2].to_vec();
        let counts = ({ vol.sb.inodes_count }, { vol.sb.blocks_count });
        drop(vol);

        super::remove(&ctx, "/a.txt").unwrap();

        let mut vol = FsVolume::open_session(&ctx).unwrap();
        assert!(!vol.sb.inode_allocated(&mut vol.file, index).unwrap());
        for b in blocks {
            assert!(!vol.sb.block_allocated(&mut vol.file, b).unwrap());
        }
        assert_eq!({ vol.sb.inodes_count }, counts.0 - 1);
        assert_eq!({ vol.sb.blocks_count }, counts.1 - 2);
        drop(vol);

        assert_eq!(find::find(&ctx, "/", "a.txt").unwrap(), "");
        assert!(matches!(
            super::remove(&ctx, "/a.txt"),
            Err(Error::NotFound(_))
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn remove_directory_recurses() {
        let (ctx, path) = session_context("remove-dir", FsKind::Ext2);
        dir::mkdir(&ctx, "/home/docs", true).unwrap();
        file::mkfile(&ctx, "/home/a.txt", false, Some(5), None).unwrap();
        file::mkfile(&ctx, "/home/docs/b.txt", false, Some(5), None).unwrap();

        let mut vol = FsVolume::open_session(&ctx).unwrap();
        let baseline = ({ vol.sb.inodes_count }, { vol.sb.blocks_count });
        drop(vol);

        super::remove(&ctx, "/home").unwrap();

        let mut vol = FsVolume::open_session(&ctx).unwrap();
        // Two dirs, two files and their four blocks are gone.
        assert_eq!({ vol.sb.inodes_count }, baseline.0 - 4);
        assert_eq!({ vol.sb.blocks_count }, baseline.1 - 4);
        assert!(vol.find_entry(0, "home").unwrap().is_none());
        drop(vol);

        assert_eq!(find::find(&ctx, "/", "*.txt").unwrap(), "/users.txt\n");
        std::fs::remove_file(&path).unwrap();
    }
}
