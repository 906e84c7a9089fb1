//! In-place renaming of directory entries.

use super::{split_path, FsVolume};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::inode::DIRECT_SLOTS;
use crate::util;

/// Renames the entry at `path` to `new_name` inside its parent directory.
///
/// The referenced inode is untouched; only the 12-byte name field of the
/// parent entry changes. A sibling already named `new_name` is an error.
pub fn rename(ctx: &Context, path: &str, new_name: &str) -> Result<String> {
    if new_name.is_empty() || new_name.contains('/') {
        return Err(Error::InvalidArgument(format!(
            "`{new_name}` is not a valid entry name"
        )));
    }
    let mut vol = FsVolume::open_session(ctx)?;
    let (segments, old_name) = split_path(path)?;
    let parent = vol.resolve_dir(&segments)?;

    if vol.find_entry(parent, new_name)?.is_some() {
        return Err(Error::AlreadyExists(format!(
            "an entry named `{new_name}` already exists"
        )));
    }

    let parent_inode = vol.sb.read_inode(&mut vol.file, parent)?;
    for slot in 0..DIRECT_SLOTS {
        let block = parent_inode.blocks[slot];
        if block == -1 {
            break;
        }
        let mut folder = vol.sb.read_folder_block(&mut vol.file, block)?;
        for i in 2..folder.entries.len() {
            let entry = &mut folder.entries[i];
            if entry.is_used() && util::field_eq(&entry.name, &old_name) {
                entry.name = util::fixed(new_name);
                vol.sb.write_folder_block(&mut vol.file, block, &folder)?;
                return Ok(format!("`{old_name}` renamed to `{new_name}`\n"));
            }
        }
    }
    Err(Error::NotFound(format!("`{path}` does not exist")))
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::fs::{dir, file, find, FsVolume};
    use crate::superblock::FsKind;
    use crate::testutil::session_context;

    #[test]
    fn rename_keeps_the_inode() {
        let (ctx, path) = session_context("rename", FsKind::Ext2);
        dir::mkdir(&ctx, "/home", false).unwrap();
        file::mkfile(&ctx, "/home/a.txt", false, Some(5), None).unwrap();

        let mut vol = FsVolume::open_session(&ctx).unwrap();
        let before = vol.resolve_file("/home/a.txt").unwrap();
        drop(vol);

        super::rename(&ctx, "/home/a.txt", "b.txt").unwrap();

        let mut vol = FsVolume::open_session(&ctx).unwrap();
        assert!(vol.resolve_file("/home/a.txt").is_err());
        assert_eq!(vol.resolve_file("/home/b.txt").unwrap(), before);
        drop(vol);

        let out = find::find(&ctx, "/", "b.*").unwrap();
        assert_eq!(out, "/home/b.txt\n");

        // Renaming back restores the original tree.
        super::rename(&ctx, "/home/b.txt", "a.txt").unwrap();
        let mut vol = FsVolume::open_session(&ctx).unwrap();
        assert_eq!(vol.resolve_file("/home/a.txt").unwrap(), before);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn duplicate_and_missing_names() {
        let (ctx, path) = session_context("rename-dup", FsKind::Ext2);
        file::mkfile(&ctx, "/a.txt", false, Some(1), None).unwrap();
        file::mkfile(&ctx, "/b.txt", false, Some(1), None).unwrap();

        assert!(matches!(
            super::rename(&ctx, "/a.txt", "b.txt"),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            super::rename(&ctx, "/nope.txt", "c.txt"),
            Err(Error::NotFound(_))
        ));
        assert!(super::rename(&ctx, "/a.txt", "bad/name").is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
