//! Directory creation.

use super::{split_path, FsVolume};
use crate::block::FolderBlock;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::inode::Inode;

/// Creates the directory at `path`.
///
/// With `parents`, missing intermediate directories are created on the fly;
/// without it, every parent must already exist. A directory that already
/// exists at the final component is not an error.
pub fn mkdir(ctx: &Context, path: &str, parents: bool) -> Result<String> {
    let mut vol = FsVolume::open_session(ctx)?;
    let (segments, leaf) = split_path(path)?;

    let mut current = 0;
    let mut walked = String::new();
    for segment in &segments {
        walked.push('/');
        walked.push_str(segment);
        match vol.find_entry(current, segment)? {
            Some(child) => {
                let inode = vol.sb.read_inode(&mut vol.file, child)?;
                if !inode.is_dir() {
                    return Err(Error::NotFound(format!("`{walked}` is not a directory")));
                }
                current = child;
            }
            None if parents => current = create_directory(&mut vol, current, segment, &walked)?,
            None => {
                return Err(Error::NotFound(format!(
                    "parent directory `{walked}` does not exist"
                )))
            }
        }
    }

    if vol.find_entry(current, &leaf)?.is_none() {
        create_directory(&mut vol, current, &leaf, path)?;
    }
    vol.sync()?;
    Ok(format!("directory `{path}` created\n"))
}

/// Allocates and links one new directory under `parent`. Returns its inode.
pub(super) fn create_directory(
    vol: &mut FsVolume,
    parent: i32,
    name: &str,
    full_path: &str,
) -> Result<i32> {
    vol.journal("mkdir", full_path, "")?;
    let child = vol.sb.allocate_inode(&mut vol.file)?;
    vol.claim_entry_slot(parent, name, child)?;
    let mut inode = Inode::new_dir(b"664");
    let block = vol.sb.assign_block_at(&mut vol.file, &mut inode, 0)?;
    vol.sb
        .write_folder_block(&mut vol.file, block, &FolderBlock::for_new_dir(child, parent))?;
    vol.sb.write_inode(&mut vol.file, child, &inode)?;
    Ok(child)
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::error::Error;
    use crate::fs::FsVolume;
    use crate::superblock::FsKind;
    use crate::testutil::session_context;

    #[test]
    fn mkdir_plain_and_missing_parent() {
        let (ctx, path) = session_context("mkdir-plain", FsKind::Ext2);
        super::mkdir(&ctx, "/home", false).unwrap();

        let mut vol = FsVolume::open_session(&ctx).unwrap();
        let home = vol.find_entry(0, "home").unwrap().unwrap();
        let inode = vol.sb.read_inode(&mut vol.file, home).unwrap();
        assert!(inode.is_dir());
        // The new directory's block carries its dot entries.
        let block = vol.sb.read_folder_block(&mut vol.file, inode.blocks[0]).unwrap();
        assert_eq!({ block.entries[0].inode }, home);
        assert_eq!({ block.entries[1].inode }, 0);

        let err = super::mkdir(&ctx, "/a/b/c", false);
        assert!(matches!(err, Err(Error::NotFound(_))));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn mkdir_recursive_is_idempotent() {
        let (ctx, path) = session_context("mkdir-p", FsKind::Ext2);
        super::mkdir(&ctx, "/a/b/c", true).unwrap();

        let mut vol = FsVolume::open_session(&ctx).unwrap();
        let counts_before = ({ vol.sb.inodes_count }, { vol.sb.blocks_count });
        let a = vol.find_entry(0, "a").unwrap().unwrap();
        let b = vol.find_entry(a, "b").unwrap().unwrap();
        assert!(vol.find_entry(b, "c").unwrap().is_some());
        drop(vol);

        // A second identical call changes nothing.
        super::mkdir(&ctx, "/a/b/c", true).unwrap();
        let mut vol = FsVolume::open_session(&ctx).unwrap();
        let counts_after = ({ vol.sb.inodes_count }, { vol.sb.blocks_count });
        assert_eq!(counts_before, counts_after);
        assert_eq!(vol.find_entry(0, "a").unwrap().unwrap(), a);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn mkdir_requires_session() {
        let ctx = Context::default();
        assert!(matches!(
            super::mkdir(&ctx, "/x", false),
            Err(Error::Forbidden(_))
        ));
    }
}
