//! The filesystem engine: opening a formatted partition through its mount id,
//! resolving absolute paths from the root inode and managing directory
//! entries. The operation submodules build on these primitives.

pub mod dir;
pub mod file;
pub mod find;
pub mod remove;
pub mod rename;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::inode::DIRECT_SLOTS;
use crate::journal;
use crate::mount::MountRegistry;
use crate::superblock::{Superblock, MAGIC};
use crate::util;
use std::fs::File;
use std::io;

/// Traversal depth cap for recursive walks (`find`, `remove`).
pub const MAX_DEPTH: usize = 64;

/// Location of one directory entry: owning block, slot in it, child inode.
#[derive(Clone, Copy, Debug)]
pub struct EntryRef {
    pub block: i32,
    pub slot: usize,
    pub inode: i32,
}

/// A formatted partition opened for a sequence of operations.
///
/// Holds the backing file, the decoded superblock and the partition's start
/// offset. The superblock is mutated in memory and written back by [`sync`].
///
/// [`sync`]: FsVolume::sync
pub struct FsVolume {
    pub file: File,
    pub sb: Superblock,
    pub sb_offset: u64,
}

impl FsVolume {
    /// Opens the formatted partition mounted as `id`.
    pub fn open(registry: &MountRegistry, id: &str) -> Result<Self> {
        let (mut file, mbr, index) = registry.open(id)?;
        let start = mbr.partitions[index].start as u64;
        let sb = Superblock::read(&mut file, start)?;
        if sb.magic != MAGIC {
            return Err(Error::InvalidState(format!(
                "partition `{id}` is not formatted"
            )));
        }
        Ok(Self {
            file,
            sb,
            sb_offset: start,
        })
    }

    /// Opens the partition the active session was logged into.
    pub fn open_session(ctx: &Context) -> Result<Self> {
        let session = ctx.session()?;
        Self::open(&ctx.mounts, &session.mount_id)
    }

    /// Writes the in-memory superblock back to disk.
    pub fn sync(&mut self) -> io::Result<()> {
        self.sb.write(&mut self.file, self.sb_offset)
    }

    /// Appends a journal record; a no-op on EXT2.
    pub fn journal(&mut self, operation: &str, path: &str, content: &str) -> io::Result<()> {
        journal::append(
            &mut self.file,
            &self.sb,
            self.sb_offset,
            operation,
            path,
            content,
        )
    }

    /// Locates the entry named `name` inside the directory at `dir_inode`,
    /// matching case-insensitively and skipping `.`/`..`.
    pub fn locate_entry(&mut self, dir_inode: i32, name: &str) -> Result<Option<EntryRef>> {
        let inode = self.sb.read_inode(&mut self.file, dir_inode)?;
        if !inode.is_dir() {
            return Err(Error::InvalidState(format!(
                "inode {dir_inode} is not a directory"
            )));
        }
        for slot in 0..DIRECT_SLOTS {
            let block = inode.blocks[slot];
            if block == -1 {
                break;
            }
            let folder = self.sb.read_folder_block(&mut self.file, block)?;
            for (i, entry) in folder.entries.iter().enumerate().skip(2) {
                if entry.is_used() && util::field_eq(&entry.name, name) {
                    return Ok(Some(EntryRef {
                        block,
                        slot: i,
                        inode: entry.inode,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// The inode referenced by `name` inside `dir_inode`, if present.
    pub fn find_entry(&mut self, dir_inode: i32, name: &str) -> Result<Option<i32>> {
        Ok(self.locate_entry(dir_inode, name)?.map(|e| e.inode))
    }

    /// Descends from the root inode through `segments`, asserting each one
    /// resolves to a directory. Returns the final directory inode.
    pub fn resolve_dir(&mut self, segments: &[String]) -> Result<i32> {
        let mut current = 0;
        for segment in segments {
            let child = self.find_entry(current, segment)?.ok_or_else(|| {
                Error::NotFound(format!("directory `{segment}` does not exist"))
            })?;
            let inode = self.sb.read_inode(&mut self.file, child)?;
            if !inode.is_dir() {
                return Err(Error::NotFound(format!("`{segment}` is not a directory")));
            }
            current = child;
        }
        Ok(current)
    }

    /// Resolves an absolute path to a regular-file inode.
    pub fn resolve_file(&mut self, path: &str) -> Result<i32> {
        let (segments, leaf) = split_path(path)?;
        let parent = self.resolve_dir(&segments)?;
        let index = self
            .find_entry(parent, &leaf)?
            .ok_or_else(|| Error::NotFound(format!("file `{path}` does not exist")))?;
        let inode = self.sb.read_inode(&mut self.file, index)?;
        if !inode.is_file() {
            return Err(Error::NotFound(format!("`{path}` is not a regular file")));
        }
        Ok(index)
    }

    /// Registers `(name, child_inode)` in the first vacant slot (index >= 2)
    /// of the directory's folder blocks, allocating a fresh folder block in
    /// the directory's next free direct slot when every block is full.
    pub fn claim_entry_slot(
        &mut self,
        dir_inode: i32,
        name: &str,
        child_inode: i32,
    ) -> Result<()> {
        use crate::block::{FolderBlock, FolderEntry};
        let mut inode = self.sb.read_inode(&mut self.file, dir_inode)?;
        for slot in 0..DIRECT_SLOTS {
            let block = inode.blocks[slot];
            if block == -1 {
                let block = self.sb.assign_block_at(&mut self.file, &mut inode, slot)?;
                let mut folder = FolderBlock::empty();
                folder.entries[2] = FolderEntry::new(name, child_inode);
                self.sb.write_folder_block(&mut self.file, block, &folder)?;
                self.sb.write_inode(&mut self.file, dir_inode, &inode)?;
                return Ok(());
            }
            let mut folder = self.sb.read_folder_block(&mut self.file, block)?;
            for i in 2..folder.entries.len() {
                if !folder.entries[i].is_used() {
                    folder.entries[i] = FolderEntry::new(name, child_inode);
                    self.sb.write_folder_block(&mut self.file, block, &folder)?;
                    return Ok(());
                }
            }
        }
        Err(Error::InsufficientSpace(format!(
            "directory inode {dir_inode} has no room for `{name}`"
        )))
    }
}

/// Splits an absolute slash-separated path into its parent segments and the
/// final component.
pub fn split_path(path: &str) -> Result<(Vec<String>, String)> {
    if !path.starts_with('/') {
        return Err(Error::InvalidArgument(format!(
            "path `{path}` is not absolute"
        )));
    }
    let mut segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    let leaf = segments
        .pop()
        .ok_or_else(|| Error::InvalidArgument("path has no final component".into()))?;
    Ok((segments, leaf))
}

/// Splits a path into every component, accepting the bare root.
pub fn components(path: &str) -> Result<Vec<String>> {
    if !path.starts_with('/') {
        return Err(Error::InvalidArgument(format!(
            "path `{path}` is not absolute"
        )));
    }
    Ok(path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_splitting() {
        let (parents, leaf) = split_path("/home/user/a.txt").unwrap();
        assert_eq!(parents, vec!["home".to_owned(), "user".to_owned()]);
        assert_eq!(leaf, "a.txt");

        let (parents, leaf) = split_path("/top").unwrap();
        assert!(parents.is_empty());
        assert_eq!(leaf, "top");

        assert!(split_path("relative/path").is_err());
        assert!(split_path("/").is_err());
        assert_eq!(components("/").unwrap().len(), 0);
        assert_eq!(components("/a/b").unwrap().len(), 2);
    }
}
