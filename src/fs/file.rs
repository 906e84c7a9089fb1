//! Regular-file operations: creation, reading and in-place editing.

use super::{split_path, FsVolume};
use crate::block::{split_content, FileBlock, PointerBlock};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::inode::{Inode, DIRECT_SLOTS, OVERFLOW_SLOT};

/// Synthesizes default file content: `0123456789` repeated up to `size`.
pub fn synth_content(size: usize) -> String {
    let mut content = String::with_capacity(size);
    while content.len() < size {
        content.push_str("0123456789");
    }
    content.truncate(size);
    content
}

/// Resolves the effective content of a new file from the `-size`/`-cont`
/// pair: synthesized digits when no content is given, otherwise the content
/// truncated to `size` when it is longer.
pub fn effective_content(size: Option<usize>, content: Option<String>) -> String {
    match content {
        None => synth_content(size.unwrap_or(0)),
        Some(c) => {
            let size = size.unwrap_or(c.len());
            if c.len() >= size && c.is_char_boundary(size) {
                c[..size].to_owned()
            } else {
                c
            }
        }
    }
}

/// Creates the file at `path` with the given content.
///
/// With `recursive`, missing parent directories are created first. The
/// content is split into 64-byte blocks filling the twelve direct slots and
/// overflowing through the pointer block anchored at the last inode slot.
pub fn mkfile(
    ctx: &Context,
    path: &str,
    recursive: bool,
    size: Option<usize>,
    content: Option<String>,
) -> Result<String> {
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
            None if recursive => {
                current = super::dir::create_directory(&mut vol, current, segment, &walked)?
            }
            None => {
                return Err(Error::NotFound(format!(
                    "parent directory `{walked}` does not exist"
                )))
            }
        }
    }

    if vol.find_entry(current, &leaf)?.is_some() {
        return Err(Error::AlreadyExists(format!("`{path}` already exists")));
    }

    let content = effective_content(size, content);
    vol.journal("mkfile", path, &content)?;
    let child = vol.sb.allocate_inode(&mut vol.file)?;
    vol.claim_entry_slot(current, &leaf, child)?;

    let mut inode = Inode::new_file(content.len() as i32, b"664");
    for (k, chunk) in split_content(&content).iter().enumerate() {
        let block = assign_chunk_block(&mut vol, &mut inode, k)?;
        vol.sb.write_file_block(&mut vol.file, block, chunk)?;
    }
    vol.sb.write_inode(&mut vol.file, child, &inode)?;
    vol.sync()?;
    Ok(format!("file `{path}` created ({} bytes)\n", content.len()))
}

/// Allocates the block backing chunk `k` of a file.
///
/// Chunks 0..11 take the direct slots. Later chunks ride the pointer block
/// anchored at the last inode slot, one indirection deep; slot 12 stays
/// untouched.
fn assign_chunk_block(vol: &mut FsVolume, inode: &mut Inode, k: usize) -> Result<i32> {
    if k < DIRECT_SLOTS {
        return vol.sb.assign_block_at(&mut vol.file, inode, k);
    }
    let anchor = if inode.blocks[OVERFLOW_SLOT] == -1 {
        let index = vol
            .sb
            .assign_block_at(&mut vol.file, inode, OVERFLOW_SLOT)?;
        vol.sb
            .write_pointer_block(&mut vol.file, index, &PointerBlock::empty())?;
        index
    } else {
        inode.blocks[OVERFLOW_SLOT]
    };
    let mut pointers = vol.sb.read_pointer_block(&mut vol.file, anchor)?;
    let cell = pointers.free_cell().ok_or_else(|| {
        Error::InsufficientSpace("file exceeds the pointer block capacity".into())
    })?;
    let data = vol.sb.allocate_block(&mut vol.file)?;
    pointers.pointers[cell] = data as i64;
    vol.sb.write_pointer_block(&mut vol.file, anchor, &pointers)?;
    Ok(data)
}

/// Reads the content of the file at inode `index`: the concatenation of its
/// assigned direct blocks, trailing NULs trimmed. Refreshes the access time.
pub fn read_file(vol: &mut FsVolume, index: i32) -> Result<String> {
    let mut inode = vol.sb.read_inode(&mut vol.file, index)?;
    if !inode.is_file() {
        return Err(Error::InvalidState(format!("inode {index} is not a file")));
    }
    let mut bytes = Vec::new();
    for slot in 0..DIRECT_SLOTS {
        let block = inode.blocks[slot];
        if block == -1 {
            break;
        }
        let data = vol.sb.read_file_block(&mut vol.file, block)?;
        bytes.extend_from_slice(&data.content);
    }
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    inode.touch_atime();
    vol.sb.write_inode(&mut vol.file, index, &inode)?;
    Ok(bytes.iter().map(|b| *b as char).collect())
}

/// Prints the content of one or more files, in argument order.
pub fn cat(ctx: &Context, paths: &[String]) -> Result<String> {
    let mut vol = FsVolume::open_session(ctx)?;
    let mut out = String::new();
    for path in paths {
        let index = vol.resolve_file(path)?;
        out.push_str(&read_file(&mut vol, index)?);
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }
    Ok(out)
}

/// Replaces the content of the file at `path` with the content of the file
/// at `content_path` (both inside the filesystem).
pub fn edit(ctx: &Context, path: &str, content_path: &str) -> Result<String> {
    let mut vol = FsVolume::open_session(ctx)?;
    let target = vol.resolve_file(path)?;
    let source = vol.resolve_file(content_path)?;
    let content = read_file(&mut vol, source)?;
    write_file_content(&mut vol, target, &content)?;
    vol.sync()?;
    Ok(format!("file `{path}` rewritten ({} bytes)\n", content.len()))
}

/// Rewrites a file's content in place.
///
/// Assigned direct blocks are zeroed but stay assigned; each new chunk reuses
/// the block already at its position or allocates one (direct first, then
/// through the overflow pointer block). Size and modification times are
/// updated.
pub(crate) fn write_file_content(vol: &mut FsVolume, index: i32, content: &str) -> Result<()> {
    let mut inode = vol.sb.read_inode(&mut vol.file, index)?;
    if !inode.is_file() {
        return Err(Error::InvalidState(format!("inode {index} is not a file")));
    }
    for slot in 0..DIRECT_SLOTS {
        let block = inode.blocks[slot];
        if block != -1 {
            vol.sb
                .write_file_block(&mut vol.file, block, &FileBlock::empty())?;
        }
    }
    for (k, chunk) in split_content(content).iter().enumerate() {
        let block = if k < DIRECT_SLOTS && inode.blocks[k] != -1 {
            inode.blocks[k]
        } else {
            assign_chunk_block(vol, &mut inode, k)?
        };
        vol.sb.write_file_block(&mut vol.file, block, chunk)?;
    }
    inode.size = content.len() as i32;
    inode.touch_mtime();
    vol.sb.write_inode(&mut vol.file, index, &inode)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::dir;
    use crate::superblock::FsKind;
    use crate::testutil::session_context;

    #[test]
    fn synth_and_effective_content() {
        assert_eq!(synth_content(0), "");
        assert_eq!(synth_content(4), "0123");
        assert_eq!(synth_content(12), "012345678901");

        assert_eq!(effective_content(Some(5), None), "01234");
        assert_eq!(effective_content(Some(3), Some("ABCDEF".into())), "ABC");
        assert_eq!(effective_content(Some(9), Some("ABC".into())), "ABC");
        assert_eq!(effective_content(None, Some("ABC".into())), "ABC");
    }

    #[test]
    fn create_and_cat() {
        let (ctx, path) = session_context("file-cat", FsKind::Ext2);
        dir::mkdir(&ctx, "/home", false).unwrap();
        mkfile(
            &ctx,
            "/home/a.txt",
            false,
            Some(15),
            Some("ABCDEFGHIJKLMNO".into()),
        )
        .unwrap();

        let out = cat(&ctx, &["/home/a.txt".to_owned()]).unwrap();
        assert_eq!(out, "ABCDEFGHIJKLMNO\n");

        // Missing parents without -r fail; with -r they are created.
        assert!(mkfile(&ctx, "/x/y.txt", false, Some(4), None).is_err());
        mkfile(&ctx, "/x/y.txt", true, Some(4), None).unwrap();
        assert_eq!(cat(&ctx, &["/x/y.txt".to_owned()]).unwrap(), "0123\n");

        // Duplicate names are rejected.
        assert!(mkfile(&ctx, "/home/a.txt", false, Some(1), None).is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn multi_block_files() {
        let (ctx, path) = session_context("file-multiblock", FsKind::Ext2);
        let content: String = (0..200).map(|i| ((i % 26) as u8 + b'a') as char).collect();
        mkfile(&ctx, "/big.txt", false, None, Some(content.clone())).unwrap();

        let mut vol = FsVolume::open_session(&ctx).unwrap();
        let index = vol.resolve_file("/big.txt").unwrap();
        let inode = vol.sb.read_inode(&mut vol.file, index).unwrap();
        // 200 bytes span four blocks.
        assert!(inode.blocks[..4].iter().all(|b| *b != -1));
        assert_eq!(inode.blocks[4], -1);
        assert_eq!(read_file(&mut vol, index).unwrap(), content);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn overflow_rides_the_last_slot() {
        let (ctx, path) = session_context("file-overflow", FsKind::Ext2);
        // 14 blocks: 12 direct + 2 through the pointer block.
        let content = "z".repeat(64 * 14);
        mkfile(&ctx, "/huge.txt", false, None, Some(content)).unwrap();

        let mut vol = FsVolume::open_session(&ctx).unwrap();
        let index = vol.resolve_file("/huge.txt").unwrap();
        let inode = vol.sb.read_inode(&mut vol.file, index).unwrap();
        assert!(inode.blocks[..12].iter().all(|b| *b != -1));
        assert_eq!(inode.blocks[12], -1);
        assert_eq!(inode.blocks[13], -1);
        let anchor = inode.blocks[14];
        assert!(anchor != -1);
        let pointers = vol.sb.read_pointer_block(&mut vol.file, anchor).unwrap();
        assert!(pointers.pointers[0] > 0);
        assert!(pointers.pointers[1] > 0);
        assert_eq!({ pointers.pointers[2] }, -1);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn edit_replaces_content_in_place() {
        let (ctx, path) = session_context("file-edit", FsKind::Ext2);
        mkfile(&ctx, "/a.txt", false, None, Some("old content here".into())).unwrap();
        mkfile(&ctx, "/b.txt", false, None, Some("NEW".into())).unwrap();

        let mut vol = FsVolume::open_session(&ctx).unwrap();
        let index = vol.resolve_file("/a.txt").unwrap();
        let before = vol.sb.read_inode(&mut vol.file, index).unwrap();
        drop(vol);

        edit(&ctx, "/a.txt", "/b.txt").unwrap();

        let a = cat(&ctx, &["/a.txt".to_owned()]).unwrap();
        let b = cat(&ctx, &["/b.txt".to_owned()]).unwrap();
        assert_eq!(a, b);

        // The first block index survives the rewrite.
        let mut vol = FsVolume::open_session(&ctx).unwrap();
        let after = vol.sb.read_inode(&mut vol.file, index).unwrap();
        assert_eq!(before.blocks[0], after.blocks[0]);
        assert_eq!({ after.size }, 3);
        std::fs::remove_file(&path).unwrap();
    }
}
