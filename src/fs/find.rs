//! Recursive name search with glob patterns.

use super::{components, FsVolume, MAX_DEPTH};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::inode::DIRECT_SLOTS;
use crate::util;
use std::fmt::Write as _;

/// Matches `name` against a glob where `?` is any single character, `*` any
/// sequence and every other character (`.` included) is literal.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            // Backtrack: let the star swallow one more character.
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Walks the tree under `path` and lists the full path of every entry whose
/// name matches the glob.
pub fn find(ctx: &Context, path: &str, pattern: &str) -> Result<String> {
    let mut vol = FsVolume::open_session(ctx)?;
    let segments = components(path)?;
    let start = vol.resolve_dir(&segments)?;
    let base = if path == "/" {
        String::new()
    } else {
        path.trim_end_matches('/').to_owned()
    };
    let mut out = String::new();
    walk(&mut vol, start, &base, pattern, 0, &mut out)?;
    Ok(out)
}

fn walk(
    vol: &mut FsVolume,
    dir_inode: i32,
    base: &str,
    pattern: &str,
    depth: usize,
    out: &mut String,
) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::InvalidState("directory tree is too deep".into()));
    }
    let inode = vol.sb.read_inode(&mut vol.file, dir_inode)?;
    if !inode.is_dir() {
        return Ok(());
    }
    for slot in 0..DIRECT_SLOTS {
        let block = inode.blocks[slot];
        if block == -1 {
            break;
        }
        let folder = vol.sb.read_folder_block(&mut vol.file, block)?;
        for entry in folder.entries.iter() {
            if !entry.is_used() {
                continue;
            }
            let name = util::field_str(&entry.name);
            // Dot links would loop the walk.
            if name == "." || name == ".." {
                continue;
            }
            let full = format!("{base}/{name}");
            if glob_match(pattern, &name) {
                let _ = writeln!(out, "{full}");
            }
            let child = vol.sb.read_inode(&mut vol.file, entry.inode)?;
            if child.is_dir() {
                walk(vol, entry.inode, &full, pattern, depth + 1, out)?;
            }
        }
    }
    Ok(())
}
