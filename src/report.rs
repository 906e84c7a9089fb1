//! Read-only report emitters.
//!
//! Structural reports return a DOT graph description; bitmap, file and `ls`
//! reports return plain text. Rendering the DOT output is the caller's
//! concern; nothing here mutates on-disk state.

use crate::context::Context;
use crate::ebr;
use crate::error::{Error, Result};
use crate::fs::{components, file, FsVolume};
use crate::inode::DIRECT_SLOTS;
use crate::journal;
use crate::mbr::TYPE_EXTENDED;
use crate::util;
use std::fmt::Write as _;

/// Dispatches a report by kind. `target` is the in-filesystem path used by
/// the `file` and `ls` reports.
pub fn report(ctx: &Context, id: &str, name: &str, target: Option<&str>) -> Result<String> {
    match name.to_ascii_lowercase().as_str() {
        "mbr" => rep_mbr(ctx, id),
        "disk" => rep_disk(ctx, id),
        "sb" => rep_sb(ctx, id),
        "inode" => rep_inode(ctx, id),
        "block" => rep_block(ctx, id),
        "bm_inode" => rep_bitmap(ctx, id, true),
        "bm_block" => rep_bitmap(ctx, id, false),
        "file" => rep_file(ctx, id, target),
        "ls" => rep_ls(ctx, id, target.unwrap_or("/")),
        "journal" => rep_journal(ctx, id),
        other => Err(Error::InvalidArgument(format!("unknown report `{other}`"))),
    }
}

fn dot_header(title: &str) -> String {
    format!(
        "digraph report {{\n  rankdir=LR;\n  node [shape=plaintext];\n  label=\"{title}\";\n"
    )
}

fn table_row(out: &mut String, key: &str, value: &str) {
    let _ = writeln!(out, "      <TR><TD>{key}</TD><TD>{value}</TD></TR>");
}

fn rep_mbr(ctx: &Context, id: &str) -> Result<String> {
    let (mut file, mbr, _) = ctx.mounts.open(id)?;
    let mut out = dot_header("MBR");
    out.push_str("  mbr [label=<\n    <TABLE BORDER=\"0\" CELLBORDER=\"1\" CELLSPACING=\"0\">\n");
    table_row(&mut out, "mbr_size", &{ mbr.size }.to_string());
    table_row(&mut out, "mbr_signature", &{ mbr.signature }.to_string());
    table_row(&mut out, "disk_fit", &(mbr.disk_fit as char).to_string());
    out.push_str("    </TABLE>>];\n");
    for (i, p) in mbr.table().into_iter().enumerate() {
        if !p.is_used() {
            continue;
        }
        let _ = writeln!(
            out,
            "  part{i} [label=<\n    <TABLE BORDER=\"0\" CELLBORDER=\"1\" CELLSPACING=\"0\">"
        );
        table_row(&mut out, "name", &p.name_str());
        table_row(&mut out, "type", &(p.part_type as char).to_string());
        table_row(&mut out, "fit", &(p.fit as char).to_string());
        table_row(&mut out, "start", &{ p.start }.to_string());
        table_row(&mut out, "size", &{ p.size }.to_string());
        table_row(&mut out, "status", &(p.status as char).to_string());
        out.push_str("    </TABLE>>];\n");
        let _ = writeln!(out, "  mbr -> part{i};");
        if p.part_type == TYPE_EXTENDED {
            for (j, e) in ebr::collect(&mut file, { p.start })?.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "  ebr{i}_{j} [label=<\n    <TABLE BORDER=\"0\" CELLBORDER=\"1\" CELLSPACING=\"0\">"
                );
                table_row(&mut out, "name", &e.name_str());
                table_row(&mut out, "start", &{ e.start }.to_string());
                table_row(&mut out, "size", &{ e.size }.to_string());
                table_row(&mut out, "next", &{ e.next }.to_string());
                out.push_str("    </TABLE>>];\n");
                let _ = writeln!(out, "  part{i} -> ebr{i}_{j};");
            }
        }
    }
    out.push_str("}\n");
    Ok(out)
}

fn rep_disk(ctx: &Context, id: &str) -> Result<String> {
    let (mut file, mbr, _) = ctx.mounts.open(id)?;
    let disk_size = mbr.size as f64;
    let mut out = dot_header("disk usage");
    out.push_str("  disk [label=<\n    <TABLE BORDER=\"0\" CELLBORDER=\"1\" CELLSPACING=\"0\"><TR>\n");
    let _ = writeln!(out, "      <TD>MBR</TD>");
    let mut covered = crate::mbr::MBR_SIZE as i64;
    for p in mbr.table() {
        if !p.is_used() {
            continue;
        }
        let pct = { p.size } as f64 * 100.0 / disk_size;
        if p.part_type == TYPE_EXTENDED {
            let mut inner = String::new();
            for e in ebr::collect(&mut file, { p.start })? {
                let lpct = { e.size } as f64 * 100.0 / disk_size;
                let _ = write!(inner, "<TD>{} {:.1}%</TD>", e.name_str(), lpct);
            }
            let _ = writeln!(out, "      <TD>extended {:.1}%</TD>{inner}", pct);
        } else {
            let _ = writeln!(out, "      <TD>{} {:.1}%</TD>", p.name_str(), pct);
        }
        covered += { p.size } as i64;
    }
    let free = ({ mbr.size } as i64 - covered).max(0);
    let _ = writeln!(out, "      <TD>free {:.1}%</TD>", free as f64 * 100.0 / disk_size);
    out.push_str("    </TR></TABLE>>];\n}\n");
    Ok(out)
}

fn rep_sb(ctx: &Context, id: &str) -> Result<String> {
    let vol = FsVolume::open(&ctx.mounts, id)?;
    let sb = vol.sb;
    let mut out = dot_header("superblock");
    out.push_str("  sb [label=<\n    <TABLE BORDER=\"0\" CELLBORDER=\"1\" CELLSPACING=\"0\">\n");
    table_row(&mut out, "filesystem_type", &{ sb.filesystem_type }.to_string());
    table_row(&mut out, "inodes_count", &{ sb.inodes_count }.to_string());
    table_row(&mut out, "blocks_count", &{ sb.blocks_count }.to_string());
    table_row(&mut out, "free_inodes_count", &{ sb.free_inodes_count }.to_string());
    table_row(&mut out, "free_blocks_count", &{ sb.free_blocks_count }.to_string());
    table_row(&mut out, "mnt_count", &{ sb.mnt_count }.to_string());
    table_row(&mut out, "magic", &format!("{:#x}", { sb.magic }));
    table_row(&mut out, "inode_size", &{ sb.inode_size }.to_string());
    table_row(&mut out, "block_size", &{ sb.block_size }.to_string());
    table_row(&mut out, "first_ino", &{ sb.first_ino }.to_string());
    table_row(&mut out, "first_blo", &{ sb.first_blo }.to_string());
    table_row(&mut out, "bm_inode_start", &{ sb.bm_inode_start }.to_string());
    table_row(&mut out, "bm_block_start", &{ sb.bm_block_start }.to_string());
    table_row(&mut out, "inode_start", &{ sb.inode_start }.to_string());
    table_row(&mut out, "block_start", &{ sb.block_start }.to_string());
    out.push_str("    </TABLE>>];\n}\n");
    Ok(out)
}

fn rep_inode(ctx: &Context, id: &str) -> Result<String> {
    let mut vol = FsVolume::open(&ctx.mounts, id)?;
    let mut out = dot_header("inodes");
    let total = vol.sb.total_inodes();
    for i in 0..total {
        if !vol.sb.inode_allocated(&mut vol.file, i)? {
            continue;
        }
        let inode = vol.sb.read_inode(&mut vol.file, i)?;
        let _ = writeln!(
            out,
            "  inode{i} [label=<\n    <TABLE BORDER=\"0\" CELLBORDER=\"1\" CELLSPACING=\"0\">"
        );
        table_row(&mut out, "index", &i.to_string());
        table_row(&mut out, "type", &(inode.kind as char).to_string());
        table_row(&mut out, "size", &{ inode.size }.to_string());
        table_row(&mut out, "uid/gid", &format!("{}/{}", { inode.uid }, { inode.gid }));
        table_row(&mut out, "perm", &util::field_str(&inode.perm));
        let blocks: Vec<String> = inode
            .blocks
            .iter()
            .map(|b| b.to_string())
            .collect();
        table_row(&mut out, "blocks", &blocks.join(","));
        out.push_str("    </TABLE>>];\n");
    }
    out.push_str("}\n");
    Ok(out)
}

fn rep_block(ctx: &Context, id: &str) -> Result<String> {
    let mut vol = FsVolume::open(&ctx.mounts, id)?;
    let mut out = dot_header("blocks");
    let total = vol.sb.total_inodes();
    for i in 0..total {
        if !vol.sb.inode_allocated(&mut vol.file, i)? {
            continue;
        }
        let inode = vol.sb.read_inode(&mut vol.file, i)?;
        for slot in 0..DIRECT_SLOTS {
            let b = inode.blocks[slot];
            if b == -1 {
                break;
            }
            let _ = writeln!(
                out,
                "  block{b} [label=<\n    <TABLE BORDER=\"0\" CELLBORDER=\"1\" CELLSPACING=\"0\">"
            );
            if inode.is_dir() {
                let folder = vol.sb.read_folder_block(&mut vol.file, b)?;
                table_row(&mut out, "folder block", &b.to_string());
                for e in folder.entries.iter() {
                    let inum = e.inode;
                    table_row(&mut out, &util::field_str(&e.name), &inum.to_string());
                }
            } else {
                let data = vol.sb.read_file_block(&mut vol.file, b)?;
                let text: String = data
                    .content
                    .iter()
                    .take_while(|c| **c != 0)
                    .map(|c| *c as char)
                    .filter(|c| !matches!(c, '<' | '>' | '&'))
                    .collect();
                table_row(&mut out, "file block", &b.to_string());
                table_row(&mut out, "content", &text);
            }
            out.push_str("    </TABLE>>];\n");
        }
    }
    out.push_str("}\n");
    Ok(out)
}

fn rep_bitmap(ctx: &Context, id: &str, inodes: bool) -> Result<String> {
    let mut vol = FsVolume::open(&ctx.mounts, id)?;
    let (start, count) = if inodes {
        (vol.sb.bm_inode_start as u64, vol.sb.total_inodes())
    } else {
        (vol.sb.bm_block_start as u64, vol.sb.total_blocks())
    };
    let mut out = String::new();
    for i in 0..count {
        let bit = crate::bitmap::test(&mut vol.file, start, i)?;
        out.push(if bit { '1' } else { '0' });
        if (i + 1) % 20 == 0 {
            out.push('\n');
        }
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

fn rep_file(ctx: &Context, id: &str, target: Option<&str>) -> Result<String> {
    let path = target.ok_or_else(|| {
        Error::InvalidArgument("the file report needs a target path".into())
    })?;
    let mut vol = FsVolume::open(&ctx.mounts, id)?;
    let index = vol.resolve_file(path)?;
    file::read_file(&mut vol, index)
}

fn rep_ls(ctx: &Context, id: &str, path: &str) -> Result<String> {
    let mut vol = FsVolume::open(&ctx.mounts, id)?;
    let segments = components(path)?;
    let dir = vol.resolve_dir(&segments)?;
    let inode = vol.sb.read_inode(&mut vol.file, dir)?;
    let mut out = format!(
        "{:<6} {:<6} {:<6} {:>8}  {}\n",
        "PERM", "UID", "GID", "SIZE", "NAME"
    );
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
            let _ = writeln!(
                out,
                "{:<6} {:<6} {:<6} {:>8}  {}",
                util::field_str(&child.perm),
                { child.uid },
                { child.gid },
                { child.size },
                util::field_str(&entry.name),
            );
        }
    }
    Ok(out)
}

fn rep_journal(ctx: &Context, id: &str) -> Result<String> {
    let mut vol = FsVolume::open(&ctx.mounts, id)?;
    let entries = journal::read_all(&mut vol.file, &vol.sb, vol.sb_offset)?;
    let mut out = dot_header("journal");
    for (i, j) in entries.iter().enumerate() {
        let _ = writeln!(
            out,
            "  journal{i} [label=<\n    <TABLE BORDER=\"0\" CELLBORDER=\"1\" CELLSPACING=\"0\">"
        );
        table_row(&mut out, "count", &{ j.count }.to_string());
        table_row(&mut out, "operation", &j.operation_str());
        table_row(&mut out, "path", &j.path_str());
        table_row(&mut out, "content", &j.content_str());
        out.push_str("    </TABLE>>];\n");
        if i > 0 {
            let _ = writeln!(out, "  journal{} -> journal{i};", i - 1);
        }
    }
    out.push_str("}\n");
    Ok(out)
}
