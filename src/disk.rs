//! Disk image lifecycle: creation of the zero-filled backing file with its
//! MBR, deletion, and the `lsblk` partition listing.

use crate::ebr;
use crate::error::{Error, Result};
use crate::mbr::{Fit, Mbr, TYPE_EXTENDED};
use crate::util::ByteSize;
use std::fmt::Write as _;
use std::fs;
use std::fs::OpenOptions;
use std::path::Path;

/// Creates a disk image of exactly `size` bytes at `path` and writes a fresh
/// MBR carrying the disk-wide fit policy.
pub fn create_disk(path: &Path, size: i64, fit: Fit) -> Result<()> {
    if size <= 0 {
        return Err(Error::InvalidArgument("disk size must be positive".into()));
    }
    if size > i32::MAX as i64 {
        return Err(Error::InvalidArgument(format!(
            "disk size {size} exceeds the addressable maximum"
        )));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.set_len(size as u64)?;
    Mbr::new(size as i32, fit).write(&mut file)?;
    Ok(())
}

/// Removes the backing file of a disk image.
pub fn remove_disk(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::NotFound(format!(
            "disk image `{}` does not exist",
            path.display()
        )));
    }
    fs::remove_file(path)?;
    Ok(())
}

/// Opens a disk image for reading and writing.
pub fn open_disk(path: &Path) -> Result<fs::File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| Error::NotFound(format!("cannot open disk `{}`: {e}", path.display())))
}

/// Creates a partition on the disk at `path`.
///
/// `P` and `E` go through the MBR fit policy; creating an extended partition
/// also writes its placeholder head EBR. `L` appends to the EBR chain of the
/// existing extended partition.
pub fn create_partition(path: &Path, size: i64, part_type: u8, name: &str) -> Result<()> {
    if size <= 0 || size > i32::MAX as i64 {
        return Err(Error::InvalidArgument(format!(
            "partition size {size} is out of range"
        )));
    }
    let size = size as i32;
    let mut file = open_disk(path)?;
    let mut mbr = Mbr::read(&mut file)?;
    match part_type {
        crate::mbr::TYPE_PRIMARY => {
            mbr.create_partition(size, part_type, name)?;
            mbr.write(&mut file)?;
        }
        TYPE_EXTENDED => {
            let index = mbr.create_partition(size, part_type, name)?;
            let p = mbr.partitions[index];
            ebr::write_head(&mut file, p.start, p.fit, name)?;
            mbr.write(&mut file)?;
        }
        b'L' => {
            let index = mbr.extended().ok_or_else(|| {
                Error::NotFound("the disk has no extended partition".into())
            })?;
            let p = mbr.partitions[index];
            ebr::create_logical(&mut file, p.start, p.size, size, p.fit, name)?;
        }
        other => {
            return Err(Error::InvalidArgument(format!(
                "partition type must be P, E or L, got `{}`",
                other as char
            )))
        }
    }
    Ok(())
}

/// Grows or shrinks the named partition by `delta` bytes.
pub fn resize_partition(path: &Path, name: &str, delta: i64) -> Result<()> {
    let mut file = open_disk(path)?;
    let mut mbr = Mbr::read(&mut file)?;
    let index = mbr
        .find_by_name(name)
        .ok_or_else(|| Error::NotFound(format!("partition `{name}` does not exist")))?;
    mbr.resize_partition(index, delta as i32)?;
    mbr.write(&mut file)?;
    Ok(())
}

/// Deletes the named partition; `full` also zeroes its byte range.
pub fn delete_partition(path: &Path, name: &str, full: bool) -> Result<()> {
    let mut file = open_disk(path)?;
    let mut mbr = Mbr::read(&mut file)?;
    let index = mbr
        .find_by_name(name)
        .ok_or_else(|| Error::NotFound(format!("partition `{name}` does not exist")))?;
    mbr.delete_partition(&mut file, index, full)?;
    mbr.write(&mut file)?;
    Ok(())
}

/// Lists the partitions of a disk image, walking the EBR chain of the
/// extended partition if present.
pub fn lsblk(path: &Path) -> Result<String> {
    let mut file = open_disk(path)?;
    let mbr = Mbr::read(&mut file)?;
    let mut out = String::new();
    let disk_size = mbr.size;
    let _ = writeln!(out, "disk {} ({})", path.display(), ByteSize(disk_size as u64));
    let _ = writeln!(
        out,
        "{:<16} {:<4} {:<3} {:>12} {:>12} {:<6}",
        "NAME", "TYPE", "FIT", "START", "SIZE", "STATUS"
    );
    for p in mbr.table() {
        if !p.is_used() {
            continue;
        }
        let (start, size, fit, status) = ({ p.start }, { p.size }, p.fit, p.status);
        let _ = writeln!(
            out,
            "{:<16} {:<4} {:<3} {:>12} {:>12} {:<6}",
            p.name_str(),
            p.part_type as char,
            fit as char,
            start,
            size,
            status as char,
        );
        if p.part_type == TYPE_EXTENDED {
            for e in ebr::collect(&mut file, start)? {
                let (estart, esize, efit) = ({ e.start }, { e.size }, e.fit);
                let _ = writeln!(
                    out,
                    "  {:<14} {:<4} {:<3} {:>12} {:>12} {:<6}",
                    e.name_str(),
                    'L',
                    efit as char,
                    estart,
                    esize,
                    e.mount as char,
                );
            }
        }
    }
    Ok(out)
}
