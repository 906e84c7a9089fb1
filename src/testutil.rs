//! Helpers for tests that need a scratch disk image on the host filesystem.

use crate::context::{Context, Session};
use crate::mbr::{Fit, Mbr, TYPE_PRIMARY};
use crate::superblock::FsKind;
use crate::{disk, mkfs};
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

static SEQ: AtomicU32 = AtomicU32::new(0);

/// Returns a unique path under the system temp directory.
pub fn temp_path(tag: &str) -> PathBuf {
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("vdisk-test-{}-{tag}-{n}.mia", std::process::id()))
}

/// A zero-filled scratch disk image removed on drop.
pub struct TempDisk {
    pub path: PathBuf,
}

impl TempDisk {
    /// Creates a zero-filled image of `size` bytes.
    pub fn create(tag: &str, size: u64) -> Self {
        let path = temp_path(tag);
        let file = File::create(&path).unwrap();
        file.set_len(size).unwrap();
        Self { path }
    }

    /// Opens the image for reading and writing.
    pub fn open(&self) -> File {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .unwrap()
    }
}

impl Drop for TempDisk {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Builds a 5 MiB disk with one formatted 1 MiB partition, mounts it and
/// opens a root session. Returns the context and the image path; the caller
/// removes the image.
pub fn session_context(tag: &str, kind: FsKind) -> (Context, PathBuf) {
    let path = temp_path(tag);
    disk::create_disk(&path, 5 << 20, Fit::First).unwrap();
    let mut file = disk::open_disk(&path).unwrap();
    let mut mbr = Mbr::read(&mut file).unwrap();
    mbr.create_partition(1 << 20, TYPE_PRIMARY, "P1").unwrap();
    mbr.write(&mut file).unwrap();
    drop(file);

    let mut ctx = Context::default();
    let id = ctx.mounts.mount(&path, "P1").unwrap();
    mkfs::format(&ctx.mounts, &id, kind).unwrap();
    ctx.session = Some(Session {
        user: "root".into(),
        group: "root".into(),
        uid: 1,
        mount_id: id,
    });
    (ctx, path)
}
