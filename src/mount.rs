//! The mount registry: a process-wide mapping from partition ids to disk
//! images, plus the id synthesis rule.

use crate::disk;
use crate::error::{Error, Result};
use crate::mbr::Mbr;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Site token embedded in every mount id.
pub const CARNET: &str = "06";

/// Registry of mounted partitions.
#[derive(Default)]
pub struct MountRegistry {
    /// `partition id → disk image path`.
    mounts: HashMap<String, PathBuf>,
    /// Disks in first-mount order; the position gives the per-disk letter.
    disks: Vec<PathBuf>,
}

impl MountRegistry {
    /// The letter assigned to `path`, stable across every partition of the
    /// same disk image.
    fn letter_for(&mut self, path: &Path) -> char {
        let index = match self.disks.iter().position(|p| p == path) {
            Some(i) => i,
            None => {
                self.disks.push(path.to_path_buf());
                self.disks.len() - 1
            }
        };
        (b'A' + (index as u8 % 26)) as char
    }

    /// Mounts the partition named `name` of the disk at `path`.
    ///
    /// Returns the generated id `<carnet><slot+1><letter>`. Mounting the same
    /// partition twice is an error.
    pub fn mount(&mut self, path: &Path, name: &str) -> Result<String> {
        let mut file = disk::open_disk(path)?;
        let mut mbr = Mbr::read(&mut file)?;
        let index = mbr.find_by_name(name).ok_or_else(|| {
            Error::NotFound(format!("partition `{name}` does not exist on `{}`", path.display()))
        })?;
        let mut partition = mbr.partitions[index];
        let letter = self.letter_for(path);
        let id = format!("{CARNET}{}{}", index + 1, letter);
        if self.mounts.contains_key(&id) {
            return Err(Error::AlreadyExists(format!(
                "partition `{name}` is already mounted as `{id}`"
            )));
        }
        partition.set_mounted(index as i32 + 1, &id);
        mbr.partitions[index] = partition;
        mbr.write(&mut file)?;
        self.mounts.insert(id.clone(), path.to_path_buf());
        Ok(id)
    }

    /// Unmounts the partition with the given id, clearing its mount marker.
    pub fn unmount(&mut self, id: &str) -> Result<()> {
        let path = self
            .mounts
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no partition is mounted as `{id}`")))?;
        let mut file = disk::open_disk(&path)?;
        let mut mbr = Mbr::read(&mut file)?;
        if let Some(index) = mbr.find_by_id(id) {
            let mut partition = mbr.partitions[index];
            partition.set_unmounted();
            mbr.partitions[index] = partition;
            mbr.write(&mut file)?;
        }
        self.mounts.remove(id);
        Ok(())
    }

    /// The disk image backing the given mount id.
    pub fn path_of(&self, id: &str) -> Result<&Path> {
        self.mounts
            .get(id)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::NotFound(format!("no partition is mounted as `{id}`")))
    }

    /// Opens the disk of a mounted partition and locates its table slot.
    pub fn open(&self, id: &str) -> Result<(File, Mbr, usize)> {
        let path = self.path_of(id)?;
        let mut file = disk::open_disk(path)?;
        let mbr = Mbr::read(&mut file)?;
        let index = mbr
            .find_by_id(id)
            .ok_or_else(|| Error::InvalidState(format!("mounted id `{id}` missing from the MBR")))?;
        Ok((file, mbr, index))
    }

    /// Human-readable listing of the current mounts.
    pub fn list(&self) -> String {
        let mut ids: Vec<_> = self.mounts.keys().collect();
        ids.sort();
        let mut out = String::new();
        for id in ids {
            let _ = writeln!(out, "{id}  {}", self.mounts[id].display());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mbr::{Fit, TYPE_PRIMARY};
    use crate::testutil;

    fn disk_with_partitions(tag: &str, names: &[&str]) -> PathBuf {
        let path = testutil::temp_path(tag);
        disk::create_disk(&path, 1 << 20, Fit::First).unwrap();
        let mut file = disk::open_disk(&path).unwrap();
        let mut mbr = Mbr::read(&mut file).unwrap();
        for name in names {
            mbr.create_partition(64 * 1024, TYPE_PRIMARY, name).unwrap();
        }
        mbr.write(&mut file).unwrap();
        path
    }

    #[test]
    fn ids_follow_carnet_slot_letter() {
        let path = disk_with_partitions("mount-ids", &["P1", "P2"]);
        let mut reg = MountRegistry::default();
        assert_eq!(reg.mount(&path, "P1").unwrap(), "061A");
        assert_eq!(reg.mount(&path, "P2").unwrap(), "062A");

        let other = disk_with_partitions("mount-ids2", &["P1"]);
        assert_eq!(reg.mount(&other, "P1").unwrap(), "061B");

        std::fs::remove_file(&path).unwrap();
        std::fs::remove_file(&other).unwrap();
    }

    #[test]
    fn remount_is_rejected_and_unmount_clears() {
        let path = disk_with_partitions("mount-re", &["P1"]);
        let mut reg = MountRegistry::default();
        let id = reg.mount(&path, "P1").unwrap();
        assert!(matches!(reg.mount(&path, "P1"), Err(Error::AlreadyExists(_))));

        reg.unmount(&id).unwrap();
        assert!(reg.path_of(&id).is_err());

        // The MBR slot was wiped clean.
        let mut file = disk::open_disk(&path).unwrap();
        let mbr = Mbr::read(&mut file).unwrap();
        let p = mbr.partitions[0];
        assert_eq!({ p.correlative }, 0);
        assert_eq!(p.id_str(), "");

        // And the partition can be mounted again.
        assert_eq!(reg.mount(&path, "P1").unwrap(), id);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unknown_partition_or_id() {
        let path = disk_with_partitions("mount-unknown", &["P1"]);
        let mut reg = MountRegistry::default();
        assert!(matches!(reg.mount(&path, "NOPE"), Err(Error::NotFound(_))));
        assert!(matches!(reg.unmount("069Z"), Err(Error::NotFound(_))));
        std::fs::remove_file(&path).unwrap();
    }
}
