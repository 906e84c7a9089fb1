//! Master Boot Record: the 4-slot primary partition table written at the head
//! of every disk image, together with the fit policies used to place
//! partitions inside the disk.

use crate::ebr;
use crate::error::{Error, Result};
use crate::util;
use bytemuck::{Pod, Zeroable};
use std::fs::File;
use std::io;
use std::mem::size_of;

/// Partition slot sentinel: never used.
pub const STATUS_UNUSED: u8 = b'9';
/// Partition slot marker: created/active.
pub const STATUS_ACTIVE: u8 = b'1';

/// Partition type: primary.
pub const TYPE_PRIMARY: u8 = b'P';
/// Partition type: extended.
pub const TYPE_EXTENDED: u8 = b'E';
/// Partition type: unused slot.
pub const TYPE_UNUSED: u8 = b'0';

/// Size of the encoded MBR in bytes.
pub const MBR_SIZE: i32 = size_of::<Mbr>() as i32;

/// A fit policy for choosing among free partition slots.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fit {
    /// `BF`: smallest qualifying slot.
    Best,
    /// `FF`: first qualifying slot.
    First,
    /// `WF`: largest qualifying slot.
    Worst,
}

impl Fit {
    /// Parses a command-line fit flag (`BF`, `FF` or `WF`).
    pub fn from_flag(flag: &str) -> Result<Self> {
        match flag.to_ascii_uppercase().as_str() {
            "BF" => Ok(Self::Best),
            "FF" => Ok(Self::First),
            "WF" => Ok(Self::Worst),
            other => Err(Error::InvalidArgument(format!(
                "fit must be BF, FF or WF, got `{other}`"
            ))),
        }
    }

    /// The byte stored on disk for this policy.
    pub fn byte(self) -> u8 {
        match self {
            Self::Best => b'B',
            Self::First => b'F',
            Self::Worst => b'W',
        }
    }

    /// Decodes the on-disk policy byte.
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            b'B' => Ok(Self::Best),
            b'F' => Ok(Self::First),
            b'W' => Ok(Self::Worst),
            other => Err(Error::InvalidState(format!(
                "invalid fit byte `{}`",
                other as char
            ))),
        }
    }
}

/// One slot of the primary partition table.
#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Partition {
    /// `9` = never used, `1` = created.
    pub status: u8,
    /// `P` = primary, `E` = extended, `0` = unused.
    pub part_type: u8,
    /// Fit byte inherited from the disk (`B`/`F`/`W`).
    pub fit: u8,
    /// Byte offset from the start of the disk, `-1` when unused.
    pub start: i32,
    /// Size in bytes, `-1` when unused.
    pub size: i32,
    /// NUL-padded partition name.
    pub name: [u8; 16],
    /// Mount sequence number, `0` while unmounted.
    pub correlative: i32,
    /// Mount id, empty while unmounted.
    pub id: [u8; 4],
}

impl Partition {
    /// An unused table slot.
    pub fn empty() -> Self {
        Self {
            status: STATUS_UNUSED,
            part_type: TYPE_UNUSED,
            fit: b'W',
            start: -1,
            size: -1,
            name: [0; 16],
            correlative: 0,
            id: [0; 4],
        }
    }

    /// Tells whether the slot holds a created partition.
    pub fn is_used(&self) -> bool {
        self.start != -1
    }

    /// The partition name, trimmed.
    pub fn name_str(&self) -> String {
        let name = self.name;
        util::field_str(&name)
    }

    /// The mount id, trimmed.
    pub fn id_str(&self) -> String {
        let id = self.id;
        util::field_str(&id)
    }

    /// Case-insensitive name comparison.
    pub fn name_matches(&self, name: &str) -> bool {
        let field = self.name;
        util::field_eq(&field, name)
    }

    /// Case-insensitive mount-id comparison.
    pub fn id_matches(&self, id: &str) -> bool {
        let field = self.id;
        util::field_eq(&field, id)
    }

    /// Marks the slot as mounted.
    pub fn set_mounted(&mut self, correlative: i32, id: &str) {
        self.correlative = correlative;
        self.id = util::fixed(id);
    }

    /// Clears the mount marker.
    pub fn set_unmounted(&mut self) {
        self.correlative = 0;
        self.id = [0; 4];
    }
}

/// The Master Boot Record stored at offset 0 of a disk image.
#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Mbr {
    /// Total disk size in bytes.
    pub size: i32,
    /// Creation timestamp, unix seconds.
    pub created_at: f32,
    /// Random disk signature.
    pub signature: i32,
    /// Disk-wide fit policy byte.
    pub disk_fit: u8,
    /// The four primary slots.
    pub partitions: [Partition; 4],
}

impl Mbr {
    /// Builds the MBR for a fresh disk of `size` bytes.
    pub fn new(size: i32, fit: Fit) -> Self {
        Self {
            size,
            created_at: util::timestamp32(),
            signature: util::random_signature(),
            disk_fit: fit.byte(),
            partitions: [Partition::empty(); 4],
        }
    }

    /// Reads the MBR from the head of a disk image.
    pub fn read(file: &mut File) -> io::Result<Self> {
        util::read_at(file, 0)
    }

    /// Writes the MBR back to the head of a disk image.
    pub fn write(&self, file: &mut File) -> io::Result<()> {
        util::write_at(file, 0, self)
    }

    /// A copy of the partition table, for iteration.
    pub fn table(&self) -> [Partition; 4] {
        self.partitions
    }

    /// Looks up a partition slot by name, ignoring ASCII case.
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        let parts = self.table();
        parts
            .iter()
            .position(|p| p.is_used() && p.name_matches(name))
    }

    /// Looks up a partition slot by mount id.
    pub fn find_by_id(&self, id: &str) -> Option<usize> {
        let parts = self.table();
        parts.iter().position(|p| p.is_used() && p.id_matches(id))
    }

    /// Returns the slot index of the extended partition, if any.
    pub fn extended(&self) -> Option<usize> {
        let parts = self.table();
        parts
            .iter()
            .position(|p| p.is_used() && p.part_type == TYPE_EXTENDED)
    }

    /// Bytes not covered by the MBR header or any created partition.
    pub fn available_space(&self) -> i32 {
        let parts = self.table();
        let used: i32 = parts.iter().filter(|p| p.is_used()).map(|p| p.size).sum();
        self.size - MBR_SIZE - used
    }

    /// The start byte a partition placed in slot `index` would get: the MBR
    /// header plus the sizes of every created slot declared before it.
    fn slot_start(&self, index: usize) -> i32 {
        let parts = self.table();
        let preceding: i32 = parts[..index]
            .iter()
            .filter(|p| p.is_used())
            .map(|p| p.size)
            .sum();
        MBR_SIZE + preceding
    }

    /// Runs the disk's fit policy over the table and returns the chosen free
    /// slot for a partition of `requested` bytes.
    fn fit_slot(&self, requested: i32) -> Result<usize> {
        if self.available_space() < requested {
            return Err(Error::InsufficientSpace(format!(
                "disk has no room for {requested} more bytes"
            )));
        }
        let fit = Fit::from_byte(self.disk_fit)?;
        let parts = self.table();
        let mut chosen: Option<usize> = None;
        for (i, p) in parts.iter().enumerate() {
            // A free slot reports -1, meaning it has no size of its own yet.
            if p.is_used() || (p.size != -1 && p.size < requested) {
                continue;
            }
            chosen = match (fit, chosen) {
                (Fit::First, None) => return Ok(i),
                (_, None) => Some(i),
                (Fit::Best, Some(c)) if p.size < parts[c].size => Some(i),
                (Fit::Worst, Some(c)) if p.size > parts[c].size => Some(i),
                (_, keep) => keep,
            };
        }
        chosen.ok_or_else(|| Error::InsufficientSpace(format!("no slot can hold {requested} bytes")))
    }

    /// Creates a primary or extended partition of `size` bytes named `name`.
    ///
    /// The slot is chosen by the disk's fit policy; the partition inherits the
    /// disk's fit byte. Returns the slot index.
    pub fn create_partition(&mut self, size: i32, part_type: u8, name: &str) -> Result<usize> {
        if part_type == TYPE_EXTENDED && self.extended().is_some() {
            return Err(Error::AlreadyExists(
                "an extended partition already exists on this disk".into(),
            ));
        }
        let index = self.fit_slot(size)?;
        let start = self.slot_start(index);
        let mut p = self.partitions[index];
        p.status = STATUS_ACTIVE;
        p.part_type = part_type;
        p.fit = self.disk_fit;
        p.start = start;
        p.size = size;
        p.name = util::fixed(name);
        p.correlative = 0;
        p.id = [0; 4];
        self.partitions[index] = p;
        Ok(index)
    }

    /// Trailing free bytes behind the partition at `index`: up to the next
    /// created partition's start, or the end of the disk.
    pub fn trailing_space(&self, index: usize) -> i32 {
        let parts = self.table();
        let p = parts[index];
        let end = p.start + p.size;
        let next_start = parts
            .iter()
            .filter(|q| q.is_used() && q.start > p.start)
            .map(|q| q.start)
            .min()
            .unwrap_or(self.size);
        next_start - end
    }

    /// Grows or shrinks the partition at `index` by `delta` bytes in place.
    pub fn resize_partition(&mut self, index: usize, delta: i32) -> Result<()> {
        let p = self.partitions[index];
        let new_size = p.size + delta;
        if new_size < 0 {
            return Err(Error::InvalidArgument(
                "partition size cannot become negative".into(),
            ));
        }
        if delta > 0 && self.trailing_space(index) < delta {
            return Err(Error::InsufficientSpace(format!(
                "only {} trailing bytes available",
                self.trailing_space(index)
            )));
        }
        self.partitions[index].size = new_size;
        Ok(())
    }

    /// Deletes the partition at `index`.
    ///
    /// For an extended partition the EBR chain is walked first and every
    /// logical region is zeroed. `full` additionally zeroes the partition's
    /// whole byte range; `fast` only clears the table slot.
    pub fn delete_partition(&mut self, file: &mut File, index: usize, full: bool) -> Result<()> {
        let p = self.partitions[index];
        if p.part_type == TYPE_EXTENDED {
            ebr::zero_chain(file, p.start, p.size)?;
        }
        if full {
            util::write_zeroes(file, p.start as u64, p.size as u64)?;
        }
        let mut slot = self.partitions[index];
        slot.start = -1;
        slot.size = -1;
        slot.name = [0; 16];
        slot.part_type = TYPE_UNUSED;
        slot.status = STATUS_UNUSED;
        slot.correlative = 0;
        slot.id = [0; 4];
        self.partitions[index] = slot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TempDisk;

    #[test]
    fn record_sizes() {
        assert_eq!(size_of::<Partition>(), 35);
        assert_eq!(size_of::<Mbr>(), 153);
    }

    #[test]
    fn first_fit_places_after_header() {
        let mut mbr = Mbr::new(1024 * 1024, Fit::First);
        let i = mbr.create_partition(4096, TYPE_PRIMARY, "P1").unwrap();
        assert_eq!(i, 0);
        let p = mbr.partitions[0];
        assert_eq!({ p.start }, MBR_SIZE);
        assert_eq!({ p.size }, 4096);
        assert_eq!(p.part_type, TYPE_PRIMARY);
        assert_eq!(p.fit, b'F');
        assert_eq!(p.status, STATUS_ACTIVE);

        let j = mbr.create_partition(2048, TYPE_PRIMARY, "P2").unwrap();
        assert_eq!(j, 1);
        let q = mbr.partitions[1];
        assert_eq!({ q.start }, MBR_SIZE + 4096);
    }

    #[test]
    fn partitions_stay_inside_the_disk() {
        let mut mbr = Mbr::new(8192 + MBR_SIZE, Fit::First);
        mbr.create_partition(8192, TYPE_PRIMARY, "ALL").unwrap();
        let p = mbr.partitions[0];
        assert!({ p.start } >= MBR_SIZE);
        assert!({ p.start } + { p.size } <= { mbr.size });
        assert!(mbr.create_partition(1, TYPE_PRIMARY, "X").is_err());
    }

    #[test]
    fn second_extended_rejected() {
        let mut mbr = Mbr::new(1024 * 1024, Fit::First);
        mbr.create_partition(4096, TYPE_EXTENDED, "E1").unwrap();
        let err = mbr.create_partition(4096, TYPE_EXTENDED, "E2");
        assert!(matches!(err, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn resize_respects_trailing_space() {
        let mut mbr = Mbr::new(MBR_SIZE + 10240, Fit::First);
        mbr.create_partition(4096, TYPE_PRIMARY, "A").unwrap();
        mbr.create_partition(4096, TYPE_PRIMARY, "B").unwrap();
        // A is boxed in by B.
        assert!(mbr.resize_partition(0, 1).is_err());
        // B has 2048 trailing bytes.
        assert!(mbr.resize_partition(1, 2048).is_ok());
        assert_eq!({ mbr.partitions[1].size }, 4096 + 2048);
        // Shrink below zero is rejected.
        assert!(mbr.resize_partition(1, -100000).is_err());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut mbr = Mbr::new(1024 * 1024, Fit::First);
        mbr.create_partition(4096, TYPE_PRIMARY, "Part1").unwrap();
        assert_eq!(mbr.find_by_name("part1"), Some(0));
        assert_eq!(mbr.find_by_name("PART1"), Some(0));
        assert_eq!(mbr.find_by_name("other"), None);
    }

    #[test]
    fn roundtrip_through_file() {
        let disk = TempDisk::create("mbr-roundtrip", 64 * 1024);
        let mut file = disk.open();
        let mut mbr = Mbr::new(64 * 1024, Fit::Best);
        mbr.create_partition(4096, TYPE_PRIMARY, "P1").unwrap();
        mbr.write(&mut file).unwrap();

        let back = Mbr::read(&mut file).unwrap();
        assert_eq!({ back.size }, 64 * 1024);
        assert_eq!({ back.signature }, { mbr.signature });
        assert_eq!(back.disk_fit, b'B');
        let p = back.partitions[0];
        assert_eq!({ p.size }, 4096);
        assert_eq!(p.name_str(), "P1");
        let q = back.partitions[1];
        assert!(!q.is_used());
    }
}
