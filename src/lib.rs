//! User-space emulation of an EXT2/EXT3-style filesystem.
//!
//! A regular host file plays the role of a raw disk: an MBR with four primary
//! slots at its head, an optional EBR chain inside an extended partition, and
//! a formatted partition carrying a superblock, allocation bitmaps, an inode
//! table and a 64-byte-block data region. The command shell in `main.rs`
//! drives these modules through a small line-oriented command language.

pub mod bitmap;
pub mod block;
pub mod context;
pub mod disk;
pub mod ebr;
pub mod error;
pub mod fs;
pub mod inode;
pub mod journal;
pub mod mbr;
pub mod mkfs;
pub mod mount;
pub mod prompt;
pub mod report;
pub mod superblock;
pub mod users;
pub mod util;

#[cfg(test)]
pub(crate) mod testutil;
