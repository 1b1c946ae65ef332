//! Low-level building blocks for PlayStation 1 disc images.
//!
//! This crate knows the byte formats: the raw 2352-byte CD-ROM XA sector
//! (sync, header, subheader, EDC, ECC), the ISO 9660 on-disc structures
//! with their XA extensions, and CUE sheet track layouts. It performs no
//! pipeline work of its own; `psxpack-lib` drives these types to rip and
//! rebuild images.

use std::io::{Read, Seek};

pub mod cue;
pub mod error;
pub mod iso;
pub mod msf;
pub mod sector;

pub use error::DiscError;
pub use msf::Msf;

/// Raw CD sector size (sync + header + subheader + data + EDC + ECC).
pub const RAW_SECTOR_SIZE: usize = 2352;

/// ISO 9660 logical block size; user data of a Mode 2 Form 1 sector.
pub const ISO_BLOCK_SIZE: usize = 2048;

/// Useful bytes of a Mode 2 sector read raw: subheader + payload + EDC.
pub const M2RAW_SECTOR_SIZE: usize = 2336;

/// Payload bytes of a Mode 2 Form 2 sector.
pub const M2F2_PAYLOAD_SIZE: usize = 2324;

/// LBN of the ISO 9660 primary volume descriptor.
pub const PVD_SECTOR: u32 = 16;

/// LBN of the volume descriptor set terminator.
pub const EVD_SECTOR: u32 = 17;

/// Number of raw sectors in the system area preceding the PVD.
pub const SYSTEM_AREA_SECTORS: usize = 16;

/// Sector capacity of a 74-minute disc; no LBN may reach this.
pub const MAX_IMAGE_SECTORS: u32 = 74 * 60 * 75;

/// Lead-in offset: LBN 0 sits at physical frame 150 (two seconds).
pub const LEADIN_FRAMES: u32 = 150;

/// Length of the postgap appended after the data track.
pub const POSTGAP_SECTORS: u32 = 150;

/// A reader that implements both Read and Seek.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}
