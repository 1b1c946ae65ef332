//! Rip, build, and inject pipelines for PlayStation 1 BIN/CUE images.
//!
//! `rip` disassembles an image into a plain-text catalog, a host file
//! tree, the raw system area, and WAV audio tracks; `build` reverses the
//! process into a byte-identical image; `inject` replaces one file's
//! contents in place. The on-disc byte formats live in `psxpack-core`;
//! this crate owns the catalog syntax, the filesystem tree, sector
//! allocation, and the pipelines themselves.

pub mod alloc;
pub mod builder;
pub mod catalog;
pub mod dirs;
pub mod error;
pub mod inject;
pub mod ripper;
pub mod tree;
pub mod wav;

pub use builder::{BuildOptions, BuildProgress, build};
pub use catalog::Catalog;
pub use error::EngineError;
pub use inject::inject;
pub use ripper::{RipOptions, RipProgress, lbn_table, rip};

/// Subdirectory of the rip output tree holding audio tracks and the raw
/// postgap sector dump.
pub const AUX_DIR_NAME: &str = "_PSXRIP";

/// First sector available to directory and file extents: system area,
/// PVD, EVD, and the four path table sectors come first.
pub const FIRST_DATA_SECTOR: u32 = 22;
