//! In-memory model of the ISO 9660 structures a PlayStation disc carries:
//! volume descriptors, XA-extended directory records, path tables, and the
//! two timestamp encodings.

pub mod chars;
pub mod path_table;
pub mod record;
pub mod time;
pub mod volume;
pub mod xa;

pub use path_table::PathTable;
pub use record::{DirectoryRecord, FLAG_DIRECTORY, FLAG_HIDDEN};
pub use time::{LongTime, RecordedTime};
pub use volume::VolumeDescriptor;
pub use xa::XaExtension;
