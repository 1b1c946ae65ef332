//! Primary and terminating volume descriptors.

use crate::ISO_BLOCK_SIZE;
use crate::error::DiscError;
use crate::iso::record::DirectoryRecord;
use crate::iso::time::LongTime;

const PVD_TYPE: u8 = 1;
const EVD_TYPE: u8 = 255;
const STANDARD_ID: &[u8; 5] = b"CD001";

/// Offset of the XA signature inside the PVD's application-use area.
const XA_SIGNATURE_OFFSET: usize = 1024;
const XA_SIGNATURE: &[u8; 8] = b"CD-XA001";

/// All PVD fields the catalog preserves, plus the layout values computed
/// at build time.
#[derive(Debug, Clone)]
pub struct VolumeDescriptor {
    pub system_id: String,
    pub volume_id: String,
    pub volume_set_id: String,
    pub publisher_id: String,
    pub preparer_id: String,
    pub application_id: String,
    pub copyright_file_id: String,
    pub abstract_file_id: String,
    pub bibliographic_file_id: String,

    pub creation_date: LongTime,
    pub modification_date: LongTime,
    pub expiration_date: LongTime,
    pub effective_date: LongTime,

    /// Volume size in logical sectors.
    pub volume_space_size: u32,
    pub path_table_size: u32,
    pub type_l_path_table: u32,
    pub opt_type_l_path_table: u32,
    pub type_m_path_table: u32,
    pub opt_type_m_path_table: u32,

    pub root: DirectoryRecord,
}

impl VolumeDescriptor {
    /// Serialize into a 2048-byte PVD sector payload.
    pub fn build_pvd(&self) -> [u8; ISO_BLOCK_SIZE] {
        let mut out = [0u8; ISO_BLOCK_SIZE];
        out[0] = PVD_TYPE;
        out[1..6].copy_from_slice(STANDARD_ID);
        out[6] = 1; // version

        write_padded(&mut out[8..40], &self.system_id);
        write_padded(&mut out[40..72], &self.volume_id);
        write_u32_both(&mut out[80..88], self.volume_space_size);
        write_u16_both(&mut out[120..124], 1); // volume set size
        write_u16_both(&mut out[124..128], 1); // volume sequence number
        write_u16_both(&mut out[128..132], ISO_BLOCK_SIZE as u16);
        write_u32_both(&mut out[132..140], self.path_table_size);
        out[140..144].copy_from_slice(&self.type_l_path_table.to_le_bytes());
        out[144..148].copy_from_slice(&self.opt_type_l_path_table.to_le_bytes());
        out[148..152].copy_from_slice(&self.type_m_path_table.to_be_bytes());
        out[152..156].copy_from_slice(&self.opt_type_m_path_table.to_be_bytes());

        self.root.write_to(&mut out[156..190]);

        write_padded(&mut out[190..318], &self.volume_set_id);
        write_padded(&mut out[318..446], &self.publisher_id);
        write_padded(&mut out[446..574], &self.preparer_id);
        write_padded(&mut out[574..702], &self.application_id);
        write_padded(&mut out[702..739], &self.copyright_file_id);
        write_padded(&mut out[739..776], &self.abstract_file_id);
        write_padded(&mut out[776..813], &self.bibliographic_file_id);

        out[813..830].copy_from_slice(&self.creation_date.to_bytes());
        out[830..847].copy_from_slice(&self.modification_date.to_bytes());
        out[847..864].copy_from_slice(&self.expiration_date.to_bytes());
        out[864..881].copy_from_slice(&self.effective_date.to_bytes());
        out[881] = 1; // file structure version

        out[XA_SIGNATURE_OFFSET..XA_SIGNATURE_OFFSET + 8].copy_from_slice(XA_SIGNATURE);
        out
    }

    /// Parse a 2048-byte PVD sector payload.
    pub fn parse_pvd(data: &[u8]) -> Result<Self, DiscError> {
        if data.len() < ISO_BLOCK_SIZE || data[0] != PVD_TYPE {
            return Err(DiscError::invalid_format(format!(
                "expected PVD type 0x01, got 0x{:02X}",
                data.first().copied().unwrap_or(0)
            )));
        }
        if &data[1..6] != STANDARD_ID {
            return Err(DiscError::invalid_format("missing CD001 signature in PVD"));
        }

        let root = match DirectoryRecord::parse(&data[156..190])? {
            Some((record, _)) => record,
            None => return Err(DiscError::invalid_format("PVD carries no root directory record")),
        };

        Ok(Self {
            system_id: read_padded(&data[8..40]),
            volume_id: read_padded(&data[40..72]),
            volume_set_id: read_padded(&data[190..318]),
            publisher_id: read_padded(&data[318..446]),
            preparer_id: read_padded(&data[446..574]),
            application_id: read_padded(&data[574..702]),
            copyright_file_id: read_padded(&data[702..739]),
            abstract_file_id: read_padded(&data[739..776]),
            bibliographic_file_id: read_padded(&data[776..813]),
            creation_date: LongTime::from_bytes(&data[813..830]),
            modification_date: LongTime::from_bytes(&data[830..847]),
            expiration_date: LongTime::from_bytes(&data[847..864]),
            effective_date: LongTime::from_bytes(&data[864..881]),
            volume_space_size: read_u32_le(data, 80),
            path_table_size: read_u32_le(data, 132),
            type_l_path_table: read_u32_le(data, 140),
            opt_type_l_path_table: read_u32_le(data, 144),
            type_m_path_table: u32::from_be_bytes([data[148], data[149], data[150], data[151]]),
            opt_type_m_path_table: u32::from_be_bytes([data[152], data[153], data[154], data[155]]),
            root,
        })
    }
}

/// The volume descriptor set terminator written at LBN 17.
pub fn build_evd() -> [u8; ISO_BLOCK_SIZE] {
    let mut out = [0u8; ISO_BLOCK_SIZE];
    out[0] = EVD_TYPE;
    out[1..6].copy_from_slice(STANDARD_ID);
    out[6] = 1;
    out
}

/// Write an identifier space-padded to the field width.
fn write_padded(field: &mut [u8], value: &str) {
    field.fill(b' ');
    let bytes = value.as_bytes();
    let n = bytes.len().min(field.len());
    field[..n].copy_from_slice(&bytes[..n]);
}

/// Read a space-padded identifier, stripping trailing blanks.
fn read_padded(field: &[u8]) -> String {
    let s = String::from_utf8_lossy(field);
    s.trim_end().to_string()
}

fn write_u32_both(buf: &mut [u8], value: u32) {
    buf[0..4].copy_from_slice(&value.to_le_bytes());
    buf[4..8].copy_from_slice(&value.to_be_bytes());
}

fn write_u16_both(buf: &mut [u8], value: u16) {
    buf[0..2].copy_from_slice(&value.to_le_bytes());
    buf[2..4].copy_from_slice(&value.to_be_bytes());
}

fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
#[path = "tests/volume_tests.rs"]
mod tests;
