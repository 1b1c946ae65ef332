//! In-place file replacement inside an existing image.
//!
//! The replacement must fit in the sector extent the original file
//! occupies; the file's sectors are re-encoded and the directory
//! record's size field is patched. Nothing else in the image moves.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use psxpack_core::cue;
use psxpack_core::error::DiscError;
use psxpack_core::iso::record::DirectoryRecord;
use psxpack_core::iso::volume::VolumeDescriptor;
use psxpack_core::sector::{self, EdcPolicy, SM_DATA, SM_EOF, SM_EOR, Subheader};
use psxpack_core::{ISO_BLOCK_SIZE, M2RAW_SECTOR_SIZE, PVD_SECTOR, RAW_SECTOR_SIZE};

use crate::error::EngineError;

/// Outcome of an inject.
#[derive(Debug)]
pub struct InjectSummary {
    pub lbn: u32,
    pub sectors_written: u32,
    pub new_size: u64,
}

/// Random-access raw sector I/O over the data track's BIN file.
struct ImageFile {
    file: File,
}

impl ImageFile {
    fn open(path: &Path) -> Result<Self, EngineError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| EngineError::host_file(path, e))?;
        Ok(Self { file })
    }

    fn read_raw(&mut self, lbn: u32, buf: &mut [u8; RAW_SECTOR_SIZE]) -> Result<(), DiscError> {
        self.file
            .seek(SeekFrom::Start(u64::from(lbn) * RAW_SECTOR_SIZE as u64))
            .map_err(|e| DiscError::sector_read(lbn, e.to_string()))?;
        self.file
            .read_exact(buf)
            .map_err(|e| DiscError::sector_read(lbn, e.to_string()))?;
        Ok(())
    }

    fn read_block(&mut self, lbn: u32) -> Result<[u8; ISO_BLOCK_SIZE], DiscError> {
        let mut raw = [0u8; RAW_SECTOR_SIZE];
        self.read_raw(lbn, &mut raw)?;
        let mut block = [0u8; ISO_BLOCK_SIZE];
        block.copy_from_slice(&raw[24..24 + ISO_BLOCK_SIZE]);
        Ok(block)
    }

    fn write_raw(&mut self, lbn: u32, buf: &[u8; RAW_SECTOR_SIZE]) -> Result<(), EngineError> {
        self.file
            .seek(SeekFrom::Start(u64::from(lbn) * RAW_SECTOR_SIZE as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }
}

/// Where a directory record lives on disc, so its bytes can be patched.
struct RecordLocation {
    record: DirectoryRecord,
    /// Sector of the directory extent holding the record.
    sector: u32,
    /// Byte offset of the record inside that sector's payload.
    offset: usize,
    /// True when that sector is the last of its directory extent.
    last_sector_of_extent: bool,
}

/// Replace the contents of `repl_path` (ISO path, `/` separated) inside
/// the image behind `cue_path` with the bytes of `new_file`.
pub fn inject(
    cue_path: &Path,
    repl_path: &str,
    new_file: &Path,
) -> Result<InjectSummary, EngineError> {
    let cue_text = fs::read_to_string(cue_path)
        .map_err(|e| EngineError::host_file(cue_path, e))?;
    let cue_files = cue::parse_cue(&cue_text)?;
    let layout = cue::analyze_layout(cue_path, &cue_files, |p| fs::metadata(p).map(|m| m.len()))?;
    let bin_path: &PathBuf = &layout.bin_paths[0];

    let mut image = ImageFile::open(bin_path)?;
    let pvd = VolumeDescriptor::parse_pvd(&image.read_block(PVD_SECTOR)?)?;

    let location = find_record(&mut image, &pvd, repl_path)?;
    let record = &location.record;
    if record.is_directory() {
        return Err(EngineError::invariant(format!(
            "'{repl_path}' is a directory, not a file"
        )));
    }

    let form2 = record.xa.is_some_and(|xa| xa.is_form2());
    let old_sectors = record.extent_sectors();

    let new_bytes = fs::read(new_file).map_err(|e| EngineError::host_file(new_file, e))?;
    let new_size = new_bytes.len() as u64;

    let block_size = if form2 {
        if new_size % M2RAW_SECTOR_SIZE as u64 != 0 {
            return Err(EngineError::invariant(format!(
                "replacement for a form 2 file must be a multiple of {M2RAW_SECTOR_SIZE} bytes"
            )));
        }
        M2RAW_SECTOR_SIZE
    } else {
        ISO_BLOCK_SIZE
    };

    let new_sectors = (new_size.div_ceil(block_size as u64) as u32).max(1);
    if new_sectors > old_sectors {
        return Err(EngineError::invariant(format!(
            "replacement needs {new_sectors} sectors but '{repl_path}' occupies only {old_sectors}"
        )));
    }

    // Rewrite the extent. Sectors past the new data stay as zero-filled
    // data sectors so the extent length never changes.
    let mut raw = [0u8; RAW_SECTOR_SIZE];
    for i in 0..old_sectors {
        let lbn = record.extent + i;
        let start = i as usize * block_size;
        let chunk = if start < new_bytes.len() {
            &new_bytes[start..(start + block_size).min(new_bytes.len())]
        } else {
            &[][..]
        };

        if form2 {
            if chunk.is_empty() {
                sector::encode_empty_form2(&mut raw, lbn, EdcPolicy::Compute);
                image.write_raw(lbn, &raw)?;
                continue;
            }
            let mut block = [0u8; M2RAW_SECTOR_SIZE];
            block[..chunk.len()].copy_from_slice(chunk);
            let subheader = Subheader::from_bytes(&block[..4]);
            sector::encode_mode2(&mut raw, &block[8..8 + 2324], lbn, subheader, EdcPolicy::Compute);
        } else {
            let submode = if i == new_sectors - 1 {
                SM_DATA | SM_EOF | SM_EOR
            } else {
                SM_DATA
            };
            sector::encode_mode2(
                &mut raw,
                chunk,
                lbn,
                Subheader::new(0, 0, submode, 0),
                EdcPolicy::Compute,
            );
        }
        image.write_raw(lbn, &raw)?;
    }

    // Patch the directory record's size field.
    let new_record_size = if form2 {
        new_sectors * ISO_BLOCK_SIZE as u32
    } else {
        new_size as u32
    };
    patch_record_size(&mut image, &location, new_record_size)?;

    log::info!(
        "replaced '{repl_path}' at sector {} ({} sectors)",
        record.extent,
        new_sectors
    );
    Ok(InjectSummary {
        lbn: record.extent,
        sectors_written: new_sectors,
        new_size,
    })
}

/// Walk the ISO filesystem to the record for `repl_path`.
fn find_record(
    image: &mut ImageFile,
    pvd: &VolumeDescriptor,
    repl_path: &str,
) -> Result<RecordLocation, EngineError> {
    let mut dir_extent = pvd.root.extent;
    let mut dir_size = pvd.root.size;

    let components: Vec<&str> = repl_path
        .split(['/', '\\'])
        .filter(|c| !c.is_empty())
        .collect();
    if components.is_empty() {
        return Err(EngineError::invariant("empty replacement path"));
    }

    'components: for (depth, component) in components.iter().enumerate() {
        let target = component.to_uppercase();
        let sectors = dir_size.div_ceil(ISO_BLOCK_SIZE as u32);

        for i in 0..sectors {
            let block = image.read_block(dir_extent + i)?;
            let mut pos = 0usize;
            while pos < ISO_BLOCK_SIZE {
                let Some((record, len)) = DirectoryRecord::parse(&block[pos..])? else {
                    break;
                };
                let bare = record.name.split(';').next().unwrap_or(&record.name);
                if bare.eq_ignore_ascii_case(&target) && record.name != "." && record.name != ".."
                {
                    if depth == components.len() - 1 {
                        return Ok(RecordLocation {
                            last_sector_of_extent: i == sectors - 1,
                            sector: dir_extent + i,
                            offset: pos,
                            record,
                        });
                    }
                    if !record.is_directory() {
                        return Err(EngineError::invariant(format!(
                            "'{component}' is not a directory"
                        )));
                    }
                    dir_extent = record.extent;
                    dir_size = record.size;
                    continue 'components;
                }
                pos += len;
            }
        }
        return Err(EngineError::invariant(format!(
            "'{repl_path}' not found in the image"
        )));
    }
    unreachable!()
}

/// Rewrite the size field of a directory record in place, re-encoding
/// the sector that holds it.
fn patch_record_size(
    image: &mut ImageFile,
    location: &RecordLocation,
    new_size: u32,
) -> Result<(), EngineError> {
    let mut raw = [0u8; RAW_SECTOR_SIZE];
    image.read_raw(location.sector, &mut raw)?;

    let decoded = sector::decode_mode2(&raw)?;
    let subheader = decoded.subheader;
    let mut payload = [0u8; ISO_BLOCK_SIZE];
    payload.copy_from_slice(&decoded.payload[..ISO_BLOCK_SIZE]);

    let at = location.offset + 10;
    payload[at..at + 4].copy_from_slice(&new_size.to_le_bytes());
    payload[at + 4..at + 8].copy_from_slice(&new_size.to_be_bytes());

    let mut out = [0u8; RAW_SECTOR_SIZE];
    sector::encode_mode2(&mut out, &payload, location.sector, subheader, EdcPolicy::Compute);
    image.write_raw(location.sector, &out)?;

    debug_assert!(
        !location.last_sector_of_extent
            || subheader.submode & (SM_EOF | SM_EOR) == (SM_EOF | SM_EOR)
    );
    Ok(())
}

#[cfg(test)]
#[path = "tests/inject_tests.rs"]
mod tests;
