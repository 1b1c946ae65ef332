//! The rip pipeline: disassemble a BIN/CUE image into a catalog, a host
//! file tree, the raw system area, and WAV audio tracks.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use psxpack_core::cue::{self, DiscLayout, TrackKind};
use psxpack_core::error::DiscError;
use psxpack_core::iso::record::DirectoryRecord;
use psxpack_core::iso::time::RecordedTime;
use psxpack_core::iso::volume::VolumeDescriptor;
use psxpack_core::sector::{self, PostgapKind};
use psxpack_core::{
    ISO_BLOCK_SIZE, M2RAW_SECTOR_SIZE, PVD_SECTOR, RAW_SECTOR_SIZE, SYSTEM_AREA_SECTORS,
};

use crate::AUX_DIR_NAME;
use crate::catalog::{Catalog, SerializeOptions, Tracking, VolumeInfo};
use crate::error::EngineError;
use crate::tree::{FsTree, Node, NodeKind};
use crate::wav;

/// Options of the rip pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct RipOptions {
    /// Record original LBNs in the catalog.
    pub write_lbns: bool,
    /// Mark the catalog for a strict (original-LBN) rebuild. Implies
    /// `write_lbns`.
    pub strict: bool,
    /// Repair Y2K-damaged timestamps instead of preserving them.
    pub fix_dates: bool,
}

/// Progress reported to the caller while ripping.
#[derive(Debug, Clone)]
pub enum RipProgress {
    Analyzing,
    SystemArea,
    Directory { path: String },
    AudioTrack { number: u8 },
    Done,
}

/// Outcome counters of a rip.
#[derive(Debug, Default)]
pub struct RipSummary {
    pub files: usize,
    pub directories: usize,
    pub audio_tracks: usize,
    /// Files whose extraction hit sector read errors.
    pub incomplete: Vec<String>,
    pub volume_id: String,
}

// ---------------------------------------------------------------------------
// Image access
// ---------------------------------------------------------------------------

/// Raw sector access over one or more BIN files, addressed by absolute
/// sector number across the concatenated image.
pub(crate) struct ImageReader {
    files: Vec<(File, u32)>,
}

impl ImageReader {
    pub(crate) fn open(paths: &[PathBuf]) -> Result<Self, EngineError> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let file = File::open(path).map_err(|e| EngineError::host_file(path, e))?;
            let sectors = (file.metadata()?.len() / RAW_SECTOR_SIZE as u64) as u32;
            files.push((file, sectors));
        }
        Ok(Self { files })
    }

    /// Read one raw 2352-byte sector.
    pub(crate) fn read_raw(
        &mut self,
        sector: u32,
        buf: &mut [u8; RAW_SECTOR_SIZE],
    ) -> Result<(), DiscError> {
        let mut remaining = sector;
        for (file, sectors) in &mut self.files {
            if remaining < *sectors {
                file.seek(SeekFrom::Start(
                    u64::from(remaining) * RAW_SECTOR_SIZE as u64,
                ))
                .map_err(|e| DiscError::sector_read(sector, e.to_string()))?;
                file.read_exact(buf)
                    .map_err(|e| DiscError::sector_read(sector, e.to_string()))?;
                return Ok(());
            }
            remaining -= *sectors;
        }
        Err(DiscError::sector_read(sector, "beyond end of image"))
    }

    /// Read the 2048 user bytes of a data sector.
    pub(crate) fn read_block(&mut self, sector: u32) -> Result<[u8; ISO_BLOCK_SIZE], DiscError> {
        let mut raw = [0u8; RAW_SECTOR_SIZE];
        self.read_raw(sector, &mut raw)?;
        let mut block = [0u8; ISO_BLOCK_SIZE];
        block.copy_from_slice(&raw[24..24 + ISO_BLOCK_SIZE]);
        Ok(block)
    }
}

/// One directory extent, parsed: its own `.` and `..` records plus the
/// children sorted by LBN (the physical order files were mastered in).
struct DirListing {
    dot: DirectoryRecord,
    dotdot: DirectoryRecord,
    children: Vec<DirectoryRecord>,
}

fn read_directory(
    reader: &mut ImageReader,
    extent: u32,
    size: u32,
) -> Result<DirListing, EngineError> {
    let mut records = Vec::new();
    let sectors = size.div_ceil(ISO_BLOCK_SIZE as u32);

    for i in 0..sectors {
        let block = reader.read_block(extent + i)?;
        let mut pos = 0usize;
        while pos < ISO_BLOCK_SIZE {
            match DirectoryRecord::parse(&block[pos..])? {
                Some((record, len)) => {
                    records.push(record);
                    pos += len;
                }
                None => break,
            }
        }
    }

    if records.len() < 2 || records[0].name != "." || records[1].name != ".." {
        return Err(DiscError::invalid_format(format!(
            "directory extent at sector {extent} lacks '.' and '..' records"
        ))
        .into());
    }

    let dotdot = records.remove(1);
    let dot = records.remove(0);
    let mut children = records;
    children.sort_by_key(|r| r.extent);

    Ok(DirListing {
        dot,
        dotdot,
        children,
    })
}

// ---------------------------------------------------------------------------
// Y2K repair policy
// ---------------------------------------------------------------------------

/// How a node's recording time is taken into the catalog.
struct DatePolicy {
    fix: bool,
    /// Replacement for irreparable entries, from the PVD creation date.
    replacement: RecordedTime,
}

impl DatePolicy {
    /// Returns the catalog date string and whether the entry counts as
    /// broken (when preserved unrepaired).
    fn resolve(&self, time: RecordedTime) -> (String, bool) {
        if !time.year_is_broken() {
            return (time.to_digits(), false);
        }
        if !self.fix {
            return (time.to_digits(), true);
        }

        // Single-digit years are the bug's usual face: the decade
        // survived, only the century byte was lost.
        let mut repaired = time;
        if time.year < 10 {
            repaired.year += 100;
        } else {
            repaired = RecordedTime {
                gmt_offset: time.gmt_offset,
                ..self.replacement
            };
        }
        (repaired.to_digits(), false)
    }
}

// ---------------------------------------------------------------------------
// Rip pipeline
// ---------------------------------------------------------------------------

/// Disassemble the image behind `cue_path` into `output` (the file tree),
/// `output.cat`, `output.sys`, and `output/_PSXRIP/`.
pub fn rip(
    cue_path: &Path,
    output: &Path,
    options: &RipOptions,
    progress: &dyn Fn(RipProgress),
) -> Result<RipSummary, EngineError> {
    progress(RipProgress::Analyzing);

    let cue_text = fs::read_to_string(cue_path)
        .map_err(|e| EngineError::host_file(cue_path, e))?;
    let cue_files = cue::parse_cue(&cue_text)?;
    let layout = cue::analyze_layout(cue_path, &cue_files, |p| fs::metadata(p).map(|m| m.len()))?;

    let mut reader = ImageReader::open(&layout.bin_paths)?;

    // Postgap classification on the last data-track sector.
    let mut last_sector = [0u8; RAW_SECTOR_SIZE];
    reader.read_raw(layout.track1_sector_count - 1, &mut last_sector)?;
    let postgap_kind = sector::classify_postgap(&last_sector);
    log::info!("track 1 postgap type: {}", postgap_kind.code());

    // Volume information.
    let pvd = VolumeDescriptor::parse_pvd(&reader.read_block(PVD_SECTOR)?)?;
    log::info!("volume ID = {}", pvd.volume_id);

    let mut creation_date = pvd.creation_date;
    if options.fix_dates && creation_date.century_is_zero() {
        creation_date.repair_century();
    }

    // Replacement source for irreparable directory times: the creation
    // date's local fields, century restored.
    let mut replacement_source = pvd.creation_date;
    if replacement_source.century_is_zero() {
        replacement_source.repair_century();
    }
    let policy = DatePolicy {
        fix: options.fix_dates,
        replacement: replacement_source.to_recorded_local(),
    };

    // System area.
    progress(RipProgress::SystemArea);
    let sys_path = output.with_extension("sys");
    dump_system_area(&mut reader, &sys_path)?;

    // Filesystem tree.
    fs::create_dir_all(output).map_err(|e| EngineError::host_file(output, e))?;

    let mut summary = RipSummary {
        volume_id: pvd.volume_id.clone(),
        ..RipSummary::default()
    };

    let root_listing = read_directory(&mut reader, pvd.root.extent, pvd.root.size)?;
    let mut warned_non_xa = false;
    let root = make_dir_node(
        "",
        &root_listing,
        &policy,
        &mut warned_non_xa,
    );
    let mut tree = FsTree::new(root);
    let root_id = tree.root();
    dump_dir(
        &mut reader,
        &mut tree,
        root_id,
        root_listing,
        output,
        &policy,
        &mut warned_non_xa,
        progress,
        &mut summary,
    )?;

    // Audio tracks and the raw postgap dump.
    let aux_dir = output.join(AUX_DIR_NAME);
    let has_audio = layout.tracks.iter().any(|t| t.kind == TrackKind::Audio);
    if has_audio || postgap_kind == PostgapKind::Raw {
        fs::create_dir_all(&aux_dir).map_err(|e| EngineError::host_file(&aux_dir, e))?;
    }

    for track in &layout.tracks {
        if track.kind != TrackKind::Audio {
            continue;
        }
        progress(RipProgress::AudioTrack {
            number: track.number,
        });
        dump_audio_track(&mut reader, &aux_dir, track)?;
        summary.audio_tracks += 1;
    }

    if postgap_kind == PostgapKind::Raw {
        let path = aux_dir.join("Last_sector.bin");
        fs::write(&path, last_sector).map_err(|e| EngineError::host_file(&path, e))?;
        log::info!("unrecognized postgap pattern, raw sector preserved");
    }

    // Catalog.
    let catalog = Catalog {
        system_area_file: Some(sys_path.clone()),
        volume: VolumeInfo {
            system_id: pvd.system_id,
            volume_id: pvd.volume_id,
            volume_set_id: pvd.volume_set_id,
            publisher_id: pvd.publisher_id,
            preparer_id: pvd.preparer_id,
            application_id: pvd.application_id,
            copyright_file_id: pvd.copyright_file_id,
            abstract_file_id: pvd.abstract_file_id,
            bibliographic_file_id: pvd.bibliographic_file_id,
            creation_date,
            modification_date: pvd.modification_date,
            expiration_date: pvd.expiration_date,
            effective_date: pvd.effective_date,
            default_uid: 0,
            default_gid: 0,
        },
        tracking: Tracking {
            tracks: layout.tracks.clone(),
            track1_sector_count: layout.track1_sector_count,
            postgap_kind,
            audio_sectors: layout.audio_sectors,
            strict_rebuild: options.strict,
        },
        tree,
    };

    let cat_path = output.with_extension("cat");
    let text = catalog.serialize(SerializeOptions {
        write_lbns: options.write_lbns || options.strict,
    });
    fs::write(&cat_path, text).map_err(|e| EngineError::host_file(&cat_path, e))?;
    log::info!("catalog written to {}", cat_path.display());

    progress(RipProgress::Done);
    Ok(summary)
}

fn dump_system_area(reader: &mut ImageReader, path: &Path) -> Result<(), EngineError> {
    let mut file = File::create(path).map_err(|e| EngineError::host_file(path, e))?;
    let mut buf = [0u8; RAW_SECTOR_SIZE];
    for sector in 0..SYSTEM_AREA_SECTORS as u32 {
        reader.read_raw(sector, &mut buf)?;
        file.write_all(&buf)?;
    }
    Ok(())
}

/// Build a directory node from its own `.` and `..` records.
fn make_dir_node(
    name: &str,
    listing: &DirListing,
    policy: &DatePolicy,
    warned_non_xa: &mut bool,
) -> Node {
    let mut node = Node::new(NodeKind::Directory, name);

    let self_xa = require_xa(&listing.dot, warned_non_xa);
    let parent_xa = require_xa(&listing.dotdot, warned_non_xa);
    node.gid = self_xa.group_id;
    node.uid = self_xa.user_id;
    node.attributes = self_xa.attributes;
    node.parent_attributes = parent_xa.attributes;

    let (date, self_broken) = policy.resolve(listing.dot.time);
    let (parent_date, parent_broken) = policy.resolve(listing.dotdot.time);
    node.date = date;
    node.parent_date = parent_date;
    node.timezone = listing.dot.time.gmt_offset;
    node.parent_timezone = listing.dotdot.time.gmt_offset;
    node.y2k = u8::from(self_broken) + 10 * u8::from(parent_broken);

    node.hidden = listing.dot.is_hidden();
    node.first_sector = listing.dot.extent;
    node.requested_lbn = listing.dot.extent;
    node.node_size = listing.dot.size;
    node
}

fn require_xa(
    record: &DirectoryRecord,
    warned_non_xa: &mut bool,
) -> psxpack_core::iso::xa::XaExtension {
    match record.xa {
        Some(xa) => xa,
        None => {
            if !*warned_non_xa {
                log::warn!("directory records carry no XA extension; not a CD-ROM XA disc?");
                *warned_non_xa = true;
            }
            psxpack_core::iso::xa::XaExtension::default()
        }
    }
}

/// Recursively dump one directory's children: host files, subdirectories,
/// and the corresponding tree nodes, in LBN order.
#[allow(clippy::too_many_arguments)]
fn dump_dir(
    reader: &mut ImageReader,
    tree: &mut FsTree,
    dir_id: usize,
    listing: DirListing,
    host_dir: &Path,
    policy: &DatePolicy,
    warned_non_xa: &mut bool,
    progress: &dyn Fn(RipProgress),
    summary: &mut RipSummary,
) -> Result<(), EngineError> {
    progress(RipProgress::Directory {
        path: host_dir.display().to_string(),
    });
    summary.directories += 1;

    for record in listing.children {
        if record.is_directory() {
            let sub_listing = read_directory(reader, record.extent, record.size)?;
            let sub_node = make_dir_node(&record.name, &sub_listing, policy, warned_non_xa);
            let sub_id = tree.add_child(dir_id, sub_node);

            let sub_host = host_dir.join(&record.name);
            fs::create_dir_all(&sub_host).map_err(|e| EngineError::host_file(&sub_host, e))?;
            dump_dir(
                reader,
                tree,
                sub_id,
                sub_listing,
                &sub_host,
                policy,
                warned_non_xa,
                progress,
                summary,
            )?;
            continue;
        }

        let xa = require_xa(&record, warned_non_xa);
        let kind = if xa.is_cdda() {
            NodeKind::CddaRef
        } else if xa.is_form2() {
            NodeKind::XaFile
        } else {
            NodeKind::File
        };

        let mut node = Node::new(kind, record.name.clone());
        node.gid = xa.group_id;
        node.uid = xa.user_id;
        node.attributes = xa.attributes;
        let (date, broken) = policy.resolve(record.time);
        node.date = date;
        node.timezone = record.time.gmt_offset;
        node.y2k = u8::from(broken);
        node.hidden = record.is_hidden();
        node.node_size = record.size;
        node.first_sector = record.extent;
        node.requested_lbn = record.extent;

        // Host file name: version suffix stripped.
        let bare_name = record.name.split(';').next().unwrap_or(&record.name);
        let host_path = host_dir.join(bare_name);

        match kind {
            NodeKind::CddaRef => {
                // Audio back-reference: zero-byte placeholder; the data
                // lives in the audio tracks.
                File::create(&host_path).map_err(|e| EngineError::host_file(&host_path, e))?;
            }
            NodeKind::XaFile => {
                let complete = extract_form2(reader, &record, &host_path, &mut node)?;
                if !complete {
                    summary.incomplete.push(bare_name.to_string());
                }
                summary.files += 1;
            }
            NodeKind::File => {
                let complete = extract_form1(reader, &record, &host_path)?;
                if !complete {
                    summary.incomplete.push(bare_name.to_string());
                }
                summary.files += 1;
            }
            NodeKind::Directory => unreachable!(),
        }

        node.host_path = host_path;
        tree.add_child(dir_id, node);
    }

    Ok(())
}

/// Copy a Form 1 file sector by sector (2048-byte logical reads).
/// Sector read errors are recoverable: the file is marked incomplete and
/// the rip continues.
fn extract_form1(
    reader: &mut ImageReader,
    record: &DirectoryRecord,
    host_path: &Path,
) -> Result<bool, EngineError> {
    let mut file = File::create(host_path).map_err(|e| EngineError::host_file(host_path, e))?;
    let mut remaining = record.size as usize;

    for i in 0..record.extent_sectors() {
        let block = match reader.read_block(record.extent + i) {
            Ok(block) => block,
            Err(e) => {
                log::warn!("{e}; output file {} may be incomplete", host_path.display());
                return Ok(false);
            }
        };
        let take = remaining.min(ISO_BLOCK_SIZE);
        file.write_all(&block[..take])?;
        remaining -= take;
    }
    Ok(true)
}

/// Copy a Form 2 file as raw 2336-byte blocks (subheader + payload +
/// EDC field), detecting the zeroed-EDC convention along the way.
fn extract_form2(
    reader: &mut ImageReader,
    record: &DirectoryRecord,
    host_path: &Path,
    node: &mut Node,
) -> Result<bool, EngineError> {
    let mut file = File::create(host_path).map_err(|e| EngineError::host_file(host_path, e))?;
    let mut raw = [0u8; RAW_SECTOR_SIZE];

    for i in 0..record.extent_sectors() {
        if let Err(e) = reader.read_raw(record.extent + i, &mut raw) {
            log::warn!("{e}; output file {} may be incomplete", host_path.display());
            return Ok(false);
        }

        // Sample for the zero-EDC convention until a positive hit.
        if !node.zero_edc
            && raw[18] & 0x20 == 0x20
            && raw[RAW_SECTOR_SIZE - 4..].iter().all(|&b| b == 0)
        {
            node.zero_edc = true;
        }

        file.write_all(&raw[16..16 + M2RAW_SECTOR_SIZE])?;
    }
    Ok(true)
}

/// Write `Track_NN.wav` (and `Pregap_NN.wav` when the track has one).
fn dump_audio_track(
    reader: &mut ImageReader,
    aux_dir: &Path,
    track: &cue::Track,
) -> Result<(), EngineError> {
    let mut raw = [0u8; RAW_SECTOR_SIZE];

    let body_sectors = track.total_sectors - track.pregap_sectors;
    let path = aux_dir.join(format!("Track_{:02}.wav", track.number));
    let mut file = File::create(&path).map_err(|e| EngineError::host_file(&path, e))?;
    wav::write_wav_header(&mut file, body_sectors * RAW_SECTOR_SIZE as u32)?;
    for i in 0..body_sectors {
        reader.read_raw(track.start_sector + i, &mut raw)?;
        file.write_all(&raw)?;
    }

    if track.pregap_sectors > 0 {
        let path = aux_dir.join(format!("Pregap_{:02}.wav", track.number));
        let mut file = File::create(&path).map_err(|e| EngineError::host_file(&path, e))?;
        wav::write_wav_header(&mut file, track.pregap_sectors * RAW_SECTOR_SIZE as u32)?;
        let pregap_start = track.start_sector.saturating_sub(track.pregap_sectors);
        for i in 0..track.pregap_sectors {
            reader.read_raw(pregap_start + i, &mut raw)?;
            file.write_all(&raw)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// LBN table
// ---------------------------------------------------------------------------

/// Print the LBN table of the image: one row per extent, hexadecimal,
/// without ripping anything.
pub fn lbn_table(cue_path: &Path, out: &mut dyn Write) -> Result<(), EngineError> {
    let cue_text = fs::read_to_string(cue_path)
        .map_err(|e| EngineError::host_file(cue_path, e))?;
    let cue_files = cue::parse_cue(&cue_text)?;
    let layout: DiscLayout =
        cue::analyze_layout(cue_path, &cue_files, |p| fs::metadata(p).map(|m| m.len()))?;
    let mut reader = ImageReader::open(&layout.bin_paths)?;

    let pvd = VolumeDescriptor::parse_pvd(&reader.read_block(PVD_SECTOR)?)?;

    writeln!(out, "{:>8} {:>8} {:>8} T Path", "LBN", "NumSec", "Size")?;
    lbn_table_dir(&mut reader, pvd.root.extent, pvd.root.size, "", out)?;
    Ok(())
}

fn lbn_table_dir(
    reader: &mut ImageReader,
    extent: u32,
    size: u32,
    path: &str,
    out: &mut dyn Write,
) -> Result<(), EngineError> {
    let listing = read_directory(reader, extent, size)?;

    writeln!(
        out,
        "{:08x} {:08x} {:08x} d {}",
        listing.dot.extent,
        listing.dot.extent_sectors(),
        listing.dot.size,
        path
    )?;

    for record in listing.children {
        let bare_name = record.name.split(';').next().unwrap_or(&record.name).to_string();
        let entry_path = if path.is_empty() {
            bare_name.clone()
        } else {
            format!("{path}/{bare_name}")
        };

        if record.is_directory() {
            lbn_table_dir(reader, record.extent, record.size, &entry_path, out)?;
            continue;
        }

        let (type_char, file_size) = match record.xa {
            Some(xa) if xa.is_cdda() => ('a', record.size),
            Some(xa) if xa.is_form2() => {
                ('x', record.extent_sectors() * M2RAW_SECTOR_SIZE as u32)
            }
            _ => ('f', record.size),
        };

        writeln!(
            out,
            "{:08x} {:08x} {:08x} {} {}",
            record.extent,
            record.extent_sectors(),
            file_size,
            type_char,
            entry_path
        )?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/ripper_tests.rs"]
mod tests;
