//! The build pipeline: assemble a byte-level BIN/CUE image from a
//! catalog, its host file tree, the system area dump, and the audio
//! track WAVs.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use psxpack_core::cue::{self, TrackKind};
use psxpack_core::iso::record::{DirectoryRecord, FLAG_DIRECTORY, record_size};
use psxpack_core::iso::volume::{VolumeDescriptor, build_evd};
use psxpack_core::sector::{
    self, EdcPolicy, PostgapKind, SM_DATA, SM_EOF, SM_EOR, Subheader,
};
use psxpack_core::{
    EVD_SECTOR, ISO_BLOCK_SIZE, M2RAW_SECTOR_SIZE, MAX_IMAGE_SECTORS, POSTGAP_SECTORS,
    PVD_SECTOR, RAW_SECTOR_SIZE, SYSTEM_AREA_SECTORS,
};

use crate::alloc::{self, BuildContext};
use crate::catalog::Catalog;
use crate::dirs;
use crate::error::EngineError;
use crate::tree::{FsTree, NodeId, NodeKind};
use crate::{AUX_DIR_NAME, wav};

/// Options of the build pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Also emit a CUE sheet next to the BIN.
    pub write_cue: bool,
}

/// Progress reported to the caller while building.
#[derive(Debug, Clone)]
pub enum BuildProgress {
    Parsing,
    Allocating,
    WritingData,
    Postgap,
    AudioTrack { number: u8 },
    Done,
}

/// Outcome of a build.
#[derive(Debug)]
pub struct BuildSummary {
    pub image_path: PathBuf,
    pub cue_path: Option<PathBuf>,
    /// Final volume size in sectors, audio included.
    pub volume_sectors: u32,
}

// ---------------------------------------------------------------------------
// Sector-granular image writer
// ---------------------------------------------------------------------------

/// Writes raw sectors sequentially, tracking the cursor so requested
/// LBNs can be honoured by filling the gap with empty Form 2 sectors.
struct ImageWriter {
    file: BufWriter<File>,
    cursor: u32,
    buf: [u8; RAW_SECTOR_SIZE],
}

impl ImageWriter {
    fn create(path: &Path) -> Result<Self, EngineError> {
        let file = File::create(path).map_err(|e| EngineError::host_file(path, e))?;
        Ok(Self {
            file: BufWriter::new(file),
            cursor: 0,
            buf: [0u8; RAW_SECTOR_SIZE],
        })
    }

    fn write_raw(&mut self, sector: &[u8; RAW_SECTOR_SIZE]) -> Result<(), EngineError> {
        self.file.write_all(sector)?;
        self.cursor += 1;
        Ok(())
    }

    /// Encode and write one Mode 2 sector at the cursor, reusing the
    /// writer's sector buffer.
    fn write_sector(
        &mut self,
        payload: &[u8],
        subheader: Subheader,
        edc_policy: EdcPolicy,
    ) -> Result<(), EngineError> {
        sector::encode_mode2(&mut self.buf, payload, self.cursor, subheader, edc_policy);
        self.file.write_all(&self.buf)?;
        self.cursor += 1;
        Ok(())
    }

    /// Fill with empty Form 2 sectors up to `until`.
    fn write_gap(&mut self, until: u32) -> Result<(), EngineError> {
        while self.cursor < until {
            sector::encode_empty_form2(&mut self.buf, self.cursor, EdcPolicy::Compute);
            self.file.write_all(&self.buf)?;
            self.cursor += 1;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Build pipeline
// ---------------------------------------------------------------------------

/// Build `output.bin` (and optionally `output.cue`) from the catalog at
/// `catalog_path`. The host file tree is expected at the catalog path
/// with its extension removed.
pub fn build(
    catalog_path: &Path,
    output: &Path,
    options: &BuildOptions,
    progress: &dyn Fn(BuildProgress),
) -> Result<BuildSummary, EngineError> {
    progress(BuildProgress::Parsing);

    let text = fs::read_to_string(catalog_path)
        .map_err(|e| EngineError::host_file(catalog_path, e))?;
    let mut catalog = Catalog::parse(&text)?;
    let fs_base = catalog_path.with_extension("");

    prepare_file_nodes(&mut catalog.tree, &fs_base)?;
    dirs::compute_directory_sizes(&mut catalog.tree);

    // Allocation.
    progress(BuildProgress::Allocating);
    let mut ctx = BuildContext::new(
        catalog.tracking.track1_sector_count,
        catalog.tracking.postgap_kind,
        catalog.tracking.audio_sectors,
        catalog.tracking.strict_rebuild,
        catalog.volume.creation_date.gmt_offset,
    );
    alloc::allocate(&mut catalog.tree, &mut ctx)?;

    let volume_sectors = ctx.end_of_track1 + POSTGAP_SECTORS + ctx.audio_sectors;
    if volume_sectors > MAX_IMAGE_SECTORS {
        log::warn!(
            "output image larger than {} MiB",
            MAX_IMAGE_SECTORS as u64 * RAW_SECTOR_SIZE as u64 / (1024 * 1024)
        );
    }

    // Directory extents and path tables.
    let (l_table, m_table) = dirs::build_path_tables(&mut catalog.tree)?;
    let path_table_size = l_table.len();

    // Image emission.
    progress(BuildProgress::WritingData);
    let image_path = output.with_extension("bin");
    let mut writer = ImageWriter::create(&image_path)?;

    write_system_area(&mut writer, &catalog, catalog_path)?;
    write_descriptors(&mut writer, &catalog, &ctx, path_table_size)?;

    for table in [&l_table, &l_table, &m_table, &m_table] {
        writer.write_sector(
            table,
            Subheader::new(0, 0, SM_DATA | SM_EOF | SM_EOR, 0),
            EdcPolicy::Compute,
        )?;
    }

    write_tree_data(&mut writer, &catalog.tree)?;

    // Postgap.
    progress(BuildProgress::Postgap);
    write_postgap(&mut writer, catalog.tracking.postgap_kind, &fs_base)?;

    // Audio tracks, streamed from their WAV bodies.
    let aux_dir = fs_base.join(AUX_DIR_NAME);
    for track in &catalog.tracking.tracks {
        if track.kind != TrackKind::Audio {
            continue;
        }
        progress(BuildProgress::AudioTrack {
            number: track.number,
        });
        append_audio_track(&mut writer, &aux_dir, track.number, track.pregap_sectors > 0)?;
    }

    writer.file.flush()?;
    log::info!("image file written to {}", image_path.display());

    // CUE sheet.
    let cue_path = if options.write_cue {
        let path = output.with_extension("cue");
        let bin_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| image_path.display().to_string());
        let text = cue::write_cue(&catalog.tracking.tracks, &bin_name, ctx.audio_offset);
        fs::write(&path, text).map_err(|e| EngineError::host_file(&path, e))?;
        log::info!("cue file written to {}", path.display());
        Some(path)
    } else {
        None
    };

    progress(BuildProgress::Done);
    Ok(BuildSummary {
        image_path,
        cue_path,
        volume_sectors,
    })
}

/// Resolve host paths and sizes for every file node and compute extent
/// sector counts.
fn prepare_file_nodes(tree: &mut FsTree, fs_base: &Path) -> Result<(), EngineError> {
    for id in tree.preorder() {
        let relative = tree.relative_path(id);
        let node = tree.node_mut(id);
        match node.kind {
            NodeKind::Directory => {}
            NodeKind::CddaRef => {
                // Audio references consume no data sectors; their
                // directory entries are fixed up after allocation.
                node.sector_count = 0;
                node.size_bytes = 0;
            }
            NodeKind::File | NodeKind::XaFile => {
                let host_path = fs_base.join(&relative);
                let size = fs::metadata(&host_path)
                    .map_err(|e| EngineError::host_file(&host_path, e))?
                    .len();
                let block = if node.kind == NodeKind::XaFile {
                    M2RAW_SECTOR_SIZE as u64
                } else {
                    ISO_BLOCK_SIZE as u64
                };
                node.size_bytes = size;
                node.sector_count = size.div_ceil(block) as u32;
                if node.sector_count == 0 {
                    // Empty files still occupy one sector.
                    node.sector_count = 1;
                }
                node.host_path = host_path;
            }
        }
    }
    Ok(())
}

fn write_system_area(
    writer: &mut ImageWriter,
    catalog: &Catalog,
    catalog_path: &Path,
) -> Result<(), EngineError> {
    let mut data = vec![0u8; SYSTEM_AREA_SECTORS * RAW_SECTOR_SIZE];

    if let Some(sys_file) = &catalog.system_area_file {
        let path = if sys_file.exists() {
            sys_file.clone()
        } else {
            // Catalogs travel; retry relative to the catalog itself.
            catalog_path
                .parent()
                .unwrap_or(Path::new(""))
                .join(sys_file.file_name().unwrap_or(sys_file.as_os_str()))
        };
        let mut file = File::open(&path).map_err(|e| EngineError::host_file(&path, e))?;
        let mut read_total = 0usize;
        while read_total < data.len() {
            let n = file.read(&mut data[read_total..])?;
            if n == 0 {
                break;
            }
            read_total += n;
        }
    }

    for sector in 0..SYSTEM_AREA_SECTORS {
        let mut raw = [0u8; RAW_SECTOR_SIZE];
        raw.copy_from_slice(&data[sector * RAW_SECTOR_SIZE..(sector + 1) * RAW_SECTOR_SIZE]);
        writer.write_raw(&raw)?;
    }
    Ok(())
}

fn write_descriptors(
    writer: &mut ImageWriter,
    catalog: &Catalog,
    ctx: &BuildContext,
    path_table_size: usize,
) -> Result<(), EngineError> {
    debug_assert_eq!(writer.cursor, PVD_SECTOR);

    // The root record's recording time mirrors the creation date,
    // normalised to GMT, with the century repair applied when the
    // mastering bug zeroed it.
    let mut creation = catalog.volume.creation_date;
    if creation.century_is_zero() {
        creation.repair_century();
    }
    let root_time = creation.to_recorded_gmt();

    let root = catalog.tree.node(catalog.tree.root());
    let v = &catalog.volume;
    let pvd = VolumeDescriptor {
        system_id: v.system_id.clone(),
        volume_id: v.volume_id.clone(),
        volume_set_id: v.volume_set_id.clone(),
        publisher_id: v.publisher_id.clone(),
        preparer_id: v.preparer_id.clone(),
        application_id: v.application_id.clone(),
        copyright_file_id: v.copyright_file_id.clone(),
        abstract_file_id: v.abstract_file_id.clone(),
        bibliographic_file_id: v.bibliographic_file_id.clone(),
        creation_date: v.creation_date,
        modification_date: v.modification_date,
        expiration_date: v.expiration_date,
        effective_date: v.effective_date,
        volume_space_size: ctx.end_of_track1 + POSTGAP_SECTORS + ctx.audio_sectors,
        path_table_size: path_table_size as u32,
        type_l_path_table: EVD_SECTOR + 1,
        opt_type_l_path_table: EVD_SECTOR + 2,
        type_m_path_table: EVD_SECTOR + 3,
        opt_type_m_path_table: EVD_SECTOR + 4,
        root: DirectoryRecord {
            extent: root.first_sector,
            size: root.sector_count * ISO_BLOCK_SIZE as u32,
            time: root_time,
            flags: FLAG_DIRECTORY,
            name: String::new(),
            xa: None,
        },
    };
    debug_assert_eq!(pvd.root.encoded_len(), record_size(1, 0));

    writer.write_sector(
        &pvd.build_pvd(),
        Subheader::new(0, 0, SM_DATA | SM_EOR, 0),
        EdcPolicy::Compute,
    )?;
    writer.write_sector(
        &build_evd(),
        Subheader::new(0, 0, SM_DATA | SM_EOF | SM_EOR, 0),
        EdcPolicy::Compute,
    )?;
    Ok(())
}

/// Emit every directory extent and file extent in insertion order,
/// filling gaps before requested LBNs with empty Form 2 sectors.
fn write_tree_data(writer: &mut ImageWriter, tree: &FsTree) -> Result<(), EngineError> {
    for id in tree.preorder() {
        let node = tree.node(id);
        match node.kind {
            NodeKind::Directory => {
                writer.write_gap(node.first_sector)?;
                let extent = dirs::build_directory_extent(tree, id)?;
                write_extent_sectors(writer, &extent, node.sector_count)?;
            }
            NodeKind::File => {
                writer.write_gap(node.first_sector)?;
                write_form1_file(writer, tree, id)?;
            }
            NodeKind::XaFile => {
                writer.write_gap(node.first_sector)?;
                write_form2_file(writer, tree, id)?;
            }
            NodeKind::CddaRef => {}
        }
    }
    Ok(())
}

/// Write a buffer of 2048-byte blocks as Form 1 data sectors, flagging
/// the last one EOF/EOR.
fn write_extent_sectors(
    writer: &mut ImageWriter,
    data: &[u8],
    sectors: u32,
) -> Result<(), EngineError> {
    for i in 0..sectors {
        let submode = if i == sectors - 1 {
            SM_DATA | SM_EOF | SM_EOR
        } else {
            SM_DATA
        };
        let start = i as usize * ISO_BLOCK_SIZE;
        let end = (start + ISO_BLOCK_SIZE).min(data.len());
        writer.write_sector(
            &data[start..end],
            Subheader::new(0, 0, submode, 0),
            EdcPolicy::Compute,
        )?;
    }
    Ok(())
}

fn write_form1_file(
    writer: &mut ImageWriter,
    tree: &FsTree,
    id: NodeId,
) -> Result<(), EngineError> {
    let node = tree.node(id);
    let mut file = File::open(&node.host_path)
        .map_err(|e| EngineError::host_file(&node.host_path, e))?;

    log::debug!("writing \"{}\"", node.host_path.display());

    let mut block = [0u8; ISO_BLOCK_SIZE];
    for i in 0..node.sector_count {
        block.fill(0);
        read_up_to(&mut file, &mut block)?;
        let submode = if i == node.sector_count - 1 {
            SM_DATA | SM_EOF | SM_EOR
        } else {
            SM_DATA
        };
        writer.write_sector(&block, Subheader::new(0, 0, submode, 0), EdcPolicy::Compute)?;
    }
    Ok(())
}

/// Form 2 files are stored as 2336-byte blocks: the subheader bytes come
/// from the file itself, and the EDC field is recomputed (or forced to
/// zero for zero-EDC payloads).
fn write_form2_file(
    writer: &mut ImageWriter,
    tree: &FsTree,
    id: NodeId,
) -> Result<(), EngineError> {
    let node = tree.node(id);
    let mut file = File::open(&node.host_path)
        .map_err(|e| EngineError::host_file(&node.host_path, e))?;

    log::debug!("writing \"{}\"", node.host_path.display());

    let mut block = [0u8; M2RAW_SECTOR_SIZE];
    for _ in 0..node.sector_count {
        block.fill(0);
        read_up_to(&mut file, &mut block)?;

        let subheader = Subheader::from_bytes(&block[..4]);
        let policy = if node.zero_edc {
            EdcPolicy::Zero
        } else {
            EdcPolicy::Compute
        };
        writer.write_sector(&block[8..8 + 2324], subheader, policy)?;
    }
    Ok(())
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> Result<usize, EngineError> {
    let mut total = 0usize;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

fn write_postgap(
    writer: &mut ImageWriter,
    kind: PostgapKind,
    fs_base: &Path,
) -> Result<(), EngineError> {
    let raw_last = fs_base.join(AUX_DIR_NAME).join("Last_sector.bin");

    for i in 0..POSTGAP_SECTORS {
        let mut out = [0u8; RAW_SECTOR_SIZE];
        match kind {
            PostgapKind::Empty => sector::encode_empty(&mut out, writer.cursor),
            PostgapKind::EmptyForm2 => {
                sector::encode_empty_form2(&mut out, writer.cursor, EdcPolicy::Zero)
            }
            PostgapKind::EmptyForm2WithEdc => {
                sector::encode_empty_form2(&mut out, writer.cursor, EdcPolicy::Compute)
            }
            PostgapKind::Raw => {
                if i == POSTGAP_SECTORS - 1 && raw_last.exists() {
                    let bytes = fs::read(&raw_last)
                        .map_err(|e| EngineError::host_file(&raw_last, e))?;
                    if bytes.len() == RAW_SECTOR_SIZE {
                        out.copy_from_slice(&bytes);
                    } else {
                        log::warn!(
                            "{} is not a raw sector, writing an empty one",
                            raw_last.display()
                        );
                        sector::encode_empty(&mut out, writer.cursor);
                    }
                } else {
                    sector::encode_empty(&mut out, writer.cursor);
                }
            }
        }
        writer.write_raw(&out)?;
    }
    Ok(())
}

/// Stream the audio bytes of one track: the pregap WAV first when the
/// track has one, then the track body, both located via their `data`
/// chunks.
fn append_audio_track(
    writer: &mut ImageWriter,
    aux_dir: &Path,
    number: u8,
    has_pregap: bool,
) -> Result<(), EngineError> {
    if has_pregap {
        let path = aux_dir.join(format!("Pregap_{number:02}.wav"));
        copy_wav_body(writer, &path)?;
    }
    let path = aux_dir.join(format!("Track_{number:02}.wav"));
    copy_wav_body(writer, &path)
}

fn copy_wav_body(writer: &mut ImageWriter, path: &Path) -> Result<(), EngineError> {
    let file = File::open(path).map_err(|e| EngineError::host_file(path, e))?;
    let mut reader = BufReader::new(file);
    let data_len = wav::seek_to_data_chunk(&mut reader)?;

    let mut remaining = data_len;
    let mut chunk = [0u8; RAW_SECTOR_SIZE];
    while remaining > 0 {
        let take = (remaining as usize).min(chunk.len());
        reader.read_exact(&mut chunk[..take])?;
        writer.file.write_all(&chunk[..take])?;
        remaining -= take as u64;
    }
    // Keep the cursor sector-aligned for bookkeeping.
    writer.cursor += (data_len / RAW_SECTOR_SIZE as u64) as u32;
    Ok(())
}

#[cfg(test)]
#[path = "tests/builder_tests.rs"]
mod tests;
