//! CUE sheet parsing and disc track layout analysis.
//!
//! The analyzer turns a CUE sheet plus the sizes of its BIN files into an
//! ordered track list with absolute sector positions. That list is stored
//! in the catalog (as CSV) so a rebuild can regenerate CUE timing exactly.

use std::io;
use std::path::{Path, PathBuf};

use crate::LEADIN_FRAMES;
use crate::RAW_SECTOR_SIZE;
use crate::error::DiscError;
use crate::msf::Msf;

/// Track content type as named in CUE sheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Raw-sector data track (`MODE2/2352`).
    Mode2,
    /// Red Book audio track.
    Audio,
}

impl TrackKind {
    pub fn as_cue_str(self) -> &'static str {
        match self {
            Self::Mode2 => "MODE2/2352",
            Self::Audio => "AUDIO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MODE2/2352" => Some(Self::Mode2),
            "AUDIO" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// One analyzed track with absolute sector positions over the whole image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub number: u8,
    pub kind: TrackKind,
    /// Absolute sector of INDEX 01, where the track data starts.
    pub start_sector: u32,
    /// Sectors between INDEX 00 and INDEX 01.
    pub pregap_sectors: u32,
    /// INDEX 01 position within the track's own BIN file.
    pub data_offset_sector: u32,
    /// Absolute last sector of the track.
    pub end_sector: u32,
    /// Total sectors the track occupies, pregap included.
    pub total_sectors: u32,
}

/// A `FILE` entry of a CUE sheet with its raw TRACK/INDEX lines.
#[derive(Debug, Clone)]
pub struct CueFile {
    pub bin_name: String,
    pub tracks: Vec<CueTrack>,
}

#[derive(Debug, Clone)]
pub struct CueTrack {
    pub number: u8,
    pub kind: TrackKind,
    /// (index number, position in sectors within the file).
    pub indexes: Vec<(u8, u32)>,
}

impl CueTrack {
    fn index(&self, number: u8) -> Option<u32> {
        self.indexes
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, pos)| *pos)
    }

    /// INDEX 00 when present, else INDEX 01: where the track's sectors
    /// begin, pregap included.
    fn first_position(&self) -> u32 {
        self.index(0).or_else(|| self.index(1)).unwrap_or(0)
    }
}

/// Parse CUE sheet text into its FILE entries.
pub fn parse_cue(text: &str) -> Result<Vec<CueFile>, DiscError> {
    let mut files: Vec<CueFile> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("REM") {
            continue;
        }

        let upper = line.to_uppercase();
        if upper.starts_with("FILE ") {
            let (bin_name, file_type) = parse_file_line(line)?;
            if !file_type.eq_ignore_ascii_case("BINARY") {
                return Err(DiscError::invalid_format(format!(
                    "unsupported CUE file type '{file_type}'"
                )));
            }
            files.push(CueFile {
                bin_name,
                tracks: Vec::new(),
            });
        } else if upper.starts_with("TRACK ") {
            let Some(file) = files.last_mut() else {
                return Err(DiscError::invalid_format("TRACK before FILE in CUE sheet"));
            };
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                return Err(DiscError::invalid_format("invalid TRACK line in CUE sheet"));
            }
            let number: u8 = parts[1]
                .parse()
                .map_err(|_| DiscError::invalid_format("invalid track number in CUE sheet"))?;
            let kind = TrackKind::parse(parts[2]).ok_or_else(|| {
                DiscError::invalid_format(format!("unsupported track type '{}'", parts[2]))
            })?;
            file.tracks.push(CueTrack {
                number,
                kind,
                indexes: Vec::new(),
            });
        } else if upper.starts_with("INDEX ") {
            let Some(track) = files.last_mut().and_then(|f| f.tracks.last_mut()) else {
                return Err(DiscError::invalid_format("INDEX before TRACK in CUE sheet"));
            };
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                return Err(DiscError::invalid_format("invalid INDEX line in CUE sheet"));
            }
            let number: u8 = parts[1]
                .parse()
                .map_err(|_| DiscError::invalid_format("invalid index number in CUE sheet"))?;
            let msf = Msf::parse(parts[2]).ok_or_else(|| {
                DiscError::invalid_format(format!("invalid MSF '{}' in CUE sheet", parts[2]))
            })?;
            track.indexes.push((number, msf.to_sectors()));
        }
        // PREGAP, POSTGAP, and other commands are ignored.
    }

    if files.is_empty() {
        return Err(DiscError::invalid_format("CUE sheet contains no FILE entries"));
    }
    Ok(files)
}

/// Parse a FILE line: `FILE "filename.bin" BINARY`.
fn parse_file_line(line: &str) -> Result<(String, String), DiscError> {
    let rest = line[5..].trim_start();

    if let Some(after_quote) = rest.strip_prefix('"') {
        let end = after_quote
            .find('"')
            .ok_or_else(|| DiscError::invalid_format("unterminated quote in CUE FILE line"))?;
        Ok((
            after_quote[..end].to_string(),
            after_quote[end + 1..].trim().to_string(),
        ))
    } else {
        let mut parts = rest.splitn(2, ' ');
        let name = parts.next().unwrap_or("").to_string();
        let file_type = parts.next().unwrap_or("").trim().to_string();
        Ok((name, file_type))
    }
}

/// The analyzed disc layout: tracks with absolute positions, resolved BIN
/// paths, and the counters the catalog's tracking block records.
#[derive(Debug)]
pub struct DiscLayout {
    pub tracks: Vec<Track>,
    /// One resolved path per `FILE` entry.
    pub bin_paths: Vec<PathBuf>,
    /// Index into `bin_paths` for each track.
    pub track_bin: Vec<usize>,
    pub single_bin: bool,
    /// Sectors of the whole first track, postgap included.
    pub track1_sector_count: u32,
    /// Total sectors of all audio tracks.
    pub audio_sectors: u32,
}

/// Analyze a parsed CUE sheet against its BIN files.
///
/// `bin_size` resolves a BIN path to its byte length. Paths are resolved
/// relative to the CUE's directory; when a path recorded in the CUE does
/// not exist, the bare file name next to the CUE is tried, as dumps moved
/// between machines often have stale paths.
pub fn analyze_layout(
    cue_path: &Path,
    files: &[CueFile],
    mut bin_size: impl FnMut(&Path) -> io::Result<u64>,
) -> Result<DiscLayout, DiscError> {
    let cue_dir = cue_path.parent().unwrap_or(Path::new(""));

    let single_bin = files.len() == 1;
    if !single_bin && files.iter().any(|f| f.tracks.len() != 1) {
        return Err(DiscError::invalid_format(
            "CUE sheet must be one FILE with all tracks or one FILE per track",
        ));
    }
    if files[0].tracks.is_empty() {
        return Err(DiscError::invalid_format("first FILE has no TRACK entries"));
    }

    // Resolve bin paths and sizes.
    let mut bin_paths = Vec::with_capacity(files.len());
    let mut bin_sectors = Vec::with_capacity(files.len());
    for file in files {
        let direct = cue_dir.join(&file.bin_name);
        let size = match bin_size(&direct) {
            Ok(size) => {
                bin_paths.push(direct);
                size
            }
            Err(_) => {
                let name_only = Path::new(&file.bin_name)
                    .file_name()
                    .map(|n| cue_dir.join(n))
                    .ok_or_else(|| {
                        DiscError::invalid_format(format!("bad BIN path '{}'", file.bin_name))
                    })?;
                log::warn!(
                    "BIN path '{}' from the CUE sheet not found, using '{}'",
                    file.bin_name,
                    name_only.display()
                );
                let size = bin_size(&name_only)?;
                bin_paths.push(name_only);
                size
            }
        };
        if size == 0 || size % RAW_SECTOR_SIZE as u64 != 0 {
            return Err(DiscError::invalid_format(format!(
                "'{}' is not a multiple of {} bytes",
                file.bin_name, RAW_SECTOR_SIZE
            )));
        }
        bin_sectors.push((size / RAW_SECTOR_SIZE as u64) as u32);
    }

    let mut tracks = Vec::new();
    let mut track_bin = Vec::new();

    if single_bin {
        let file = &files[0];
        let total = bin_sectors[0];
        for (i, cue_track) in file.tracks.iter().enumerate() {
            let idx01 = cue_track.index(1).ok_or_else(|| {
                DiscError::invalid_format(format!("track {} has no INDEX 01", cue_track.number))
            })?;
            let begin = cue_track.first_position();
            let next_begin = file
                .tracks
                .get(i + 1)
                .map(|t| t.first_position())
                .unwrap_or(total);

            let mut pregap = idx01.saturating_sub(begin);
            if i == 0 {
                // A negative first-track pregap from broken sheets clamps
                // to zero (libcdio reports the same).
                pregap = 0;
            }

            if next_begin <= begin {
                return Err(DiscError::invalid_format(format!(
                    "track {} INDEX positions are not increasing",
                    cue_track.number
                )));
            }
            tracks.push(Track {
                number: cue_track.number,
                kind: cue_track.kind,
                start_sector: idx01,
                pregap_sectors: pregap,
                data_offset_sector: idx01,
                end_sector: next_begin - 1,
                total_sectors: next_begin - begin,
            });
            track_bin.push(0);
        }
    } else {
        let mut base = 0u32;
        for (i, file) in files.iter().enumerate() {
            let cue_track = &file.tracks[0];
            let idx01 = cue_track.index(1).unwrap_or(0);
            let begin = cue_track.first_position();
            let pregap = if i == 0 { 0 } else { idx01.saturating_sub(begin) };

            tracks.push(Track {
                number: cue_track.number,
                kind: cue_track.kind,
                start_sector: base + idx01,
                pregap_sectors: pregap,
                data_offset_sector: idx01,
                end_sector: base + bin_sectors[i] - 1,
                total_sectors: bin_sectors[i],
            });
            track_bin.push(i);
            base += bin_sectors[i];
        }
    }

    // Mixed-mode discs: the end LBN of non-last tracks is reported 150
    // sectors short by the disc library the catalog format grew up with.
    let mixed = tracks.iter().any(|t| t.kind == TrackKind::Audio);
    if mixed {
        let last = tracks.len() - 1;
        for track in &mut tracks[..last] {
            track.end_sector += LEADIN_FRAMES;
        }
    }

    let track1_sector_count = if single_bin {
        files[0]
            .tracks
            .get(1)
            .map(|t| t.first_position())
            .unwrap_or(bin_sectors[0])
    } else {
        bin_sectors[0]
    };

    let audio_sectors = tracks
        .iter()
        .filter(|t| t.kind == TrackKind::Audio)
        .map(|t| t.total_sectors)
        .sum();

    Ok(DiscLayout {
        tracks,
        bin_paths,
        track_bin,
        single_bin,
        track1_sector_count,
        audio_sectors,
    })
}

// ---------------------------------------------------------------------------
// Track listing CSV (stored base64-encoded in the catalog)
// ---------------------------------------------------------------------------

/// Serialize tracks as one CSV row each:
/// `number,kind,start,pregap,data_offset,end,total`.
pub fn tracks_to_csv(tracks: &[Track]) -> String {
    let mut out = String::new();
    for t in tracks {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            t.number,
            t.kind.as_cue_str(),
            t.start_sector,
            t.pregap_sectors,
            t.data_offset_sector,
            t.end_sector,
            t.total_sectors
        ));
    }
    out
}

/// Parse the CSV form back into tracks.
pub fn tracks_from_csv(csv: &str) -> Result<Vec<Track>, DiscError> {
    let mut tracks = Vec::new();
    for line in csv.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let [number, kind, start, pregap, data_offset, end, total] = fields[..] else {
            return Err(DiscError::invalid_format(format!(
                "malformed track listing row '{line}'"
            )));
        };
        let parse_u32 = |s: &str| -> Result<u32, DiscError> {
            s.parse()
                .map_err(|_| DiscError::invalid_format(format!("bad number '{s}' in track listing")))
        };
        tracks.push(Track {
            number: parse_u32(number)? as u8,
            kind: TrackKind::parse(kind).ok_or_else(|| {
                DiscError::invalid_format(format!("bad track type '{kind}' in track listing"))
            })?,
            start_sector: parse_u32(start)?,
            pregap_sectors: parse_u32(pregap)?,
            data_offset_sector: parse_u32(data_offset)?,
            end_sector: parse_u32(end)?,
            total_sectors: parse_u32(total)?,
        });
    }
    Ok(tracks)
}

// ---------------------------------------------------------------------------
// CUE generation
// ---------------------------------------------------------------------------

/// Emit a CUE sheet for a rebuilt single-BIN image. Audio track positions
/// are shifted by `audio_offset`, the growth of the data track between the
/// original image and the rebuild.
pub fn write_cue(tracks: &[Track], bin_name: &str, audio_offset: i64) -> String {
    let mut out = String::new();
    out.push_str(&format!("FILE \"{bin_name}\" BINARY\r\n"));

    for (i, track) in tracks.iter().enumerate() {
        out.push_str(&format!(
            "  TRACK {:02} {}\r\n",
            track.number,
            track.kind.as_cue_str()
        ));

        if i == 0 {
            out.push_str("    INDEX 01 00:00:00\r\n");
            continue;
        }

        let start = shift(track.start_sector, audio_offset);
        if track.pregap_sectors > 0 {
            let index0 = shift(
                track.start_sector.saturating_sub(track.pregap_sectors),
                audio_offset,
            );
            out.push_str(&format!("    INDEX 00 {}\r\n", Msf::from_sectors(index0)));
        }
        out.push_str(&format!("    INDEX 01 {}\r\n", Msf::from_sectors(start)));
    }
    out
}

fn shift(sector: u32, offset: i64) -> u32 {
    (i64::from(sector) + offset).max(0) as u32
}

#[cfg(test)]
#[path = "tests/cue_tests.rs"]
mod tests;
