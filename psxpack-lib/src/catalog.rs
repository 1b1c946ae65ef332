//! The catalog file: a line-oriented text sidecar that records every
//! volume, directory, and file attribute needed to rebuild an image
//! byte-for-byte.
//!
//! Three top-level blocks: `system_area { … }`, `volume { … }`, and the
//! root `dir … { … }` subtree. Entry lines carry suffix-valued attribute
//! tokens (`GID0 UID0 ATR2321 …`) and an optional `@LBN` position. The
//! parser tokenizes each line into an attribute bag instead of matching
//! per-attribute patterns, so token order never matters.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use psxpack_core::cue::{self, Track};
use psxpack_core::iso::chars;
use psxpack_core::iso::time::LongTime;
use psxpack_core::sector::PostgapKind;
use psxpack_core::{EVD_SECTOR, MAX_IMAGE_SECTORS};

use crate::error::EngineError;
use crate::tree::{FsTree, Node, NodeKind};

/// PVD string fields, dates, and default ownership from the `volume`
/// block.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
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
    pub default_uid: u16,
    pub default_gid: u16,
}

impl Default for VolumeInfo {
    fn default() -> Self {
        Self {
            system_id: String::new(),
            volume_id: String::new(),
            volume_set_id: String::new(),
            publisher_id: String::new(),
            preparer_id: String::new(),
            application_id: String::new(),
            copyright_file_id: String::new(),
            abstract_file_id: String::new(),
            bibliographic_file_id: String::new(),
            creation_date: LongTime::zero(),
            modification_date: LongTime::zero(),
            expiration_date: LongTime::zero(),
            effective_date: LongTime::zero(),
            default_uid: 0,
            default_gid: 0,
        }
    }
}

/// The tracking block: everything the rebuild needs to reproduce track
/// layout and postgap bytes.
#[derive(Debug, Clone)]
pub struct Tracking {
    pub tracks: Vec<Track>,
    /// Sectors of the whole original first track, postgap included.
    pub track1_sector_count: u32,
    pub postgap_kind: PostgapKind,
    pub audio_sectors: u32,
    pub strict_rebuild: bool,
}

impl Default for Tracking {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            track1_sector_count: 0,
            postgap_kind: PostgapKind::Empty,
            audio_sectors: 0,
            strict_rebuild: false,
        }
    }
}

/// A parsed catalog: volume metadata, track bookkeeping, and the
/// filesystem tree in insertion order.
#[derive(Debug)]
pub struct Catalog {
    pub system_area_file: Option<PathBuf>,
    pub volume: VolumeInfo,
    pub tracking: Tracking,
    pub tree: FsTree,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// The attribute bag a single entry line can carry.
#[derive(Debug, Default)]
struct AttrBag {
    lbn: Option<u32>,
    gid: u16,
    uid: u16,
    atr: u16,
    atrp: u16,
    date: String,
    datep: String,
    timezone: i8,
    timezonep: i8,
    size: u32,
    hidden: bool,
    y2k: u8,
    zero_edc: bool,
}

/// Attribute keys, longest first so prefixes never shadow each other.
const ATTR_KEYS: &[&str] = &[
    "TIMEZONES",
    "TIMEZONEP",
    "TIMEZONE",
    "ZEROEDC",
    "Y2KBUG",
    "HIDDEN",
    "DATES",
    "DATEP",
    "DATE",
    "ATRS",
    "ATRP",
    "ATR",
    "GID",
    "UID",
    "SIZE",
];

fn split_attr_token(token: &str) -> Option<(&'static str, &str)> {
    ATTR_KEYS
        .iter()
        .find(|key| token.starts_with(**key))
        .map(|key| (*key, &token[key.len()..]))
}

struct Parser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            pos: 0,
        }
    }

    /// Next non-blank line, trimmed, with its 1-based line number.
    fn next_line(&mut self) -> Option<(usize, &'a str)> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos].trim();
            self.pos += 1;
            if !line.is_empty() {
                return Some((self.pos, line));
            }
        }
        None
    }

    fn parse_attrs(
        &self,
        line_no: usize,
        tokens: &[&str],
    ) -> Result<AttrBag, EngineError> {
        let mut bag = AttrBag::default();

        for token in tokens {
            if let Some(value) = token.strip_prefix('@') {
                let lbn: u32 = value.parse().map_err(|_| {
                    EngineError::syntax(line_no, format!("invalid start LBN '@{value}'"))
                })?;
                if lbn <= EVD_SECTOR || lbn >= MAX_IMAGE_SECTORS {
                    return Err(EngineError::invariant(format!(
                        "start LBN {lbn} is outside the valid range {}..{}",
                        EVD_SECTOR + 1,
                        MAX_IMAGE_SECTORS
                    )));
                }
                bag.lbn = Some(lbn);
                continue;
            }

            let Some((key, value)) = split_attr_token(token) else {
                return Err(EngineError::syntax(
                    line_no,
                    format!("\"{token}\" unrecognized in directory section"),
                ));
            };

            match key {
                "GID" => bag.gid = parse_num(line_no, key, value)?,
                "UID" => bag.uid = parse_num(line_no, key, value)?,
                "ATR" => bag.atr = parse_num(line_no, key, value)?,
                "ATRS" => bag.atr = parse_num(line_no, key, value)?,
                "ATRP" => bag.atrp = parse_num(line_no, key, value)?,
                "DATE" => bag.date = parse_date(line_no, value)?,
                "DATES" => bag.date = parse_date(line_no, value)?,
                "DATEP" => bag.datep = parse_date(line_no, value)?,
                "TIMEZONE" => bag.timezone = parse_num(line_no, key, value)?,
                "TIMEZONES" => bag.timezone = parse_num(line_no, key, value)?,
                "TIMEZONEP" => bag.timezonep = parse_num(line_no, key, value)?,
                "SIZE" => bag.size = parse_num(line_no, key, value)?,
                "HIDDEN" => bag.hidden = parse_bool(line_no, key, value)?,
                "ZEROEDC" => bag.zero_edc = parse_bool(line_no, key, value)?,
                "Y2KBUG" => {
                    bag.y2k = parse_num(line_no, key, value)?;
                    if !matches!(bag.y2k, 0 | 1 | 10 | 11) {
                        return Err(EngineError::syntax(
                            line_no,
                            format!("invalid Y2KBUG value '{value}'"),
                        ));
                    }
                }
                _ => unreachable!(),
            }
        }
        Ok(bag)
    }
}

fn parse_num<T: std::str::FromStr>(
    line_no: usize,
    key: &str,
    value: &str,
) -> Result<T, EngineError> {
    value
        .parse()
        .map_err(|_| EngineError::syntax(line_no, format!("invalid {key} value '{value}'")))
}

fn parse_bool(line_no: usize, key: &str, value: &str) -> Result<bool, EngineError> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(EngineError::syntax(
            line_no,
            format!("invalid {key} value '{value}'"),
        )),
    }
}

fn parse_date(line_no: usize, value: &str) -> Result<String, EngineError> {
    if value.is_empty() {
        return Ok(String::new());
    }
    if value.len() != 14 || !value.bytes().all(|c| c.is_ascii_digit()) {
        return Err(EngineError::syntax(line_no, format!("invalid date '{value}'")));
    }
    Ok(value.to_string())
}

impl Catalog {
    /// Parse catalog text.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let mut parser = Parser::new(text);

        let mut system_area_file = None;
        let mut volume = VolumeInfo::default();
        let mut tracking = Tracking::default();
        let mut tree: Option<FsTree> = None;

        while let Some((line_no, line)) = parser.next_line() {
            if line == "system_area {" || (line.starts_with("system_area") && line.ends_with('{')) {
                system_area_file = parse_system_area(&mut parser)?;
            } else if line == "volume {" || (line.starts_with("volume") && line.ends_with('{')) {
                parse_volume(&mut parser, &mut volume, &mut tracking)?;
            } else if line.split_whitespace().next() == Some("dir") && line.ends_with('{') {
                if tree.is_some() {
                    return Err(EngineError::invariant(
                        "more than one root directory section in catalog file",
                    ));
                }
                let tokens: Vec<&str> = line.split_whitespace().collect();
                let attr_tokens = &tokens[1..tokens.len() - 1];
                let bag = parser.parse_attrs(line_no, attr_tokens)?;

                let mut root = Node::new(NodeKind::Directory, "");
                apply_dir_attrs(&mut root, &bag);
                let mut t = FsTree::new(root);
                parse_dir_body(&mut parser, &mut t, 0)?;
                tree = Some(t);
            } else {
                return Err(EngineError::syntax(
                    line_no,
                    format!("\"{line}\" unrecognized"),
                ));
            }
        }

        let tree = tree.ok_or_else(|| {
            EngineError::invariant("no root directory specified in catalog file")
        })?;

        Ok(Self {
            system_area_file,
            volume,
            tracking,
            tree,
        })
    }
}

fn parse_system_area(parser: &mut Parser<'_>) -> Result<Option<PathBuf>, EngineError> {
    let mut file = None;
    loop {
        let Some((line_no, line)) = parser.next_line() else {
            return Err(EngineError::invariant(
                "unterminated system_area section in catalog file",
            ));
        };
        if line == "}" {
            return Ok(file);
        }
        if let Some(rest) = line.strip_prefix("file") {
            let rest = rest.trim();
            let quoted = rest
                .strip_prefix('"')
                .and_then(|r| r.strip_suffix('"'))
                .ok_or_else(|| {
                    EngineError::syntax(line_no, "system_area file path must be quoted")
                })?;
            file = Some(PathBuf::from(quoted));
        } else {
            return Err(EngineError::syntax(
                line_no,
                format!("\"{line}\" unrecognized in system_area section"),
            ));
        }
    }
}

fn parse_volume(
    parser: &mut Parser<'_>,
    volume: &mut VolumeInfo,
    tracking: &mut Tracking,
) -> Result<(), EngineError> {
    loop {
        let Some((line_no, line)) = parser.next_line() else {
            return Err(EngineError::invariant(
                "unterminated volume section in catalog file",
            ));
        };
        if line == "}" {
            return Ok(());
        }

        let (key, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let bracketed = || -> Result<String, EngineError> {
            rest.strip_prefix('[')
                .and_then(|r| r.strip_suffix(']'))
                .map(str::to_string)
                .ok_or_else(|| {
                    EngineError::syntax(line_no, format!("{key} value must be bracketed"))
                })
        };
        let ltime = || -> Result<LongTime, EngineError> {
            LongTime::parse(rest).map_err(|e| EngineError::syntax(line_no, e.to_string()))
        };

        match key {
            "system_id" => {
                volume.system_id = bracketed()?;
                warn_achars(&volume.system_id, "system_id");
            }
            "volume_id" => {
                volume.volume_id = bracketed()?;
                warn_dchars(&volume.volume_id, "volume_id");
            }
            "volume_set_id" => {
                volume.volume_set_id = bracketed()?;
                warn_dchars(&volume.volume_set_id, "volume_set_id");
            }
            "publisher_id" => {
                volume.publisher_id = bracketed()?;
                warn_achars(&volume.publisher_id, "publisher_id");
            }
            "preparer_id" => {
                volume.preparer_id = bracketed()?;
                warn_achars(&volume.preparer_id, "preparer_id");
            }
            "application_id" => {
                volume.application_id = bracketed()?;
                warn_achars(&volume.application_id, "application_id");
            }
            "copyright_file_id" => {
                volume.copyright_file_id = bracketed()?;
                warn_dchars(&volume.copyright_file_id, "copyright_file_id");
            }
            "abstract_file_id" => {
                volume.abstract_file_id = bracketed()?;
                warn_dchars(&volume.abstract_file_id, "abstract_file_id");
            }
            "bibliographic_file_id" => {
                volume.bibliographic_file_id = bracketed()?;
                warn_dchars(&volume.bibliographic_file_id, "bibliographic_file_id");
            }
            "creation_date" => volume.creation_date = ltime()?,
            "modification_date" => volume.modification_date = ltime()?,
            "expiration_date" => volume.expiration_date = ltime()?,
            "effective_date" => volume.effective_date = ltime()?,
            "track_listing" => {
                let encoded = bracketed()?;
                let bytes = BASE64.decode(encoded.as_bytes()).map_err(|e| {
                    EngineError::syntax(line_no, format!("invalid track_listing base64: {e}"))
                })?;
                let csv = String::from_utf8(bytes).map_err(|_| {
                    EngineError::syntax(line_no, "track_listing is not valid UTF-8")
                })?;
                tracking.tracks = cue::tracks_from_csv(&csv)
                    .map_err(|e| EngineError::syntax(line_no, e.to_string()))?;
            }
            "track1_sector_count" => {
                tracking.track1_sector_count = parse_num(line_no, key, rest)?;
            }
            "track1_postgap_type" => {
                let code: u8 = parse_num(line_no, key, rest)?;
                tracking.postgap_kind = PostgapKind::from_code(code).ok_or_else(|| {
                    EngineError::syntax(line_no, format!("invalid postgap type '{rest}'"))
                })?;
            }
            "audio_sectors" => tracking.audio_sectors = parse_num(line_no, key, rest)?,
            "strict_rebuild" => tracking.strict_rebuild = parse_bool(line_no, key, rest)?,
            "default_uid" => volume.default_uid = parse_num(line_no, key, rest)?,
            "default_gid" => volume.default_gid = parse_num(line_no, key, rest)?,
            _ => {
                return Err(EngineError::syntax(
                    line_no,
                    format!("\"{line}\" unrecognized in volume section"),
                ));
            }
        }
    }
}

fn parse_dir_body(
    parser: &mut Parser<'_>,
    tree: &mut FsTree,
    dir: usize,
) -> Result<(), EngineError> {
    loop {
        let Some((line_no, line)) = parser.next_line() else {
            return Err(EngineError::invariant(format!(
                "unterminated directory section \"{}\" in catalog file",
                tree.node(dir).name
            )));
        };
        if line == "}" {
            return Ok(());
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens[0] {
            "dir" => {
                if tokens.last() != Some(&"{") {
                    return Err(EngineError::syntax(line_no, "dir line must end with '{'"));
                }
                let body = &tokens[1..tokens.len() - 1];
                let (name, attr_tokens) = body.split_first().ok_or_else(|| {
                    EngineError::syntax(line_no, "nested directory must be named")
                })?;
                let name = *name;
                if !chars::is_dstring(name) {
                    log::warn!("illegal character in directory name \"{name}\"");
                }
                let bag = parser.parse_attrs(line_no, attr_tokens)?;

                let mut node = Node::new(NodeKind::Directory, name);
                apply_dir_attrs(&mut node, &bag);
                let child = tree.add_child(dir, node);
                parse_dir_body(parser, tree, child)?;
            }
            "file" | "xafile" | "cddafile" => {
                let kind = match tokens[0] {
                    "file" => NodeKind::File,
                    "xafile" => NodeKind::XaFile,
                    _ => NodeKind::CddaRef,
                };
                let (name, attr_tokens) = tokens[1..].split_first().ok_or_else(|| {
                    EngineError::syntax(line_no, format!("{} line must be named", tokens[0]))
                })?;
                let name = *name;
                if !chars::is_file_name(name) {
                    return Err(EngineError::invariant(format!(
                        "illegal character in file name \"{name}\""
                    )));
                }
                let bag = parser.parse_attrs(line_no, attr_tokens)?;
                if kind == NodeKind::CddaRef && bag.lbn.is_none() {
                    return Err(EngineError::syntax(
                        line_no,
                        format!("cddafile \"{name}\" is missing its @LBN"),
                    ));
                }

                let mut node = Node::new(kind, format!("{name};1"));
                node.requested_lbn = bag.lbn.unwrap_or(0);
                node.gid = bag.gid;
                node.uid = bag.uid;
                node.attributes = bag.atr;
                node.date = bag.date;
                node.timezone = bag.timezone;
                node.node_size = bag.size;
                node.hidden = bag.hidden;
                node.y2k = bag.y2k;
                node.zero_edc = bag.zero_edc;
                tree.add_child(dir, node);
            }
            _ => {
                return Err(EngineError::syntax(
                    line_no,
                    format!("\"{line}\" unrecognized in directory section"),
                ));
            }
        }
    }
}

fn apply_dir_attrs(node: &mut Node, bag: &AttrBag) {
    node.requested_lbn = bag.lbn.unwrap_or(0);
    node.gid = bag.gid;
    node.uid = bag.uid;
    node.attributes = bag.atr;
    node.parent_attributes = bag.atrp;
    node.date = bag.date.clone();
    node.parent_date = bag.datep.clone();
    node.timezone = bag.timezone;
    node.parent_timezone = bag.timezonep;
    node.hidden = bag.hidden;
    node.y2k = bag.y2k;
}

fn warn_dchars(s: &str, what: &str) {
    if !chars::is_dstring(s) {
        log::warn!("illegal character in {what} \"{s}\"");
    }
}

fn warn_achars(s: &str, what: &str) {
    if !chars::is_astring(s) {
        log::warn!("illegal character in {what} \"{s}\"");
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Controls whether entry lines record their original LBNs. CDDA
/// references always do.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializeOptions {
    pub write_lbns: bool,
}

impl Catalog {
    /// Serialize into catalog text. Sibling order follows the tree's
    /// insertion order, which fixes the physical write order on rebuild.
    pub fn serialize(&self, options: SerializeOptions) -> String {
        let mut out = String::new();

        if let Some(path) = &self.system_area_file {
            out.push_str("system_area {\n");
            out.push_str(&format!("  file \"{}\"\n", path.display()));
            out.push_str("}\n\n");
        }

        let v = &self.volume;
        out.push_str("volume {\n");
        out.push_str(&format!("  system_id [{}]\n", v.system_id));
        out.push_str(&format!("  volume_id [{}]\n", v.volume_id));
        out.push_str(&format!("  volume_set_id [{}]\n", v.volume_set_id));
        out.push_str(&format!("  publisher_id [{}]\n", v.publisher_id));
        out.push_str(&format!("  preparer_id [{}]\n", v.preparer_id));
        out.push_str(&format!("  application_id [{}]\n", v.application_id));
        out.push_str(&format!("  copyright_file_id [{}]\n", v.copyright_file_id));
        out.push_str(&format!("  abstract_file_id [{}]\n", v.abstract_file_id));
        out.push_str(&format!(
            "  bibliographic_file_id [{}]\n",
            v.bibliographic_file_id
        ));
        out.push_str(&format!(
            "  creation_date {}\n",
            v.creation_date.format_catalog()
        ));
        out.push_str(&format!(
            "  modification_date {}\n",
            v.modification_date.format_catalog()
        ));
        out.push_str(&format!(
            "  expiration_date {}\n",
            v.expiration_date.format_catalog()
        ));
        out.push_str(&format!(
            "  effective_date {}\n",
            v.effective_date.format_catalog()
        ));

        let t = &self.tracking;
        let csv = cue::tracks_to_csv(&t.tracks);
        out.push_str(&format!("  track_listing [{}]\n", BASE64.encode(csv)));
        out.push_str(&format!(
            "  track1_sector_count {}\n",
            t.track1_sector_count
        ));
        out.push_str(&format!(
            "  track1_postgap_type {}\n",
            t.postgap_kind.code()
        ));
        out.push_str(&format!("  audio_sectors {}\n", t.audio_sectors));
        out.push_str(&format!(
            "  strict_rebuild {}\n",
            u8::from(t.strict_rebuild)
        ));
        out.push_str(&format!("  default_uid {}\n", v.default_uid));
        out.push_str(&format!("  default_gid {}\n", v.default_gid));
        out.push_str("}\n\n");

        self.serialize_dir(&mut out, self.tree.root(), 0, options);
        out
    }

    fn serialize_dir(
        &self,
        out: &mut String,
        id: usize,
        level: usize,
        options: SerializeOptions,
    ) {
        let node = self.tree.node(id);
        let indent = "  ".repeat(level);

        out.push_str(&indent);
        out.push_str("dir");
        if !node.name.is_empty() {
            out.push_str(&format!(" {}", node.name));
        }
        if options.write_lbns {
            out.push_str(&format!(" @{}", node.first_sector));
        }
        out.push_str(&format!(" GID{}", node.gid));
        out.push_str(&format!(" UID{}", node.uid));
        out.push_str(&format!(" ATRS{}", node.attributes));
        out.push_str(&format!(" ATRP{}", node.parent_attributes));
        out.push_str(&format!(" DATES{}", node.date));
        out.push_str(&format!(" DATEP{}", node.parent_date));
        out.push_str(&format!(" TIMEZONES{}", node.timezone));
        out.push_str(&format!(" TIMEZONEP{}", node.parent_timezone));
        out.push_str(&format!(" HIDDEN{}", u8::from(node.hidden)));
        if node.y2k != 0 {
            out.push_str(&format!(" Y2KBUG{}", node.y2k));
        }
        out.push_str(" {\n");

        for &child_id in &node.children {
            let child = self.tree.node(child_id);
            if child.is_directory() {
                self.serialize_dir(out, child_id, level + 1, options);
                continue;
            }

            let keyword = match child.kind {
                NodeKind::File => "file",
                NodeKind::XaFile => "xafile",
                NodeKind::CddaRef => "cddafile",
                NodeKind::Directory => unreachable!(),
            };
            let bare_name = child.name.split(';').next().unwrap_or(&child.name);

            out.push_str(&"  ".repeat(level + 1));
            out.push_str(&format!("{keyword} {bare_name}"));
            if options.write_lbns || child.kind == NodeKind::CddaRef {
                out.push_str(&format!(" @{}", child.first_sector));
            }
            out.push_str(&format!(" GID{}", child.gid));
            out.push_str(&format!(" UID{}", child.uid));
            out.push_str(&format!(" ATR{}", child.attributes));
            out.push_str(&format!(" DATE{}", child.date));
            out.push_str(&format!(" TIMEZONE{}", child.timezone));
            out.push_str(&format!(" SIZE{}", child.node_size));
            out.push_str(&format!(" HIDDEN{}", u8::from(child.hidden)));
            if child.y2k != 0 {
                out.push_str(&format!(" Y2KBUG{}", child.y2k));
            }
            if child.kind == NodeKind::XaFile {
                out.push_str(&format!(" ZEROEDC{}", u8::from(child.zero_edc)));
            }
            out.push('\n');
        }

        out.push_str(&indent);
        out.push_str("}\n");
    }
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
