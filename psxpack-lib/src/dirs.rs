//! Directory extent and path table emission.
//!
//! Runs after allocation: every node has its first sector, so the `.` and
//! `..` records, the child records, and both path tables can be written
//! as bytes.

use psxpack_core::ISO_BLOCK_SIZE;
use psxpack_core::iso::path_table::PathTable;
use psxpack_core::iso::record::{DirectoryRecord, FLAG_DIRECTORY, FLAG_HIDDEN, record_size};
use psxpack_core::iso::time::RecordedTime;
use psxpack_core::iso::xa::{XA_EXTENSION_SIZE, XaExtension};

use crate::error::EngineError;
use crate::tree::{FsTree, NodeId, NodeKind};

/// Compute the extent size in sectors of every directory. Records never
/// straddle a sector: a record that would cross the boundary is pushed
/// to the next sector, padding the previous one.
pub fn compute_directory_sizes(tree: &mut FsTree) {
    for id in tree.preorder_sorted() {
        if !tree.node(id).is_directory() {
            continue;
        }

        // "." and ".." records.
        let mut size = 2 * record_size(1, XA_EXTENSION_SIZE);

        for child_id in tree.sorted_children(id) {
            let name = &tree.node(child_id).name;
            let rec = record_size(name.len(), XA_EXTENSION_SIZE);
            if size % ISO_BLOCK_SIZE + rec > ISO_BLOCK_SIZE {
                size += ISO_BLOCK_SIZE - size % ISO_BLOCK_SIZE;
            }
            size += rec;
        }

        tree.node_mut(id).sector_count = size.div_ceil(ISO_BLOCK_SIZE) as u32;
    }
}

/// The directory-record size field for a node, per its kind.
fn record_data_size(tree: &FsTree, id: NodeId) -> u32 {
    let node = tree.node(id);
    match node.kind {
        // Audio references keep the original record's size verbatim.
        NodeKind::CddaRef => node.node_size,
        // Form 1 files record their true byte length.
        NodeKind::File => node.size_bytes as u32,
        // Form 2 files and directories record whole sectors at the
        // logical block size.
        NodeKind::XaFile | NodeKind::Directory => node.sector_count * ISO_BLOCK_SIZE as u32,
    }
}

fn node_time(date: &str, timezone: i8) -> Result<RecordedTime, EngineError> {
    Ok(RecordedTime::from_digits(date, timezone)?)
}

fn node_record(tree: &FsTree, id: NodeId) -> Result<DirectoryRecord, EngineError> {
    let node = tree.node(id);

    let mut flags = if node.is_directory() {
        FLAG_DIRECTORY
    } else {
        0
    };
    if node.hidden {
        flags |= FLAG_HIDDEN;
    }

    // Form 2 files advertise their file number; everything else is 0.
    let file_number = u8::from(node.kind == NodeKind::XaFile);

    Ok(DirectoryRecord {
        extent: node.first_sector,
        size: record_data_size(tree, id),
        time: node_time(&node.date, node.timezone)?,
        flags,
        name: node.name.clone(),
        xa: Some(XaExtension::new(node.gid, node.uid, node.attributes, file_number)),
    })
}

/// Build one directory's extent, padded to whole sectors.
pub fn build_directory_extent(tree: &FsTree, id: NodeId) -> Result<Vec<u8>, EngineError> {
    let dir = tree.node(id);
    let mut data = vec![0u8; dir.sector_count as usize * ISO_BLOCK_SIZE];
    let mut pos = 0usize;

    let (parent_sector, parent_size) = match dir.parent {
        Some(parent) => {
            let p = tree.node(parent);
            (p.first_sector, p.sector_count * ISO_BLOCK_SIZE as u32)
        }
        None => (dir.first_sector, dir.sector_count * ISO_BLOCK_SIZE as u32),
    };

    let dot = DirectoryRecord {
        extent: dir.first_sector,
        size: dir.sector_count * ISO_BLOCK_SIZE as u32,
        time: node_time(&dir.date, dir.timezone)?,
        flags: FLAG_DIRECTORY,
        name: ".".to_string(),
        xa: Some(XaExtension::new(dir.gid, dir.uid, dir.attributes, 0)),
    };
    pos += dot.write_to(&mut data[pos..]);

    let dotdot = DirectoryRecord {
        extent: parent_sector,
        size: parent_size,
        time: node_time(&dir.parent_date, dir.parent_timezone)?,
        flags: FLAG_DIRECTORY,
        name: "..".to_string(),
        xa: Some(XaExtension::new(dir.gid, dir.uid, dir.parent_attributes, 0)),
    };
    pos += dotdot.write_to(&mut data[pos..]);

    for child_id in tree.sorted_children(id) {
        let record = node_record(tree, child_id)?;
        let len = record.encoded_len();
        if pos % ISO_BLOCK_SIZE + len > ISO_BLOCK_SIZE {
            pos += ISO_BLOCK_SIZE - pos % ISO_BLOCK_SIZE;
        }
        pos += record.write_to(&mut data[pos..]);
    }

    Ok(data)
}

/// Build both path tables breadth-first over name-sorted directories,
/// assigning each directory its 1-based record number. One sector is the
/// supported capacity per table.
pub fn build_path_tables(tree: &mut FsTree) -> Result<(Vec<u8>, Vec<u8>), EngineError> {
    let mut table = PathTable::new();

    for id in tree.breadth_first_sorted_dirs() {
        let parent_record = tree
            .node(id)
            .parent
            .map(|p| tree.node(p).record_number)
            .unwrap_or(1);
        let node = tree.node(id);
        let record = table.add(&node.name, node.first_sector, parent_record);
        tree.node_mut(id).record_number = record;
    }

    if table.size() > ISO_BLOCK_SIZE {
        return Err(EngineError::invariant(
            "the path table is larger than one sector, which is not supported",
        ));
    }

    Ok((table.to_bytes_lsb(), table.to_bytes_msb()))
}

#[cfg(test)]
#[path = "tests/dirs_tests.rs"]
mod tests;
