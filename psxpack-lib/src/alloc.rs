//! Sector allocation for the rebuild.
//!
//! The default policy walks the tree in insertion order and honours
//! requested LBNs by writing gap sectors up to them; the strict policy
//! puts every file back at its original LBN and relocates only what no
//! longer fits. Audio references never consume data-track sectors; their
//! directory entries are fixed up afterwards with the growth of track 1.

use psxpack_core::POSTGAP_SECTORS;
use psxpack_core::sector::PostgapKind;

use crate::FIRST_DATA_SECTOR;
use crate::error::EngineError;
use crate::tree::{FsTree, NodeId, NodeKind};

/// Per-invocation state of a build. Two builds never share one of these.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Sectors of the original first track, postgap included.
    pub track1_sector_count: u32,
    pub postgap_kind: PostgapKind,
    pub audio_sectors: u32,
    pub strict: bool,
    /// Quarter-hour GMT offset of the volume creation date.
    pub time_zone: i8,
    /// Cursor position after allocation: first sector past the data.
    pub end_of_track1: u32,
    /// Applied to every audio reference: growth of track 1 between the
    /// original image and this rebuild.
    pub audio_offset: i64,
}

impl BuildContext {
    pub fn new(
        track1_sector_count: u32,
        postgap_kind: PostgapKind,
        audio_sectors: u32,
        strict: bool,
        time_zone: i8,
    ) -> Self {
        Self {
            track1_sector_count,
            postgap_kind,
            audio_sectors,
            strict,
            time_zone,
            end_of_track1: 0,
            audio_offset: 0,
        }
    }
}

/// Assign first sectors to every extent. Directory sizes must already be
/// computed. Fills in `ctx.end_of_track1` and `ctx.audio_offset`.
pub fn allocate(tree: &mut FsTree, ctx: &mut BuildContext) -> Result<(), EngineError> {
    let end = if ctx.strict {
        allocate_strict(tree)?
    } else {
        allocate_default(tree)
    };
    ctx.end_of_track1 = end;

    // The CDDA fix-up: directory entries keep pointing at the right
    // audio sectors after the data track grows or shrinks.
    if ctx.track1_sector_count > POSTGAP_SECTORS {
        ctx.audio_offset = i64::from(end) + i64::from(POSTGAP_SECTORS)
            - i64::from(ctx.track1_sector_count);
    }

    for id in tree.preorder() {
        let node = tree.node_mut(id);
        if node.kind == NodeKind::CddaRef {
            node.first_sector =
                (i64::from(node.requested_lbn) + ctx.audio_offset).max(0) as u32;
        }
    }
    Ok(())
}

/// Contiguous allocation with hints: requested LBNs ahead of the cursor
/// open a gap, requests at or behind it are refused with a warning.
fn allocate_default(tree: &mut FsTree) -> u32 {
    let mut cursor = FIRST_DATA_SECTOR;

    for id in tree.preorder() {
        let node = tree.node_mut(id);
        if node.kind == NodeKind::CddaRef {
            continue;
        }

        if node.requested_lbn != 0 {
            if node.requested_lbn < cursor {
                log::warn!(
                    "{} will start at sector {} instead of {}",
                    node.name,
                    cursor,
                    node.requested_lbn
                );
                node.first_sector = cursor;
            } else {
                node.first_sector = node.requested_lbn;
            }
        } else {
            node.first_sector = cursor;
        }

        cursor = node.first_sector + node.sector_count;
    }
    cursor
}

/// Strict allocation: everything that still fits inside the space the
/// original TOC reserved for it goes back to its original LBN; files
/// that grew are appended at the tail of track 1 in encounter order.
fn allocate_strict(tree: &mut FsTree) -> Result<u32, EngineError> {
    // Sort all placeable nodes by their original position; the reserved
    // space of each is the distance to the next original position.
    let mut placed: Vec<NodeId> = tree
        .preorder()
        .into_iter()
        .filter(|&id| {
            let node = tree.node(id);
            node.kind != NodeKind::CddaRef && node.requested_lbn != 0
        })
        .collect();
    placed.sort_by_key(|&id| tree.node(id).requested_lbn);

    let mut overflow: Vec<NodeId> = tree
        .preorder()
        .into_iter()
        .filter(|&id| {
            let node = tree.node(id);
            node.kind != NodeKind::CddaRef && node.requested_lbn == 0
        })
        .collect();

    let mut tail = FIRST_DATA_SECTOR;
    for (i, &id) in placed.iter().enumerate() {
        let reserved = placed
            .get(i + 1)
            .map(|&next| tree.node(next).requested_lbn - tree.node(id).requested_lbn);
        let node = tree.node(id);

        let fits = match reserved {
            Some(reserved) => node.sector_count <= reserved,
            None => true, // the last extent may extend the track freely
        };

        if fits {
            let node = tree.node_mut(id);
            node.first_sector = node.requested_lbn;
            tail = tail.max(node.first_sector + node.sector_count);
        } else {
            log::warn!(
                "{} no longer fits at sector {}, relocating to the end of the data track",
                node.name,
                node.requested_lbn
            );
            overflow.push(id);
        }
    }

    // Append overflow files in encounter order.
    for &id in &overflow {
        let node = tree.node_mut(id);
        node.first_sector = tail;
        tail += node.sector_count;
    }

    // A relocated extent must not land inside anything placed at its
    // original position; reject instead of silently reordering.
    for &id in &overflow {
        let (start, count) = {
            let node = tree.node(id);
            (node.first_sector, node.sector_count)
        };
        for &other in &placed {
            if overflow.contains(&other) {
                continue;
            }
            let o = tree.node(other);
            if start < o.first_sector + o.sector_count && o.first_sector < start + count {
                return Err(EngineError::invariant(format!(
                    "relocated extent {} collides with {} at sector {}",
                    tree.node(id).name,
                    o.name,
                    o.first_sector
                )));
            }
        }
    }

    Ok(tail)
}

#[cfg(test)]
#[path = "tests/alloc_tests.rs"]
mod tests;
