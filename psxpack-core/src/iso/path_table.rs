//! ISO 9660 path tables.
//!
//! Both byte orders describe the same breadth-first, name-sorted directory
//! index; record numbers are 1-based and the root references itself.

/// One path table record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTableEntry {
    /// Directory identifier; empty for the root.
    pub name: String,
    /// LBN of the directory extent.
    pub extent: u32,
    /// 1-based record number of the parent directory.
    pub parent: u16,
}

/// An in-memory path table, serializable in both byte orders.
#[derive(Debug, Default)]
pub struct PathTable {
    entries: Vec<PathTableEntry>,
}

impl PathTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return its 1-based record number.
    pub fn add(&mut self, name: &str, extent: u32, parent: u16) -> u16 {
        self.entries.push(PathTableEntry {
            name: name.to_string(),
            extent,
            parent,
        });
        self.entries.len() as u16
    }

    pub fn entries(&self) -> &[PathTableEntry] {
        &self.entries
    }

    /// Encoded size in bytes, identical for both byte orders.
    pub fn size(&self) -> usize {
        self.entries
            .iter()
            .map(|e| {
                let name_len = identifier_len(&e.name);
                8 + name_len + name_len % 2
            })
            .sum()
    }

    /// Serialize with little-endian fields (the L table).
    pub fn to_bytes_lsb(&self) -> Vec<u8> {
        self.serialize(true)
    }

    /// Serialize with big-endian fields (the M table).
    pub fn to_bytes_msb(&self) -> Vec<u8> {
        self.serialize(false)
    }

    fn serialize(&self, little_endian: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        for entry in &self.entries {
            let name_len = identifier_len(&entry.name);
            out.push(name_len as u8);
            out.push(0); // extended attribute record length
            if little_endian {
                out.extend_from_slice(&entry.extent.to_le_bytes());
                out.extend_from_slice(&entry.parent.to_le_bytes());
            } else {
                out.extend_from_slice(&entry.extent.to_be_bytes());
                out.extend_from_slice(&entry.parent.to_be_bytes());
            }
            if entry.name.is_empty() {
                out.push(0);
            } else {
                out.extend_from_slice(entry.name.as_bytes());
            }
            if name_len % 2 != 0 {
                out.push(0);
            }
        }
        out
    }
}

fn identifier_len(name: &str) -> usize {
    if name.is_empty() { 1 } else { name.len() }
}

#[cfg(test)]
#[path = "tests/path_table_tests.rs"]
mod tests;
