use super::*;

fn sample_table() -> PathTable {
    let mut table = PathTable::new();
    let root = table.add("", 22, 1);
    assert_eq!(root, 1);
    let sub = table.add("DATA", 30, root);
    assert_eq!(sub, 2);
    table.add("XTRA1", 40, sub);
    table
}

#[test]
fn root_record_encoding() {
    let table = sample_table();
    let bytes = table.to_bytes_lsb();

    // Root: name length 1, zero xattr, extent 22 LE, parent 1, name 0x00.
    assert_eq!(bytes[0], 1);
    assert_eq!(bytes[1], 0);
    assert_eq!(&bytes[2..6], &22u32.to_le_bytes());
    assert_eq!(&bytes[6..8], &1u16.to_le_bytes());
    assert_eq!(bytes[8], 0);
    // Name length 1 is odd, so one pad byte follows.
    assert_eq!(bytes[9], 0);
}

#[test]
fn byte_orders_differ_only_in_fields() {
    let table = sample_table();
    let lsb = table.to_bytes_lsb();
    let msb = table.to_bytes_msb();
    assert_eq!(lsb.len(), msb.len());

    // Second record starts at 10: name "DATA", extent 30, parent 1.
    assert_eq!(&lsb[12..16], &30u32.to_le_bytes());
    assert_eq!(&msb[12..16], &30u32.to_be_bytes());
    assert_eq!(&lsb[18..22], b"DATA");
    assert_eq!(&msb[18..22], b"DATA");
}

#[test]
fn size_matches_serialized_length() {
    let table = sample_table();
    assert_eq!(table.size(), table.to_bytes_lsb().len());
    // Root 10 + "DATA" (8 + 4) + "XTRA1" (8 + 5 + 1 pad) = 36.
    assert_eq!(table.size(), 36);
}

#[test]
fn record_numbers_are_one_based() {
    let mut table = PathTable::new();
    assert_eq!(table.add("", 22, 1), 1);
    assert_eq!(table.add("A", 30, 1), 2);
    assert_eq!(table.add("B", 31, 1), 3);
    assert_eq!(table.entries().len(), 3);
    assert_eq!(table.entries()[2].parent, 1);
}
