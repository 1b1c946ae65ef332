use super::*;
use crate::iso::time::RecordedTime;
use crate::iso::xa::{XA_ATTR_DIRECTORY, XaExtension};

fn sample_record(name: &str, flags: u8) -> DirectoryRecord {
    DirectoryRecord {
        extent: 24,
        size: 6144,
        time: RecordedTime::from_digits("19941109053015", 36).unwrap(),
        flags,
        name: name.to_string(),
        xa: Some(XaExtension::new(0, 0, XA_ATTR_DIRECTORY | 0x0555, 0)),
    }
}

#[test]
fn record_size_pads_to_even_offsets() {
    // 33 + 1 = 34 is already even.
    assert_eq!(record_size(1, 14), 48);
    // 33 + 2 = 35 pads to 36.
    assert_eq!(record_size(2, 14), 50);
    assert_eq!(record_size(0, 0), 34);
}

#[test]
fn write_parse_round_trip() {
    let record = sample_record("README.TXT;1", 0);
    let mut buf = [0u8; 128];
    let written = record.write_to(&mut buf);
    assert_eq!(written, record.encoded_len());
    assert_eq!(written as u8, buf[0]);

    let (parsed, len) = DirectoryRecord::parse(&buf).unwrap().unwrap();
    assert_eq!(len, written);
    assert_eq!(parsed, record);
}

#[test]
fn dot_names_use_special_identifiers() {
    let dot = sample_record(".", FLAG_DIRECTORY);
    let mut buf = [0u8; 64];
    dot.write_to(&mut buf);
    assert_eq!(buf[32], 1);
    assert_eq!(buf[33], 0x00);
    let (parsed, _) = DirectoryRecord::parse(&buf).unwrap().unwrap();
    assert_eq!(parsed.name, ".");

    let dotdot = sample_record("..", FLAG_DIRECTORY);
    dotdot.write_to(&mut buf);
    assert_eq!(buf[33], 0x01);
    let (parsed, _) = DirectoryRecord::parse(&buf).unwrap().unwrap();
    assert_eq!(parsed.name, "..");
}

#[test]
fn extent_field_is_both_endian() {
    let record = sample_record("A.BIN;1", 0);
    let mut buf = [0u8; 64];
    record.write_to(&mut buf);
    assert_eq!(&buf[2..6], &24u32.to_le_bytes());
    assert_eq!(&buf[6..10], &24u32.to_be_bytes());
    assert_eq!(&buf[10..14], &6144u32.to_le_bytes());
    assert_eq!(&buf[14..18], &6144u32.to_be_bytes());
}

#[test]
fn zero_length_byte_ends_the_sector() {
    let buf = [0u8; 64];
    assert!(DirectoryRecord::parse(&buf).unwrap().is_none());
}

#[test]
fn hidden_and_directory_flags() {
    let record = sample_record("SECRET", FLAG_DIRECTORY | FLAG_HIDDEN);
    assert!(record.is_directory());
    assert!(record.is_hidden());
    let mut buf = [0u8; 64];
    record.write_to(&mut buf);
    assert_eq!(buf[25], FLAG_DIRECTORY | FLAG_HIDDEN);
}

#[test]
fn extent_sectors_rounds_up() {
    let mut record = sample_record("A;1", 0);
    record.size = 1;
    assert_eq!(record.extent_sectors(), 1);
    record.size = 2048;
    assert_eq!(record.extent_sectors(), 1);
    record.size = 2049;
    assert_eq!(record.extent_sectors(), 2);
}

#[test]
fn xa_reserved_bytes_survive_round_trip() {
    let mut record = sample_record("RAW.BIN;1", 0);
    record.xa = Some(XaExtension {
        reserved: [0xDE, 0xAD, 0xBE, 0xEF, 0x42],
        ..XaExtension::new(0, 0, 0x0555, 0)
    });

    let mut buf = [0u8; 64];
    let len = record.write_to(&mut buf);
    assert_eq!(&buf[len - 5..len], &[0xDE, 0xAD, 0xBE, 0xEF, 0x42]);

    let (parsed, _) = DirectoryRecord::parse(&buf).unwrap().unwrap();
    assert_eq!(parsed, record);
}

#[test]
fn record_without_xa_parses_none() {
    let mut record = sample_record("PLAIN.TXT;1", 0);
    record.xa = None;
    let mut buf = [0u8; 64];
    record.write_to(&mut buf);
    let (parsed, _) = DirectoryRecord::parse(&buf).unwrap().unwrap();
    assert_eq!(parsed.xa, None);
}
