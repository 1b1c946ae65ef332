use super::*;
use crate::iso::record::FLAG_DIRECTORY;
use crate::iso::time::RecordedTime;

fn sample_pvd() -> VolumeDescriptor {
    VolumeDescriptor {
        system_id: "PLAYSTATION".to_string(),
        volume_id: "TEST_GAME".to_string(),
        volume_set_id: String::new(),
        publisher_id: "ACME CORP".to_string(),
        preparer_id: String::new(),
        application_id: "PLAYSTATION".to_string(),
        copyright_file_id: String::new(),
        abstract_file_id: String::new(),
        bibliographic_file_id: String::new(),
        creation_date: LongTime::parse("1994-11-09 05:00:00.00 36").unwrap(),
        modification_date: LongTime::zero(),
        expiration_date: LongTime::zero(),
        effective_date: LongTime::zero(),
        volume_space_size: 242_175,
        path_table_size: 10,
        type_l_path_table: 18,
        opt_type_l_path_table: 19,
        type_m_path_table: 20,
        opt_type_m_path_table: 21,
        root: DirectoryRecord {
            extent: 22,
            size: 2048,
            time: RecordedTime::from_digits("19941108200000", 36).unwrap(),
            flags: FLAG_DIRECTORY,
            name: String::new(),
            xa: None,
        },
    }
}

#[test]
fn pvd_round_trip() {
    let pvd = sample_pvd();
    let bytes = pvd.build_pvd();

    assert_eq!(bytes[0], 0x01);
    assert_eq!(&bytes[1..6], b"CD001");

    let parsed = VolumeDescriptor::parse_pvd(&bytes).unwrap();
    assert_eq!(parsed.system_id, "PLAYSTATION");
    assert_eq!(parsed.volume_id, "TEST_GAME");
    assert_eq!(parsed.publisher_id, "ACME CORP");
    assert_eq!(parsed.volume_space_size, 242_175);
    assert_eq!(parsed.path_table_size, 10);
    assert_eq!(parsed.type_l_path_table, 18);
    assert_eq!(parsed.opt_type_l_path_table, 19);
    assert_eq!(parsed.type_m_path_table, 20);
    assert_eq!(parsed.opt_type_m_path_table, 21);
    assert_eq!(parsed.creation_date, pvd.creation_date);
    assert_eq!(parsed.root.extent, 22);
    assert_eq!(parsed.root.size, 2048);
    assert!(parsed.root.is_directory());
}

#[test]
fn pvd_carries_xa_signature() {
    let bytes = sample_pvd().build_pvd();
    assert_eq!(&bytes[1024..1032], b"CD-XA001");
}

#[test]
fn identifiers_are_space_padded() {
    let bytes = sample_pvd().build_pvd();
    // "PLAYSTATION" is 11 characters; the rest of the 32-byte field is
    // space filled.
    assert_eq!(&bytes[8..19], b"PLAYSTATION");
    assert!(bytes[19..40].iter().all(|&b| b == b' '));
}

#[test]
fn parse_rejects_wrong_type_or_signature() {
    let mut bytes = sample_pvd().build_pvd();
    bytes[0] = 0x02;
    assert!(VolumeDescriptor::parse_pvd(&bytes).is_err());

    let mut bytes = sample_pvd().build_pvd();
    bytes[1] = b'X';
    assert!(VolumeDescriptor::parse_pvd(&bytes).is_err());
}

#[test]
fn evd_is_terminator() {
    let bytes = build_evd();
    assert_eq!(bytes[0], 255);
    assert_eq!(&bytes[1..6], b"CD001");
    assert_eq!(bytes[6], 1);
    assert!(bytes[7..].iter().all(|&b| b == 0));
}
