use super::*;
use psxpack_core::cue::TrackKind;
use psxpack_core::sector::PostgapKind;

use crate::tree::NodeKind;

const SAMPLE: &str = r#"system_area {
  file "GAME.sys"
}

volume {
  system_id [PLAYSTATION]
  volume_id [GAME]
  volume_set_id []
  publisher_id [ACME CORP]
  preparer_id []
  application_id [PLAYSTATION]
  copyright_file_id []
  abstract_file_id []
  bibliographic_file_id []
  creation_date 1994-11-09 05:00:00.00 36
  modification_date 0000-00-00 00:00:00.00 0
  expiration_date 0000-00-00 00:00:00.00 0
  effective_date 0000-00-00 00:00:00.00 0
  track_listing [MSxNT0RFMi8yMzUyLDAsMCwwLDYwMTQ5LDYwMDAwCjIsQVVESU8sNjAxNTAsMTUwLDYwMTUwLDY5OTk5LDEwMDAwCg==]
  track1_sector_count 60000
  track1_postgap_type 2
  audio_sectors 10000
  strict_rebuild 0
  default_uid 0
  default_gid 0
}

dir @22 GID0 UID0 ATRS36181 ATRP36181 DATES19941109050000 DATEP19941109050000 TIMEZONES36 TIMEZONEP36 HIDDEN0 {
  file SLUS_000.01 @24 GID1117 UID20 ATR2321 DATE19941109050000 TIMEZONE36 SIZE1024 HIDDEN0
  xafile MOVIE.STR @30 GID0 UID0 ATR5461 DATE19941109050000 TIMEZONE36 SIZE204800 HIDDEN0 ZEROEDC1
  cddafile MUSIC.DA @70000 GID0 UID0 ATR17749 DATE19941109050000 TIMEZONE36 SIZE529200 HIDDEN0
  dir SUB @31 GID0 UID0 ATRS36181 ATRP36181 DATES19941109050000 DATEP19941109050000 TIMEZONES36 TIMEZONEP36 HIDDEN1 {
    file HIDDEN.DAT @32 GID0 UID0 ATR2321 DATE19000101000000 TIMEZONE0 SIZE77 HIDDEN1 Y2KBUG1
  }
}
"#;

#[test]
fn parse_sample_catalog() {
    let cat = Catalog::parse(SAMPLE).unwrap();

    assert_eq!(
        cat.system_area_file.as_deref(),
        Some(std::path::Path::new("GAME.sys"))
    );
    assert_eq!(cat.volume.system_id, "PLAYSTATION");
    assert_eq!(cat.volume.publisher_id, "ACME CORP");
    assert_eq!(
        cat.volume.creation_date.format_catalog(),
        "1994-11-09 05:00:00.00 36"
    );

    assert_eq!(cat.tracking.track1_sector_count, 60000);
    assert_eq!(cat.tracking.postgap_kind, PostgapKind::EmptyForm2);
    assert_eq!(cat.tracking.audio_sectors, 10000);
    assert!(!cat.tracking.strict_rebuild);
    assert_eq!(cat.tracking.tracks.len(), 2);
    assert_eq!(cat.tracking.tracks[1].kind, TrackKind::Audio);
    assert_eq!(cat.tracking.tracks[1].start_sector, 60150);

    let tree = &cat.tree;
    let root = tree.node(tree.root());
    assert_eq!(root.requested_lbn, 22);
    assert_eq!(root.attributes, 36181);
    assert_eq!(root.children.len(), 4);

    let exe = tree.node(root.children[0]);
    assert_eq!(exe.kind, NodeKind::File);
    assert_eq!(exe.name, "SLUS_000.01;1");
    assert_eq!(exe.requested_lbn, 24);
    assert_eq!(exe.gid, 1117);
    assert_eq!(exe.uid, 20);
    assert_eq!(exe.node_size, 1024);

    let movie = tree.node(root.children[1]);
    assert_eq!(movie.kind, NodeKind::XaFile);
    assert!(movie.zero_edc);

    let music = tree.node(root.children[2]);
    assert_eq!(music.kind, NodeKind::CddaRef);
    assert_eq!(music.requested_lbn, 70000);

    let sub = tree.node(root.children[3]);
    assert_eq!(sub.kind, NodeKind::Directory);
    assert!(sub.hidden);

    let hidden = tree.node(sub.children[0]);
    assert_eq!(hidden.date, "19000101000000");
    assert_eq!(hidden.y2k, 1);
    assert!(hidden.hidden);
}

#[test]
fn serialize_then_parse_is_identity() {
    let cat = Catalog::parse(SAMPLE).unwrap();

    // Re-serialize with LBNs: first sectors mirror the requested ones.
    let mut cat = cat;
    for id in cat.tree.preorder() {
        let node = cat.tree.node_mut(id);
        node.first_sector = node.requested_lbn;
    }

    let text = cat.serialize(SerializeOptions { write_lbns: true });
    let mut reparsed = Catalog::parse(&text).unwrap();
    for id in reparsed.tree.preorder() {
        let node = reparsed.tree.node_mut(id);
        node.first_sector = node.requested_lbn;
    }

    assert_eq!(reparsed.volume.system_id, cat.volume.system_id);
    assert_eq!(reparsed.tracking.tracks, cat.tracking.tracks);
    assert_eq!(reparsed.tree.len(), cat.tree.len());

    for (a, b) in cat.tree.preorder().iter().zip(reparsed.tree.preorder()) {
        let x = cat.tree.node(*a);
        let y = reparsed.tree.node(b);
        assert_eq!(x.kind, y.kind);
        assert_eq!(x.name, y.name);
        assert_eq!(x.requested_lbn, y.requested_lbn);
        assert_eq!(x.gid, y.gid);
        assert_eq!(x.uid, y.uid);
        assert_eq!(x.attributes, y.attributes);
        assert_eq!(x.parent_attributes, y.parent_attributes);
        assert_eq!(x.date, y.date);
        assert_eq!(x.parent_date, y.parent_date);
        assert_eq!(x.timezone, y.timezone);
        assert_eq!(x.parent_timezone, y.parent_timezone);
        assert_eq!(x.hidden, y.hidden);
        assert_eq!(x.y2k, y.y2k);
        assert_eq!(x.zero_edc, y.zero_edc);
        assert_eq!(x.node_size, y.node_size);
    }

    // Serializing the reparsed catalog reproduces the text exactly.
    assert_eq!(reparsed.serialize(SerializeOptions { write_lbns: true }), text);
}

#[test]
fn sibling_insertion_order_is_preserved() {
    let cat = Catalog::parse(SAMPLE).unwrap();
    let names: Vec<String> = cat
        .tree
        .node(cat.tree.root())
        .children
        .iter()
        .map(|&id| cat.tree.node(id).name.clone())
        .collect();
    assert_eq!(
        names,
        vec!["SLUS_000.01;1", "MOVIE.STR;1", "MUSIC.DA;1", "SUB"]
    );
}

#[test]
fn missing_root_is_fatal() {
    let err = Catalog::parse("volume {\n}\n").unwrap_err();
    assert!(err.to_string().contains("no root directory"));
}

#[test]
fn duplicate_root_is_fatal() {
    let text = "dir {\n}\ndir {\n}\n";
    let err = Catalog::parse(text).unwrap_err();
    assert!(err.to_string().contains("more than one root"));
}

#[test]
fn unterminated_section_is_fatal() {
    assert!(Catalog::parse("dir {\n  file A SIZE1\n").is_err());
    assert!(Catalog::parse("volume {\n  system_id [X]\n").is_err());
}

#[test]
fn cddafile_requires_an_lbn() {
    let text = "dir {\n  cddafile MUSIC.DA GID0\n}\n";
    let err = Catalog::parse(text).unwrap_err();
    assert!(err.to_string().contains("@LBN"));
}

#[test]
fn lbn_range_is_enforced() {
    // 17 is the EVD sector; file data cannot live there.
    assert!(Catalog::parse("dir {\n  file A.BIN @17 SIZE1\n}\n").is_err());
    assert!(Catalog::parse("dir {\n  file A.BIN @333000 SIZE1\n}\n").is_err());
    assert!(Catalog::parse("dir {\n  file A.BIN @18 SIZE1\n}\n").is_ok());
}

#[test]
fn illegal_file_name_characters_are_fatal() {
    let err = Catalog::parse("dir {\n  file bad~name SIZE1\n}\n").unwrap_err();
    assert!(err.to_string().contains("illegal character"));
}

#[test]
fn unknown_tokens_are_fatal() {
    assert!(Catalog::parse("dir {\n  file A.BIN BOGUS7\n}\n").is_err());
    assert!(Catalog::parse("volume {\n  flux_capacitor 88\n}\n").is_err());
}

#[test]
fn negative_timezones_round_trip() {
    let text = "dir GID0 UID0 ATRS0 ATRP0 DATES19941109050000 DATEP19941109050000 TIMEZONES-20 TIMEZONEP-20 HIDDEN0 {\n}\n";
    let cat = Catalog::parse(text).unwrap();
    assert_eq!(cat.tree.node(0).timezone, -20);

    let out = cat.serialize(SerializeOptions::default());
    assert!(out.contains("TIMEZONES-20"));
}

#[test]
fn y2k_marker_values_are_validated() {
    assert!(Catalog::parse("dir Y2KBUG5 {\n}\n").is_err());
    assert!(Catalog::parse("dir Y2KBUG11 {\n}\n").is_ok());
}
