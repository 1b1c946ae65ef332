use super::*;
use std::fs;
use std::path::Path;

use psxpack_core::sector::{XaForm, classify_postgap, decode_mode2};
use psxpack_core::{ISO_BLOCK_SIZE, RAW_SECTOR_SIZE};
use tempfile::TempDir;

fn no_progress(_: BuildProgress) {}

const VOLUME_BLOCK: &str = "volume {
  system_id [PLAYSTATION]
  volume_id [TEST]
  volume_set_id []
  publisher_id []
  preparer_id []
  application_id [PLAYSTATION]
  copyright_file_id []
  abstract_file_id []
  bibliographic_file_id []
  creation_date 1994-11-09 05:00:00.00 36
  modification_date 0000-00-00 00:00:00.00 0
  expiration_date 0000-00-00 00:00:00.00 0
  effective_date 0000-00-00 00:00:00.00 0
  track1_sector_count 0
  track1_postgap_type 1
  audio_sectors 0
  strict_rebuild 0
  default_uid 0
  default_gid 0
}
";

/// Write a catalog plus its host tree and return the catalog path.
fn setup(dir: &Path, dir_body: &str, files: &[(&str, &[u8])]) -> std::path::PathBuf {
    let base = dir.join("TEST");
    fs::create_dir_all(&base).unwrap();
    for (name, content) in files {
        let path = base.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    let catalog = format!(
        "{VOLUME_BLOCK}\ndir GID0 UID0 ATRS36181 ATRP36181 DATES19941109050000 DATEP19941109050000 TIMEZONES36 TIMEZONEP36 HIDDEN0 {{\n{dir_body}}}\n"
    );
    let cat_path = dir.join("TEST.cat");
    fs::write(&cat_path, catalog).unwrap();
    cat_path
}

fn read_sector(image: &Path, lbn: u32) -> [u8; RAW_SECTOR_SIZE] {
    let bytes = fs::read(image).unwrap();
    let start = lbn as usize * RAW_SECTOR_SIZE;
    let mut out = [0u8; RAW_SECTOR_SIZE];
    out.copy_from_slice(&bytes[start..start + RAW_SECTOR_SIZE]);
    out
}

/// Parse the records of the root directory extent at sector 22.
fn root_records(image: &Path) -> Vec<psxpack_core::iso::record::DirectoryRecord> {
    let raw = read_sector(image, 22);
    let decoded = decode_mode2(&raw).unwrap();
    let mut records = Vec::new();
    let mut pos = 0;
    while let Some((record, len)) =
        psxpack_core::iso::record::DirectoryRecord::parse(&decoded.payload[pos..]).unwrap()
    {
        records.push(record);
        pos += len;
    }
    records
}

#[test]
fn empty_file_occupies_one_sector() {
    let tmp = TempDir::new().unwrap();
    let cat = setup(
        tmp.path(),
        "  file EMPTY GID0 UID0 ATR2321 DATE19941109050000 TIMEZONE36 SIZE0 HIDDEN0\n",
        &[("EMPTY", b"")],
    );

    let summary = build(&cat, &tmp.path().join("out"), &BuildOptions::default(), &no_progress)
        .unwrap();

    // Root at 22, EMPTY at 23, then the 150-sector postgap.
    assert_eq!(summary.volume_sectors, 24 + 150);
    let image = summary.image_path;
    assert_eq!(
        fs::metadata(&image).unwrap().len(),
        (24 + 150) * RAW_SECTOR_SIZE as u64
    );

    let records = root_records(&image);
    let empty = records.iter().find(|r| r.name == "EMPTY;1").unwrap();
    assert_eq!(empty.size, 0);
    assert_eq!(empty.extent, 23);

    // The sector itself is a well-formed Form 1 sector of zeroes.
    let sector = read_sector(&image, 23);
    let decoded = decode_mode2(&sector).unwrap();
    assert_eq!(decoded.form, XaForm::Form1);
    assert!(decoded.edc_ok);
    assert!(decoded.payload.iter().all(|&b| b == 0));
}

#[test]
fn pvd_and_evd_are_in_place() {
    let tmp = TempDir::new().unwrap();
    let cat = setup(
        tmp.path(),
        "  file A.BIN GID0 UID0 ATR2321 DATE19941109050000 TIMEZONE36 SIZE4 HIDDEN0\n",
        &[("A.BIN", b"ping")],
    );

    let summary = build(&cat, &tmp.path().join("out"), &BuildOptions::default(), &no_progress)
        .unwrap();

    let pvd_raw = read_sector(&summary.image_path, 16);
    let decoded = decode_mode2(&pvd_raw).unwrap();
    let pvd =
        psxpack_core::iso::volume::VolumeDescriptor::parse_pvd(decoded.payload).unwrap();
    assert_eq!(pvd.volume_id, "TEST");
    assert_eq!(pvd.volume_space_size, summary.volume_sectors);
    assert_eq!(pvd.type_l_path_table, 18);
    assert_eq!(pvd.type_m_path_table, 20);
    assert_eq!(pvd.root.extent, 22);
    // Creation date is nine hours ahead of GMT; the root record time is
    // normalised back.
    assert_eq!(pvd.root.time.to_digits(), "19941108200000");

    let evd_raw = read_sector(&summary.image_path, 17);
    let decoded = decode_mode2(&evd_raw).unwrap();
    assert_eq!(decoded.payload[0], 255);
    assert_eq!(&decoded.payload[1..6], b"CD001");
}

#[test]
fn requested_lbn_gap_is_filled_with_empty_form2() {
    let tmp = TempDir::new().unwrap();
    let cat = setup(
        tmp.path(),
        concat!(
            "  file A.BIN GID0 UID0 ATR2321 DATE19941109050000 TIMEZONE36 SIZE3 HIDDEN0\n",
            "  file B.BIN @1000 GID0 UID0 ATR2321 DATE19941109050000 TIMEZONE36 SIZE3 HIDDEN0\n",
        ),
        &[("A.BIN", b"aaa"), ("B.BIN", b"bbb")],
    );

    let summary = build(&cat, &tmp.path().join("out"), &BuildOptions::default(), &no_progress)
        .unwrap();
    assert_eq!(summary.volume_sectors, 1001 + 150);

    // A at 23; the gap runs to 1000.
    let a = read_sector(&summary.image_path, 23);
    assert_eq!(&decode_mode2(&a).unwrap().payload[..3], b"aaa");

    let gap = read_sector(&summary.image_path, 500);
    let decoded = decode_mode2(&gap).unwrap();
    assert_eq!(decoded.form, XaForm::Form2);
    assert_eq!(
        &gap[16..24],
        &[0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x20, 0x00]
    );
    assert!(decoded.payload.iter().all(|&b| b == 0));

    let b = read_sector(&summary.image_path, 1000);
    assert_eq!(&decode_mode2(&b).unwrap().payload[..3], b"bbb");
}

#[test]
fn form2_zero_edc_policy() {
    // One 2336-byte block: Form 2 subheader, patterned payload.
    let mut block = vec![0u8; 2336];
    block[2] = 0x20;
    block[6] = 0x20;
    for (i, b) in block[8..2332].iter_mut().enumerate() {
        *b = (i % 247) as u8;
    }

    for zero_edc in [true, false] {
        let tmp = TempDir::new().unwrap();
        let cat = setup(
            tmp.path(),
            &format!(
                "  xafile MOVIE.STR GID0 UID0 ATR5461 DATE19941109050000 TIMEZONE36 SIZE2048 HIDDEN0 ZEROEDC{}\n",
                u8::from(zero_edc)
            ),
            &[("MOVIE.STR", &block)],
        );

        let summary =
            build(&cat, &tmp.path().join("out"), &BuildOptions::default(), &no_progress).unwrap();
        let sector = read_sector(&summary.image_path, 23);
        assert_eq!(sector[18] & 0x20, 0x20);
        assert_eq!(&sector[24..24 + 2324], &block[8..2332]);
        if zero_edc {
            assert_eq!(&sector[2348..], &[0, 0, 0, 0]);
        } else {
            assert!(decode_mode2(&sector).unwrap().edc_ok);
        }
    }
}

#[test]
fn postgap_type2_matches_classification() {
    let tmp = TempDir::new().unwrap();
    let mut catalog = VOLUME_BLOCK.replace("track1_postgap_type 1", "track1_postgap_type 2");
    catalog.push_str(
        "\ndir GID0 UID0 ATRS36181 ATRP36181 DATES19941109050000 DATEP19941109050000 TIMEZONES36 TIMEZONEP36 HIDDEN0 {\n}\n",
    );
    let cat_path = tmp.path().join("TEST.cat");
    fs::write(&cat_path, catalog).unwrap();
    fs::create_dir_all(tmp.path().join("TEST")).unwrap();

    let summary = build(&cat_path, &tmp.path().join("out"), &BuildOptions::default(), &no_progress)
        .unwrap();

    // Data ends at 23 (root only); 150 postgap sectors follow.
    for lbn in [23u32, 100, 172] {
        let sector = read_sector(&summary.image_path, lbn);
        assert_eq!(
            classify_postgap(&sector),
            psxpack_core::sector::PostgapKind::EmptyForm2
        );
    }
}

#[test]
fn cdda_reference_is_offset_by_track_growth() {
    let tmp = TempDir::new().unwrap();

    // Original track 1 was 1000 sectors; this rebuild ends at 1000
    // (via the requested LBN) so the track grows by the 150-sector
    // postgap exactly.
    let audio_body = vec![0x55u8; 75 * RAW_SECTOR_SIZE];
    let mut wav = Vec::new();
    crate::wav::write_wav_header(&mut wav, audio_body.len() as u32).unwrap();
    wav.extend_from_slice(&audio_body);

    let base = tmp.path().join("TEST");
    fs::create_dir_all(base.join("_PSXRIP")).unwrap();
    fs::write(base.join("_PSXRIP/Track_02.wav"), &wav).unwrap();
    fs::write(base.join("PAD.BIN"), vec![0u8; 2048]).unwrap();
    fs::File::create(base.join("MUSIC.DA")).unwrap();

    let csv = "1,MODE2/2352,0,0,0,1149,1000\n2,AUDIO,2000,0,2000,2074,75\n";
    let listing = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(csv)
    };

    let catalog = format!(
        "volume {{
  system_id [PLAYSTATION]
  volume_id [TEST]
  volume_set_id []
  publisher_id []
  preparer_id []
  application_id [PLAYSTATION]
  copyright_file_id []
  abstract_file_id []
  bibliographic_file_id []
  creation_date 1994-11-09 05:00:00.00 36
  modification_date 0000-00-00 00:00:00.00 0
  expiration_date 0000-00-00 00:00:00.00 0
  effective_date 0000-00-00 00:00:00.00 0
  track_listing [{listing}]
  track1_sector_count 1000
  track1_postgap_type 2
  audio_sectors 75
  strict_rebuild 0
  default_uid 0
  default_gid 0
}}

dir GID0 UID0 ATRS36181 ATRP36181 DATES19941109050000 DATEP19941109050000 TIMEZONES36 TIMEZONEP36 HIDDEN0 {{
  file PAD.BIN @999 GID0 UID0 ATR2321 DATE19941109050000 TIMEZONE36 SIZE2048 HIDDEN0
  cddafile MUSIC.DA @2000 GID0 UID0 ATR17749 DATE19941109050000 TIMEZONE36 SIZE176400 HIDDEN0
}}
"
    );
    let cat_path = tmp.path().join("TEST.cat");
    fs::write(&cat_path, catalog).unwrap();

    let summary = build(
        &cat_path,
        &tmp.path().join("out"),
        &BuildOptions { write_cue: true },
        &no_progress,
    )
    .unwrap();

    // end_of_track1 = 1000, so the growth is exactly the postgap.
    assert_eq!(summary.volume_sectors, 1000 + 150 + 75);

    let records = root_records(&summary.image_path);
    let music = records.iter().find(|r| r.name == "MUSIC.DA;1").unwrap();
    assert_eq!(music.extent, 2_150);
    assert_eq!(music.size, 176_400);

    let cue = fs::read_to_string(summary.cue_path.unwrap()).unwrap();
    assert!(cue.contains("TRACK 02 AUDIO"));
    assert!(cue.contains("INDEX 01 00:28:50"));

    // The audio body is appended verbatim after the postgap.
    let audio_start = 1_150usize * RAW_SECTOR_SIZE;
    let bytes = fs::read(&summary.image_path).unwrap();
    assert_eq!(
        &bytes[audio_start..audio_start + audio_body.len()],
        &audio_body[..]
    );
}

#[test]
fn missing_host_file_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let cat = setup(
        tmp.path(),
        "  file GONE.BIN GID0 UID0 ATR2321 DATE19941109050000 TIMEZONE36 SIZE9 HIDDEN0\n",
        &[],
    );
    let result = build(&cat, &tmp.path().join("out"), &BuildOptions::default(), &no_progress);
    assert!(result.is_err());
}

#[test]
fn file_payloads_span_sectors() {
    let tmp = TempDir::new().unwrap();
    let mut content = Vec::new();
    for i in 0..5000u32 {
        content.push((i % 251) as u8);
    }
    let cat = setup(
        tmp.path(),
        "  file BIG.DAT GID0 UID0 ATR2321 DATE19941109050000 TIMEZONE36 SIZE5000 HIDDEN0\n",
        &[("BIG.DAT", &content)],
    );

    let summary = build(&cat, &tmp.path().join("out"), &BuildOptions::default(), &no_progress)
        .unwrap();

    let records = root_records(&summary.image_path);
    let big = records.iter().find(|r| r.name == "BIG.DAT;1").unwrap();
    assert_eq!(big.size, 5000);
    assert_eq!(big.extent_sectors(), 3);

    let mut reassembled = Vec::new();
    for i in 0..3 {
        let sector = read_sector(&summary.image_path, big.extent + i);
        let decoded = decode_mode2(&sector).unwrap();
        assert!(decoded.edc_ok);
        reassembled.extend_from_slice(decoded.payload);
    }
    assert_eq!(&reassembled[..5000], &content[..]);
    // The tail of the last sector is zero padding.
    assert!(reassembled[5000..3 * ISO_BLOCK_SIZE].iter().all(|&b| b == 0));
}
