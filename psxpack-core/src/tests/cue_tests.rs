use super::*;
use std::collections::HashMap;
use std::io;

const MIXED_CUE: &str = r#"FILE "game.bin" BINARY
  TRACK 01 MODE2/2352
    INDEX 01 00:00:00
  TRACK 02 AUDIO
    INDEX 00 13:20:00
    INDEX 01 13:22:00
  TRACK 03 AUDIO
    INDEX 00 15:00:00
    INDEX 01 15:02:00
"#;

fn sizes(entries: &[(&str, u64)]) -> impl FnMut(&Path) -> io::Result<u64> {
    let map: HashMap<String, u64> = entries
        .iter()
        .map(|(name, size)| (name.to_string(), *size))
        .collect();
    move |path: &Path| {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        map.get(&name)
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "missing"))
    }
}

#[test]
fn parse_mixed_cue() {
    let files = parse_cue(MIXED_CUE).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].bin_name, "game.bin");
    assert_eq!(files[0].tracks.len(), 3);
    assert_eq!(files[0].tracks[0].kind, TrackKind::Mode2);
    assert_eq!(files[0].tracks[1].kind, TrackKind::Audio);
    assert_eq!(files[0].tracks[1].indexes, vec![(0, 60000), (1, 60150)]);
}

#[test]
fn parse_rejects_malformed_sheets() {
    assert!(parse_cue("TRACK 01 MODE2/2352\n").is_err());
    assert!(parse_cue("FILE \"a.bin\" BINARY\nTRACK 01 MODE3\n").is_err());
    assert!(parse_cue("").is_err());
    assert!(parse_cue("FILE \"a.bin\" WAVE\n").is_err());
}

#[test]
fn single_bin_layout() {
    let files = parse_cue(MIXED_CUE).unwrap();
    // 70000 sectors total.
    let layout = analyze_layout(
        Path::new("game.cue"),
        &files,
        sizes(&[("game.bin", 70000 * 2352)]),
    )
    .unwrap();

    assert!(layout.single_bin);
    assert_eq!(layout.tracks.len(), 3);

    let t1 = &layout.tracks[0];
    assert_eq!(t1.start_sector, 0);
    assert_eq!(t1.pregap_sectors, 0);
    assert_eq!(t1.total_sectors, 60000);
    // Mixed-mode discs report non-last track ends 150 sectors short;
    // the analyzer compensates.
    assert_eq!(t1.end_sector, 59999 + 150);

    let t2 = &layout.tracks[1];
    assert_eq!(t2.start_sector, 60150);
    assert_eq!(t2.pregap_sectors, 150);
    assert_eq!(t2.total_sectors, 67500 - 60000);

    let t3 = &layout.tracks[2];
    assert_eq!(t3.start_sector, 67650);
    assert_eq!(t3.end_sector, 69999);
    assert_eq!(t3.total_sectors, 70000 - 67500);

    assert_eq!(layout.track1_sector_count, 60000);
    assert_eq!(layout.audio_sectors, 10000);
}

#[test]
fn multi_bin_layout() {
    let cue = r#"FILE "track01.bin" BINARY
  TRACK 01 MODE2/2352
    INDEX 01 00:00:00
FILE "track02.bin" BINARY
  TRACK 02 AUDIO
    INDEX 00 00:00:00
    INDEX 01 00:02:00
"#;
    let files = parse_cue(cue).unwrap();
    let layout = analyze_layout(
        Path::new("game.cue"),
        &files,
        sizes(&[("track01.bin", 60150 * 2352), ("track02.bin", 9000 * 2352)]),
    )
    .unwrap();

    assert!(!layout.single_bin);
    assert_eq!(layout.track1_sector_count, 60150);
    assert_eq!(layout.audio_sectors, 9000);

    let t2 = &layout.tracks[1];
    assert_eq!(t2.start_sector, 60150 + 150);
    assert_eq!(t2.pregap_sectors, 150);
    assert_eq!(t2.data_offset_sector, 150);
    assert_eq!(t2.total_sectors, 9000);
    assert_eq!(t2.end_sector, 60150 + 9000 - 1);
}

#[test]
fn uneven_file_track_combinations_are_fatal() {
    let cue = r#"FILE "a.bin" BINARY
  TRACK 01 MODE2/2352
    INDEX 01 00:00:00
FILE "b.bin" BINARY
  TRACK 02 AUDIO
    INDEX 01 00:00:00
  TRACK 03 AUDIO
    INDEX 01 01:00:00
"#;
    let files = parse_cue(cue).unwrap();
    let result = analyze_layout(
        Path::new("game.cue"),
        &files,
        sizes(&[("a.bin", 2352), ("b.bin", 2352)]),
    );
    assert!(result.is_err());
}

#[test]
fn bin_size_must_be_sector_aligned() {
    let files = parse_cue("FILE \"a.bin\" BINARY\n  TRACK 01 MODE2/2352\n    INDEX 01 00:00:00\n").unwrap();
    let result = analyze_layout(Path::new("a.cue"), &files, sizes(&[("a.bin", 1000)]));
    assert!(result.is_err());
}

#[test]
fn csv_round_trip() {
    let files = parse_cue(MIXED_CUE).unwrap();
    let layout = analyze_layout(
        Path::new("game.cue"),
        &files,
        sizes(&[("game.bin", 70000 * 2352)]),
    )
    .unwrap();

    let csv = tracks_to_csv(&layout.tracks);
    let parsed = tracks_from_csv(&csv).unwrap();
    assert_eq!(parsed, layout.tracks);
}

#[test]
fn csv_rejects_malformed_rows() {
    assert!(tracks_from_csv("1,MODE2/2352,0").is_err());
    assert!(tracks_from_csv("1,MODE7,0,0,0,0,0").is_err());
    assert!(tracks_from_csv("x,AUDIO,0,0,0,0,0").is_err());
}

#[test]
fn cue_generation_applies_audio_offset() {
    let tracks = vec![
        Track {
            number: 1,
            kind: TrackKind::Mode2,
            start_sector: 0,
            pregap_sectors: 0,
            data_offset_sector: 0,
            end_sector: 59999,
            total_sectors: 60000,
        },
        Track {
            number: 2,
            kind: TrackKind::Audio,
            start_sector: 70000,
            pregap_sectors: 150,
            data_offset_sector: 70000,
            end_sector: 75000,
            total_sectors: 5150,
        },
    ];

    let cue = write_cue(&tracks, "rebuilt.bin", 150);
    let expected = "FILE \"rebuilt.bin\" BINARY\r\n\
                    \x20 TRACK 01 MODE2/2352\r\n\
                    \x20   INDEX 01 00:00:00\r\n\
                    \x20 TRACK 02 AUDIO\r\n\
                    \x20   INDEX 00 15:33:25\r\n\
                    \x20   INDEX 01 15:35:25\r\n";
    assert_eq!(cue, expected);
}
