use chrono::{NaiveDate, NaiveDateTime};
use pretty_assertions::assert_eq;
use quickcheck_macros::quickcheck;
use rstest::rstest;
use std::io::{Cursor, Read};

use zippen::zip::parser::find_eocd;
use zippen::zip::{
    CentralDirectoryHeader, EndOfCentralDirectory, LocalFileHeader, list_central_directory,
};
use zippen::{EntryStore, Error, parse};

fn timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 11, 30)
        .unwrap()
        .and_hms_opt(17, 42, 13)
        .unwrap()
}

fn mixed_store() -> EntryStore {
    let mut store = EntryStore::new();
    store.add_directory("docs/", timestamp()).unwrap();
    store
        .add_file("docs/readme.md", timestamp(), "# Title\n\nSome text.\n")
        .unwrap();
    store.add_file("empty.bin", timestamp(), Vec::new()).unwrap();
    store
        .add_file("big.txt", timestamp(), "lorem ipsum ".repeat(4096))
        .unwrap();
    store.add_file("Grüße/日本.txt", timestamp(), "unicode").unwrap();
    store
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[test]
fn test_foo_bar_example() {
    let mut store = EntryStore::new();
    store.add_file("foo.txt", timestamp(), "foo").unwrap();
    store.add_file("bar.txt", timestamp(), "bar").unwrap();
    let buf = store.build().unwrap();

    let parsed = parse(&buf).unwrap();
    let got: Vec<_> = parsed
        .iter()
        .map(|e| (e.path().to_string(), e.data().map(<[u8]>::to_vec)))
        .collect();
    assert_eq!(
        got,
        vec![
            ("foo.txt".to_string(), Some(b"foo".to_vec())),
            ("bar.txt".to_string(), Some(b"bar".to_vec())),
        ]
    );
}

#[test]
fn test_round_trip_mixed_entries() {
    let mut store = mixed_store();
    let buf = store.build().unwrap();
    let parsed = parse(&buf).unwrap();

    assert_eq!(parsed.len(), store.len());
    for (original, decoded) in store.iter().zip(parsed.iter()) {
        assert_eq!(decoded.path(), original.path());
        assert_eq!(decoded.is_dir(), original.is_dir());
        assert_eq!(decoded.data(), original.data());
        assert_eq!(decoded.crc32(), original.crc32());
        let drift = (original.modified() - decoded.modified()).num_seconds();
        assert!((0..=1).contains(&drift), "drift of {drift}s");
    }
}

#[test]
fn test_build_is_deterministic_and_idempotent() {
    let mut first = mixed_store();
    let mut second = mixed_store();

    let a = first.build().unwrap();
    let offsets: Vec<_> = first.iter().map(|e| e.local_header_offset()).collect();
    let b = first.build().unwrap();
    let offsets_again: Vec<_> = first.iter().map(|e| e.local_header_offset()).collect();

    assert_eq!(a, b);
    assert_eq!(offsets, offsets_again);
    assert_eq!(a, second.build().unwrap());
}

#[test]
fn test_central_directory_offsets_point_at_local_headers() {
    let mut store = mixed_store();
    let buf = store.build().unwrap();
    let listing = list_central_directory(&buf).unwrap();

    assert_eq!(listing.len(), store.len());
    for (entry, listed) in store.iter().zip(&listing) {
        assert_eq!(Some(listed.lfh_offset as u32), entry.local_header_offset());
        assert_eq!(
            u32_at(&buf, listed.lfh_offset as usize),
            LocalFileHeader::SIGNATURE
        );
        let name_at = listed.lfh_offset as usize + LocalFileHeader::SIZE;
        assert_eq!(&buf[name_at..name_at + entry.path_len()], entry.path().as_bytes());
    }
}

#[test]
fn test_trailer_size_and_count_invariants() {
    let mut store = mixed_store();
    let buf = store.build().unwrap();

    let eocd_at = buf.len() - EndOfCentralDirectory::SIZE;
    let eocd = EndOfCentralDirectory::from_bytes(&buf[eocd_at..]).unwrap();

    let written: usize = store
        .iter()
        .map(|e| CentralDirectoryHeader::SIZE + e.path_len())
        .sum();
    assert_eq!(eocd.cd_size as usize, written);
    assert_eq!(eocd.cd_offset as usize + written, eocd_at);
    assert_eq!(eocd.disk_entries as usize, store.len());
    assert_eq!(eocd.total_entries as usize, store.len());
    assert_eq!(u32_at(&buf, eocd.cd_offset as usize), CentralDirectoryHeader::SIGNATURE);
    assert_eq!(find_eocd(&buf).unwrap(), (eocd, eocd_at));
}

#[test]
fn test_empty_archive() {
    let mut store = EntryStore::new();
    let buf = store.build().unwrap();

    assert_eq!(buf.len(), EndOfCentralDirectory::SIZE);
    let eocd = EndOfCentralDirectory::from_bytes(&buf).unwrap();
    assert_eq!(eocd.total_entries, 0);
    assert_eq!(eocd.cd_size, 0);
    assert_eq!(eocd.cd_offset, 0);
    assert!(parse(&buf).unwrap().is_empty());
    assert!(list_central_directory(&buf).unwrap().is_empty());
}

#[rstest]
#[case("日本語/ファイル.txt")]
#[case("ñandú.md")]
#[case("emoji-🦀.rs")]
fn test_non_ascii_paths(#[case] path: &str) {
    let mut store = EntryStore::new();
    store.add_file(path, timestamp(), path.as_bytes()).unwrap();
    let buf = store.build().unwrap();

    let parsed = parse(&buf).unwrap();
    let entry = parsed.get(0).unwrap();
    assert_eq!(entry.path(), path);
    assert!(entry.path_len() > path.chars().count());
    assert_eq!(entry.data(), Some(path.as_bytes()));
}

#[test]
fn test_append_after_build_needs_rebuild() {
    let mut store = EntryStore::new();
    store.add_file("one", timestamp(), "1").unwrap();
    let before = store.build().unwrap();

    store.add_file("two", timestamp(), "2").unwrap();
    assert_eq!(store.get(1).unwrap().local_header_offset(), None);
    let after = store.build().unwrap();

    assert_eq!(parse(&before).unwrap().len(), 1);
    assert_eq!(parse(&after).unwrap().len(), 2);
    // The first entry's local record is unchanged by the append.
    let first_len = before.len() - CentralDirectoryHeader::SIZE - 3 - EndOfCentralDirectory::SIZE;
    assert_eq!(&after[..first_len], &before[..first_len]);
}

#[test]
fn test_rebuild_of_parsed_archive_is_identical() {
    let mut store = mixed_store();
    let buf = store.build().unwrap();
    let mut reparsed = parse(&buf).unwrap();
    assert_eq!(reparsed.build().unwrap(), buf);
}

#[test]
fn test_readable_by_zip_crate() {
    let mut store = mixed_store();
    let buf = store.build().unwrap();

    let mut archive = zip::ZipArchive::new(Cursor::new(buf)).unwrap();
    assert_eq!(archive.len(), store.len());

    for (i, entry) in store.iter().enumerate() {
        let mut file = archive.by_index(i).unwrap();
        // Names are written without the UTF-8 flag, so compare raw bytes
        // rather than the reader's code page decoding.
        assert_eq!(file.name_raw(), entry.path().as_bytes());
        assert_eq!(file.is_dir(), entry.is_dir());
        assert_eq!(file.crc32(), entry.crc32());

        let modified = file.last_modified();
        assert_eq!(modified.year(), 2021);
        assert_eq!(modified.month(), 11);
        assert_eq!(modified.day(), 30);
        assert_eq!(modified.hour(), 17);
        assert_eq!(modified.minute(), 42);
        assert_eq!(modified.second(), 12);

        if !entry.is_dir() {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents).unwrap();
            assert_eq!(Some(contents.as_slice()), entry.data());
        }
    }
}

#[test]
fn test_reads_zip_crate_output() {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        writer.start_file("a.txt", options).unwrap();
        std::io::Write::write_all(&mut writer, b"from the zip crate").unwrap();
        let stored =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("b.txt", stored).unwrap();
        std::io::Write::write_all(&mut writer, b"stored").unwrap();
        writer.finish().unwrap();
    }

    let parsed = parse(buf.get_ref()).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed.find("a.txt").and_then(|e| e.data()), Some(&b"from the zip crate"[..]));
    assert_eq!(parsed.find("b.txt").and_then(|e| e.data()), Some(&b"stored"[..]));
}

#[test]
fn test_garbage_after_entries_is_malformed() {
    let mut store = EntryStore::new();
    store.add_file("x", timestamp(), "x").unwrap();
    let buf = store.build().unwrap();

    let cd_at = store.get(0).unwrap().compressed().len() + LocalFileHeader::SIZE + 1;
    let mut corrupted = buf[..cd_at].to_vec();
    corrupted.extend_from_slice(b"JUNKJUNK");
    let err = parse(&corrupted).unwrap_err();
    assert!(matches!(err, Error::MalformedInput { offset, .. } if offset == cd_at));
}

#[quickcheck]
fn prop_round_trip(entries: Vec<(String, Option<Vec<u8>>)>) -> bool {
    let mut store = EntryStore::new();
    for (i, (name, data)) in entries.iter().enumerate() {
        // Prefix so no path is empty.
        store.add(format!("{i}/{name}"), timestamp(), data.clone()).unwrap();
    }
    let buf = store.build().unwrap();
    let parsed = parse(&buf).unwrap();

    parsed.len() == store.len()
        && store
            .iter()
            .zip(parsed.iter())
            .all(|(a, b)| a.path() == b.path() && a.data() == b.data())
}
