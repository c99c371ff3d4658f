//! Archive encoder.
//!
//! The output is laid out in three passes over the entries:
//!
//! ```text
//! [local header + name + compressed data] * n
//! [central directory record + name]       * n
//! [end of central directory]
//! ```
//!
//! Every record writer appends to the output and returns how many bytes it
//! wrote. The builder folds those counts into the offsets it records, so the
//! offsets in the central directory are exactly where the local headers
//! landed.

use tracing::{debug, trace};

use super::datetime::DosDateTime;
use super::entry::{Entry, EntryStore};
use super::structures::{
    CentralDirectoryHeader, CompressionMethod, EndOfCentralDirectory, LocalFileHeader,
    VERSION_MADE_BY, VERSION_NEEDED,
};
use crate::error::{Error, Result};

/// Exact size of the archive `entries` encode to.
///
/// # Errors
///
/// [`Error::CapacityOverflow`] when the total does not fit the 32-bit offset
/// fields of the format (or `usize` on small targets).
pub fn archive_size(entries: &[Entry]) -> Result<usize> {
    let fixed = LocalFileHeader::SIZE + CentralDirectoryHeader::SIZE;

    let total = entries.iter().try_fold(EndOfCentralDirectory::SIZE, |total, entry| {
        entry
            .path_len()
            .checked_mul(2)
            .and_then(|names| names.checked_add(fixed))
            .and_then(|record| record.checked_add(entry.compressed().len()))
            .and_then(|record| total.checked_add(record))
    });

    match total {
        Some(total) if total <= u32::MAX as usize => Ok(total),
        Some(total) => Err(Error::capacity(format!("{total} bytes"))),
        None => Err(Error::capacity("archive size overflows usize")),
    }
}

/// Append an entry's local header, name and compressed data.
pub fn write_local_file(out: &mut Vec<u8>, entry: &Entry) -> usize {
    let header = LocalFileHeader {
        version_needed: VERSION_NEEDED,
        flags: 0,
        compression_method: CompressionMethod::Deflate,
        modified: DosDateTime::encode(&entry.modified()),
        crc32: entry.crc32(),
        compressed_size: entry.compressed_size(),
        uncompressed_size: entry.uncompressed_size(),
        file_name_length: entry.path_len() as u16,
        extra_field_length: 0,
    };

    let written = header.write_to(out);
    out.extend_from_slice(entry.path().as_bytes());
    out.extend_from_slice(entry.compressed());
    written + entry.path_len() + entry.compressed().len()
}

/// Append an entry's central directory record and name.
pub fn write_central_record(out: &mut Vec<u8>, entry: &Entry, lfh_offset: u32) -> usize {
    let header = CentralDirectoryHeader {
        version_made_by: VERSION_MADE_BY,
        version_needed: VERSION_NEEDED,
        flags: 0,
        compression_method: CompressionMethod::Deflate,
        modified: DosDateTime::encode(&entry.modified()),
        crc32: entry.crc32(),
        compressed_size: entry.compressed_size(),
        uncompressed_size: entry.uncompressed_size(),
        file_name_length: entry.path_len() as u16,
        extra_field_length: 0,
        file_comment_length: 0,
        disk_number_start: 0,
        internal_attrs: 0,
        external_attrs: 0,
        lfh_offset,
    };

    let written = header.write_to(out);
    out.extend_from_slice(entry.path().as_bytes());
    written + entry.path_len()
}

/// Append the end of central directory record.
pub fn write_end_of_central_directory(
    out: &mut Vec<u8>,
    entries: u16,
    cd_size: u32,
    cd_offset: u32,
) -> usize {
    EndOfCentralDirectory {
        disk_number: 0,
        disk_with_cd: 0,
        disk_entries: entries,
        total_entries: entries,
        cd_size,
        cd_offset,
        comment_len: 0,
    }
    .write_to(out)
}

impl<C, K> EntryStore<C, K> {
    /// Serialize every entry into a single ZIP buffer.
    ///
    /// Records each entry's local header offset as a side effect. Building an
    /// unchanged store again yields the same offsets and identical bytes.
    ///
    /// # Errors
    ///
    /// [`Error::CapacityOverflow`] when the archive holds more than 65535
    /// entries or would exceed 4 GiB.
    pub fn build(&mut self) -> Result<Vec<u8>> {
        let count = u16::try_from(self.len())
            .map_err(|_| Error::capacity(format!("{} entries", self.len())))?;
        let total = archive_size(self.entries())?;
        let mut out = Vec::with_capacity(total);

        // `total` fits in u32, so every offset below does as well.
        let mut offset = 0usize;
        let mut lfh_offsets = Vec::with_capacity(self.len());
        for entry in self.entries_mut() {
            let lfh_offset = offset as u32;
            entry.set_local_header_offset(lfh_offset);
            lfh_offsets.push(lfh_offset);
            trace!(path = entry.path(), offset, "local file header");
            offset += write_local_file(&mut out, entry);
        }

        let cd_offset = offset;
        let mut cd_size = 0usize;
        for (entry, &lfh_offset) in self.entries().iter().zip(&lfh_offsets) {
            cd_size += write_central_record(&mut out, entry, lfh_offset);
        }

        offset += cd_size;
        offset += write_end_of_central_directory(&mut out, count, cd_size as u32, cd_offset as u32);

        debug_assert_eq!(offset, total);
        debug_assert_eq!(out.len(), total);
        debug!(entries = count, bytes = total, cd_offset, cd_size, "built archive");

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use pretty_assertions::assert_eq;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 2, 29)
            .unwrap()
            .and_hms_opt(23, 59, 58)
            .unwrap()
    }

    fn u16_at(buf: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([buf[at], buf[at + 1]])
    }

    fn u32_at(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    }

    #[test]
    fn test_empty_archive_is_bare_trailer() {
        let mut store = EntryStore::new();
        let buf = store.build().unwrap();

        assert_eq!(
            buf,
            vec![
                0x50, 0x4b, 0x05, 0x06, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0
            ]
        );
    }

    #[test]
    fn test_directory_layout() {
        let mut store = EntryStore::new();
        store.add_directory("dir/", timestamp()).unwrap();
        let buf = store.build().unwrap();

        // 30 + 4, then 46 + 4, then 22
        assert_eq!(buf.len(), 106);
        assert_eq!(u32_at(&buf, 0), LocalFileHeader::SIGNATURE);
        assert_eq!(u16_at(&buf, 8), 8);
        assert_eq!(u32_at(&buf, 14), 0);
        assert_eq!(u32_at(&buf, 18), 0);
        assert_eq!(&buf[30..34], b"dir/");
        assert_eq!(u32_at(&buf, 34), CentralDirectoryHeader::SIGNATURE);
        assert_eq!(u32_at(&buf, 34 + 42), 0);
        assert_eq!(u32_at(&buf, 84), EndOfCentralDirectory::SIGNATURE);
        assert_eq!(u32_at(&buf, 84 + 12), 50);
        assert_eq!(u32_at(&buf, 84 + 16), 34);
    }

    #[test]
    fn test_offsets_follow_written_bytes() {
        let mut store = EntryStore::new();
        store.add_file("foo.txt", timestamp(), "foo").unwrap();
        store.add_file("bar.txt", timestamp(), "bar").unwrap();
        let buf = store.build().unwrap();

        let first = store.get(0).unwrap();
        let second = store.get(1).unwrap();
        assert_eq!(first.local_header_offset(), Some(0));
        let expected = (LocalFileHeader::SIZE + first.path_len() + first.compressed().len()) as u32;
        assert_eq!(second.local_header_offset(), Some(expected));
        assert_eq!(u32_at(&buf, expected as usize), LocalFileHeader::SIGNATURE);
    }

    #[test]
    fn test_record_writers_report_their_size() {
        let mut store = EntryStore::new();
        let entry = store.add_file("a/b.txt", timestamp(), "hello").unwrap().clone();

        let mut out = Vec::new();
        let n = write_local_file(&mut out, &entry);
        assert_eq!(n, out.len());
        assert_eq!(n, 30 + 7 + entry.compressed().len());

        let mut out = Vec::new();
        let n = write_central_record(&mut out, &entry, 1234);
        assert_eq!(n, out.len());
        assert_eq!(n, 46 + 7);
        assert_eq!(u32_at(&out, 42), 1234);

        let mut out = Vec::new();
        assert_eq!(write_end_of_central_directory(&mut out, 3, 10, 20), 22);
        assert_eq!(u16_at(&out, 8), 3);
        assert_eq!(u16_at(&out, 10), 3);
    }

    #[test]
    fn test_timestamp_fields() {
        let mut store = EntryStore::new();
        store.add_file("t", timestamp(), "x").unwrap();
        let buf = store.build().unwrap();

        let dos = DosDateTime::encode(&timestamp());
        assert_eq!(u16_at(&buf, 10), dos.time);
        assert_eq!(u16_at(&buf, 12), dos.date);
    }

    #[test]
    fn test_archive_size_matches_output() {
        let mut store = EntryStore::new();
        store.add_file("ünïcödé.txt", timestamp(), vec![7u8; 1000]).unwrap();
        store.add_directory("d/", timestamp()).unwrap();
        let expected = archive_size(store.entries()).unwrap();
        assert_eq!(store.build().unwrap().len(), expected);
    }

    #[test]
    fn test_stale_offsets_are_rewritten() {
        let mut store = EntryStore::new();
        store.add_file("a", timestamp(), "first").unwrap();
        store.add_file("b", timestamp(), "second").unwrap();
        let expected = store.build().unwrap();

        for entry in store.entries_mut() {
            entry.set_local_header_offset(0xdead_beef);
        }
        assert_eq!(store.build().unwrap(), expected);
        assert_eq!(store.get(0).unwrap().local_header_offset(), Some(0));

        // The central record for "b" points at the second local header.
        let second = store.get(1).unwrap().local_header_offset().unwrap();
        let cd_b = expected.len() - EndOfCentralDirectory::SIZE - CentralDirectoryHeader::SIZE - 1;
        assert_eq!(u32_at(&expected, cd_b + 42), second);
    }

    #[test]
    fn test_too_many_entries() {
        let mut store = EntryStore::new();
        for i in 0..=u16::MAX as usize {
            store.add_directory(format!("{i}/"), timestamp()).unwrap();
        }
        let err = store.build().unwrap_err();
        assert!(matches!(err, Error::CapacityOverflow { .. }));
    }
}
