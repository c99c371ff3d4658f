//! Archive decoder.
//!
//! ## Parsing Strategy
//!
//! [`parse`] walks the buffer front to back, one record signature at a time:
//!
//! 1. A local file header is read together with its name and data, and the
//!    data is inflated into an [`Entry`]
//! 2. A data descriptor is read and discarded
//! 3. The first central directory record or end of central directory record
//!    ends the scan
//!
//! Anything else is malformed input and aborts the parse; there is no
//! resynchronisation.
//!
//! [`list_central_directory`] goes the other way, reading the end of central
//! directory record from the tail and then only the central directory, which
//! is what a listing needs.

use tracing::{debug, trace};

use super::entry::{Entry, EntryStore};
use super::structures::*;
use crate::codec::{Checksum, Compression, Crc32, RawDeflate};
use crate::error::{Error, Result};

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
pub(crate) const MAX_COMMENT_SIZE: usize = 65535;

/// Where a [`Scanner`] is in its walk over the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Scanning,
    /// Reached the central directory, the trailer or the end of the buffer.
    Done,
    /// Hit an unknown signature or a truncated record.
    Malformed,
}

/// One record found by the scanner, borrowing from the scanned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    Local {
        offset: usize,
        header: LocalFileHeader,
        name: &'a [u8],
        data: &'a [u8],
    },
    DataDescriptor {
        offset: usize,
        descriptor: DataDescriptor,
    },
    CentralDirectory {
        offset: usize,
    },
    EndOfCentralDirectory {
        offset: usize,
    },
}

/// Sequential record scanner over an in-memory archive.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    buf: &'a [u8],
    offset: usize,
    state: ScanState,
}

impl<'a> Scanner<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            state: ScanState::Scanning,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Offset of the next record to be read.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` once the scan is over. After an error the scanner
    /// stays in [`ScanState::Malformed`] and yields nothing further.
    pub fn next_record(&mut self) -> Result<Option<Record<'a>>> {
        if self.state != ScanState::Scanning {
            return Ok(None);
        }
        if self.offset >= self.buf.len() {
            self.state = ScanState::Done;
            return Ok(None);
        }

        match self.read_record() {
            Ok(record) => {
                if matches!(
                    record,
                    Record::CentralDirectory { .. } | Record::EndOfCentralDirectory { .. }
                ) {
                    self.state = ScanState::Done;
                }
                Ok(Some(record))
            }
            Err(e) => {
                self.state = ScanState::Malformed;
                Err(e)
            }
        }
    }

    fn read_record(&mut self) -> Result<Record<'a>> {
        let offset = self.offset;
        let raw = self.take(offset, 4, "record signature")?;
        let raw = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);

        let Some(signature) = Signature::from_u32(raw) else {
            return Err(Error::malformed(
                offset,
                format!("unknown record signature 0x{raw:08x}"),
            ));
        };
        trace!(offset, ?signature, "record");

        match signature {
            Signature::LocalFileHeader => {
                let fixed = self.take(offset, LocalFileHeader::SIZE, "local file header")?;
                let header = LocalFileHeader::from_bytes(fixed)
                    .map_err(|e| Error::malformed(offset, e.to_string()))?;

                let name_at = offset + LocalFileHeader::SIZE;
                let name = self.take(name_at, header.file_name_length as usize, "file name")?;
                let data_at = name_at + header.variable_size();
                let data = self.take(data_at, header.compressed_size as usize, "file data")?;

                self.offset = data_at + data.len();
                Ok(Record::Local {
                    offset,
                    header,
                    name,
                    data,
                })
            }
            Signature::DataDescriptor => {
                let fixed = self.take(offset, DataDescriptor::SIZE, "data descriptor")?;
                let descriptor = DataDescriptor::from_bytes(fixed)
                    .map_err(|e| Error::malformed(offset, e.to_string()))?;

                self.offset = offset + DataDescriptor::SIZE;
                Ok(Record::DataDescriptor { offset, descriptor })
            }
            Signature::CentralDirectory => Ok(Record::CentralDirectory { offset }),
            Signature::EndOfCentralDirectory => Ok(Record::EndOfCentralDirectory { offset }),
        }
    }

    fn take(&self, at: usize, len: usize, what: &str) -> Result<&'a [u8]> {
        at.checked_add(len)
            .and_then(|end| self.buf.get(at..end))
            .ok_or_else(|| {
                Error::malformed(
                    at,
                    format!(
                        "truncated {what}: need {len} bytes, {} remain",
                        self.buf.len().saturating_sub(at)
                    ),
                )
            })
    }
}

/// Decode every local entry in `buf` using raw DEFLATE and `crc32fast`.
pub fn parse(buf: &[u8]) -> Result<EntryStore> {
    parse_with(buf, RawDeflate::default(), Crc32)
}

/// Decode every local entry in `buf` with the given adapters.
///
/// The returned store keeps the DEFLATE bytes found in the buffer, so
/// building it again reproduces each entry's data verbatim.
///
/// # Errors
///
/// - [`Error::MalformedInput`] for unknown signatures, truncated records,
///   non UTF-8 names, unsupported methods and size or CRC mismatches
/// - [`Error::CompressionFailure`] when inflating a payload fails
pub fn parse_with<C, K>(buf: &[u8], compression: C, checksum: K) -> Result<EntryStore<C, K>>
where
    C: Compression,
    K: Checksum,
{
    let mut store = EntryStore::with_adapters(compression, checksum);
    let mut scanner = Scanner::new(buf);

    while let Some(record) = scanner.next_record()? {
        match record {
            Record::Local {
                offset,
                header,
                name,
                data,
            } => {
                let entry = decode_local(
                    offset,
                    &header,
                    name,
                    data,
                    store.compression(),
                    store.checksum(),
                )?;
                store.push(entry);
            }
            Record::DataDescriptor { .. } => {}
            Record::CentralDirectory { .. } | Record::EndOfCentralDirectory { .. } => break,
        }
    }

    debug!(entries = store.len(), bytes = buf.len(), "parsed archive");
    Ok(store)
}

pub(crate) fn decode_local<C, K>(
    offset: usize,
    header: &LocalFileHeader,
    name: &[u8],
    data: &[u8],
    compression: &C,
    checksum: &K,
) -> Result<Entry>
where
    C: Compression,
    K: Checksum,
{
    let path = std::str::from_utf8(name)
        .map_err(|e| Error::malformed(offset, format!("file name is not UTF-8: {e}")))?
        .to_string();
    if path.is_empty() {
        return Err(Error::malformed(offset, "empty file name"));
    }
    let modified = header.modified.decode();

    let is_directory = header.compressed_size == 0
        && header.uncompressed_size == 0
        && (path.ends_with('/') || header.compression_method == CompressionMethod::Deflate);
    if is_directory {
        return Ok(Entry::from_parts(path, modified, None, Vec::new(), 0));
    }

    let (contents, compressed) = match header.compression_method {
        CompressionMethod::Deflate => {
            let contents = compression
                .decompress(data, header.uncompressed_size as usize)
                .map_err(|e| Error::compression(path.as_str(), e))?;
            (contents, data.to_vec())
        }
        CompressionMethod::Stored => {
            let compressed = compression
                .compress(data)
                .map_err(|e| Error::compression(path.as_str(), e))?;
            (data.to_vec(), compressed)
        }
        CompressionMethod::Unknown(method) => {
            return Err(Error::malformed(
                offset,
                format!("unsupported compression method {method} for '{path}'"),
            ));
        }
    };

    let crc32 = checksum.crc32(&contents);
    if !header.uses_data_descriptor() {
        if contents.len() != header.uncompressed_size as usize {
            return Err(Error::malformed(
                offset,
                format!(
                    "'{path}' inflated to {} bytes, header says {}",
                    contents.len(),
                    header.uncompressed_size
                ),
            ));
        }
        if crc32 != header.crc32 {
            return Err(Error::malformed(
                offset,
                format!(
                    "'{path}' CRC-32 is {crc32:08x}, header says {:08x}",
                    header.crc32
                ),
            ));
        }
    }

    trace!(path = %path, offset, size = contents.len(), "decoded entry");
    Ok(Entry::from_parts(path, modified, Some(contents), compressed, crc32))
}

/// Find and parse the End of Central Directory record.
///
/// Tries the common no-comment layout first, then searches backwards over
/// the largest possible comment.
///
/// # Returns
///
/// A tuple of (EOCD record, offset of EOCD in the buffer).
pub fn find_eocd(buf: &[u8]) -> Result<(EndOfCentralDirectory, usize)> {
    let size = EndOfCentralDirectory::SIZE;
    if buf.len() < size {
        return Err(Error::malformed(0, "buffer is smaller than an EOCD record"));
    }

    let offset = buf.len() - size;
    if let Ok(eocd) = EndOfCentralDirectory::from_bytes(&buf[offset..]) {
        if eocd.comment_len == 0 {
            return Ok((eocd, offset));
        }
    }

    let search_start = buf.len().saturating_sub(MAX_COMMENT_SIZE + size);
    for i in (search_start..=offset).rev() {
        if let Ok(eocd) = EndOfCentralDirectory::from_bytes(&buf[i..]) {
            // The comment length must account for every remaining byte.
            if eocd.comment_len as usize == buf.len() - i - size {
                return Ok((eocd, i));
            }
        }
    }

    Err(Error::malformed(offset, "end of central directory not found"))
}

/// List the archive from its central directory without touching entry data.
pub fn list_central_directory(buf: &[u8]) -> Result<Vec<ZipFileEntry>> {
    let (eocd, eocd_offset) = find_eocd(buf)?;
    let cd = central_directory_range(&eocd, eocd_offset)?;
    let records = buf
        .get(cd.clone())
        .ok_or_else(|| Error::malformed(cd.start, "truncated central directory"))?;
    parse_central_directory(records, cd.start, eocd.total_entries)
}

/// Byte range of the central directory described by `eocd`.
///
/// The directory must end where the trailer starts; multi-disk archives are
/// rejected.
pub fn central_directory_range(
    eocd: &EndOfCentralDirectory,
    eocd_offset: usize,
) -> Result<std::ops::Range<usize>> {
    if eocd.disk_number != 0 || eocd.disk_with_cd != 0 {
        return Err(Error::malformed(eocd_offset, "multi-disk archives are not supported"));
    }

    let start = eocd.cd_offset as usize;
    let end = start + eocd.cd_size as usize;
    if end > eocd_offset {
        return Err(Error::malformed(
            eocd_offset,
            format!("central directory {start}..{end} overlaps the trailer"),
        ));
    }
    Ok(start..end)
}

/// Decode `count` central directory records from `records`, which starts at
/// archive offset `base`.
pub fn parse_central_directory(records: &[u8], base: usize, count: u16) -> Result<Vec<ZipFileEntry>> {
    let mut entries = Vec::with_capacity(count as usize);
    let mut at = 0usize;

    for _ in 0..count {
        let fixed = records
            .get(at..)
            .filter(|rest| rest.len() >= CentralDirectoryHeader::SIZE)
            .ok_or_else(|| Error::malformed(base + at, "truncated central directory"))?;
        let header = CentralDirectoryHeader::from_bytes(fixed)
            .map_err(|e| Error::malformed(base + at, e.to_string()))?;

        let name_at = at + CentralDirectoryHeader::SIZE;
        let name = records
            .get(name_at..name_at + header.file_name_length as usize)
            .ok_or_else(|| Error::malformed(base + name_at, "truncated file name"))?;
        // Listings tolerate legacy code page names.
        let file_name = String::from_utf8_lossy(name).to_string();

        entries.push(ZipFileEntry {
            is_directory: file_name.ends_with('/')
                || (header.compressed_size == 0
                    && header.uncompressed_size == 0
                    && header.compression_method == CompressionMethod::Deflate),
            file_name,
            compression_method: header.compression_method,
            compressed_size: header.compressed_size as u64,
            uncompressed_size: header.uncompressed_size as u64,
            crc32: header.crc32,
            lfh_offset: header.lfh_offset as u64,
            modified: header.modified,
        });

        at = name_at + header.variable_size();
    }

    Ok(entries)
}
