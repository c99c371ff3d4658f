//! Random access archive reader.
//!
//! Unlike [`parse`](super::parse), which walks a whole buffer from the
//! front, this reads from the end: the trailer, then the central directory,
//! then only the entries asked for. Over HTTP Range requests a listing costs
//! the tail of the archive and nothing else.

use anyhow::{Context, Result, bail};
use std::sync::Arc;
use tracing::debug;

use super::entry::Entry;
use super::parser::{
    MAX_COMMENT_SIZE, central_directory_range, decode_local, find_eocd, parse_central_directory,
};
use super::structures::*;
use crate::codec::{Crc32, RawDeflate};
use crate::io::{ReadAt, read_exact_at};

/// Archive reader over any [`ReadAt`] source.
pub struct ArchiveReader<R: ReadAt + ?Sized> {
    reader: Arc<R>,
    size: u64,
}

impl<R: ReadAt + ?Sized> ArchiveReader<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Locate the end of central directory record.
    ///
    /// Reads just the last 22 bytes first and only fetches the largest
    /// possible comment window when those are not a comment-free trailer.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let fixed = EndOfCentralDirectory::SIZE as u64;
        if self.size < fixed {
            bail!("Not a valid ZIP file: only {} bytes", self.size);
        }

        let offset = self.size - fixed;
        let tail = read_exact_at(self.reader.as_ref(), offset, fixed as usize).await?;
        if let Ok((eocd, 0)) = find_eocd(&tail) {
            return Ok((eocd, offset));
        }

        let window = (MAX_COMMENT_SIZE as u64 + fixed).min(self.size);
        let start = self.size - window;
        let tail = read_exact_at(self.reader.as_ref(), start, window as usize).await?;
        let (eocd, at) = find_eocd(&tail).context("Not a valid ZIP file")?;
        Ok((eocd, start + at as u64))
    }

    /// List every entry from the central directory.
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;
        let cd = central_directory_range(&eocd, usize::try_from(eocd_offset)?)?;
        let records = read_exact_at(self.reader.as_ref(), cd.start as u64, cd.len()).await?;
        debug!(
            entries = eocd.total_entries,
            cd_offset = cd.start,
            cd_size = cd.len(),
            "read central directory"
        );

        Ok(parse_central_directory(&records, cd.start, eocd.total_entries)?)
    }

    /// Fetch and decode the entry a central directory record points at.
    ///
    /// Sizes and CRC come from the central directory, so entries written with
    /// a trailing data descriptor are verified too.
    pub async fn read_entry(&self, listed: &ZipFileEntry) -> Result<Entry> {
        let offset = listed.lfh_offset;
        let fixed = read_exact_at(self.reader.as_ref(), offset, LocalFileHeader::SIZE).await?;
        let mut header = LocalFileHeader::from_bytes(&fixed)
            .with_context(|| format!("Bad local header for {}", listed.file_name))?;

        header.flags &= !FLAG_DATA_DESCRIPTOR;
        header.crc32 = listed.crc32;
        header.compressed_size = u32::try_from(listed.compressed_size)?;
        header.uncompressed_size = u32::try_from(listed.uncompressed_size)?;

        let rest = read_exact_at(
            self.reader.as_ref(),
            offset + LocalFileHeader::SIZE as u64,
            header.variable_size() + header.compressed_size as usize,
        )
        .await
        .with_context(|| format!("Cannot read {}", listed.file_name))?;
        let (variable, data) = rest.split_at(header.variable_size());
        let name = &variable[..header.file_name_length as usize];

        let entry = decode_local(
            usize::try_from(offset)?,
            &header,
            name,
            data,
            &RawDeflate::default(),
            &Crc32,
        )?;
        Ok(entry)
    }
}
