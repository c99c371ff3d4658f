//! Archive entries and the ordered store they live in.
//!
//! Adding an entry happens in two steps. [`EntrySpec`] describes it and only
//! validates the path and payload size; [`EntrySpec::materialize`] then runs
//! the compression and checksum adapters. [`EntryStore::add`] does both, but
//! callers that want to retry a failed compression can hold on to the spec.

use chrono::NaiveDateTime;
use tracing::trace;

use crate::codec::{Checksum, Compression, Crc32, RawDeflate};
use crate::error::{Error, Result};

/// Description of an entry before any adapter has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySpec {
    path: String,
    modified: NaiveDateTime,
    data: Option<Vec<u8>>,
}

impl EntrySpec {
    /// Describe a file (`Some`) or directory marker (`None`).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidEntry`] when the path is empty, the path does not fit
    /// the 16-bit name length field, or the payload does not fit the 32-bit
    /// size fields.
    pub fn new(
        path: impl Into<String>,
        modified: NaiveDateTime,
        data: Option<Vec<u8>>,
    ) -> Result<Self> {
        let path = path.into();
        if path.is_empty() {
            return Err(Error::invalid_entry(path, "path is empty"));
        }
        if path.len() > u16::MAX as usize {
            let reason = format!("path is {} bytes, limit is {}", path.len(), u16::MAX);
            return Err(Error::invalid_entry(path, reason));
        }
        if let Some(data) = &data {
            if data.len() > u32::MAX as usize {
                let reason = format!("payload of {} bytes needs ZIP64", data.len());
                return Err(Error::invalid_entry(path, reason));
            }
        }

        Ok(Self {
            path,
            modified,
            data,
        })
    }

    pub fn file(
        path: impl Into<String>,
        modified: NaiveDateTime,
        data: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        Self::new(path, modified, Some(data.into()))
    }

    pub fn directory(path: impl Into<String>, modified: NaiveDateTime) -> Result<Self> {
        Self::new(path, modified, None)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_dir(&self) -> bool {
        self.data.is_none()
    }

    /// Compute the checksum and compressed payload.
    ///
    /// Borrows the description so a failed compression can be retried.
    pub fn materialize<C, K>(&self, compression: &C, checksum: &K) -> Result<Entry>
    where
        C: Compression + ?Sized,
        K: Checksum + ?Sized,
    {
        self.clone().into_entry(compression, checksum)
    }

    /// Like [`materialize`](Self::materialize) without copying the payload.
    pub fn into_entry<C, K>(self, compression: &C, checksum: &K) -> Result<Entry>
    where
        C: Compression + ?Sized,
        K: Checksum + ?Sized,
    {
        let (crc32, compressed) = match &self.data {
            Some(data) => {
                let compressed = compression
                    .compress(data)
                    .map_err(|e| Error::compression(self.path.as_str(), e))?;
                if compressed.len() > u32::MAX as usize {
                    let reason = format!("compressed payload of {} bytes needs ZIP64", compressed.len());
                    return Err(Error::invalid_entry(self.path, reason));
                }
                (checksum.crc32(data), compressed)
            }
            None => (0, Vec::new()),
        };

        trace!(
            path = %self.path,
            crc32,
            compressed = compressed.len(),
            "materialized entry"
        );

        Ok(Entry::from_parts(
            self.path,
            self.modified,
            self.data,
            compressed,
            crc32,
        ))
    }
}

/// A materialized archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    path: String,
    modified: NaiveDateTime,
    data: Option<Vec<u8>>,
    compressed: Vec<u8>,
    crc32: u32,
    local_header_offset: Option<u32>,
}

impl Entry {
    /// Assemble an entry whose derived bytes are already known, as the parser
    /// does with the payload it reads back.
    pub(crate) fn from_parts(
        path: String,
        modified: NaiveDateTime,
        data: Option<Vec<u8>>,
        compressed: Vec<u8>,
        crc32: u32,
    ) -> Self {
        Self {
            path,
            modified,
            data,
            compressed,
            crc32,
            local_header_offset: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Length of the path in UTF-8 bytes, which is what the headers store.
    pub fn path_len(&self) -> usize {
        self.path.len()
    }

    pub fn is_dir(&self) -> bool {
        self.data.is_none()
    }

    pub fn modified(&self) -> NaiveDateTime {
        self.modified
    }

    /// Uncompressed payload, `None` for directories.
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn compressed(&self) -> &[u8] {
        &self.compressed
    }

    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    pub fn compressed_size(&self) -> u32 {
        self.compressed.len() as u32
    }

    pub fn uncompressed_size(&self) -> u32 {
        self.data.as_ref().map_or(0, |d| d.len() as u32)
    }

    /// Where the local header was written by the most recent build.
    pub fn local_header_offset(&self) -> Option<u32> {
        self.local_header_offset
    }

    pub(crate) fn set_local_header_offset(&mut self, offset: u32) {
        self.local_header_offset = Some(offset);
    }
}

/// Ordered collection of entries plus the adapters used to materialize them.
///
/// Order is preserved verbatim in the built archive and duplicate paths are
/// allowed, since the format does not require unique names.
#[derive(Debug, Clone)]
pub struct EntryStore<C = RawDeflate, K = Crc32> {
    entries: Vec<Entry>,
    compression: C,
    checksum: K,
}

impl EntryStore {
    /// Store using raw DEFLATE at the default level and `crc32fast`.
    pub fn new() -> Self {
        Self::with_adapters(RawDeflate::default(), Crc32)
    }
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Compression, K: Checksum> EntryStore<C, K> {
    pub fn with_adapters(compression: C, checksum: K) -> Self {
        Self {
            entries: Vec::new(),
            compression,
            checksum,
        }
    }

    /// Add a file (`Some`) or directory marker (`None`).
    pub fn add(
        &mut self,
        path: impl Into<String>,
        modified: NaiveDateTime,
        data: Option<Vec<u8>>,
    ) -> Result<&Entry> {
        let entry = EntrySpec::new(path, modified, data)?
            .into_entry(&self.compression, &self.checksum)?;
        Ok(self.push(entry))
    }

    pub fn add_file(
        &mut self,
        path: impl Into<String>,
        modified: NaiveDateTime,
        data: impl Into<Vec<u8>>,
    ) -> Result<&Entry> {
        self.add(path, modified, Some(data.into()))
    }

    pub fn add_directory(
        &mut self,
        path: impl Into<String>,
        modified: NaiveDateTime,
    ) -> Result<&Entry> {
        self.add(path, modified, None)
    }

    /// Materialize a described entry with this store's adapters and append it.
    pub fn add_spec(&mut self, spec: &EntrySpec) -> Result<&Entry> {
        let entry = spec.materialize(&self.compression, &self.checksum)?;
        Ok(self.push(entry))
    }

    /// Append an already materialized entry.
    pub fn push(&mut self, entry: Entry) -> &Entry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn compression(&self) -> &C {
        &self.compression
    }

    pub fn checksum(&self) -> &K {
        &self.checksum
    }
}

impl<C, K> EntryStore<C, K> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// First entry stored under `path`.
    pub fn find(&self, path: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [Entry] {
        &mut self.entries
    }
}

impl<'a, C, K> IntoIterator for &'a EntryStore<C, K> {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
