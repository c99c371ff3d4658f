//! # zippen
//!
//! A byte-exact ZIP archive builder and parser.
//!
//! Entries are collected in an [`EntryStore`], which compresses and checksums
//! each payload as it is added. [`EntryStore::build`] then lays out the local
//! headers, the central directory and the end of central directory record in
//! one exactly sized buffer, and [`parse`] scans such a buffer back into
//! entries.
//!
//! ## Features
//!
//! - DEFLATE output readable by any standards-compliant unzip
//! - Deterministic output: the same entries always build the same bytes
//! - UTF-8 paths, directory markers, duplicate names
//! - Pluggable compression and checksum adapters
//! - Archive sources on the local filesystem or behind HTTP Range requests
//!
//! ## Example
//!
//! ```
//! use chrono::NaiveDate;
//! use zippen::{EntryStore, parse};
//!
//! let modified = NaiveDate::from_ymd_opt(2024, 5, 1)
//!     .unwrap()
//!     .and_hms_opt(10, 30, 0)
//!     .unwrap();
//!
//! let mut store = EntryStore::new();
//! store.add_file("foo.txt", modified, "foo")?;
//! store.add_directory("docs/", modified)?;
//! let archive = store.build()?;
//!
//! let parsed = parse(&archive)?;
//! assert_eq!(parsed.len(), 2);
//! assert_eq!(parsed.find("foo.txt").and_then(|e| e.data()), Some(&b"foo"[..]));
//! # Ok::<(), zippen::Error>(())
//! ```

pub mod cli;
pub mod codec;
pub mod error;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use codec::{Checksum, Compression, Crc32, RawDeflate};
pub use error::{Error, Result};
pub use io::{HttpRangeReader, LocalFileReader, LocalFileSink, MemoryReader, ReadAt, RemoteSource};
pub use zip::{ArchiveReader, DosDateTime, Entry, EntrySpec, EntryStore, parse, parse_with};
