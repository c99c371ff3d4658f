//! ZIP archive building and parsing.
//!
//! ## Architecture
//!
//! The module is organized into six components:
//!
//! - [`datetime`]: MS-DOS packed date/time conversion
//! - [`structures`]: Record layouts (local header, central directory, EOCD, data descriptor)
//! - [`entry`]: Entries and the ordered [`EntryStore`]
//! - [`builder`]: Serializes an [`EntryStore`] into one contiguous buffer
//! - [`parser`]: Sequential scanner that turns a buffer back into entries
//! - [`reader`]: Random access reader that lists and extracts through [`ReadAt`](crate::io::ReadAt)
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The builder always knows sizes and CRC before it writes a local header,
//! so it never emits data descriptors. The parser still skips them when a
//! foreign archive contains them.
//!
//! ## Supported Features
//!
//! - DEFLATE compression method on output
//! - DEFLATE and STORED methods on input
//! - UTF-8 names of any length up to 65535 bytes
//!
//! ## Limitations
//!
//! - No ZIP64 (archives above 4 GiB or 65535 entries)
//! - No encryption support
//! - No multi-disk archive support
//! - No archive or file comments on output

pub mod builder;
pub mod datetime;
pub mod entry;
pub mod parser;
pub mod reader;
pub mod structures;

pub use builder::archive_size;
pub use datetime::DosDateTime;
pub use entry::{Entry, EntrySpec, EntryStore};
pub use parser::{
    ScanState, Scanner, list_central_directory, parse, parse_central_directory, parse_with,
};
pub use reader::ArchiveReader;
pub use structures::*;
