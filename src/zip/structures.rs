use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor};

use super::datetime::DosDateTime;

/// Version needed to extract: 2.0, the first version with DEFLATE.
pub const VERSION_NEEDED: u16 = 20;

/// Version made by: 4.5 on MS-DOS (upper byte 0), attributes are DOS style.
pub const VERSION_MADE_BY: u16 = 45;

/// General purpose flag bit 3: sizes and crc follow the data in a descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Record signatures the scanner knows how to dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    LocalFileHeader,
    DataDescriptor,
    CentralDirectory,
    EndOfCentralDirectory,
}

impl Signature {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            LocalFileHeader::SIGNATURE => Some(Signature::LocalFileHeader),
            DataDescriptor::SIGNATURE => Some(Signature::DataDescriptor),
            CentralDirectoryHeader::SIGNATURE => Some(Signature::CentralDirectory),
            EndOfCentralDirectory::SIGNATURE => Some(Signature::EndOfCentralDirectory),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Signature::LocalFileHeader => LocalFileHeader::SIGNATURE,
            Signature::DataDescriptor => DataDescriptor::SIGNATURE,
            Signature::CentralDirectory => CentralDirectoryHeader::SIGNATURE,
            Signature::EndOfCentralDirectory => EndOfCentralDirectory::SIGNATURE,
        }
    }
}

fn check_signature(cursor: &mut Cursor<&[u8]>, expected: u32, what: &str) -> io::Result<()> {
    let found = cursor.read_u32::<LittleEndian>()?;
    if found != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid {what} signature 0x{found:08x}"),
        ));
    }
    Ok(())
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Local File Header (LFH) - 30 bytes plus file name and extra field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    pub const SIGNATURE: u32 = 0x04034b50;
    pub const SIZE: usize = 30;

    /// Parse the fixed part of a header; `data` starts at the signature.
    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);
        check_signature(&mut cursor, Self::SIGNATURE, "local file header")?;

        let version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = CompressionMethod::from_u16(cursor.read_u16::<LittleEndian>()?);
        let time = cursor.read_u16::<LittleEndian>()?;
        let date = cursor.read_u16::<LittleEndian>()?;

        Ok(Self {
            version_needed,
            flags,
            compression_method,
            modified: DosDateTime::new(date, time),
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Append the fixed part of the header, returning the bytes written.
    pub fn write_to(&self, out: &mut Vec<u8>) -> usize {
        put_u32(out, Self::SIGNATURE);
        put_u16(out, self.version_needed);
        put_u16(out, self.flags);
        put_u16(out, self.compression_method.as_u16());
        put_u16(out, self.modified.time);
        put_u16(out, self.modified.date);
        put_u32(out, self.crc32);
        put_u32(out, self.compressed_size);
        put_u32(out, self.uncompressed_size);
        put_u16(out, self.file_name_length);
        put_u16(out, self.extra_field_length);
        Self::SIZE
    }

    pub fn uses_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Bytes between the end of the fixed header and the start of the data
    pub fn variable_size(&self) -> usize {
        self.file_name_length as usize + self.extra_field_length as usize
    }
}

/// Data descriptor - 16 bytes with the optional signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    pub const SIGNATURE: u32 = 0x08074b50;
    pub const SIZE: usize = 16;

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);
        check_signature(&mut cursor, Self::SIGNATURE, "data descriptor")?;

        Ok(Self {
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes plus name, extra and comment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub file_comment_length: u16,
    pub disk_number_start: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub lfh_offset: u32,
}

impl CentralDirectoryHeader {
    pub const SIGNATURE: u32 = 0x02014b50;
    pub const SIZE: usize = 46;

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);
        check_signature(&mut cursor, Self::SIGNATURE, "central directory")?;

        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = CompressionMethod::from_u16(cursor.read_u16::<LittleEndian>()?);
        let time = cursor.read_u16::<LittleEndian>()?;
        let date = cursor.read_u16::<LittleEndian>()?;

        Ok(Self {
            version_made_by,
            version_needed,
            flags,
            compression_method,
            modified: DosDateTime::new(date, time),
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
            file_comment_length: cursor.read_u16::<LittleEndian>()?,
            disk_number_start: cursor.read_u16::<LittleEndian>()?,
            internal_attrs: cursor.read_u16::<LittleEndian>()?,
            external_attrs: cursor.read_u32::<LittleEndian>()?,
            lfh_offset: cursor.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> usize {
        put_u32(out, Self::SIGNATURE);
        put_u16(out, self.version_made_by);
        put_u16(out, self.version_needed);
        put_u16(out, self.flags);
        put_u16(out, self.compression_method.as_u16());
        put_u16(out, self.modified.time);
        put_u16(out, self.modified.date);
        put_u32(out, self.crc32);
        put_u32(out, self.compressed_size);
        put_u32(out, self.uncompressed_size);
        put_u16(out, self.file_name_length);
        put_u16(out, self.extra_field_length);
        put_u16(out, self.file_comment_length);
        put_u16(out, self.disk_number_start);
        put_u16(out, self.internal_attrs);
        put_u32(out, self.external_attrs);
        put_u32(out, self.lfh_offset);
        Self::SIZE
    }

    /// Bytes following the fixed header: name, extra field and comment
    pub fn variable_size(&self) -> usize {
        self.file_name_length as usize
            + self.extra_field_length as usize
            + self.file_comment_length as usize
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: u32 = 0x06054b50;
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(data);
        check_signature(&mut cursor, Self::SIGNATURE, "end of central directory")?;

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> usize {
        put_u32(out, Self::SIGNATURE);
        put_u16(out, self.disk_number);
        put_u16(out, self.disk_with_cd);
        put_u16(out, self.disk_entries);
        put_u16(out, self.total_entries);
        put_u32(out, self.cd_size);
        put_u32(out, self.cd_offset);
        put_u16(out, self.comment_len);
        Self::SIZE
    }
}

/// Parsed central directory entry, as shown by listings
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub modified: DosDateTime,
    pub is_directory: bool,
}

impl ZipFileEntry {
    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        (
            self.modified.year() as u16,
            self.modified.month() as u8,
            self.modified.day() as u8,
        )
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        (
            self.modified.hour() as u8,
            self.modified.minute() as u8,
            self.modified.second() as u8,
        )
    }
}
