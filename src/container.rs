//! Zip output that keeps copied entries' headers intact
//!
//! Copied entries are transferred as raw byte ranges: the local header with its
//! extra field, the compressed data, any trailing data descriptor, and the
//! central directory record with its extra field and comment. Only the local
//! header offset inside the central record changes. A replaced entry keeps both
//! of its header records and gets new sizes, CRC and data.
//!
//! Entry positions come from [`zip::ZipArchive`]; this module only moves bytes.
//! ZIP64 entries are rejected.

use crate::error::{Error, Result};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::{self, Read, Seek, SeekFrom, Write};
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::{CompressionMethod, DateTime};

const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4b50;
const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;

const LOCAL_HEADER_LEN: usize = 30;
const CENTRAL_HEADER_LEN: usize = 46;

const DATA_DESCRIPTOR_FLAG: u16 = 1 << 3;
const UTF8_NAME_FLAG: u16 = 1 << 11;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;
const VERSION_STORED: u16 = 10;
const VERSION_DEFLATED: u16 = 20;
const VERSION_MADE_BY_UNIX: u16 = (3 << 8) | 20;
const REGULAR_FILE_MODE: u32 = 0o100644;

/// Size and offset value that means "see the ZIP64 extra field"
const ZIP64_MARKER: u32 = u32::MAX;

// Field offsets within the fixed part of each header
mod local {
    pub const FLAGS: usize = 6;
    pub const VERSION_NEEDED: usize = 4;
    pub const METHOD: usize = 8;
    pub const CRC: usize = 14;
    pub const COMPRESSED_SIZE: usize = 18;
    pub const SIZE: usize = 22;
}

mod central {
    pub const VERSION_NEEDED: usize = 6;
    pub const FLAGS: usize = 8;
    pub const METHOD: usize = 10;
    pub const CRC: usize = 16;
    pub const COMPRESSED_SIZE: usize = 20;
    pub const SIZE: usize = 24;
    pub const NAME_LEN: usize = 28;
    pub const EXTRA_LEN: usize = 30;
    pub const COMMENT_LEN: usize = 32;
    pub const HEADER_OFFSET: usize = 42;
}

/// Where one input entry's records live in the source file
#[derive(Clone, Debug)]
pub struct EntryLayout {
    /// Entry name
    pub name: String,
    /// Modification time from the entry header
    pub modified: DateTime,
    compression: CompressionMethod,
    header_start: u64,
    data_start: u64,
    compressed_size: u64,
    central_header_start: u64,
}

impl EntryLayout {
    /// Capture the record positions of an opened entry
    pub fn of(entry: &ZipFile<'_>) -> Self {
        Self {
            name: entry.name().to_string(),
            modified: entry.last_modified(),
            compression: entry.compression(),
            header_start: entry.header_start(),
            data_start: entry.data_start(),
            compressed_size: entry.compressed_size(),
            central_header_start: entry.central_header_start(),
        }
    }
}

/// Raw header records of one input entry
struct SourceRecords {
    local: Vec<u8>,
    central: Vec<u8>,
    descriptor_len: u64,
}

fn read_records<R: Read + Seek>(source: &mut R, layout: &EntryLayout) -> Result<SourceRecords> {
    let local_len = usize::try_from(layout.data_start.saturating_sub(layout.header_start))
        .map_err(|_| invalid("local header too large"))?;
    if local_len < LOCAL_HEADER_LEN {
        return Err(invalid("truncated local header"));
    }
    let local = read_at(source, layout.header_start, local_len)?;
    if u32_at(&local, 0) != LOCAL_HEADER_SIGNATURE {
        return Err(invalid("invalid local file header"));
    }

    let fixed = read_at(source, layout.central_header_start, CENTRAL_HEADER_LEN)?;
    if u32_at(&fixed, 0) != CENTRAL_HEADER_SIGNATURE {
        return Err(invalid("invalid central directory header"));
    }
    let variable = usize::from(u16_at(&fixed, central::NAME_LEN))
        + usize::from(u16_at(&fixed, central::EXTRA_LEN))
        + usize::from(u16_at(&fixed, central::COMMENT_LEN));
    let central = read_at(
        source,
        layout.central_header_start,
        CENTRAL_HEADER_LEN + variable,
    )?;

    if [
        central::COMPRESSED_SIZE,
        central::SIZE,
        central::HEADER_OFFSET,
    ]
    .iter()
    .any(|&at| u32_at(&central, at) == ZIP64_MARKER)
    {
        return Err(Error::Archive(ZipError::UnsupportedArchive(
            "ZIP64 entries are not supported",
        )));
    }

    let descriptor_len = if u16_at(&local, local::FLAGS) & DATA_DESCRIPTOR_FLAG != 0 {
        let marker = read_at(source, layout.data_start + layout.compressed_size, 4)?;
        if u32_at(&marker, 0) == DATA_DESCRIPTOR_SIGNATURE {
            16
        } else {
            12
        }
    } else {
        0
    };

    Ok(SourceRecords {
        local,
        central,
        descriptor_len,
    })
}

/// Writes a zip archive entry by entry, then its central directory
pub struct ContainerWriter<W: Write> {
    inner: W,
    position: u64,
    central_directory: Vec<u8>,
    entries: usize,
}

impl<W: Write> ContainerWriter<W> {
    /// Start an archive at the beginning of `inner`
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            position: 0,
            central_directory: Vec::new(),
            entries: 0,
        }
    }

    /// Copy an input entry unchanged: headers, extra fields, comment and data
    pub fn copy_entry<R: Read + Seek>(&mut self, source: &mut R, layout: &EntryLayout) -> Result<()> {
        let records = read_records(source, layout)?;
        let offset = self.header_offset()?;

        self.emit(&records.local)?;
        let len = layout.compressed_size + records.descriptor_len;
        source.seek(SeekFrom::Start(layout.data_start))?;
        let copied = io::copy(&mut (&mut *source).take(len), &mut self.inner)?;
        if copied != len {
            return Err(invalid("entry data is truncated"));
        }
        self.position += copied;

        let mut record = records.central;
        put_u32(&mut record, central::HEADER_OFFSET, offset);
        self.push_central(&record);
        Ok(())
    }

    /// Write new contents under an input entry's headers
    ///
    /// Name, timestamps, attributes, extra fields and comment come from the
    /// input records. Deflated entries are recompressed; any other method is
    /// written stored.
    pub fn replace_entry<R: Read + Seek>(
        &mut self,
        source: &mut R,
        layout: &EntryLayout,
        contents: &[u8],
    ) -> Result<()> {
        let records = read_records(source, layout)?;
        let (method, data) = match layout.compression {
            CompressionMethod::Deflated => (METHOD_DEFLATED, deflate(contents)?),
            _ => (METHOD_STORED, contents.to_vec()),
        };
        let crc = crc32fast::hash(contents);
        let compressed_size = size_u32(data.len())?;
        let size = size_u32(contents.len())?;
        let offset = self.header_offset()?;

        // Sizes are known up front, so no data descriptor follows
        let flags = u16_at(&records.local, local::FLAGS) & !DATA_DESCRIPTOR_FLAG;
        let version_needed = if method == METHOD_DEFLATED {
            VERSION_DEFLATED
        } else {
            VERSION_STORED
        };

        let mut header = records.local;
        let version = u16_at(&header, local::VERSION_NEEDED).max(version_needed);
        put_u16(&mut header, local::VERSION_NEEDED, version);
        put_u16(&mut header, local::FLAGS, flags);
        put_u16(&mut header, local::METHOD, method);
        put_u32(&mut header, local::CRC, crc);
        put_u32(&mut header, local::COMPRESSED_SIZE, compressed_size);
        put_u32(&mut header, local::SIZE, size);
        self.emit(&header)?;
        self.emit(&data)?;

        let mut record = records.central;
        let version = u16_at(&record, central::VERSION_NEEDED).max(version_needed);
        put_u16(&mut record, central::VERSION_NEEDED, version);
        put_u16(&mut record, central::FLAGS, flags);
        put_u16(&mut record, central::METHOD, method);
        put_u32(&mut record, central::CRC, crc);
        put_u32(&mut record, central::COMPRESSED_SIZE, compressed_size);
        put_u32(&mut record, central::SIZE, size);
        put_u32(&mut record, central::HEADER_OFFSET, offset);
        self.push_central(&record);
        Ok(())
    }

    /// Add a new stored entry with regular file permissions
    pub fn add_stored(&mut self, name: &str, contents: &[u8], modified: DateTime) -> Result<()> {
        let name_len = u16::try_from(name.len()).map_err(|_| invalid("entry name too long"))?;
        let crc = crc32fast::hash(contents);
        let size = size_u32(contents.len())?;
        let offset = self.header_offset()?;
        let flags = if name.is_ascii() { 0 } else { UTF8_NAME_FLAG };

        let mut header = Vec::with_capacity(LOCAL_HEADER_LEN + name.len());
        header.extend_from_slice(&LOCAL_HEADER_SIGNATURE.to_le_bytes());
        header.extend_from_slice(&VERSION_STORED.to_le_bytes());
        header.extend_from_slice(&flags.to_le_bytes());
        header.extend_from_slice(&METHOD_STORED.to_le_bytes());
        header.extend_from_slice(&modified.timepart().to_le_bytes());
        header.extend_from_slice(&modified.datepart().to_le_bytes());
        header.extend_from_slice(&crc.to_le_bytes());
        header.extend_from_slice(&size.to_le_bytes());
        header.extend_from_slice(&size.to_le_bytes());
        header.extend_from_slice(&name_len.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes());
        header.extend_from_slice(name.as_bytes());
        self.emit(&header)?;
        self.emit(contents)?;

        let mut record = Vec::with_capacity(CENTRAL_HEADER_LEN + name.len());
        record.extend_from_slice(&CENTRAL_HEADER_SIGNATURE.to_le_bytes());
        record.extend_from_slice(&VERSION_MADE_BY_UNIX.to_le_bytes());
        record.extend_from_slice(&VERSION_STORED.to_le_bytes());
        record.extend_from_slice(&flags.to_le_bytes());
        record.extend_from_slice(&METHOD_STORED.to_le_bytes());
        record.extend_from_slice(&modified.timepart().to_le_bytes());
        record.extend_from_slice(&modified.datepart().to_le_bytes());
        record.extend_from_slice(&crc.to_le_bytes());
        record.extend_from_slice(&size.to_le_bytes());
        record.extend_from_slice(&size.to_le_bytes());
        record.extend_from_slice(&name_len.to_le_bytes());
        // extra field, comment, disk number, internal attributes
        record.extend_from_slice(&[0; 8]);
        record.extend_from_slice(&(REGULAR_FILE_MODE << 16).to_le_bytes());
        record.extend_from_slice(&offset.to_le_bytes());
        record.extend_from_slice(name.as_bytes());
        self.push_central(&record);
        Ok(())
    }

    /// Write the central directory and end record, returning the inner writer
    pub fn finish(mut self, comment: &[u8]) -> Result<W> {
        let entries = u16::try_from(self.entries)
            .map_err(|_| unsupported("more than 65535 entries requires ZIP64"))?;
        let comment_len =
            u16::try_from(comment.len()).map_err(|_| invalid("archive comment too long"))?;
        let directory_offset = self.header_offset()?;
        let directory = std::mem::take(&mut self.central_directory);
        let directory_size = size_u32(directory.len())?;
        self.emit(&directory)?;

        let mut end = Vec::with_capacity(22 + comment.len());
        end.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        // this disk, disk with the central directory
        end.extend_from_slice(&[0; 4]);
        end.extend_from_slice(&entries.to_le_bytes());
        end.extend_from_slice(&entries.to_le_bytes());
        end.extend_from_slice(&directory_size.to_le_bytes());
        end.extend_from_slice(&directory_offset.to_le_bytes());
        end.extend_from_slice(&comment_len.to_le_bytes());
        end.extend_from_slice(comment);
        self.emit(&end)?;

        self.inner.flush()?;
        Ok(self.inner)
    }

    fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn push_central(&mut self, record: &[u8]) {
        self.central_directory.extend_from_slice(record);
        self.entries += 1;
    }

    fn header_offset(&self) -> Result<u32> {
        u32::try_from(self.position)
            .ok()
            .filter(|&offset| offset != ZIP64_MARKER)
            .ok_or_else(|| unsupported("output larger than 4 GiB requires ZIP64"))
    }
}

fn deflate(contents: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(contents)?;
    encoder.finish()
}

fn read_at<R: Read + Seek>(source: &mut R, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    source.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0; len];
    source.read_exact(&mut buf)?;
    Ok(buf)
}

fn size_u32(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|&size| size != ZIP64_MARKER)
        .ok_or_else(|| unsupported("entry larger than 4 GiB requires ZIP64"))
}

fn invalid(reason: &'static str) -> Error {
    Error::Archive(ZipError::InvalidArchive(reason))
}

fn unsupported(reason: &'static str) -> Error {
    Error::Archive(ZipError::UnsupportedArchive(reason))
}

fn u16_at(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}
