//! Export archive fixtures and readers

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Channel list as it appears in a real export
pub const CHANNELS_JSON: &[u8] = br#"[{"id": "C1", "name": "general", "members": ["U1", "U2"]}]"#;

/// A day of messages in #general
pub const GENERAL_DAY_JSON: &[u8] =
    br#"[{"type": "message", "user": "U1", "text": "hello", "ts": "1577836800.000100"}]"#;

/// Write a zip with the given entries, deflated, in order
pub fn write_export(path: &Path, files: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
}

/// Entry names in archive order
pub fn entry_names(path: &Path) -> Vec<String> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index_raw(i).unwrap().name().to_string())
        .collect()
}

/// Decompressed contents of one entry
pub fn read_entry(path: &Path, name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).unwrap();
    buf
}

/// Raw (still compressed) bytes and CRC of one entry
pub fn raw_entry(path: &Path, name: &str) -> (u32, Vec<u8>) {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let index = (0..archive.len())
        .find(|i| archive.by_index_raw(*i).unwrap().name() == name)
        .unwrap();
    let mut entry = archive.by_index_raw(index).unwrap();
    let crc = entry.crc32();
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).unwrap();
    (crc, buf)
}

/// users.json decoded as plain JSON
pub fn read_users(path: &Path) -> serde_json::Value {
    serde_json::from_slice(&read_entry(path, "users.json")).unwrap()
}

/// Extended timestamp extra field (0x5455) with a modification time
pub fn extended_timestamp(mtime: u32) -> Vec<u8> {
    let mut field = vec![0x55, 0x54, 0x05, 0x00, 0x01];
    field.extend_from_slice(&mtime.to_le_bytes());
    field
}

/// A stored entry with header details the zip writer cannot produce
pub struct AnnotatedEntry<'a> {
    pub name: &'a str,
    pub content: &'a [u8],
    pub extra: Vec<u8>,
    pub comment: &'a str,
    /// Sizes and CRC in a trailing data descriptor, as streaming writers emit
    pub streamed: bool,
}

/// Write a zip of stored entries byte by byte, with extra fields and comments
pub fn write_annotated_export(path: &Path, entries: &[AnnotatedEntry<'_>], comment: &str) {
    const DOS_TIME: u16 = 0x6000;
    const DOS_DATE: u16 = 0x5021;

    let mut out = Vec::new();
    let mut central = Vec::new();
    for entry in entries {
        let offset = out.len() as u32;
        let crc = crc32fast::hash(entry.content);
        let size = entry.content.len() as u32;
        let flags: u16 = if entry.streamed { 1 << 3 } else { 0 };
        let (local_crc, local_size) = if entry.streamed { (0, 0) } else { (crc, size) };

        out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        out.extend_from_slice(&10u16.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&DOS_TIME.to_le_bytes());
        out.extend_from_slice(&DOS_DATE.to_le_bytes());
        out.extend_from_slice(&local_crc.to_le_bytes());
        out.extend_from_slice(&local_size.to_le_bytes());
        out.extend_from_slice(&local_size.to_le_bytes());
        out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(entry.extra.len() as u16).to_le_bytes());
        out.extend_from_slice(entry.name.as_bytes());
        out.extend_from_slice(&entry.extra);
        out.extend_from_slice(entry.content);
        if entry.streamed {
            out.extend_from_slice(&0x0807_4b50u32.to_le_bytes());
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
        }

        central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        central.extend_from_slice(&((3u16 << 8) | 20).to_le_bytes());
        central.extend_from_slice(&10u16.to_le_bytes());
        central.extend_from_slice(&flags.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&DOS_TIME.to_le_bytes());
        central.extend_from_slice(&DOS_DATE.to_le_bytes());
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&size.to_le_bytes());
        central.extend_from_slice(&size.to_le_bytes());
        central.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
        central.extend_from_slice(&(entry.extra.len() as u16).to_le_bytes());
        central.extend_from_slice(&(entry.comment.len() as u16).to_le_bytes());
        central.extend_from_slice(&[0; 4]);
        central.extend_from_slice(&(0o100644u32 << 16).to_le_bytes());
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(entry.name.as_bytes());
        central.extend_from_slice(&entry.extra);
        central.extend_from_slice(entry.comment.as_bytes());
    }

    let directory_offset = out.len() as u32;
    out.extend_from_slice(&central);
    out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&directory_offset.to_le_bytes());
    out.extend_from_slice(&(comment.len() as u16).to_le_bytes());
    out.extend_from_slice(comment.as_bytes());

    std::fs::write(path, out).unwrap();
}

/// Central directory extra field and comment of one entry
pub fn entry_annotations(path: &Path, name: &str) -> (Vec<u8>, String) {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let entry = archive.by_name(name).unwrap();
    (entry.extra_data().to_vec(), entry.comment().to_string())
}

/// Local header extra field of one entry, read from the raw file
pub fn local_extra(path: &Path, name: &str) -> Vec<u8> {
    let bytes = std::fs::read(path).unwrap();
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let entry = archive.by_name(name).unwrap();
    let start = entry.header_start() as usize;
    let name_len = u16::from_le_bytes([bytes[start + 26], bytes[start + 27]]) as usize;
    let extra_len = u16::from_le_bytes([bytes[start + 28], bytes[start + 29]]) as usize;
    let extra_start = start + 30 + name_len;
    bytes[extra_start..extra_start + extra_len].to_vec()
}

/// Offset of an entry's local header
pub fn header_start(path: &Path, name: &str) -> u64 {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let entry = archive.by_name(name).unwrap();
    entry.header_start()
}

/// Archive-level comment
pub fn archive_comment(path: &Path) -> Vec<u8> {
    let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    archive.comment().to_vec()
}
