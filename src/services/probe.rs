//! Filesystem probes used by the injection resolver.
//!
//! The [`FileProbe`] trait is the only way the resolver looks at disk. [`DiskProbe`] is the real
//! implementation: it checks file presence, reads the PE header of executables to find their
//! bitness, and pulls the version string out of a DLL's version resource.
//!
//! Every probe is infallible from the caller's point of view. Read or parse failures are logged
//! at `debug` and reported as "not present" / [`Bitness::Unknown`] / `None`.

use camino::Utf8Path;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use thiserror::Error;

use crate::models::Bitness;

/// Bytes read from the start of an image when looking for its PE headers and section table.
const PE_HEADER_READ_LIMIT: u64 = 4096;

/// Upper bound on the resource section bytes read for a version lookup.
const RESOURCE_READ_LIMIT: u32 = 16 * 1024 * 1024;

const COFF_HEADER_SIZE: usize = 20;
const SECTION_HEADER_SIZE: usize = 40;
const RESOURCE_DIRECTORY_INDEX: usize = 2;
const RT_VERSION: u32 = 16;
const SUBDIRECTORY_FLAG: u32 = 0x8000_0000;

const IMAGE_FILE_MACHINE_I386: u16 = 0x014c;
const IMAGE_FILE_MACHINE_ARMNT: u16 = 0x01c4;
const IMAGE_FILE_MACHINE_AMD64: u16 = 0x8664;
const IMAGE_FILE_MACHINE_ARM64: u16 = 0xaa64;

const PE32_MAGIC: u16 = 0x010b;
const PE32_PLUS_MAGIC: u16 = 0x020b;

/// `VS_FIXEDFILEINFO.dwSignature`, little endian.
const FIXED_FILE_INFO_SIGNATURE: [u8; 4] = [0xbd, 0x04, 0xef, 0xfe];

/// Errors raised while reading binaries. Never escape the probe.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a PE image: {0}")]
    NotPe(&'static str),

    #[error("Unrecognized machine type {0:#06x}")]
    UnknownMachine(u16),

    #[error("No version resource found")]
    NoVersion,
}

/// Read-only view of the filesystem.
#[cfg_attr(test, mockall::automock)]
pub trait FileProbe: Send + Sync {
    /// Whether a regular file exists at `path`.
    fn file_exists(&self, path: &Utf8Path) -> bool;

    /// Version string the binary at `path` reports about itself.
    fn read_version(&self, path: &Utf8Path) -> Option<String>;

    /// Pointer width of the executable at `path`.
    fn read_bitness(&self, path: &Utf8Path) -> Bitness;
}

/// [`FileProbe`] backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskProbe;

impl DiskProbe {
    pub fn new() -> Self {
        Self
    }
}

impl FileProbe for DiskProbe {
    fn file_exists(&self, path: &Utf8Path) -> bool {
        path.is_file()
    }

    fn read_version(&self, path: &Utf8Path) -> Option<String> {
        match read_version_from_disk(path) {
            Ok(version) => Some(version),
            Err(e) => {
                tracing::debug!("Could not read version of {}: {}", path, e);
                None
            }
        }
    }

    fn read_bitness(&self, path: &Utf8Path) -> Bitness {
        let result = File::open(path)
            .map_err(ProbeError::from)
            .and_then(|mut file| read_headers(&mut file))
            .and_then(|header| parse_pe_bitness(&header));

        match result {
            Ok(bitness) => bitness,
            Err(e) => {
                tracing::debug!("Could not determine bitness of {}: {}", path, e);
                Bitness::Unknown
            }
        }
    }
}

fn read_headers(file: &mut File) -> Result<Vec<u8>, ProbeError> {
    let mut header = Vec::with_capacity(PE_HEADER_READ_LIMIT as usize);
    file.by_ref().take(PE_HEADER_READ_LIMIT).read_to_end(&mut header)?;
    Ok(header)
}

/// Read the headers, then only the resource section's raw bytes.
fn read_version_from_disk(path: &Utf8Path) -> Result<String, ProbeError> {
    let mut file = File::open(path)?;
    let header = read_headers(&mut file)?;
    let resources = ResourceSection::locate(&header)?;

    let mut raw = Vec::new();
    file.seek(SeekFrom::Start(u64::from(resources.raw_offset)))?;
    file.take(u64::from(resources.raw_size.min(RESOURCE_READ_LIMIT)))
        .read_to_end(&mut raw)?;

    resources.version(&raw)
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let raw = bytes.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let raw = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Offset of the COFF file header, just past the `PE\0\0` signature.
fn coff_header_offset(header: &[u8]) -> Result<usize, ProbeError> {
    if header.get(0..2) != Some(b"MZ") {
        return Err(ProbeError::NotPe("missing MZ signature"));
    }

    let pe_offset = read_u32(header, 0x3c).ok_or(ProbeError::NotPe("truncated DOS header"))? as usize;
    let coff_offset = pe_offset
        .checked_add(4)
        .ok_or(ProbeError::NotPe("PE header offset out of range"))?;

    if header.get(pe_offset..coff_offset) != Some(b"PE\0\0") {
        return Err(ProbeError::NotPe("missing PE signature"));
    }
    Ok(coff_offset)
}

/// Determine bitness from the DOS + NT headers at the start of an image.
///
/// The optional header magic is authoritative; the COFF machine field is the fallback for
/// images whose optional header lies beyond the bytes we read.
pub fn parse_pe_bitness(header: &[u8]) -> Result<Bitness, ProbeError> {
    let coff = coff_header_offset(header)?;
    let machine = read_u16(header, coff).ok_or(ProbeError::NotPe("truncated COFF header"))?;

    let magic = coff
        .checked_add(COFF_HEADER_SIZE)
        .and_then(|optional| read_u16(header, optional));
    match magic {
        Some(PE32_PLUS_MAGIC) => return Ok(Bitness::Bits64),
        Some(PE32_MAGIC) => return Ok(Bitness::Bits32),
        _ => {}
    }

    match machine {
        IMAGE_FILE_MACHINE_AMD64 | IMAGE_FILE_MACHINE_ARM64 => Ok(Bitness::Bits64),
        IMAGE_FILE_MACHINE_I386 | IMAGE_FILE_MACHINE_ARMNT => Ok(Bitness::Bits32),
        other => Err(ProbeError::UnknownMachine(other)),
    }
}

/// Extract the version string from a complete PE image.
///
/// Prefers the `ProductVersion` string table entry (what Special K reports in its own UI) and
/// falls back to the numeric product version of `VS_FIXEDFILEINFO`.
pub fn parse_version(image: &[u8]) -> Result<String, ProbeError> {
    let resources = ResourceSection::locate(image)?;

    let start = resources.raw_offset as usize;
    let end = start.saturating_add(resources.raw_size as usize).min(image.len());
    let raw = image
        .get(start..end)
        .ok_or(ProbeError::NotPe("resource section outside the image"))?;

    resources.version(raw)
}

/// Section holding the resource directory, as described by the section table.
#[derive(Debug, Clone, Copy)]
struct ResourceSection {
    /// RVA of the section start
    virtual_address: u32,
    /// RVA of the root resource directory
    directory_rva: u32,
    raw_offset: u32,
    raw_size: u32,
}

impl ResourceSection {
    fn locate(header: &[u8]) -> Result<Self, ProbeError> {
        let coff = coff_header_offset(header)?;
        let section_count = read_u16(header, coff + 2)
            .ok_or(ProbeError::NotPe("truncated COFF header"))? as usize;
        let optional_size = read_u16(header, coff + 16)
            .ok_or(ProbeError::NotPe("truncated COFF header"))? as usize;
        let optional = coff + COFF_HEADER_SIZE;

        let directories = match read_u16(header, optional) {
            Some(PE32_MAGIC) => optional + 96,
            Some(PE32_PLUS_MAGIC) => optional + 112,
            _ => return Err(ProbeError::NotPe("unknown optional header magic")),
        };
        let directory_count = read_u32(header, directories - 4).ok_or(ProbeError::NoVersion)?;
        if directory_count <= RESOURCE_DIRECTORY_INDEX as u32 {
            return Err(ProbeError::NoVersion);
        }

        let entry = directories + RESOURCE_DIRECTORY_INDEX * 8;
        let directory_rva = read_u32(header, entry).ok_or(ProbeError::NoVersion)?;
        if directory_rva == 0 {
            return Err(ProbeError::NoVersion);
        }

        let table = optional + optional_size;
        (0..section_count)
            .find_map(|i| {
                let section = table + i * SECTION_HEADER_SIZE;
                let virtual_size = read_u32(header, section + 8)?;
                let virtual_address = read_u32(header, section + 12)?;
                let raw_size = read_u32(header, section + 16)?;
                let raw_offset = read_u32(header, section + 20)?;
                let extent = virtual_size.max(raw_size);

                (directory_rva >= virtual_address
                    && directory_rva - virtual_address < extent)
                    .then_some(Self {
                        virtual_address,
                        directory_rva,
                        raw_offset,
                        raw_size,
                    })
            })
            .ok_or(ProbeError::NoVersion)
    }

    /// Walk type, name and language directories down to the first `RT_VERSION` resource
    /// and parse it. `raw` is the section's raw data.
    fn version(&self, raw: &[u8]) -> Result<String, ProbeError> {
        let root = (self.directory_rva - self.virtual_address) as usize;

        let names = directory_entry(raw, root, Some(RT_VERSION))
            .and_then(|entry| subdirectory(root, entry))
            .ok_or(ProbeError::NoVersion)?;
        let languages = directory_entry(raw, names, None)
            .and_then(|entry| subdirectory(root, entry))
            .ok_or(ProbeError::NoVersion)?;
        let data_entry = directory_entry(raw, languages, None)
            .filter(|entry| entry & SUBDIRECTORY_FLAG == 0)
            .ok_or(ProbeError::NoVersion)?;

        let data_entry = root
            .checked_add(data_entry as usize)
            .ok_or(ProbeError::NoVersion)?;
        let data_rva = read_u32(raw, data_entry).ok_or(ProbeError::NoVersion)?;
        let data_size = data_entry
            .checked_add(4)
            .and_then(|size| read_u32(raw, size))
            .ok_or(ProbeError::NoVersion)? as usize;

        let start = data_rva
            .checked_sub(self.virtual_address)
            .ok_or(ProbeError::NoVersion)? as usize;
        let data = raw
            .get(start..start.saturating_add(data_size).min(raw.len()))
            .ok_or(ProbeError::NoVersion)?;

        parse_version_info(data).ok_or(ProbeError::NoVersion)
    }
}

/// `OffsetToData` of the first entry in the directory at `offset` matching `id`, or of the
/// first entry at all when `id` is `None`.
fn directory_entry(raw: &[u8], offset: usize, id: Option<u32>) -> Option<u32> {
    let named = read_u16(raw, offset.checked_add(12)?)? as usize;
    let ids = read_u16(raw, offset.checked_add(14)?)? as usize;

    (0..named + ids).find_map(|i| {
        let entry = offset.checked_add(16 + i * 8)?;
        let name = read_u32(raw, entry)?;
        let target = read_u32(raw, entry.checked_add(4)?)?;
        match id {
            Some(id) if i < named || name != id => None,
            _ => Some(target),
        }
    })
}

fn subdirectory(root: usize, entry: u32) -> Option<usize> {
    if entry & SUBDIRECTORY_FLAG == 0 {
        return None;
    }
    root.checked_add((entry & !SUBDIRECTORY_FLAG) as usize)
}

/// One node of the `VS_VERSIONINFO` tree.
struct VersionBlock<'a> {
    key: String,
    value: &'a [u8],
    children: &'a [u8],
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// Parse the block at the start of `data`, returning it and the aligned offset of its sibling.
fn parse_block(data: &[u8]) -> Option<(VersionBlock<'_>, usize)> {
    let length = read_u16(data, 0)? as usize;
    let value_length = read_u16(data, 2)? as usize;
    let is_text = read_u16(data, 4)? == 1;
    let block = data.get(..length).filter(|_| length >= 6)?;

    let key_units: Vec<u16> = block[6..]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    let key = String::from_utf16(&key_units).ok()?;

    let value_start = align4(6 + (key_units.len() + 1) * 2).min(length);
    let value_bytes = if is_text { value_length * 2 } else { value_length };
    let value_end = (value_start + value_bytes).min(length);
    let children_start = align4(value_end).min(length);

    Some((
        VersionBlock {
            key,
            value: &block[value_start..value_end],
            children: &block[children_start..],
        },
        align4(length),
    ))
}

fn child_blocks(mut data: &[u8]) -> impl Iterator<Item = VersionBlock<'_>> {
    std::iter::from_fn(move || {
        let (block, next) = parse_block(data)?;
        data = data.get(next..).unwrap_or_default();
        Some(block)
    })
}

/// `VS_VERSIONINFO` → `StringFileInfo` → string table → `ProductVersion`, else the numeric
/// product version of the fixed file info.
fn parse_version_info(data: &[u8]) -> Option<String> {
    let (root, _) = parse_block(data)?;
    if root.key != "VS_VERSION_INFO" {
        return None;
    }

    child_blocks(root.children)
        .filter(|block| block.key == "StringFileInfo")
        .flat_map(|block| child_blocks(block.children))
        .flat_map(|table| child_blocks(table.children))
        .filter(|entry| entry.key == "ProductVersion")
        .find_map(|entry| utf16_text(entry.value))
        .or_else(|| fixed_product_version(root.value))
}

fn utf16_text(bytes: &[u8]) -> Option<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    let text = String::from_utf16(&units).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn fixed_product_version(fixed: &[u8]) -> Option<String> {
    if fixed.get(0..4) != Some(&FIXED_FILE_INFO_SIGNATURE[..]) {
        return None;
    }

    // dwSignature, dwStrucVersion, dwFileVersionMS, dwFileVersionLS, dwProductVersionMS, ...LS
    let ms = read_u32(fixed, 16)?;
    let ls = read_u32(fixed, 20)?;

    Some(format!(
        "{}.{}.{}.{}",
        ms >> 16,
        ms & 0xffff,
        ls >> 16,
        ls & 0xffff
    ))
}
