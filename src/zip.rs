//! Buffered ZIP container for ODF packages
//!
//! The whole archive is held in memory. The central directory is parsed once
//! into an entry table; entry data is decompressed lazily on request.
//! Two views are kept over the same table: a mutable *working set* that the
//! package edits as entries are replaced or removed, and the immutable
//! *original snapshot* of everything the archive contained at load.
//!
//! [`ZipEncoder`] writes the other direction: local headers, data, central
//! directory and EOCD for stored and DEFLATE entries.

use std::collections::{BTreeSet, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use miniz_oxide::inflate::TINFLStatus;

use crate::path;

/// Runtime-configurable ZIP safety limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZipLimits {
    /// Maximum compressed or uncompressed file size allowed for reads.
    pub max_file_read_size: usize,
    /// Maximum allowed size for the `mimetype` entry.
    pub max_mimetype_size: usize,
    /// Whether ZIP parsing should fail on strict structural issues.
    pub strict: bool,
    /// Maximum bytes scanned from file tail while searching for EOCD.
    pub max_eocd_scan: usize,
}

impl ZipLimits {
    /// Create explicit ZIP limits.
    pub fn new(max_file_read_size: usize, max_mimetype_size: usize) -> Self {
        Self {
            max_file_read_size,
            max_mimetype_size,
            strict: false,
            max_eocd_scan: MAX_EOCD_SCAN,
        }
    }

    /// Enable or disable strict ZIP parsing behavior.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set a cap for EOCD tail scan bytes.
    pub fn with_max_eocd_scan(mut self, max_eocd_scan: usize) -> Self {
        self.max_eocd_scan = max_eocd_scan.max(EOCD_MIN_SIZE);
        self
    }
}

/// Local file header signature (little-endian)
const SIG_LOCAL_FILE_HEADER: u32 = 0x04034b50;

/// Central directory entry signature (little-endian)
const SIG_CD_ENTRY: u32 = 0x02014b50;

/// End of central directory signature (little-endian)
const SIG_EOCD: u32 = 0x06054b50;
/// ZIP64 end of central directory locator signature (little-endian)
const SIG_ZIP64_EOCD_LOCATOR: u32 = 0x07064b50;
/// Minimum EOCD record size in bytes
const EOCD_MIN_SIZE: usize = 22;
/// Maximum EOCD search window (EOCD + max comment length)
const MAX_EOCD_SCAN: usize = EOCD_MIN_SIZE + u16::MAX as usize;

/// Fixed part of a local file header
const LOCAL_HEADER_SIZE: usize = 30;
/// Fixed part of a central directory entry
const CD_ENTRY_SIZE: usize = 46;

/// Compression methods
pub const METHOD_STORED: u16 = 0;
/// DEFLATE compression method id.
pub const METHOD_DEFLATED: u16 = 8;

/// General purpose flag: names are UTF-8
const FLAG_UTF8: u16 = 0x0800;
/// MS-DOS directory attribute
const ATTR_DIRECTORY: u32 = 0x10;
const VERSION_NEEDED: u16 = 20;
const DEFLATE_LEVEL: u8 = 6;

// Re-export the crate's public ZIP error alias for module consumers.
pub use crate::error::ZipError;

#[derive(Clone, Copy, Debug)]
struct EocdInfo {
    cd_offset: usize,
    cd_size: usize,
    num_entries: u16,
    uses_zip64: bool,
}

/// Central directory entry metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdEntry {
    /// Normalized package path used as the lookup key
    pub name: String,
    /// Filename exactly as stored in the archive
    pub filename: String,
    /// Compression method (0=stored, 8=deflated)
    pub method: u16,
    /// General purpose bit flags
    pub flags: u16,
    /// Compressed size in bytes
    pub compressed_size: u32,
    /// Uncompressed size in bytes
    pub uncompressed_size: u32,
    /// Offset to local file header
    pub local_header_offset: u32,
    /// CRC32 checksum
    pub crc32: u32,
    /// Length of the central directory extra field
    pub extra_len: u16,
    /// MS-DOS modification time
    pub dos_time: u16,
    /// MS-DOS modification date
    pub dos_date: u16,
}

impl CdEntry {
    /// Directory entries carry a trailing slash.
    pub fn is_directory(&self) -> bool {
        self.filename.ends_with('/')
    }

    /// Stored timestamp of this entry.
    pub fn timestamp(&self) -> DosTimestamp {
        DosTimestamp {
            time: self.dos_time,
            date: self.dos_date,
        }
    }
}

/// Buffered ZIP archive with a working view and an original snapshot.
pub struct ZipContainer {
    data: Vec<u8>,
    /// Entries in central directory order
    entries: Vec<CdEntry>,
    index: HashMap<String, usize>,
    working: BTreeSet<String>,
    limits: Option<ZipLimits>,
    /// Lowest local header offset over every central directory record,
    /// including records dropped as unsafe or duplicate
    first_offset: Option<u32>,
}

impl std::fmt::Debug for ZipContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipContainer")
            .field("len", &self.data.len())
            .field("entries", &self.entries.len())
            .field("working", &self.working.len())
            .finish()
    }
}

impl ZipContainer {
    /// Parse the central directory of a buffered archive.
    pub fn open(data: Vec<u8>) -> Result<Self, ZipError> {
        Self::open_with_limits(data, None)
    }

    /// Parse the central directory with explicit runtime limits.
    pub fn open_with_limits(data: Vec<u8>, limits: Option<ZipLimits>) -> Result<Self, ZipError> {
        let max_eocd_scan = limits
            .map(|l| l.max_eocd_scan.min(MAX_EOCD_SCAN))
            .unwrap_or(MAX_EOCD_SCAN);
        let eocd = find_eocd(&data, max_eocd_scan)?;
        if eocd.uses_zip64 {
            return Err(ZipError::UnsupportedZip64);
        }
        let strict = limits.is_some_and(|l| l.strict);

        let mut entries = Vec::with_capacity(eocd.num_entries as usize);
        let mut index = HashMap::with_capacity(eocd.num_entries as usize);
        let cd_end = eocd.cd_offset + eocd.cd_size;
        let mut pos = eocd.cd_offset;
        let mut first_offset: Option<u32> = None;

        for _ in 0..eocd.num_entries {
            if pos >= cd_end {
                if strict {
                    return Err(ZipError::InvalidFormat);
                }
                break;
            }
            let Some((entry, next)) = read_cd_entry(&data, pos)? else {
                if strict {
                    return Err(ZipError::InvalidFormat);
                }
                break;
            };
            pos = next;
            first_offset = Some(
                first_offset.map_or(entry.local_header_offset, |o| o.min(entry.local_header_offset)),
            );

            if entry.name.is_empty() || path::is_external_reference(&entry.name) {
                if strict {
                    return Err(ZipError::InvalidFormat);
                }
                log::warn!("[ZIP] Skipping entry with unsafe name '{}'", entry.filename);
                continue;
            }
            if index.contains_key(&entry.name) {
                if strict {
                    return Err(ZipError::InvalidFormat);
                }
                log::warn!("[ZIP] Duplicate entry '{}' ignored", entry.filename);
                continue;
            }
            index.insert(entry.name.clone(), entries.len());
            entries.push(entry);
        }

        if entries.is_empty() {
            return Err(ZipError::EmptyArchive);
        }

        log::debug!(
            "[ZIP] Parsed {} central directory entries (offset {})",
            entries.len(),
            eocd.cd_offset
        );

        let working = entries.iter().map(|e| e.name.clone()).collect();
        Ok(Self {
            data,
            entries,
            index,
            working,
            limits,
            first_offset,
        })
    }

    /// Entry in the working set.
    pub fn get(&self, name: &str) -> Option<&CdEntry> {
        if !self.working.contains(name) {
            return None;
        }
        self.original(name)
    }

    /// Entry as it was at load, regardless of later edits.
    pub fn original(&self, name: &str) -> Option<&CdEntry> {
        self.index.get(name).map(|&idx| &self.entries[idx])
    }

    /// Whether the working set holds `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.working.contains(name)
    }

    /// Drop `name` from the working set. The original snapshot keeps it.
    pub fn remove(&mut self, name: &str) -> bool {
        self.working.remove(name)
    }

    /// Drop every working entry whose key starts with `prefix`.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let before = self.working.len();
        self.working.retain(|name| !name.starts_with(prefix));
        before - self.working.len()
    }

    /// Working entry names in sorted order.
    pub fn working_names(&self) -> impl Iterator<Item = &str> {
        self.working.iter().map(String::as_str)
    }

    /// All original entries in central directory order.
    pub fn entries(&self) -> impl Iterator<Item = &CdEntry> {
        self.entries.iter()
    }

    /// Number of original entries.
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// The physically first entry (lowest local header offset).
    pub fn first_entry(&self) -> Option<&CdEntry> {
        self.entries.iter().min_by_key(|e| e.local_header_offset)
    }

    /// Whether `entry` starts at the lowest local header offset of any
    /// central directory record, skipped ones included.
    pub fn is_physically_first(&self, entry: &CdEntry) -> bool {
        self.first_offset == Some(entry.local_header_offset)
    }

    /// Get the active limits used by this ZIP reader.
    pub fn limits(&self) -> Option<ZipLimits> {
        self.limits
    }

    /// Length of the extra field in the entry's local header.
    pub fn local_extra_len(&self, entry: &CdEntry) -> Result<u16, ZipError> {
        let (_, extra_len) = self.local_header_lengths(entry)?;
        Ok(extra_len)
    }

    /// Read and decompress an entry, verifying its CRC32.
    pub fn read(&self, entry: &CdEntry) -> Result<Vec<u8>, ZipError> {
        if let Some(limits) = self.limits {
            if entry.uncompressed_size as usize > limits.max_file_read_size
                || entry.compressed_size as usize > limits.max_file_read_size
            {
                return Err(ZipError::FileTooLarge);
            }
        }

        let data_offset = self.calc_data_offset(entry)?;
        let data_end = data_offset
            .checked_add(entry.compressed_size as usize)
            .ok_or(ZipError::InvalidFormat)?;
        let compressed = self
            .data
            .get(data_offset..data_end)
            .ok_or(ZipError::InvalidFormat)?;

        let out = match entry.method {
            METHOD_STORED => compressed.to_vec(),
            METHOD_DEFLATED => {
                let max = self
                    .limits
                    .map(|l| l.max_file_read_size)
                    .unwrap_or(usize::MAX);
                miniz_oxide::inflate::decompress_to_vec_with_limit(compressed, max).map_err(
                    |err| match err.status {
                        TINFLStatus::HasMoreOutput => ZipError::FileTooLarge,
                        _ => ZipError::DecompressError,
                    },
                )?
            }
            _ => return Err(ZipError::UnsupportedCompression),
        };

        if out.len() != entry.uncompressed_size as usize {
            log::warn!(
                "[ZIP] '{}' inflated to {} bytes, directory says {}",
                entry.filename,
                out.len(),
                entry.uncompressed_size
            );
        }
        if entry.crc32 != 0 && crc32fast::hash(&out) != entry.crc32 {
            return Err(ZipError::CrcMismatch);
        }
        Ok(out)
    }

    /// Read a working-set entry by key.
    pub fn read_working(&self, name: &str) -> Result<Vec<u8>, ZipError> {
        let entry = self.get(name).ok_or(ZipError::FileNotFound)?;
        self.read(entry)
    }

    /// Read an entry from the original snapshot by key.
    pub fn read_original(&self, name: &str) -> Result<Vec<u8>, ZipError> {
        let entry = self.original(name).ok_or(ZipError::FileNotFound)?;
        self.read(entry)
    }

    fn local_header_lengths(&self, entry: &CdEntry) -> Result<(u16, u16), ZipError> {
        let offset = entry.local_header_offset as usize;
        if read_u32_le(&self.data, offset)? != SIG_LOCAL_FILE_HEADER {
            return Err(ZipError::InvalidFormat);
        }
        let name_len = read_u16_le(&self.data, offset + 26)?;
        let extra_len = read_u16_le(&self.data, offset + 28)?;
        Ok((name_len, extra_len))
    }

    /// Calculate the offset to the actual file data (past local header)
    fn calc_data_offset(&self, entry: &CdEntry) -> Result<usize, ZipError> {
        let (name_len, extra_len) = self.local_header_lengths(entry)?;
        Ok(entry.local_header_offset as usize
            + LOCAL_HEADER_SIZE
            + name_len as usize
            + extra_len as usize)
    }
}

/// Find EOCD and extract central directory info
fn find_eocd(data: &[u8], max_eocd_scan: usize) -> Result<EocdInfo, ZipError> {
    let file_size = data.len();
    if file_size < EOCD_MIN_SIZE {
        return Err(ZipError::InvalidFormat);
    }

    let scan_range = file_size.min(max_eocd_scan);
    let scan_base = file_size - scan_range;

    for i in (scan_base..=file_size - EOCD_MIN_SIZE).rev() {
        if read_u32_le(data, i)? != SIG_EOCD {
            continue;
        }
        let num_entries = read_u16_le(data, i + 10)?;
        let cd_size = read_u32_le(data, i + 12)?;
        let cd_offset = read_u32_le(data, i + 16)?;
        let comment_len = read_u16_le(data, i + 20)? as usize;
        if i + EOCD_MIN_SIZE + comment_len != file_size {
            continue;
        }

        let cd_end = (cd_offset as usize)
            .checked_add(cd_size as usize)
            .ok_or(ZipError::InvalidFormat)?;
        if cd_end > i {
            return Err(ZipError::InvalidFormat);
        }

        let uses_zip64_sentinel =
            num_entries == u16::MAX || cd_size == u32::MAX || cd_offset == u32::MAX;
        let uses_zip64_locator = i >= 20 && read_u32_le(data, i - 20)? == SIG_ZIP64_EOCD_LOCATOR;

        return Ok(EocdInfo {
            cd_offset: cd_offset as usize,
            cd_size: cd_size as usize,
            num_entries,
            uses_zip64: uses_zip64_sentinel || uses_zip64_locator,
        });
    }

    Err(ZipError::InvalidFormat)
}

/// Read a central directory entry at `pos`, returning it and the next offset.
fn read_cd_entry(data: &[u8], pos: usize) -> Result<Option<(CdEntry, usize)>, ZipError> {
    if data.len() < pos + CD_ENTRY_SIZE || read_u32_le(data, pos)? != SIG_CD_ENTRY {
        return Ok(None);
    }

    let flags = read_u16_le(data, pos + 8)?;
    let method = read_u16_le(data, pos + 10)?;
    let dos_time = read_u16_le(data, pos + 12)?;
    let dos_date = read_u16_le(data, pos + 14)?;
    let crc32 = read_u32_le(data, pos + 16)?;
    let compressed_size = read_u32_le(data, pos + 20)?;
    let uncompressed_size = read_u32_le(data, pos + 24)?;
    let name_len = read_u16_le(data, pos + 28)? as usize;
    let extra_len = read_u16_le(data, pos + 30)?;
    let comment_len = read_u16_le(data, pos + 32)? as usize;
    let local_header_offset = read_u32_le(data, pos + 42)?;

    let name_start = pos + CD_ENTRY_SIZE;
    let name_bytes = data
        .get(name_start..name_start + name_len)
        .ok_or(ZipError::InvalidFormat)?;
    let filename = String::from_utf8_lossy(name_bytes).into_owned();
    let next = name_start + name_len + extra_len as usize + comment_len;
    if next > data.len() {
        return Err(ZipError::InvalidFormat);
    }

    let name = if filename.ends_with('/') {
        path::normalize_directory(&filename)
    } else {
        path::normalize(&filename)
    };

    Ok(Some((
        CdEntry {
            name,
            filename,
            method,
            flags,
            compressed_size,
            uncompressed_size,
            local_header_offset,
            crc32,
            extra_len,
            dos_time,
            dos_date,
        },
        next,
    )))
}

/// Read u16 from buffer at offset (little-endian)
fn read_u16_le(buf: &[u8], offset: usize) -> Result<u16, ZipError> {
    buf.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(ZipError::InvalidFormat)
}

/// Read u32 from buffer at offset (little-endian)
fn read_u32_le(buf: &[u8], offset: usize) -> Result<u32, ZipError> {
    buf.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(ZipError::InvalidFormat)
}

/// MS-DOS date/time pair as stored in ZIP headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DosTimestamp {
    /// Packed hour/minute/second-pair.
    pub time: u16,
    /// Packed year/month/day.
    pub date: u16,
}

impl DosTimestamp {
    /// Timestamp for the current system time (UTC).
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::from_unix_seconds(secs)
    }

    /// Convert seconds since the Unix epoch to a DOS timestamp. Dates before
    /// 1980 clamp to the DOS epoch.
    pub fn from_unix_seconds(secs: u64) -> Self {
        let days = (secs / 86_400) as i64;
        let rem = secs % 86_400;
        let (hour, minute, second) = (rem / 3600, (rem % 3600) / 60, rem % 60);

        // Civil-from-days (proleptic Gregorian).
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z.rem_euclid(146_097);
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = doy - (153 * mp + 2) / 5 + 1;
        let month = if mp < 10 { mp + 3 } else { mp - 9 };
        let year = yoe + era * 400 + i64::from(month <= 2);

        if year < 1980 {
            return Self {
                time: 0,
                date: (1 << 5) | 1,
            };
        }
        let year = (year - 1980).min(127) as u16;
        Self {
            time: ((hour as u16) << 11) | ((minute as u16) << 5) | (second as u16 / 2),
            date: (year << 9) | ((month as u16) << 5) | day as u16,
        }
    }
}

/// Compression applied to an encoded entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    /// Method 0
    Stored,
    /// Method 8 (raw DEFLATE)
    Deflated,
}

/// Incremental ZIP writer producing each record as an owned chunk.
///
/// Feed entries with [`ZipEncoder::encode_entry`]; each call returns the
/// bytes of the local header plus data. [`ZipEncoder::finish`] returns the
/// central directory and EOCD.
#[derive(Debug, Default)]
pub struct ZipEncoder {
    offset: u64,
    central: Vec<u8>,
    count: usize,
}

impl ZipEncoder {
    /// Create an encoder positioned at offset 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries encoded so far.
    pub fn entry_count(&self) -> usize {
        self.count
    }

    /// Encode one entry. Directory names (trailing `/`) are always stored empty.
    pub fn encode_entry(
        &mut self,
        name: &str,
        data: &[u8],
        compression: Compression,
        timestamp: DosTimestamp,
    ) -> Result<Vec<u8>, ZipError> {
        let is_directory = name.ends_with('/');
        let (method, payload) = match compression {
            Compression::Deflated if !is_directory && !data.is_empty() => (
                METHOD_DEFLATED,
                miniz_oxide::deflate::compress_to_vec(data, DEFLATE_LEVEL),
            ),
            _ if is_directory => (METHOD_STORED, Vec::new()),
            _ => (METHOD_STORED, data.to_vec()),
        };
        let raw_len = if is_directory { 0 } else { data.len() };
        let crc = if is_directory { 0 } else { crc32fast::hash(data) };

        let too_large = || ZipError::EntryTooLarge(name.to_string());
        let compressed_size = u32::try_from(payload.len()).map_err(|_| too_large())?;
        let uncompressed_size = u32::try_from(raw_len).map_err(|_| too_large())?;
        let local_offset = u32::try_from(self.offset).map_err(|_| too_large())?;
        let name_bytes = name.as_bytes();
        let name_len = u16::try_from(name_bytes.len()).map_err(|_| too_large())?;
        if self.count >= u16::MAX as usize {
            return Err(too_large());
        }
        let flags = if name.is_ascii() { 0 } else { FLAG_UTF8 };

        let mut out = Vec::with_capacity(LOCAL_HEADER_SIZE + name_bytes.len() + payload.len());
        out.extend_from_slice(&SIG_LOCAL_FILE_HEADER.to_le_bytes());
        out.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&method.to_le_bytes());
        out.extend_from_slice(&timestamp.time.to_le_bytes());
        out.extend_from_slice(&timestamp.date.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&compressed_size.to_le_bytes());
        out.extend_from_slice(&uncompressed_size.to_le_bytes());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra field length
        out.extend_from_slice(name_bytes);
        out.extend_from_slice(&payload);

        let external_attrs = if is_directory { ATTR_DIRECTORY } else { 0 };
        let cd = &mut self.central;
        cd.extend_from_slice(&SIG_CD_ENTRY.to_le_bytes());
        cd.extend_from_slice(&VERSION_NEEDED.to_le_bytes()); // version made by
        cd.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
        cd.extend_from_slice(&flags.to_le_bytes());
        cd.extend_from_slice(&method.to_le_bytes());
        cd.extend_from_slice(&timestamp.time.to_le_bytes());
        cd.extend_from_slice(&timestamp.date.to_le_bytes());
        cd.extend_from_slice(&crc.to_le_bytes());
        cd.extend_from_slice(&compressed_size.to_le_bytes());
        cd.extend_from_slice(&uncompressed_size.to_le_bytes());
        cd.extend_from_slice(&name_len.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes()); // extra field length
        cd.extend_from_slice(&0u16.to_le_bytes()); // comment length
        cd.extend_from_slice(&0u16.to_le_bytes()); // disk number start
        cd.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        cd.extend_from_slice(&external_attrs.to_le_bytes());
        cd.extend_from_slice(&local_offset.to_le_bytes());
        cd.extend_from_slice(name_bytes);

        self.offset += out.len() as u64;
        self.count += 1;
        Ok(out)
    }

    /// Emit the central directory and EOCD record.
    pub fn finish(self) -> Result<Vec<u8>, ZipError> {
        let too_large = || ZipError::EntryTooLarge("central directory".to_string());
        let cd_offset = u32::try_from(self.offset).map_err(|_| too_large())?;
        let cd_size = u32::try_from(self.central.len()).map_err(|_| too_large())?;
        let count = self.count as u16;

        let mut out = self.central;
        out.extend_from_slice(&SIG_EOCD.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // disk number
        out.extend_from_slice(&0u16.to_le_bytes()); // disk with CD
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // comment length
        Ok(out)
    }
}
