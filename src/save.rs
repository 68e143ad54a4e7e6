//! Package assembly.
//!
//! Saving rebuilds the archive from package state in a fixed order:
//!
//! 1. `mimetype`, stored, holding the package media type
//! 2. the `META-INF/` directory
//! 3. a freshly serialized `META-INF/manifest.xml`
//! 4. every other manifest path, resolved through the content cache
//!
//! [`PackageChunks`] yields the archive lazily, one local record per item and
//! the central directory last. [`PackageReader`] adapts it to [`Read`].

use std::borrow::Cow;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::OdfError;
use crate::package::{file_uri, io_error, OdfPackage};
use crate::path;
use crate::xml::XmlEngine;
use crate::zip::{CdEntry, Compression, DosTimestamp, ZipEncoder};

/// Extensions of formats that are already compressed; stored as-is.
pub const PRECOMPRESSED_EXTENSIONS: &[&str] = &[
    "jpg", "gif", "png", "zip", "rar", "jpeg", "mpe", "mpg", "mpeg", "mpeg4", "mp4", "7z", "ari",
    "arj", "jar", "gz", "tar", "war", "mov", "avi",
];

/// Compression used for `path` when the package is saved.
pub fn compression_for(path: &str) -> Compression {
    if path == path::MIMETYPE_PATH || path::is_directory(path) {
        return Compression::Stored;
    }
    match path::extension(path) {
        Some(ext) if PRECOMPRESSED_EXTENSIONS.contains(&ext.as_str()) => Compression::Stored,
        _ => Compression::Deflated,
    }
}

enum Planned {
    Mimetype(Vec<u8>),
    Manifest(Vec<u8>),
    Directory(String),
    File(String),
}

/// Lazy sequence of archive chunks for one save.
///
/// Finite and not restartable. Entries whose content cannot be resolved are
/// logged and left out; the archive stays well-formed.
pub struct PackageChunks<'a, X: XmlEngine> {
    package: &'a OdfPackage<X>,
    plan: std::vec::IntoIter<Planned>,
    encoder: Option<ZipEncoder>,
    save_time: DosTimestamp,
}

impl<'a, X: XmlEngine> PackageChunks<'a, X> {
    fn new(package: &'a OdfPackage<X>) -> Self {
        let mut plan = Vec::with_capacity(package.manifest.len() + 3);
        let media_type = package.media_type.clone().unwrap_or_default();
        if media_type.is_empty() {
            log::warn!("[SAVE] Package has no media type; writing an empty mimetype");
        }
        plan.push(Planned::Mimetype(media_type.into_bytes()));
        plan.push(Planned::Directory(path::META_INF_DIR.to_string()));
        plan.push(Planned::Manifest(package.manifest.to_xml().into_bytes()));
        for entry_path in package.manifest.paths() {
            if entry_path == path::ROOT
                || entry_path == path::META_INF_DIR
                || entry_path == path::MIMETYPE_PATH
                || entry_path == path::MANIFEST_PATH
            {
                continue;
            }
            if path::is_directory(entry_path) {
                plan.push(Planned::Directory(entry_path.to_string()));
            } else {
                plan.push(Planned::File(entry_path.to_string()));
            }
        }
        log::debug!("[SAVE] Planned {} archive entries", plan.len());

        Self {
            package,
            plan: plan.into_iter(),
            encoder: Some(ZipEncoder::new()),
            save_time: DosTimestamp::now(),
        }
    }

    fn timestamp_for(&self, name: &str) -> DosTimestamp {
        self.package
            .zip
            .as_ref()
            .and_then(|zip| zip.original(name))
            .map(CdEntry::timestamp)
            .unwrap_or(self.save_time)
    }

    fn resolve(&self, entry_path: &str) -> Option<Cow<'a, [u8]>> {
        let package = self.package;
        match package
            .cache
            .peek_bytes(entry_path, package.zip.as_ref(), &package.engine)
        {
            Ok(Some(bytes)) => Some(bytes),
            Ok(None) => {
                log::error!("[SAVE] No content for '{}', entry skipped", entry_path);
                None
            }
            Err(err) => {
                log::error!("[SAVE] Failed to resolve '{}': {}, entry skipped", entry_path, err);
                None
            }
        }
    }
}

impl<X: XmlEngine> Iterator for PackageChunks<'_, X> {
    type Item = Result<Vec<u8>, OdfError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.encoder.as_ref()?;
            let Some(planned) = self.plan.next() else {
                let encoder = self.encoder.take()?;
                let count = encoder.entry_count();
                let tail = encoder.finish().map_err(OdfError::from);
                if tail.is_ok() {
                    log::debug!("[SAVE] Wrote {} archive entries", count);
                }
                return Some(tail);
            };

            let (name, data, compression): (Cow<'_, str>, Cow<'_, [u8]>, Compression) =
                match planned {
                    Planned::Mimetype(bytes) => (
                        Cow::Borrowed(path::MIMETYPE_PATH),
                        Cow::Owned(bytes),
                        Compression::Stored,
                    ),
                    Planned::Manifest(bytes) => (
                        Cow::Borrowed(path::MANIFEST_PATH),
                        Cow::Owned(bytes),
                        Compression::Deflated,
                    ),
                    Planned::Directory(dir) => {
                        (Cow::Owned(dir), Cow::Borrowed(&[][..]), Compression::Stored)
                    }
                    Planned::File(file) => {
                        let Some(bytes) = self.resolve(&file) else {
                            continue;
                        };
                        let compression = compression_for(&file);
                        (Cow::Owned(file), bytes, compression)
                    }
                };

            let timestamp = self.timestamp_for(&name);
            let encoder = self.encoder.as_mut()?;
            match encoder.encode_entry(&name, &data, compression, timestamp) {
                Ok(chunk) => return Some(Ok(chunk)),
                Err(err) => {
                    log::error!("[SAVE] Failed to write '{}': {}, entry skipped", name, err);
                }
            }
        }
    }
}

/// [`Read`] adapter over [`PackageChunks`].
pub struct PackageReader<'a, X: XmlEngine> {
    chunks: PackageChunks<'a, X>,
    current: Vec<u8>,
    pos: usize,
}

impl<X: XmlEngine> Read for PackageReader<'_, X> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.current.len() {
                let n = buf.len().min(self.current.len() - self.pos);
                buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            match self.chunks.next() {
                Some(Ok(chunk)) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Some(Err(err)) => return Err(io::Error::other(err.to_string())),
                None => return Ok(0),
            }
        }
    }
}

impl<X: XmlEngine> OdfPackage<X> {
    /// Lazily assemble the package archive.
    pub fn chunks(&mut self) -> Result<PackageChunks<'_, X>, OdfError> {
        self.ensure_open()?;
        self.sync_root_entry();
        Ok(PackageChunks::new(self))
    }

    /// The assembled package archive as a readable stream.
    pub fn reader(&mut self) -> Result<PackageReader<'_, X>, OdfError> {
        Ok(PackageReader {
            chunks: self.chunks()?,
            current: Vec::new(),
            pos: 0,
        })
    }

    /// Write the assembled archive to `writer`.
    pub fn save_to_writer<W: Write>(&mut self, mut writer: W) -> Result<(), OdfError> {
        for chunk in self.chunks()? {
            writer.write_all(&chunk?)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Assemble the archive in memory.
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, OdfError> {
        let mut out = Vec::new();
        self.save_to_writer(&mut out)?;
        Ok(out)
    }

    /// Save to a file path. The archive is assembled before the file is
    /// opened, so a package may be saved over the file it was loaded from.
    /// The base URI becomes the file's URI.
    pub fn save_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), OdfError> {
        let path = path.as_ref();
        let bytes = self.save_to_bytes()?;
        fs::write(path, &bytes).map_err(|err| io_error(path, err))?;
        if let Some(uri) = file_uri(path) {
            self.base_uri = Some(uri);
        }
        log::debug!("[SAVE] Saved {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}
