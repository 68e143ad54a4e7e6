//! `META-INF/manifest.xml` model, parser, consistency pass, and writer.

use std::collections::{BTreeMap, BTreeSet};

use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::OdfError;
use crate::path;
use crate::validate::{PackageConstraint, Reporter};

/// Manifest namespace URI.
pub const MANIFEST_NAMESPACE: &str = "urn:oasis:names:tc:opendocument:xmlns:manifest:1.0";

/// Manifest version written on save.
pub const MANIFEST_VERSION: &str = "1.2";

/// `<manifest:algorithm>` metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Algorithm {
    /// `manifest:algorithm-name`
    pub name: Option<String>,
    /// `manifest:initialization-vector` (base64)
    pub initialization_vector: Option<String>,
}

/// `<manifest:key-derivation>` metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyDerivation {
    /// `manifest:key-derivation-name`
    pub name: Option<String>,
    /// `manifest:salt` (base64)
    pub salt: Option<String>,
    /// `manifest:iteration-count`
    pub iteration_count: Option<u32>,
    /// `manifest:key-size`
    pub key_size: Option<u32>,
}

/// `<manifest:start-key-generation>` metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StartKeyGeneration {
    /// `manifest:start-key-generation-name`
    pub name: Option<String>,
    /// `manifest:key-size`
    pub key_size: Option<u32>,
}

/// `<manifest:encryption-data>` metadata. The package carries it through
/// load and save untouched; it never encrypts or decrypts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncryptionData {
    /// `manifest:checksum-type`
    pub checksum_type: Option<String>,
    /// `manifest:checksum` (base64)
    pub checksum: Option<String>,
    /// Cipher description
    pub algorithm: Option<Algorithm>,
    /// Key derivation description
    pub key_derivation: Option<KeyDerivation>,
    /// Start key description
    pub start_key_generation: Option<StartKeyGeneration>,
}

/// One `<manifest:file-entry>`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileEntry {
    /// Normalized package path (directories end with `/`, root is `/`)
    pub path: String,
    /// Media type; `None` for plain containers and unknown files
    pub media_type: Option<String>,
    /// Uncompressed size, when known
    pub size: Option<u64>,
    /// `manifest:version` of a document root entry
    pub version: Option<String>,
    /// Encryption metadata
    pub encryption: Option<EncryptionData>,
}

impl FileEntry {
    /// Entry without media type.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Entry with a media type.
    pub fn with_media_type(path: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            media_type: Some(media_type.into()),
            ..Self::default()
        }
    }

    /// Media type, treating the empty string as absent.
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref().filter(|mt| !mt.is_empty())
    }

    /// Whether this entry addresses a directory (document root).
    pub fn is_directory(&self) -> bool {
        path::is_directory(&self.path)
    }

    fn is_serializable(&self) -> bool {
        !self.is_directory() || self.media_type().is_some()
    }
}

/// Manifest entry set keyed by normalized path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, FileEntry>,
}

impl Manifest {
    /// Empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `META-INF/manifest.xml`.
    pub fn parse(bytes: &[u8]) -> Result<Self, OdfError> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut manifest = Manifest::new();
        let mut current: Option<FileEntry> = None;
        let mut saw_root = false;

        loop {
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(err) => return Err(err.into()),
            };
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let self_closing = matches!(event, Event::Empty(_));
                    match e.local_name().as_ref() {
                        b"manifest" => saw_root = true,
                        b"file-entry" => {
                            if let Some(done) = current.take() {
                                manifest.insert_parsed(done);
                            }
                            current = parse_file_entry(&reader, e)?;
                            if self_closing {
                                if let Some(done) = current.take() {
                                    manifest.insert_parsed(done);
                                }
                            }
                        }
                        b"encryption-data" => {
                            if let Some(entry) = current.as_mut() {
                                let attrs = attributes(&reader, e)?;
                                entry.encryption = Some(EncryptionData {
                                    checksum_type: attr(&attrs, "checksum-type"),
                                    checksum: attr(&attrs, "checksum"),
                                    ..EncryptionData::default()
                                });
                            }
                        }
                        b"algorithm" => {
                            if let Some(enc) = current.as_mut().and_then(|c| c.encryption.as_mut())
                            {
                                let attrs = attributes(&reader, e)?;
                                enc.algorithm = Some(Algorithm {
                                    name: attr(&attrs, "algorithm-name"),
                                    initialization_vector: attr(&attrs, "initialization-vector"),
                                });
                            }
                        }
                        b"key-derivation" => {
                            if let Some(enc) = current.as_mut().and_then(|c| c.encryption.as_mut())
                            {
                                let attrs = attributes(&reader, e)?;
                                enc.key_derivation = Some(KeyDerivation {
                                    name: attr(&attrs, "key-derivation-name"),
                                    salt: attr(&attrs, "salt"),
                                    iteration_count: attr_u32(&attrs, "iteration-count"),
                                    key_size: attr_u32(&attrs, "key-size"),
                                });
                            }
                        }
                        b"start-key-generation" => {
                            if let Some(enc) = current.as_mut().and_then(|c| c.encryption.as_mut())
                            {
                                let attrs = attributes(&reader, e)?;
                                enc.start_key_generation = Some(StartKeyGeneration {
                                    name: attr(&attrs, "start-key-generation-name"),
                                    key_size: attr_u32(&attrs, "key-size"),
                                });
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(e) => {
                    if e.local_name().as_ref() == b"file-entry" {
                        if let Some(done) = current.take() {
                            manifest.insert_parsed(done);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        if let Some(done) = current.take() {
            manifest.insert_parsed(done);
        }

        if !saw_root {
            return Err(OdfError::Xml("missing <manifest:manifest> root".to_string()));
        }
        log::debug!("[MANIFEST] Parsed {} file entries", manifest.len());
        Ok(manifest)
    }

    fn insert_parsed(&mut self, entry: FileEntry) {
        if self.entries.contains_key(&entry.path) {
            log::warn!("[MANIFEST] Duplicate file-entry '{}' ignored", entry.path);
            return;
        }
        self.entries.insert(entry.path.clone(), entry);
    }

    /// Entry for an exact normalized path.
    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    /// Mutable entry for an exact normalized path.
    pub fn get_mut(&mut self, path: &str) -> Option<&mut FileEntry> {
        self.entries.get_mut(path)
    }

    /// Whether an entry exists for `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, entry: FileEntry) -> Option<FileEntry> {
        self.entries.insert(entry.path.clone(), entry)
    }

    /// Remove an entry.
    pub fn remove(&mut self, path: &str) -> Option<FileEntry> {
        self.entries.remove(path)
    }

    /// Remove every entry whose path starts with `prefix`, returning them.
    pub fn remove_prefix(&mut self, prefix: &str) -> Vec<FileEntry> {
        let keys: Vec<String> = self
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        keys.iter()
            .filter_map(|k| self.entries.remove(k))
            .collect()
    }

    /// Sorted entry paths.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries in path order.
    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    /// Entries below `prefix` (inclusive), in path order.
    pub fn entries_under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a FileEntry> {
        self.entries
            .range(prefix.to_string()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(_, v)| v)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Media type of the root entry.
    pub fn root_media_type(&self) -> Option<&str> {
        self.get(path::ROOT).and_then(FileEntry::media_type)
    }

    /// Set the root entry's media type, creating the entry if needed.
    pub fn set_root_media_type(&mut self, media_type: Option<&str>) {
        let entry = self
            .entries
            .entry(path::ROOT.to_string())
            .or_insert_with(|| FileEntry::new(path::ROOT));
        entry.media_type = media_type.map(str::to_string);
    }

    /// Make sure `path` and its parent directories have entries; missing ones
    /// are created without media type. Returns the entry for `path`.
    pub fn ensure_entry(&mut self, path: &str) -> &mut FileEntry {
        for parent in path::parent_directories(path) {
            self.entries
                .entry(parent.clone())
                .or_insert_with(|| FileEntry::new(parent));
        }
        self.entries
            .entry(path.to_string())
            .or_insert_with(|| FileEntry::new(path))
    }

    /// Reconcile the manifest with the archive's working entry names.
    ///
    /// With an active reporter, mismatches are reported and untyped
    /// directories pruned. Afterwards every archive path has an entry.
    pub(crate) fn reconcile<'a, I>(&mut self, archive_paths: I, reporter: &mut Reporter<'_>)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let archive: BTreeSet<&str> = archive_paths.into_iter().collect();

        if reporter.is_active() {
            for &zip_path in &archive {
                if !path::is_directory(zip_path) && !self.contains(zip_path) {
                    reporter.report(PackageConstraint::ManifestDoesNotListFile, &[zip_path]);
                }
            }

            let manifest_paths: Vec<String> = self.entries.keys().cloned().collect();
            for manifest_path in manifest_paths {
                if manifest_path == path::ROOT {
                    continue;
                }
                if path::is_directory(&manifest_path) {
                    let typed = self
                        .get(&manifest_path)
                        .and_then(FileEntry::media_type)
                        .is_some();
                    if !typed {
                        self.entries.remove(&manifest_path);
                    } else if !archive.iter().any(|p| p.starts_with(manifest_path.as_str())) {
                        reporter.report(
                            PackageConstraint::ManifestListsDirectory,
                            &[manifest_path.as_str()],
                        );
                    }
                } else if !archive.contains(manifest_path.as_str()) {
                    reporter.report(
                        PackageConstraint::ManifestListsNonexistentFile,
                        &[manifest_path.as_str()],
                    );
                    self.entries.remove(&manifest_path);
                }
            }
        }

        for zip_path in archive {
            self.ensure_entry(zip_path);
        }
    }

    /// Serialize the whole manifest. Untyped directories are omitted.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(&format!(
            "<manifest:manifest xmlns:manifest=\"{}\" manifest:version=\"{}\">\n",
            MANIFEST_NAMESPACE, MANIFEST_VERSION
        ));
        for entry in self.entries.values().filter(|e| e.is_serializable()) {
            write_file_entry(&mut out, entry);
        }
        out.push_str("</manifest:manifest>\n");
        out
    }
}

fn write_file_entry(out: &mut String, entry: &FileEntry) {
    out.push_str(" <manifest:file-entry");
    push_attr(out, "full-path", &entry.path);
    push_attr(out, "media-type", entry.media_type.as_deref().unwrap_or(""));
    if let Some(version) = &entry.version {
        push_attr(out, "version", version);
    }
    if let Some(size) = entry.size.filter(|&s| s > 0) {
        push_attr(out, "size", &size.to_string());
    }

    let Some(enc) = &entry.encryption else {
        out.push_str("/>\n");
        return;
    };
    out.push_str(">\n  <manifest:encryption-data");
    push_opt_attr(out, "checksum-type", enc.checksum_type.as_deref());
    push_opt_attr(out, "checksum", enc.checksum.as_deref());
    out.push_str(">\n");
    if let Some(alg) = &enc.algorithm {
        out.push_str("   <manifest:algorithm");
        push_opt_attr(out, "algorithm-name", alg.name.as_deref());
        push_opt_attr(out, "initialization-vector", alg.initialization_vector.as_deref());
        out.push_str("/>\n");
    }
    if let Some(skg) = &enc.start_key_generation {
        out.push_str("   <manifest:start-key-generation");
        push_opt_attr(out, "start-key-generation-name", skg.name.as_deref());
        if let Some(size) = skg.key_size {
            push_attr(out, "key-size", &size.to_string());
        }
        out.push_str("/>\n");
    }
    if let Some(kd) = &enc.key_derivation {
        out.push_str("   <manifest:key-derivation");
        push_opt_attr(out, "key-derivation-name", kd.name.as_deref());
        if let Some(size) = kd.key_size {
            push_attr(out, "key-size", &size.to_string());
        }
        push_opt_attr(out, "salt", kd.salt.as_deref());
        if let Some(count) = kd.iteration_count {
            push_attr(out, "iteration-count", &count.to_string());
        }
        out.push_str("/>\n");
    }
    out.push_str("  </manifest:encryption-data>\n </manifest:file-entry>\n");
}

fn push_attr(out: &mut String, local: &str, value: &str) {
    out.push_str(" manifest:");
    out.push_str(local);
    out.push_str("=\"");
    out.push_str(&escape(value));
    out.push('"');
}

fn push_opt_attr(out: &mut String, local: &str, value: Option<&str>) {
    if let Some(value) = value {
        push_attr(out, local, value);
    }
}

/// Attributes of an element as `(local name, unescaped value)`.
fn attributes(
    reader: &Reader<&[u8]>,
    e: &BytesStart<'_>,
) -> Result<Vec<(String, String)>, OdfError> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| OdfError::Xml(err.to_string()))?;
        let key = reader
            .decoder()
            .decode(attr.key.local_name().as_ref())
            .map_err(|err| OdfError::Xml(err.to_string()))?
            .into_owned();
        let raw = reader
            .decoder()
            .decode(&attr.value)
            .map_err(|err| OdfError::Xml(err.to_string()))?;
        let value = unescape(&raw)
            .map_err(|err| OdfError::Xml(err.to_string()))?
            .into_owned();
        out.push((key, value));
    }
    Ok(out)
}

fn attr(attrs: &[(String, String)], local: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(k, _)| k == local)
        .map(|(_, v)| v.clone())
}

fn attr_u32(attrs: &[(String, String)], local: &str) -> Option<u32> {
    attr(attrs, local).and_then(|v| v.trim().parse().ok())
}

fn parse_file_entry(
    reader: &Reader<&[u8]>,
    e: &BytesStart<'_>,
) -> Result<Option<FileEntry>, OdfError> {
    let attrs = attributes(reader, e)?;
    let Some(raw_path) = attr(&attrs, "full-path") else {
        log::warn!("[MANIFEST] file-entry without full-path ignored");
        return Ok(None);
    };
    let normalized = if raw_path.ends_with('/') {
        path::normalize_directory(&raw_path)
    } else {
        path::normalize(&raw_path)
    };
    if normalized.is_empty() || (normalized != path::ROOT && path::is_external_reference(&normalized))
    {
        log::warn!("[MANIFEST] file-entry '{}' points outside the package", raw_path);
        return Ok(None);
    }
    Ok(Some(FileEntry {
        path: normalized,
        media_type: attr(&attrs, "media-type"),
        size: attr(&attrs, "size").and_then(|v| v.trim().parse().ok()),
        version: attr(&attrs, "version"),
        encryption: None,
    }))
}
