//! The package aggregate.
//!
//! [`OdfPackage`] owns the buffered archive, the live manifest, and the
//! content cache for one ODF package. Every path argument is normalized
//! through [`crate::path`] before it touches any of them, so all raw
//! spellings of an entry address the same state.
//!
//! Loading runs the ZIP reader and manifest parser once, resolves the package
//! media type, and reconciles the manifest with the archive. Validation
//! findings go to the optional [`ValidationSink`] given at load time.
//!
//! Saving lives in [`crate::save`].

use std::fmt;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use url::Url;

use crate::cache::{self, ContentCache};
use crate::error::{OdfError, ZipError};
use crate::manifest::{FileEntry, Manifest};
use crate::media_type;
use crate::path;
use crate::validate::{PackageConstraint, Reporter, ValidationSink};
use crate::xml::{QuickXmlEngine, XmlEngine};
use crate::zip::{ZipContainer, ZipLimits};

/// Media type given to inserted document trees when none is provided.
pub const XML_MEDIA_TYPE: &str = "text/xml";

/// Options controlling package loading.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageOptions {
    /// URI of the package location, carried into validation findings.
    pub base_uri: Option<String>,
    /// Optional ZIP safety limits used while reading archive entries.
    ///
    /// When `None`, no explicit file-size caps are enforced.
    pub zip_limits: Option<ZipLimits>,
}

/// Builder for loading or creating packages with explicit options.
pub struct OdfPackageBuilder<X = QuickXmlEngine> {
    options: PackageOptions,
    error_handler: Option<Box<dyn ValidationSink>>,
    engine: X,
}

impl OdfPackageBuilder<QuickXmlEngine> {
    /// Builder with default options and the default XML engine.
    pub fn new() -> Self {
        Self {
            options: PackageOptions::default(),
            error_handler: None,
            engine: QuickXmlEngine,
        }
    }
}

impl Default for OdfPackageBuilder<QuickXmlEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X> fmt::Debug for OdfPackageBuilder<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OdfPackageBuilder")
            .field("options", &self.options)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

impl<X: XmlEngine> OdfPackageBuilder<X> {
    /// Set the base URI reported with findings.
    pub fn base_uri(mut self, uri: impl Into<String>) -> Self {
        self.options.base_uri = Some(uri.into());
        self
    }

    /// Register a sink for validation findings produced while loading.
    pub fn error_handler(mut self, sink: impl ValidationSink + 'static) -> Self {
        self.error_handler = Some(Box::new(sink));
        self
    }

    /// Set explicit ZIP limits.
    pub fn with_zip_limits(mut self, limits: ZipLimits) -> Self {
        self.options.zip_limits = Some(limits);
        self
    }

    /// Replace all options at once.
    pub fn options(mut self, options: PackageOptions) -> Self {
        self.options = options;
        self
    }

    /// Use another XML engine for document trees.
    pub fn xml_engine<Y: XmlEngine>(self, engine: Y) -> OdfPackageBuilder<Y> {
        OdfPackageBuilder {
            options: self.options,
            error_handler: self.error_handler,
            engine,
        }
    }

    /// Create an empty package.
    pub fn create(self) -> OdfPackage<X> {
        OdfPackage::from_parts(self.engine, self.options.base_uri, self.error_handler)
    }

    /// Load a package from an in-memory archive.
    pub fn load_bytes(self, data: Vec<u8>) -> Result<OdfPackage<X>, OdfError> {
        let limits = self.options.zip_limits;
        let mut package =
            OdfPackage::from_parts(self.engine, self.options.base_uri, self.error_handler);
        package.load_archive(data, limits)?;
        Ok(package)
    }

    /// Load a package from any reader; the whole stream is buffered.
    pub fn load_reader<R: Read>(self, mut reader: R) -> Result<OdfPackage<X>, OdfError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.load_bytes(data)
    }

    /// Load a package from a file path. The base URI defaults to the file's URI.
    pub fn load_file<P: AsRef<Path>>(self, path: P) -> Result<OdfPackage<X>, OdfError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|err| io_error(path, err))?;
        self.default_base_uri(path).load_bytes(data)
    }

    pub(crate) fn default_base_uri(mut self, path: &Path) -> Self {
        if self.options.base_uri.is_none() {
            self.options.base_uri = file_uri(path);
        }
        self
    }
}

/// An ODF package: archive, manifest, and cached content.
pub struct OdfPackage<X: XmlEngine = QuickXmlEngine> {
    pub(crate) zip: Option<ZipContainer>,
    pub(crate) manifest: Manifest,
    pub(crate) cache: ContentCache<X::Tree>,
    pub(crate) media_type: Option<String>,
    pub(crate) base_uri: Option<String>,
    pub(crate) error_handler: Option<Box<dyn ValidationSink>>,
    pub(crate) engine: X,
    pub(crate) closed: bool,
}

impl<X: XmlEngine> fmt::Debug for OdfPackage<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OdfPackage")
            .field("base_uri", &self.base_uri)
            .field("media_type", &self.media_type)
            .field("entries", &self.manifest.len())
            .field("cached", &self.cache.len())
            .field("archive", &self.zip)
            .field("closed", &self.closed)
            .finish()
    }
}

impl OdfPackage<QuickXmlEngine> {
    /// Empty package with the default XML engine.
    pub fn new() -> Self {
        OdfPackageBuilder::new().create()
    }

    /// Builder for explicit options.
    pub fn builder() -> OdfPackageBuilder {
        OdfPackageBuilder::new()
    }

    /// Load a package from a file path.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, OdfError> {
        OdfPackageBuilder::new().load_file(path)
    }

    /// Load a package from any reader.
    pub fn load_reader<R: Read>(reader: R) -> Result<Self, OdfError> {
        OdfPackageBuilder::new().load_reader(reader)
    }

    /// Load a package from an in-memory archive.
    pub fn load_bytes(data: Vec<u8>) -> Result<Self, OdfError> {
        OdfPackageBuilder::new().load_bytes(data)
    }
}

impl Default for OdfPackage<QuickXmlEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: XmlEngine> OdfPackage<X> {
    /// Empty package using `engine` for document trees.
    pub fn with_engine(engine: X) -> Self {
        Self::from_parts(engine, None, None)
    }

    fn from_parts(
        engine: X,
        base_uri: Option<String>,
        error_handler: Option<Box<dyn ValidationSink>>,
    ) -> Self {
        Self {
            zip: None,
            manifest: Manifest::new(),
            cache: ContentCache::new(),
            media_type: None,
            base_uri,
            error_handler,
            engine,
            closed: false,
        }
    }

    fn load_archive(&mut self, data: Vec<u8>, limits: Option<ZipLimits>) -> Result<(), OdfError> {
        let mut reporter =
            Reporter::new(self.error_handler.as_deref_mut(), self.base_uri.as_deref());

        if data.len() < 3 {
            return Err(not_a_zip(&mut reporter, "input is shorter than a ZIP header"));
        }
        let mut zip = match ZipContainer::open_with_limits(data, limits) {
            Ok(zip) => zip,
            Err(err @ (ZipError::InvalidFormat | ZipError::EmptyArchive)) => {
                return Err(not_a_zip(&mut reporter, &err.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let mut manifest = match zip.original(path::MANIFEST_PATH) {
            Some(entry) => match zip
                .read(entry)
                .map_err(OdfError::from)
                .and_then(|bytes| Manifest::parse(&bytes))
            {
                Ok(manifest) => manifest,
                Err(err) => {
                    log::warn!("[MANIFEST] Ignoring unusable manifest: {}", err);
                    Manifest::new()
                }
            },
            None => {
                reporter.report(PackageConstraint::ManifestNotInPackage, &[]);
                Manifest::new()
            }
        };

        let media_type = media_type::resolve_package_media_type(&zip, &manifest, &mut reporter);

        zip.remove(path::MIMETYPE_PATH);
        zip.remove(path::MANIFEST_PATH);
        zip.remove(path::META_INF_DIR);
        manifest.reconcile(zip.working_names(), &mut reporter);

        log::debug!(
            "[PKG] Loaded package: {} archive entries, {} manifest entries, media type {:?}",
            zip.num_entries(),
            manifest.len(),
            media_type
        );

        self.zip = Some(zip);
        self.manifest = manifest;
        self.media_type = media_type;
        Ok(())
    }

    pub(crate) fn ensure_open(&self) -> Result<(), OdfError> {
        if self.closed {
            return Err(OdfError::Closed);
        }
        Ok(())
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// URI of the package location, if known.
    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    /// Replace the base URI.
    pub fn set_base_uri(&mut self, uri: Option<String>) {
        self.base_uri = uri;
    }

    /// Replace the validation sink. It receives load findings and parse
    /// failures from [`document_tree`](Self::document_tree).
    pub fn set_error_handler(&mut self, handler: Option<Box<dyn ValidationSink>>) {
        self.error_handler = handler;
    }

    /// Current validation sink, if any.
    pub fn error_handler(&self) -> Option<&dyn ValidationSink> {
        self.error_handler.as_deref()
    }

    /// XML engine used for document trees.
    pub fn engine(&self) -> &X {
        &self.engine
    }

    /// Package media type.
    pub fn media_type(&self) -> Result<Option<&str>, OdfError> {
        self.ensure_open()?;
        Ok(self.media_type.as_deref())
    }

    /// Set the package media type; the manifest root entry follows it.
    pub fn set_media_type(&mut self, media_type: Option<&str>) -> Result<(), OdfError> {
        self.ensure_open()?;
        self.media_type = media_type.map(str::to_string);
        self.manifest.set_root_media_type(media_type);
        Ok(())
    }

    /// Media type of a path; `""` and `/` give the package media type.
    pub fn media_type_of(&self, raw_path: &str) -> Result<Option<&str>, OdfError> {
        self.ensure_open()?;
        Ok(media_type::media_type_of(
            &self.manifest,
            self.media_type.as_deref(),
            raw_path,
        ))
    }

    /// Live manifest.
    pub fn manifest(&self) -> Result<&Manifest, OdfError> {
        self.ensure_open()?;
        Ok(&self.manifest)
    }

    /// Manifest record for a file or directory path.
    pub fn file_entry(&self, raw_path: &str) -> Result<Option<&FileEntry>, OdfError> {
        self.ensure_open()?;
        let normalized = path::normalize(raw_path);
        if normalized.is_empty() || path::is_external_reference(raw_path) {
            return Err(OdfError::InvalidPath(raw_path.to_string()));
        }
        Ok(self
            .manifest
            .get(&normalized)
            .or_else(|| self.manifest.get(&path::normalize_directory(raw_path))))
    }

    /// Sorted paths of every manifest record.
    pub fn file_entries(&self) -> Result<Vec<String>, OdfError> {
        self.ensure_open()?;
        Ok(self.manifest.paths().map(str::to_string).collect())
    }

    /// Serialized `META-INF/manifest.xml` as save would write it.
    pub fn manifest_xml(&mut self) -> Result<String, OdfError> {
        self.ensure_open()?;
        self.sync_root_entry();
        Ok(self.manifest.to_xml())
    }

    pub(crate) fn sync_root_entry(&mut self) {
        self.manifest
            .set_root_media_type(self.media_type.as_deref());
    }

    /// Whether the package holds an entry for `raw_path`.
    pub fn contains(&self, raw_path: &str) -> Result<bool, OdfError> {
        self.ensure_open()?;
        let internal = path::internal_file_path(raw_path)?;
        if internal == path::MIMETYPE_PATH {
            return Ok(self.media_type.is_some());
        }
        if internal == path::MANIFEST_PATH {
            return Ok(true);
        }
        Ok(self.manifest.contains(&internal)
            || self.cache.contains(&internal)
            || self.zip.as_ref().is_some_and(|zip| zip.contains(&internal))
            || self
                .manifest
                .contains(&path::normalize_directory(raw_path)))
    }

    /// Paths of embedded documents (typed directory entries), excluding the
    /// root document, optionally filtered by media type and subtree.
    pub fn document_paths(
        &self,
        media_type: Option<&str>,
        subtree: Option<&str>,
    ) -> Result<Vec<String>, OdfError> {
        self.ensure_open()?;
        let subtree = match subtree {
            Some(raw) => Some(path::internal_directory_path(raw)?).filter(|s| s != path::ROOT),
            None => None,
        };
        Ok(self
            .manifest
            .entries()
            .filter(|e| e.path != path::ROOT && e.is_directory())
            .filter(|e| {
                subtree
                    .as_deref()
                    .is_none_or(|s| e.path.starts_with(s) && e.path != s)
            })
            .filter_map(|e| {
                let mt = e.media_type()?;
                media_type
                    .is_none_or(|wanted| wanted == mt)
                    .then(|| e.path.clone())
            })
            .collect())
    }

    /// Current bytes of a file, resolved through the cache tiers.
    ///
    /// `mimetype` yields the package media type and `META-INF/manifest.xml`
    /// the freshly serialized manifest. Directories yield `None`.
    pub fn bytes(&mut self, raw_path: &str) -> Result<Option<Vec<u8>>, OdfError> {
        self.ensure_open()?;
        let internal = path::internal_file_path(raw_path)?;
        match internal.as_str() {
            path::MIMETYPE_PATH => Ok(self.media_type.as_ref().map(|mt| mt.as_bytes().to_vec())),
            path::MANIFEST_PATH => Ok(Some(self.manifest_xml()?.into_bytes())),
            p if path::is_directory(p) => Ok(None),
            p => self.cache.bytes(p, self.zip.as_ref(), &self.engine),
        }
    }

    /// Bytes of a file as the archive held them at load, ignoring edits.
    pub fn original_bytes(&self, raw_path: &str) -> Result<Option<Vec<u8>>, OdfError> {
        self.ensure_open()?;
        let internal = path::internal_file_path(raw_path)?;
        let Some(zip) = self.zip.as_ref() else {
            return Ok(None);
        };
        match zip.original(&internal) {
            Some(entry) if !entry.is_directory() => Ok(Some(zip.read(entry)?)),
            _ => Ok(None),
        }
    }

    /// Readable stream of a file: current content, or the original archive
    /// content when `original` is set.
    pub fn input_stream(
        &mut self,
        raw_path: &str,
        original: bool,
    ) -> Result<Option<Cursor<Vec<u8>>>, OdfError> {
        let bytes = if original {
            self.original_bytes(raw_path)?
        } else {
            self.bytes(raw_path)?
        };
        Ok(bytes.map(Cursor::new))
    }

    /// Parsed document tree of a file, parsed on first access and kept as
    /// the authoritative content for that path.
    ///
    /// Malformed XML is reported to the error handler and returned as
    /// [`OdfError::Xml`]; the bytes stay in place.
    pub fn document_tree(&mut self, raw_path: &str) -> Result<Option<&mut X::Tree>, OdfError> {
        self.ensure_open()?;
        let internal = path::internal_file_path(raw_path)?;
        if cache::is_synthetic(&internal) || path::is_directory(&internal) {
            return Ok(None);
        }
        match self.cache.tree(&internal, self.zip.as_ref(), &self.engine) {
            Err(OdfError::Xml(message)) => {
                log::warn!("[PKG] '{}' is not well-formed: {}", internal, message);
                let mut reporter =
                    Reporter::new(self.error_handler.as_deref_mut(), self.base_uri.as_deref());
                reporter.report(PackageConstraint::DocumentNotParsable, &[&internal, &message]);
                Err(OdfError::Xml(message))
            }
            other => other,
        }
    }

    /// Insert or replace a file with raw bytes.
    ///
    /// Writing `mimetype` sets the package media type instead.
    pub fn insert_bytes(
        &mut self,
        bytes: impl Into<Vec<u8>>,
        raw_path: &str,
        media_type: Option<&str>,
    ) -> Result<(), OdfError> {
        self.ensure_open()?;
        let internal = insertable_file_path(raw_path)?;
        let bytes = bytes.into();
        if internal == path::MIMETYPE_PATH {
            let value = String::from_utf8_lossy(&bytes).trim().to_string();
            let value = Some(value).filter(|v| !v.is_empty());
            return self.set_media_type(value.as_deref());
        }
        log::debug!("[PKG] Insert {} bytes at '{}'", bytes.len(), internal);
        self.cache.set_bytes(&internal, bytes, self.zip.as_mut());
        self.update_entry(&internal, media_type);
        Ok(())
    }

    /// Insert or replace a file with everything `reader` yields.
    pub fn insert_reader<R: Read>(
        &mut self,
        mut reader: R,
        raw_path: &str,
        media_type: Option<&str>,
    ) -> Result<(), OdfError> {
        self.ensure_open()?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.insert_bytes(data, raw_path, media_type)
    }

    /// Insert or replace a file with the content at `uri`.
    ///
    /// `file:` URIs and plain filesystem paths are supported.
    pub fn insert_uri(
        &mut self,
        uri: &str,
        raw_path: &str,
        media_type: Option<&str>,
    ) -> Result<(), OdfError> {
        self.ensure_open()?;
        let source = source_path(uri)?;
        let file = fs::File::open(&source).map_err(|err| io_error(&source, err))?;
        self.insert_reader(io::BufReader::new(file), raw_path, media_type)
    }

    /// Insert or replace a file with a document tree. The media type
    /// defaults to `text/xml`.
    pub fn insert_tree(
        &mut self,
        tree: X::Tree,
        raw_path: &str,
        media_type: Option<&str>,
    ) -> Result<(), OdfError> {
        self.ensure_open()?;
        let internal = insertable_file_path(raw_path)?;
        if internal == path::MIMETYPE_PATH {
            return Err(OdfError::ReservedPath(internal));
        }
        self.cache.set_tree(&internal, tree, self.zip.as_mut());
        self.update_entry(&internal, Some(media_type.unwrap_or(XML_MEDIA_TYPE)));
        Ok(())
    }

    /// Register a directory entry, e.g. the root of an embedded document.
    /// The root directory sets the package media type.
    pub fn insert_directory(
        &mut self,
        raw_path: &str,
        media_type: Option<&str>,
    ) -> Result<(), OdfError> {
        self.ensure_open()?;
        let internal = path::internal_directory_path(raw_path)?;
        if internal == path::ROOT {
            return self.set_media_type(media_type);
        }
        if internal == path::META_INF_DIR {
            return Err(OdfError::ReservedPath(internal));
        }
        self.update_entry(&internal, media_type);
        Ok(())
    }

    /// Writer whose bytes are inserted at `raw_path` on
    /// [`commit`](InsertWriter::commit) or drop. Without a media type the
    /// existing record's media type is kept.
    pub fn insert_writer(
        &mut self,
        raw_path: &str,
        media_type: Option<&str>,
    ) -> Result<InsertWriter<'_, X>, OdfError> {
        self.ensure_open()?;
        let internal = insertable_file_path(raw_path)?;
        Ok(InsertWriter {
            package: self,
            path: internal,
            media_type: media_type.map(str::to_string),
            buffer: Vec::new(),
            committed: false,
        })
    }

    /// Carry over the metadata that describes the stored bytes verbatim.
    fn copy_entry_metadata(&mut self, internal: &str, source: &FileEntry) {
        if let Some(entry) = self.manifest.get_mut(internal) {
            entry.size = source.size;
            entry.version.clone_from(&source.version);
            entry.encryption.clone_from(&source.encryption);
        }
    }

    fn update_entry(&mut self, internal: &str, media_type: Option<&str>) {
        let entry = self.manifest.ensure_entry(internal);
        entry.media_type = media_type.map(str::to_string);
        entry.size = None;
        entry.encryption = None;
    }

    /// Remove a file, or a directory with everything below it.
    ///
    /// `""` and `/` remove the root document: every entry that does not
    /// belong to an embedded document, plus the root record.
    pub fn remove(&mut self, raw_path: &str) -> Result<(), OdfError> {
        self.ensure_open()?;
        let normalized = path::normalize(raw_path);
        if normalized.is_empty() || path::is_external_reference(raw_path) {
            return Err(OdfError::InvalidPath(raw_path.to_string()));
        }
        if normalized == path::ROOT {
            self.remove_root_document();
            return Ok(());
        }
        if normalized == path::MANIFEST_PATH {
            return Err(OdfError::ReservedPath(normalized));
        }
        if normalized == path::MIMETYPE_PATH {
            self.media_type = None;
            return Ok(());
        }

        let directory = path::normalize_directory(raw_path);
        let is_subtree = path::is_directory(&normalized)
            || (!self.holds_file(&normalized) && self.manifest.contains(&directory));
        if is_subtree {
            let removed = self.manifest.remove_prefix(&directory).len();
            self.cache.remove_prefix(&directory);
            if let Some(zip) = self.zip.as_mut() {
                zip.remove_prefix(&directory);
            }
            log::debug!("[PKG] Removed '{}' ({} records)", directory, removed);
        } else {
            self.manifest.remove(&normalized);
            self.cache.remove(&normalized);
            if let Some(zip) = self.zip.as_mut() {
                zip.remove(&normalized);
            }
        }
        Ok(())
    }

    fn holds_file(&self, internal: &str) -> bool {
        self.manifest.contains(internal)
            || self.cache.contains(internal)
            || self.zip.as_ref().is_some_and(|zip| zip.contains(internal))
    }

    fn remove_root_document(&mut self) {
        let embedded: Vec<String> = self
            .manifest
            .entries()
            .filter(|e| e.path != path::ROOT && e.is_directory() && e.media_type().is_some())
            .map(|e| e.path.clone())
            .collect();
        let owned_by_root =
            |p: &str| !embedded.iter().any(|root| p.starts_with(root.as_str()));

        let manifest_paths: Vec<String> = self
            .manifest
            .paths()
            .filter(|p| owned_by_root(p))
            .map(str::to_string)
            .collect();
        for p in &manifest_paths {
            self.manifest.remove(p);
        }
        let cached: Vec<String> = self
            .cache
            .paths()
            .filter(|p| owned_by_root(p))
            .map(str::to_string)
            .collect();
        for p in &cached {
            self.cache.remove(p);
        }
        if let Some(zip) = self.zip.as_mut() {
            let archived: Vec<String> = zip
                .working_names()
                .filter(|p| owned_by_root(p))
                .map(str::to_string)
                .collect();
            for p in &archived {
                zip.remove(p);
            }
        }
        log::debug!(
            "[PKG] Removed root document ({} records, {} embedded documents kept)",
            manifest_paths.len(),
            embedded.len()
        );
    }

    /// Serialize open document trees below `subtree` (everything when
    /// `None` or `/`) into the byte tier. Returns the flushed paths.
    pub fn flush_trees(&mut self, subtree: Option<&str>) -> Result<Vec<String>, OdfError> {
        self.ensure_open()?;
        let prefix = match subtree {
            Some(raw) => {
                let dir = path::internal_directory_path(raw)?;
                if dir == path::ROOT {
                    String::new()
                } else {
                    dir
                }
            }
            None => String::new(),
        };
        let flushed = self.cache.flush_trees(&prefix, &self.engine)?;
        for p in &flushed {
            if let Some(entry) = self.manifest.get_mut(p) {
                if entry.media_type().is_none() {
                    entry.media_type = Some(XML_MEDIA_TYPE.to_string());
                }
                entry.size = None;
            }
        }
        Ok(flushed)
    }

    /// Copy the document rooted at `source_root` in `source` into this
    /// package below `destination_root`.
    ///
    /// `source_root` of `""` or `/` embeds the source's root document.
    /// A root without a media type fails with [`OdfError::NotADocument`].
    /// Open trees in the source subtree are flushed first. Entries keep
    /// their size and encryption metadata; entries that cannot be read
    /// are logged and skipped.
    pub fn insert_document(
        &mut self,
        source: &mut OdfPackage<X>,
        source_root: &str,
        destination_root: &str,
    ) -> Result<(), OdfError> {
        self.ensure_open()?;
        source.ensure_open()?;

        let source_root = path::internal_directory_path(source_root)?;
        let destination = path::internal_directory_path(destination_root)?;
        if destination == path::ROOT || destination == path::META_INF_DIR {
            return Err(OdfError::InvalidPath(destination_root.to_string()));
        }
        let embeds_root = source_root == path::ROOT;
        let prefix = if embeds_root { "" } else { source_root.as_str() };

        let document_media_type = if embeds_root {
            source.media_type.clone()
        } else {
            source
                .manifest
                .get(&source_root)
                .and_then(FileEntry::media_type)
                .map(str::to_string)
        };
        if document_media_type.is_none() {
            log::warn!("[PKG] '{}' has no document media type", source_root);
            return Err(OdfError::NotADocument(source_root.clone()));
        }

        source.flush_trees(Some(&source_root))?;

        let entries: Vec<FileEntry> = source
            .manifest
            .entries_under(prefix)
            .filter(|e| e.path != path::ROOT && e.path != source_root)
            .filter(|e| !(embeds_root && e.path.starts_with(path::META_INF_DIR)))
            .filter(|e| !cache::is_synthetic(&e.path))
            .cloned()
            .collect();

        let mut copied = 0usize;
        for entry in entries {
            let target = format!("{}{}", destination, &entry.path[prefix.len()..]);
            if entry.is_directory() {
                self.update_entry(&target, entry.media_type());
                self.copy_entry_metadata(&target, &entry);
                copied += 1;
                continue;
            }
            match source.bytes(&entry.path) {
                Ok(Some(bytes)) => match self.insert_bytes(bytes, &target, entry.media_type()) {
                    Ok(()) => {
                        self.copy_entry_metadata(&target, &entry);
                        copied += 1;
                    }
                    Err(err) => log::error!("[PKG] Failed to embed '{}': {}", target, err),
                },
                Ok(None) => {
                    log::error!("[PKG] Embedded entry '{}' has no content", entry.path)
                }
                Err(err) => log::error!("[PKG] Failed to read '{}': {}", entry.path, err),
            }
        }

        self.manifest.ensure_entry(&destination);
        self.manifest.insert(FileEntry {
            media_type: document_media_type,
            ..FileEntry::new(destination.as_str())
        });
        log::debug!(
            "[PKG] Embedded document at '{}' ({} entries)",
            destination,
            copied
        );
        Ok(())
    }

    /// Release the archive and all in-memory state. Later calls fail with
    /// [`OdfError::Closed`]; closing twice has no effect.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.zip = None;
        self.manifest = Manifest::new();
        self.cache.clear();
        self.media_type = None;
        self.base_uri = None;
        self.error_handler = None;
        self.closed = true;
        log::debug!("[PKG] Package closed");
    }
}

/// Buffered writer returned by [`OdfPackage::insert_writer`].
///
/// Nothing reaches the package until the writer is committed or dropped.
pub struct InsertWriter<'a, X: XmlEngine> {
    package: &'a mut OdfPackage<X>,
    path: String,
    media_type: Option<String>,
    buffer: Vec<u8>,
    committed: bool,
}

impl<X: XmlEngine> InsertWriter<'_, X> {
    /// Normalized target path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Insert the buffered bytes, reporting any failure.
    pub fn commit(mut self) -> Result<(), OdfError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), OdfError> {
        if self.committed {
            return Ok(());
        }
        self.committed = true;
        let bytes = std::mem::take(&mut self.buffer);
        let media_type = match self.media_type.take() {
            Some(mt) => Some(mt),
            None => self
                .package
                .manifest
                .get(&self.path)
                .and_then(FileEntry::media_type)
                .map(str::to_string),
        };
        self.package
            .insert_bytes(bytes, &self.path, media_type.as_deref())
    }
}

impl<X: XmlEngine> Write for InsertWriter<'_, X> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<X: XmlEngine> Drop for InsertWriter<'_, X> {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            log::error!("[PKG] Failed to insert '{}': {}", self.path, err);
        }
    }
}

fn insertable_file_path(raw_path: &str) -> Result<String, OdfError> {
    let internal = path::internal_file_path(raw_path)?;
    if internal == path::MANIFEST_PATH {
        return Err(OdfError::ReservedPath(internal));
    }
    if path::is_directory(&internal) {
        return Err(OdfError::InvalidPath(raw_path.to_string()));
    }
    Ok(internal)
}

fn not_a_zip(reporter: &mut Reporter<'_>, detail: &str) -> OdfError {
    log::warn!("[PKG] Input is not a ZIP archive: {}", detail);
    reporter.report(PackageConstraint::PackageIsNoZip, &[]);
    OdfError::NotAZipArchive
}

pub(crate) fn io_error(path: &Path, err: io::Error) -> OdfError {
    OdfError::Io(format!("{}: {}", path.display(), err))
}

/// `file:` URI of a filesystem path, when it can be resolved.
pub(crate) fn file_uri(path: &Path) -> Option<String> {
    let absolute = fs::canonicalize(path).ok()?;
    Url::from_file_path(absolute).ok().map(|url| url.to_string())
}

fn source_path(uri: &str) -> Result<PathBuf, OdfError> {
    match Url::parse(uri) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|()| OdfError::UnsupportedUri(uri.to_string())),
        // Drive letters parse as one-character schemes.
        Ok(url) if url.scheme().len() == 1 => Ok(PathBuf::from(uri)),
        Ok(_) => Err(OdfError::UnsupportedUri(uri.to_string())),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(PathBuf::from(uri)),
        Err(_) => Err(OdfError::UnsupportedUri(uri.to_string())),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::validate::ValidationReport;
    use crate::xml::{XmlDocument, XmlElement};
    use crate::zip::tests::{build_zip, EntrySpec};

    pub(crate) const TEXT: &str = "application/vnd.oasis.opendocument.text";
    pub(crate) const CHART: &str = "application/vnd.oasis.opendocument.chart";

    pub(crate) const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.2">
 <manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.text"/>
 <manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
 <manifest:file-entry manifest:full-path="styles.xml" manifest:media-type="text/xml"/>
 <manifest:file-entry manifest:full-path="Pictures/logo.png" manifest:media-type="image/png"/>
 <manifest:file-entry manifest:full-path="Object 1/" manifest:media-type="application/vnd.oasis.opendocument.chart"/>
 <manifest:file-entry manifest:full-path="Object 1/content.xml" manifest:media-type="text/xml"/>
</manifest:manifest>"#;

    /// A well-formed text document with one embedded chart.
    pub(crate) fn sample_odt() -> Vec<u8> {
        build_zip(&[
            EntrySpec::stored("mimetype", TEXT.as_bytes()),
            EntrySpec::deflated("META-INF/manifest.xml", MANIFEST.as_bytes()),
            EntrySpec::deflated("content.xml", b"<office:document-content><p>Hi</p></office:document-content>"),
            EntrySpec::deflated("styles.xml", b"<office:document-styles/>"),
            EntrySpec::stored("Pictures/logo.png", b"\x89PNG"),
            EntrySpec::deflated("Object 1/content.xml", b"<chart/>"),
        ])
    }

    fn load_with_report(data: Vec<u8>) -> (Result<OdfPackage, OdfError>, ValidationReport) {
        let report = ValidationReport::shared();
        let result = OdfPackage::builder()
            .base_uri("file:///tmp/sample.odt")
            .error_handler(report.clone())
            .load_bytes(data);
        let report = report.lock().unwrap().clone();
        (result, report)
    }

    #[test]
    fn test_load_well_formed_package() {
        let (pkg, report) = load_with_report(sample_odt());
        let mut pkg = pkg.unwrap();
        assert!(report.findings().is_empty(), "{:?}", report.findings());
        assert_eq!(pkg.media_type().unwrap(), Some(TEXT));
        assert_eq!(pkg.media_type_of("content.xml").unwrap(), Some("text/xml"));
        assert_eq!(
            pkg.bytes("./content.xml").unwrap().unwrap(),
            b"<office:document-content><p>Hi</p></office:document-content>"
        );
        assert_eq!(pkg.base_uri(), Some("file:///tmp/sample.odt"));
    }

    #[test]
    fn test_synthetic_paths_are_derived() {
        let mut pkg = OdfPackage::load_bytes(sample_odt()).unwrap();
        assert_eq!(pkg.bytes("mimetype").unwrap().unwrap(), TEXT.as_bytes());
        let manifest = String::from_utf8(pkg.bytes("META-INF/manifest.xml").unwrap().unwrap()).unwrap();
        assert!(manifest.contains("manifest:full-path=\"Object 1/content.xml\""));
        assert!(pkg.contains("META-INF/manifest.xml").unwrap());
        assert!(pkg.contains("mimetype").unwrap());
        assert!(!pkg.file_entries().unwrap().iter().any(|p| p == "mimetype"));
    }

    #[test]
    fn test_short_and_garbage_input_is_not_a_zip() {
        for data in [b"PK".to_vec(), b"definitely not an archive".to_vec()] {
            let (result, report) = load_with_report(data);
            assert!(matches!(result, Err(OdfError::NotAZipArchive)));
            assert!(report.contains_code("PACKAGE_IS_NO_ZIP"));
            assert_eq!(
                report.findings()[0].severity,
                crate::validate::ValidationSeverity::Fatal
            );
        }
    }

    #[test]
    fn test_missing_manifest_reported_and_files_synthesized() {
        let data = build_zip(&[
            EntrySpec::stored("mimetype", TEXT.as_bytes()),
            EntrySpec::deflated("content.xml", b"<a/>"),
        ]);
        let (pkg, report) = load_with_report(data);
        let pkg = pkg.unwrap();
        assert!(report.contains_code("MANIFEST_NOT_IN_PACKAGE"));
        assert!(report.contains_code("MANIFEST_DOES_NOT_LIST_FILE"));
        assert!(report.contains_code("MIMETYPE_WITHOUT_MANIFEST_MEDIATYPE"));
        assert!(pkg.contains("content.xml").unwrap());
        assert_eq!(pkg.media_type_of("content.xml").unwrap(), None);
        assert_eq!(pkg.media_type().unwrap(), Some(TEXT));
    }

    #[test]
    fn test_unparsable_manifest_treated_as_empty() {
        let data = build_zip(&[
            EntrySpec::stored("mimetype", TEXT.as_bytes()),
            EntrySpec::deflated("META-INF/manifest.xml", b"<manifest:manifest><oops"),
            EntrySpec::deflated("content.xml", b"<a/>"),
        ]);
        let pkg = OdfPackage::load_bytes(data).unwrap();
        assert_eq!(pkg.file_entries().unwrap(), vec!["content.xml".to_string()]);
    }

    #[test]
    fn test_insert_bytes_and_media_type() {
        let mut pkg = OdfPackage::new();
        pkg.insert_bytes(b"hello".to_vec(), "docs\\notes//foo.txt", Some("text/plain"))
            .unwrap();
        assert_eq!(pkg.bytes("docs/notes/foo.txt").unwrap().unwrap(), b"hello");
        assert_eq!(
            pkg.media_type_of("docs/./notes/foo.txt").unwrap(),
            Some("text/plain")
        );
        assert_eq!(
            pkg.file_entries().unwrap(),
            vec!["docs/", "docs/notes/", "docs/notes/foo.txt"]
        );
    }

    #[test]
    fn test_insert_replaces_archive_content_and_keeps_original() {
        let mut pkg = OdfPackage::load_bytes(sample_odt()).unwrap();
        pkg.insert_bytes(b"<new/>".to_vec(), "content.xml", Some("text/xml"))
            .unwrap();
        assert_eq!(pkg.bytes("content.xml").unwrap().unwrap(), b"<new/>");
        let mut original = String::new();
        pkg.input_stream("content.xml", true)
            .unwrap()
            .unwrap()
            .read_to_string(&mut original)
            .unwrap();
        assert!(original.contains("<p>Hi</p>"));
    }

    #[test]
    fn test_insert_resets_size_and_encryption() {
        let mut pkg = OdfPackage::new();
        pkg.insert_bytes(b"a".to_vec(), "a.bin", None).unwrap();
        {
            let entry = pkg.manifest.get_mut("a.bin").unwrap();
            entry.size = Some(10);
            entry.encryption = Some(Default::default());
        }
        pkg.insert_bytes(b"b".to_vec(), "a.bin", Some("application/octet-stream"))
            .unwrap();
        let entry = pkg.file_entry("a.bin").unwrap().unwrap();
        assert_eq!(entry.size, None);
        assert!(entry.encryption.is_none());
    }

    #[test]
    fn test_insert_mimetype_sets_package_media_type() {
        let mut pkg = OdfPackage::new();
        pkg.insert_bytes(TEXT.as_bytes().to_vec(), "mimetype", None)
            .unwrap();
        assert_eq!(pkg.media_type().unwrap(), Some(TEXT));
        assert_eq!(pkg.file_entry("/").unwrap().unwrap().media_type(), Some(TEXT));
        assert_eq!(pkg.media_type_of("").unwrap(), Some(TEXT));
    }

    #[test]
    fn test_reserved_and_invalid_insert_paths() {
        let mut pkg = OdfPackage::new();
        assert!(matches!(
            pkg.insert_bytes(b"x".to_vec(), "META-INF/manifest.xml", None),
            Err(OdfError::ReservedPath(_))
        ));
        assert!(matches!(
            pkg.insert_bytes(b"x".to_vec(), "../outside.txt", None),
            Err(OdfError::InvalidPath(_))
        ));
        assert!(matches!(
            pkg.insert_bytes(b"x".to_vec(), "", None),
            Err(OdfError::InvalidPath(_))
        ));
        assert!(matches!(
            pkg.insert_bytes(b"x".to_vec(), "Pictures/", None),
            Err(OdfError::InvalidPath(_))
        ));
        assert!(matches!(pkg.bytes("http://example.com/a"), Err(OdfError::InvalidPath(_))));
    }

    #[test]
    fn test_insert_tree_supersedes_cached_bytes() {
        let mut pkg = OdfPackage::new();
        pkg.insert_bytes(b"<old/>".to_vec(), "content.xml", None)
            .unwrap();
        let tree = XmlDocument::new(XmlElement::new("office:document-content").with_text("new"));
        pkg.insert_tree(tree, "content.xml", None).unwrap();
        let bytes = String::from_utf8(pkg.bytes("content.xml").unwrap().unwrap()).unwrap();
        assert!(bytes.contains("<office:document-content>new</office:document-content>"));
        assert!(!bytes.contains("old"));
        assert_eq!(pkg.media_type_of("content.xml").unwrap(), Some(XML_MEDIA_TYPE));
    }

    #[test]
    fn test_document_tree_edits_are_visible() {
        let mut pkg = OdfPackage::load_bytes(sample_odt()).unwrap();
        {
            let tree = pkg.document_tree("styles.xml").unwrap().unwrap();
            tree.root.set_attribute("office:version", "1.3");
        }
        let bytes = String::from_utf8(pkg.bytes("styles.xml").unwrap().unwrap()).unwrap();
        assert!(bytes.contains("office:version=\"1.3\""));
        assert!(pkg.document_tree("missing.xml").unwrap().is_none());
        assert!(pkg.document_tree("mimetype").unwrap().is_none());
    }

    #[test]
    fn test_unparsable_tree_reported_to_error_handler() {
        let mut pkg = OdfPackage::load_bytes(sample_odt()).unwrap();
        assert!(pkg.error_handler().is_none());
        let report = ValidationReport::shared();
        pkg.set_error_handler(Some(Box::new(report.clone())));
        assert!(pkg.error_handler().is_some());

        pkg.insert_bytes(b"<broken".to_vec(), "bad.xml", Some("text/xml"))
            .unwrap();
        assert!(matches!(pkg.document_tree("bad.xml"), Err(OdfError::Xml(_))));
        assert_eq!(pkg.bytes("bad.xml").unwrap().unwrap(), b"<broken");

        let report = report.lock().unwrap();
        assert_eq!(report.findings().len(), 1);
        let finding = &report.findings()[0];
        assert_eq!(finding.code, "DOCUMENT_NOT_PARSABLE");
        assert_eq!(finding.severity, crate::validate::ValidationSeverity::Error);
        assert_eq!(finding.path.as_deref(), Some("bad.xml"));
    }

    #[test]
    fn test_insert_writer_commits_on_drop_and_keeps_media_type() {
        let mut pkg = OdfPackage::load_bytes(sample_odt()).unwrap();
        {
            let mut writer = pkg.insert_writer("Pictures/logo.png", None).unwrap();
            writer.write_all(b"new image").unwrap();
        }
        assert_eq!(pkg.bytes("Pictures/logo.png").unwrap().unwrap(), b"new image");
        assert_eq!(pkg.media_type_of("Pictures/logo.png").unwrap(), Some("image/png"));

        let mut writer = pkg.insert_writer("notes.txt", Some("text/plain")).unwrap();
        writer.write_all(b"note").unwrap();
        writer.commit().unwrap();
        assert_eq!(pkg.bytes("notes.txt").unwrap().unwrap(), b"note");
    }

    #[test]
    fn test_insert_uri_reads_files_and_rejects_remote() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("image.png");
        fs::write(&source, b"PNGDATA").unwrap();

        let mut pkg = OdfPackage::new();
        pkg.insert_uri(source.to_str().unwrap(), "Pictures/a.png", Some("image/png"))
            .unwrap();
        let uri = Url::from_file_path(&source).unwrap().to_string();
        pkg.insert_uri(&uri, "Pictures/b.png", Some("image/png"))
            .unwrap();
        assert_eq!(pkg.bytes("Pictures/a.png").unwrap().unwrap(), b"PNGDATA");
        assert_eq!(pkg.bytes("Pictures/b.png").unwrap().unwrap(), b"PNGDATA");
        assert!(matches!(
            pkg.insert_uri("https://example.com/a.png", "Pictures/c.png", None),
            Err(OdfError::UnsupportedUri(_))
        ));
    }

    #[test]
    fn test_document_paths_filters() {
        let mut pkg = OdfPackage::load_bytes(sample_odt()).unwrap();
        pkg.insert_directory("Object 1/Object 2", Some(TEXT)).unwrap();
        pkg.insert_directory("Object 3/", Some(CHART)).unwrap();

        let mut all = pkg.document_paths(None, None).unwrap();
        all.sort();
        assert_eq!(all, vec!["Object 1/", "Object 1/Object 2/", "Object 3/"]);
        assert_eq!(
            pkg.document_paths(Some(CHART), None).unwrap(),
            vec!["Object 1/", "Object 3/"]
        );
        assert_eq!(
            pkg.document_paths(None, Some("Object 1")).unwrap(),
            vec!["Object 1/Object 2/"]
        );
    }

    #[test]
    fn test_remove_file_and_directory() {
        let mut pkg = OdfPackage::load_bytes(sample_odt()).unwrap();
        pkg.remove("styles.xml").unwrap();
        assert!(!pkg.contains("styles.xml").unwrap());
        assert!(pkg.bytes("styles.xml").unwrap().is_none());

        pkg.remove("Object 1").unwrap();
        assert!(!pkg.contains("Object 1/content.xml").unwrap());
        assert!(pkg.document_paths(None, None).unwrap().is_empty());
        assert!(pkg.original_bytes("Object 1/content.xml").unwrap().is_some());
    }

    #[test]
    fn test_remove_root_keeps_embedded_documents() {
        let mut pkg = OdfPackage::load_bytes(sample_odt()).unwrap();
        pkg.insert_bytes(b"x".to_vec(), "extra.txt", None).unwrap();
        pkg.remove("/").unwrap();
        assert_eq!(
            pkg.file_entries().unwrap(),
            vec!["Object 1/", "Object 1/content.xml"]
        );
        assert!(pkg.bytes("content.xml").unwrap().is_none());
        assert!(pkg.bytes("extra.txt").unwrap().is_none());
        assert_eq!(pkg.bytes("Object 1/content.xml").unwrap().unwrap(), b"<chart/>");
    }

    #[test]
    fn test_insert_document_copies_embedded_subtree() {
        let mut source = OdfPackage::load_bytes(sample_odt()).unwrap();
        {
            let tree = source.document_tree("Object 1/content.xml").unwrap().unwrap();
            tree.root.set_attribute("edited", "yes");
        }
        let mut target = OdfPackage::new();
        target.set_media_type(Some(TEXT)).unwrap();
        target
            .insert_document(&mut source, "Object 1", "Charts/Chart 1")
            .unwrap();

        assert_eq!(
            target.document_paths(None, None).unwrap(),
            vec!["Charts/Chart 1/"]
        );
        assert_eq!(target.media_type_of("Charts/Chart 1/").unwrap(), Some(CHART));
        let copied =
            String::from_utf8(target.bytes("Charts/Chart 1/content.xml").unwrap().unwrap()).unwrap();
        assert!(copied.contains("edited=\"yes\""));
        assert_eq!(
            target.media_type_of("Charts/Chart 1/content.xml").unwrap(),
            Some("text/xml")
        );
    }

    #[test]
    fn test_insert_document_embeds_root_document() {
        let mut source = OdfPackage::load_bytes(sample_odt()).unwrap();
        let mut target = OdfPackage::new();
        target.insert_document(&mut source, "/", "Embedded").unwrap();

        assert_eq!(target.media_type_of("Embedded/").unwrap(), Some(TEXT));
        assert_eq!(target.bytes("Embedded/Pictures/logo.png").unwrap().unwrap(), b"\x89PNG");
        assert_eq!(
            target.media_type_of("Embedded/Object 1/").unwrap(),
            Some(CHART)
        );
        assert!(!target.contains("Embedded/META-INF/manifest.xml").unwrap());
        assert!(matches!(
            target.insert_document(&mut source, "/", "/"),
            Err(OdfError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_insert_document_keeps_encryption_metadata() {
        let mut source = OdfPackage::load_bytes(sample_odt()).unwrap();
        let encryption = crate::manifest::EncryptionData {
            checksum_type: Some("SHA1/1K".to_string()),
            checksum: Some("c2VjcmV0".to_string()),
            ..Default::default()
        };
        {
            let entry = source.manifest.get_mut("Object 1/content.xml").unwrap();
            entry.size = Some(8);
            entry.encryption = Some(encryption.clone());
        }
        let mut target = OdfPackage::new();
        target
            .insert_document(&mut source, "Object 1", "Object 5")
            .unwrap();

        let entry = target.file_entry("Object 5/content.xml").unwrap().unwrap();
        assert_eq!(entry.encryption.as_ref(), Some(&encryption));
        assert_eq!(entry.size, Some(8));
        assert_eq!(entry.media_type(), Some("text/xml"));
    }

    #[test]
    fn test_insert_document_rejects_plain_directory() {
        let mut source = OdfPackage::load_bytes(sample_odt()).unwrap();
        let mut target = OdfPackage::new();
        assert!(matches!(
            target.insert_document(&mut source, "Pictures", "Copied"),
            Err(OdfError::NotADocument(path)) if path == "Pictures/"
        ));
        assert!(target
            .file_entries()
            .unwrap()
            .iter()
            .all(|p| !p.starts_with("Copied")));

        let mut untyped = OdfPackage::new();
        untyped.insert_bytes(b"<a/>".to_vec(), "content.xml", None).unwrap();
        assert!(matches!(
            target.insert_document(&mut untyped, "/", "Copied"),
            Err(OdfError::NotADocument(_))
        ));
        assert!(!target.contains("Copied/content.xml").unwrap());
    }

    #[test]
    fn test_flush_trees_moves_trees_to_bytes() {
        let mut pkg = OdfPackage::load_bytes(sample_odt()).unwrap();
        pkg.document_tree("content.xml").unwrap();
        pkg.document_tree("Object 1/content.xml").unwrap();
        let flushed = pkg.flush_trees(Some("Object 1/")).unwrap();
        assert_eq!(flushed, vec!["Object 1/content.xml".to_string()]);
        let all = pkg.flush_trees(None).unwrap();
        assert_eq!(all, vec!["content.xml".to_string()]);
    }

    #[test]
    fn test_close_is_terminal() {
        let mut pkg = OdfPackage::load_bytes(sample_odt()).unwrap();
        pkg.close();
        pkg.close();
        assert!(pkg.is_closed());
        assert!(matches!(pkg.bytes("content.xml"), Err(OdfError::Closed)));
        assert!(matches!(pkg.media_type(), Err(OdfError::Closed)));
        assert!(matches!(
            pkg.insert_bytes(b"x".to_vec(), "a.txt", None),
            Err(OdfError::Closed)
        ));
        assert!(matches!(pkg.remove("a.txt"), Err(OdfError::Closed)));
    }
}
