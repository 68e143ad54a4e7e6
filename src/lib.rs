//! mu-odf -- OpenDocument package engine
//!
//! Reads, edits, and rewrites ODF packages: ZIP archives holding XML content
//! streams, a `META-INF/manifest.xml` describing every entry, and optionally
//! embedded sub-documents stored in typed directories.
//!
//! ```no_run
//! use mu_odf::OdfPackage;
//!
//! let mut pkg = OdfPackage::load_file("report.odt")?;
//! let content = pkg.bytes("content.xml")?;
//! pkg.insert_bytes(b"hello".to_vec(), "notes/hello.txt", Some("text/plain"))?;
//! pkg.save_file("report-edited.odt")?;
//! # let _ = content;
//! # Ok::<(), mu_odf::OdfError>(())
//! ```
//!
//! # Features
//!
//! - `async` -- tokio-based file load/save helpers
//! - `cli` -- the `mu-odf` inspection binary
//!
//! # Memory Behavior
//!
//! The whole archive is buffered at load. Entries are decompressed lazily on
//! first access and cached per path; saving reads untouched entries straight
//! from the buffer without caching them.

#![warn(missing_docs)]
#![deny(clippy::large_enum_variant, clippy::large_stack_arrays, clippy::redundant_clone)]
#![warn(
    clippy::box_collection,
    clippy::needless_collect,
    clippy::map_clone,
    clippy::implicit_clone,
    clippy::inefficient_to_string
)]

pub mod cache;
pub mod error;
pub mod manifest;
pub mod media_type;
pub mod package;
pub mod path;
pub mod save;
pub mod validate;
pub mod xml;
pub mod zip;

#[cfg(feature = "async")]
pub mod async_api;

// Re-export key types for convenience
#[cfg(feature = "async")]
pub use async_api::{
    load_package_file_async, load_package_file_async_with, save_package_file_async,
};
pub use cache::{CachedContent, ContentCache};
pub use error::{OdfError, ZipError, ZipErrorKind};
pub use manifest::{
    Algorithm, EncryptionData, FileEntry, KeyDerivation, Manifest, StartKeyGeneration,
};
pub use package::{InsertWriter, OdfPackage, OdfPackageBuilder, PackageOptions, XML_MEDIA_TYPE};
pub use save::{PackageChunks, PackageReader};
pub use validate::{
    LogSink, PackageConstraint, ValidationFinding, ValidationReport, ValidationSeverity,
    ValidationSink,
};
pub use xml::{QuickXmlEngine, XmlDocument, XmlElement, XmlEngine, XmlNode};
pub use zip::ZipLimits;
