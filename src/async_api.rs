//! Optional async helpers for loading and saving package files.
//!
//! This module is available with the `async` feature. File I/O runs on
//! tokio; parsing and assembly stay synchronous over the buffered archive.

use std::path::Path;

use crate::error::OdfError;
use crate::package::{file_uri, io_error, OdfPackage, OdfPackageBuilder};
use crate::xml::XmlEngine;

/// Read a package file asynchronously and load it with default options.
pub async fn load_package_file_async<P: AsRef<Path>>(path: P) -> Result<OdfPackage, OdfError> {
    load_package_file_async_with(path, OdfPackageBuilder::new()).await
}

/// Read a package file asynchronously and load it through `builder`.
pub async fn load_package_file_async_with<P, X>(
    path: P,
    builder: OdfPackageBuilder<X>,
) -> Result<OdfPackage<X>, OdfError>
where
    P: AsRef<Path>,
    X: XmlEngine,
{
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| io_error(path, e))?;
    builder.default_base_uri(path).load_bytes(bytes)
}

/// Assemble `package` and write it to `path` asynchronously.
pub async fn save_package_file_async<P, X>(
    package: &mut OdfPackage<X>,
    path: P,
) -> Result<(), OdfError>
where
    P: AsRef<Path>,
    X: XmlEngine,
{
    let path = path.as_ref();
    let bytes = package.save_to_bytes()?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| io_error(path, e))?;
    if let Some(uri) = file_uri(path) {
        package.set_base_uri(Some(uri));
    }
    Ok(())
}
