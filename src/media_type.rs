//! Package and per-path media type resolution.
//!
//! The package media type comes from the `mimetype` stream when it is
//! present and non-empty, otherwise from the manifest root entry.

use crate::manifest::Manifest;
use crate::path;
use crate::validate::{PackageConstraint, Reporter};
use crate::zip::{ZipContainer, METHOD_STORED};

/// Default cap for reading the `mimetype` stream when no limits are set.
const DEFAULT_MAX_MIMETYPE_SIZE: usize = 4 * 1024;

/// Remove control characters so media types are safe to show in findings.
pub fn strip_control_chars(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).collect()
}

/// Determine the package media type and report mimetype findings.
pub(crate) fn resolve_package_media_type(
    zip: &ZipContainer,
    manifest: &Manifest,
    reporter: &mut Reporter<'_>,
) -> Option<String> {
    let manifest_media_type = manifest.root_media_type();

    let Some(entry) = zip.original(path::MIMETYPE_PATH) else {
        reporter.report(PackageConstraint::MimetypeNotInPackage, &[]);
        return manifest_media_type.map(str::to_string);
    };

    if reporter.is_active() {
        if entry.method != METHOD_STORED {
            reporter.report(PackageConstraint::MimetypeIsCompressed, &[]);
        }
        let local_extra = zip.local_extra_len(entry).unwrap_or(0);
        if entry.extra_len > 0 || local_extra > 0 {
            reporter.report(PackageConstraint::MimetypeHasExtraField, &[]);
        }
        if !zip.is_physically_first(entry) {
            reporter.report(PackageConstraint::MimetypeNotFirstInPackage, &[]);
        }
    }

    let max = zip
        .limits()
        .map(|l| l.max_mimetype_size)
        .unwrap_or(DEFAULT_MAX_MIMETYPE_SIZE);
    let stream_value = if entry.uncompressed_size as usize > max {
        log::warn!(
            "[PKG] mimetype entry is {} bytes, ignoring (max {})",
            entry.uncompressed_size,
            max
        );
        String::new()
    } else {
        match zip.read(entry) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
            Err(err) => {
                log::warn!("[PKG] mimetype entry unreadable: {}", err);
                String::new()
            }
        }
    };

    if stream_value.is_empty() {
        return manifest_media_type.map(str::to_string);
    }
    match manifest_media_type {
        Some(manifest_value) if manifest_value != stream_value => reporter.report(
            PackageConstraint::MimetypeDiffersFromPackage,
            &[
                &strip_control_chars(&stream_value),
                &strip_control_chars(manifest_value),
            ],
        ),
        Some(_) => {}
        None => reporter.report(
            PackageConstraint::MimetypeWithoutManifestMediatype,
            &[&strip_control_chars(&stream_value)],
        ),
    }
    Some(stream_value)
}

/// Media type of `path`: the package media type for the root, otherwise the
/// manifest entry for the file form, then the directory form.
pub(crate) fn media_type_of<'a>(
    manifest: &'a Manifest,
    package_media_type: Option<&'a str>,
    raw_path: &str,
) -> Option<&'a str> {
    if raw_path.is_empty() || raw_path == path::ROOT {
        return package_media_type;
    }
    let file_form = path::normalize(raw_path);
    if file_form == path::ROOT {
        return package_media_type;
    }
    manifest
        .get(&file_form)
        .and_then(|e| e.media_type())
        .or_else(|| {
            manifest
                .get(&path::normalize_directory(raw_path))
                .and_then(|e| e.media_type())
        })
}
