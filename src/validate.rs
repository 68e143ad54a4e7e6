//! Package validation findings and sinks.
//!
//! Structural checks run while a package loads. Each failed check becomes a
//! [`ValidationFinding`] handed to the registered [`ValidationSink`]. With no
//! sink registered the checks are skipped entirely.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Severity level for a validation finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationSeverity {
    /// Suspicious or non-ideal structure that may reduce compatibility.
    Warning,
    /// Violates a required structural expectation.
    Error,
    /// The input could not be used at all.
    Fatal,
}

impl ValidationSeverity {
    /// Lowercase label used in text and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationSeverity::Warning => "warning",
            ValidationSeverity::Error => "error",
            ValidationSeverity::Fatal => "fatal",
        }
    }
}

/// Package-level constraint violated by a finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PackageConstraint {
    /// Input is not a ZIP archive.
    PackageIsNoZip,
    /// `META-INF/manifest.xml` is missing.
    ManifestNotInPackage,
    /// A file in the archive has no manifest entry.
    ManifestDoesNotListFile,
    /// A manifest entry names a file that is not in the archive.
    ManifestListsNonexistentFile,
    /// A typed directory entry has no archive content below it.
    ManifestListsDirectory,
    /// The `mimetype` entry is compressed.
    MimetypeIsCompressed,
    /// The `mimetype` entry carries an extra field.
    MimetypeHasExtraField,
    /// The `mimetype` entry is not the first entry of the archive.
    MimetypeNotFirstInPackage,
    /// The `mimetype` stream and the manifest root media type differ.
    MimetypeDiffersFromPackage,
    /// A `mimetype` stream exists but the manifest has no root media type.
    MimetypeWithoutManifestMediatype,
    /// There is no `mimetype` entry.
    MimetypeNotInPackage,
    /// A stream requested as a document tree is not well-formed XML.
    DocumentNotParsable,
}

impl PackageConstraint {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            PackageConstraint::PackageIsNoZip => "PACKAGE_IS_NO_ZIP",
            PackageConstraint::ManifestNotInPackage => "MANIFEST_NOT_IN_PACKAGE",
            PackageConstraint::ManifestDoesNotListFile => "MANIFEST_DOES_NOT_LIST_FILE",
            PackageConstraint::ManifestListsNonexistentFile => "MANIFEST_LISTS_NONEXISTENT_FILE",
            PackageConstraint::ManifestListsDirectory => "MANIFEST_LISTS_DIRECTORY",
            PackageConstraint::MimetypeIsCompressed => "MIMETYPE_IS_COMPRESSED",
            PackageConstraint::MimetypeHasExtraField => "MIMETYPE_HAS_EXTRA_FIELD",
            PackageConstraint::MimetypeNotFirstInPackage => "MIMETYPE_NOT_FIRST_IN_PACKAGE",
            PackageConstraint::MimetypeDiffersFromPackage => "MIMETYPE_DIFFERS_FROM_PACKAGE",
            PackageConstraint::MimetypeWithoutManifestMediatype => {
                "MIMETYPE_WITHOUT_MANIFEST_MEDIATYPE"
            }
            PackageConstraint::MimetypeNotInPackage => "MIMETYPE_NOT_IN_PACKAGE",
            PackageConstraint::DocumentNotParsable => "DOCUMENT_NOT_PARSABLE",
        }
    }

    /// Default severity of this constraint.
    pub fn severity(&self) -> ValidationSeverity {
        match self {
            PackageConstraint::PackageIsNoZip => ValidationSeverity::Fatal,
            PackageConstraint::ManifestListsDirectory
            | PackageConstraint::MimetypeNotInPackage => ValidationSeverity::Warning,
            _ => ValidationSeverity::Error,
        }
    }

    fn describe(&self, args: &[String]) -> String {
        let arg = |idx: usize| args.get(idx).map(String::as_str).unwrap_or("");
        match self {
            PackageConstraint::PackageIsNoZip => {
                "The package is not a ZIP file or contains no entries.".to_string()
            }
            PackageConstraint::ManifestNotInPackage => {
                "The package has no `META-INF/manifest.xml`.".to_string()
            }
            PackageConstraint::ManifestDoesNotListFile => {
                format!("The file '{}' is not listed in the manifest.", arg(0))
            }
            PackageConstraint::ManifestListsNonexistentFile => {
                format!("The manifest lists '{}', which is not in the package.", arg(0))
            }
            PackageConstraint::ManifestListsDirectory => format!(
                "The manifest lists directory '{}', which has no content in the package.",
                arg(0)
            ),
            PackageConstraint::MimetypeIsCompressed => {
                "The `mimetype` entry is compressed; it must be stored.".to_string()
            }
            PackageConstraint::MimetypeHasExtraField => {
                "The `mimetype` entry has an extra field.".to_string()
            }
            PackageConstraint::MimetypeNotFirstInPackage => {
                "The `mimetype` entry is not the first entry of the package.".to_string()
            }
            PackageConstraint::MimetypeDiffersFromPackage => format!(
                "The `mimetype` value '{}' differs from the manifest root media type '{}'.",
                arg(0),
                arg(1)
            ),
            PackageConstraint::MimetypeWithoutManifestMediatype => format!(
                "The `mimetype` value '{}' has no matching media type on the manifest root entry.",
                arg(0)
            ),
            PackageConstraint::MimetypeNotInPackage => {
                "The package has no `mimetype` entry.".to_string()
            }
            PackageConstraint::DocumentNotParsable => {
                format!("The stream '{}' could not be parsed: {}", arg(0), arg(1))
            }
        }
    }
}

impl fmt::Display for PackageConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One structural finding reported during load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationFinding {
    /// Violated constraint.
    pub constraint: PackageConstraint,
    /// Severity classification.
    pub severity: ValidationSeverity,
    /// Stable machine-readable code (`constraint.code()`).
    pub code: &'static str,
    /// Human-readable description.
    pub message: String,
    /// Base URI of the package being loaded, when known.
    pub base_uri: Option<String>,
    /// Package path related to this finding.
    pub path: Option<String>,
    /// Message arguments (paths, media types).
    pub args: Vec<String>,
}

impl ValidationFinding {
    /// Build a finding with the constraint's default severity.
    pub fn new(constraint: PackageConstraint, base_uri: Option<&str>, args: Vec<String>) -> Self {
        Self {
            constraint,
            severity: constraint.severity(),
            code: constraint.code(),
            message: constraint.describe(&args),
            base_uri: base_uri.map(str::to_string),
            path: None,
            args,
        }
    }

    fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.severity.as_str(), self.code)?;
        if let Some(uri) = &self.base_uri {
            write!(f, " {}", uri)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Receiver for validation findings.
pub trait ValidationSink: Send {
    /// Handle one finding. Findings are never fatal to the caller; fatal
    /// load failures are additionally returned as errors.
    fn report(&mut self, finding: &ValidationFinding);
}

/// Collecting sink with all reported findings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    findings: Vec<ValidationFinding>,
}

impl ValidationReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty report wrapped for sharing with a package.
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Return all collected findings.
    pub fn findings(&self) -> &[ValidationFinding] {
        &self.findings
    }

    /// Whether a finding with `code` was reported.
    pub fn contains_code(&self, code: &str) -> bool {
        self.findings.iter().any(|f| f.code == code)
    }

    /// Number of error (and fatal) findings.
    pub fn error_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity >= ValidationSeverity::Error)
            .count()
    }

    /// Number of warning findings.
    pub fn warning_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == ValidationSeverity::Warning)
            .count()
    }

    /// Returns `true` when no error-level findings were reported.
    pub fn is_valid(&self) -> bool {
        self.error_count() == 0
    }

    /// Drop all collected findings.
    pub fn clear(&mut self) {
        self.findings.clear();
    }
}

impl ValidationSink for ValidationReport {
    fn report(&mut self, finding: &ValidationFinding) {
        self.findings.push(finding.clone());
    }
}

impl<S: ValidationSink> ValidationSink for Arc<Mutex<S>> {
    fn report(&mut self, finding: &ValidationFinding) {
        match self.lock() {
            Ok(mut sink) => sink.report(finding),
            Err(poisoned) => poisoned.into_inner().report(finding),
        }
    }
}

/// Sink forwarding findings to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl ValidationSink for LogSink {
    fn report(&mut self, finding: &ValidationFinding) {
        match finding.severity {
            ValidationSeverity::Warning => log::warn!("[VALIDATE] {}", finding),
            ValidationSeverity::Error | ValidationSeverity::Fatal => {
                log::error!("[VALIDATE] {}", finding)
            }
        }
    }
}

/// Borrowed view of the optional sink plus the base URI, used by the loaders.
pub(crate) struct Reporter<'a> {
    sink: Option<&'a mut (dyn ValidationSink + 'static)>,
    base_uri: Option<&'a str>,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(
        sink: Option<&'a mut (dyn ValidationSink + 'static)>,
        base_uri: Option<&'a str>,
    ) -> Self {
        Self { sink, base_uri }
    }

    /// A reporter that drops everything; checks guarded by `is_active` are skipped.
    #[cfg(test)]
    pub(crate) fn silent() -> Self {
        Self {
            sink: None,
            base_uri: None,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    pub(crate) fn report(&mut self, constraint: PackageConstraint, args: &[&str]) {
        let Some(sink) = self.sink.as_deref_mut() else {
            return;
        };
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let mut finding = ValidationFinding::new(constraint, self.base_uri, args);
        if let Some(first) = finding.args.first().cloned() {
            if matches!(
                constraint,
                PackageConstraint::ManifestDoesNotListFile
                    | PackageConstraint::ManifestListsNonexistentFile
                    | PackageConstraint::ManifestListsDirectory
                    | PackageConstraint::DocumentNotParsable
            ) {
                finding = finding.with_path(first);
            }
        }
        if constraint.code().starts_with("MIMETYPE_") {
            finding = finding.with_path(crate::path::MIMETYPE_PATH);
        }
        sink.report(&finding);
    }
}
