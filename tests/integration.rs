//! Integration tests for mu-odf
//!
//! Packages are built with the `zip` crate so that reading is checked
//! against an independent writer, and saved output is read back the same way.

use std::io::{Cursor, Read, Write};

use mu_odf::xml::XmlNode;
use mu_odf::{
    OdfError, OdfPackage, OdfPackageBuilder, ValidationReport, ValidationSeverity, XmlDocument,
    XmlElement,
};
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::{CompressionMethod, ZipArchive};

const TEXT: &str = "application/vnd.oasis.opendocument.text";
const CHART: &str = "application/vnd.oasis.opendocument.chart";

const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.3">
 <manifest:file-entry manifest:full-path="/" manifest:version="1.3" manifest:media-type="application/vnd.oasis.opendocument.text"/>
 <manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
 <manifest:file-entry manifest:full-path="styles.xml" manifest:media-type="text/xml"/>
 <manifest:file-entry manifest:full-path="Pictures/photo.jpg" manifest:media-type="image/jpeg"/>
 <manifest:file-entry manifest:full-path="Object 1/" manifest:media-type="application/vnd.oasis.opendocument.chart"/>
 <manifest:file-entry manifest:full-path="Object 1/content.xml" manifest:media-type="text/xml"/>
</manifest:manifest>
"#;

const CONTENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0"><office:body><office:text><text:p>Original paragraph</text:p></office:text></office:body></office:document-content>"#;

fn stored() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
}

fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn write_archive(entries: &[(&str, &[u8], SimpleFileOptions)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data, options) in entries {
        writer.start_file(*name, *options).expect("start_file failed");
        writer.write_all(data).expect("write failed");
    }
    writer.finish().expect("finish failed").into_inner()
}

fn sample_text_document() -> Vec<u8> {
    write_archive(&[
        ("mimetype", TEXT.as_bytes(), stored()),
        ("META-INF/manifest.xml", MANIFEST.as_bytes(), deflated()),
        ("content.xml", CONTENT.as_bytes(), deflated()),
        ("styles.xml", b"<office:document-styles/>", deflated()),
        ("Pictures/photo.jpg", b"\xff\xd8\xff\xe0fakejpeg", stored()),
        ("Object 1/content.xml", b"<chart:chart/>", deflated()),
    ])
}

fn sample_chart_document() -> Vec<u8> {
    let manifest = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0">
 <manifest:file-entry manifest:full-path="/" manifest:media-type="{CHART}"/>
 <manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
 <manifest:file-entry manifest:full-path="styles.xml" manifest:media-type="text/xml"/>
</manifest:manifest>"#
    );
    write_archive(&[
        ("mimetype", CHART.as_bytes(), stored()),
        ("META-INF/manifest.xml", manifest.as_bytes(), deflated()),
        ("content.xml", b"<chart:chart kind=\"bar\"/>", deflated()),
        ("styles.xml", b"<office:document-styles/>", deflated()),
    ])
}

fn archive_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("saved archive unreadable");
    (0..archive.len())
        .map(|i| archive.by_index(i).expect("entry").name().to_string())
        .collect()
}

fn read_archive_entry(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("saved archive unreadable");
    let mut file = archive
        .by_name(name)
        .unwrap_or_else(|_| panic!("missing entry {}", name));
    let mut out = Vec::new();
    file.read_to_end(&mut out).expect("read failed");
    out
}

// -- Loading ------------------------------------------------------------------

#[test]
fn test_load_reports_media_type_and_files() {
    let mut pkg = OdfPackage::load_bytes(sample_text_document()).unwrap();

    assert_eq!(pkg.media_type().unwrap(), Some(TEXT));
    assert!(pkg.contains("content.xml").unwrap());
    assert!(pkg.contains("./Pictures/photo.jpg").unwrap());
    assert!(pkg.contains("mimetype").unwrap());
    assert!(!pkg.contains("missing.xml").unwrap());

    let content = pkg.bytes("content.xml").unwrap().unwrap();
    assert_eq!(content, CONTENT.as_bytes());
    assert_eq!(pkg.bytes("mimetype").unwrap().unwrap(), TEXT.as_bytes());
    assert_eq!(pkg.media_type_of("Object 1").unwrap(), Some(CHART));
    assert_eq!(
        pkg.file_entry("/").unwrap().and_then(|e| e.version.as_deref()),
        Some("1.3")
    );
}

#[test]
fn test_load_from_file_sets_base_uri() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("letter.odt");
    std::fs::write(&path, sample_text_document()).unwrap();

    let pkg = OdfPackage::load_file(&path).unwrap();
    let base_uri = pkg.base_uri().expect("file load sets a base URI");
    assert!(base_uri.starts_with("file://"));
    assert!(base_uri.ends_with("letter.odt"));
}

#[test]
fn test_load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = OdfPackage::load_file(dir.path().join("absent.odt")).unwrap_err();
    assert!(matches!(err, OdfError::Io(_)));
}

#[test]
fn test_not_a_zip_is_reported_and_fails() {
    let report = ValidationReport::shared();
    let err = OdfPackageBuilder::new()
        .error_handler(report.clone())
        .load_bytes(b"just some text, not an archive".to_vec())
        .unwrap_err();

    assert_eq!(err, OdfError::NotAZipArchive);
    let report = report.lock().unwrap();
    assert!(report.contains_code("PACKAGE_IS_NO_ZIP"));
    assert!(!report.is_valid());
}

#[test]
fn test_input_stream_original_ignores_edits() {
    let mut pkg = OdfPackage::load_bytes(sample_text_document()).unwrap();
    pkg.insert_bytes(b"<replaced/>".to_vec(), "content.xml", Some("text/xml"))
        .unwrap();

    let mut current = String::new();
    pkg.input_stream("content.xml", false)
        .unwrap()
        .unwrap()
        .read_to_string(&mut current)
        .unwrap();
    assert_eq!(current, "<replaced/>");

    let mut original = String::new();
    pkg.input_stream("content.xml", true)
        .unwrap()
        .unwrap()
        .read_to_string(&mut original)
        .unwrap();
    assert_eq!(original, CONTENT);
}

// -- Saving -------------------------------------------------------------------

#[test]
fn test_saved_archive_is_readable_by_zip_crate() {
    let mut pkg = OdfPackage::load_bytes(sample_text_document()).unwrap();
    pkg.insert_bytes(b"plain notes".to_vec(), "notes/readme.txt", Some("text/plain"))
        .unwrap();
    let saved = pkg.save_to_bytes().unwrap();

    let mut archive = ZipArchive::new(Cursor::new(saved.as_slice())).unwrap();
    {
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
    }
    {
        let photo = archive.by_name("Pictures/photo.jpg").unwrap();
        assert_eq!(photo.compression(), CompressionMethod::Stored);
    }
    {
        let content = archive.by_name("content.xml").unwrap();
        assert_eq!(content.compression(), CompressionMethod::Deflated);
    }

    assert_eq!(read_archive_entry(&saved, "mimetype"), TEXT.as_bytes());
    assert_eq!(read_archive_entry(&saved, "notes/readme.txt"), b"plain notes");
    assert_eq!(read_archive_entry(&saved, "content.xml"), CONTENT.as_bytes());

    let manifest = String::from_utf8(read_archive_entry(&saved, "META-INF/manifest.xml")).unwrap();
    assert!(manifest.contains(r#"manifest:full-path="notes/readme.txt" manifest:media-type="text/plain""#));
    assert!(manifest.contains(r#"manifest:full-path="Object 1/" manifest:media-type="application/vnd.oasis.opendocument.chart""#));
    assert!(!manifest.contains(r#"manifest:full-path="notes/""#));
}

#[test]
fn test_save_orders_mimetype_then_manifest() {
    let mut pkg = OdfPackage::load_bytes(sample_text_document()).unwrap();
    let names = archive_names(&pkg.save_to_bytes().unwrap());
    assert_eq!(
        names[..3],
        [
            "mimetype".to_string(),
            "META-INF/".to_string(),
            "META-INF/manifest.xml".to_string()
        ]
    );
    assert!(names.contains(&"Object 1/".to_string()));
    assert!(names.contains(&"Object 1/content.xml".to_string()));
}

#[test]
fn test_save_and_reload_preserves_edits() {
    let mut pkg = OdfPackage::load_bytes(sample_text_document()).unwrap();
    pkg.insert_bytes(b"<office:document-meta/>".to_vec(), "meta.xml", Some("text/xml"))
        .unwrap();
    pkg.remove("Pictures/photo.jpg").unwrap();
    let saved = pkg.save_to_bytes().unwrap();

    let report = ValidationReport::shared();
    let mut reloaded = OdfPackageBuilder::new()
        .error_handler(report.clone())
        .load_bytes(saved)
        .unwrap();

    assert_eq!(reloaded.media_type().unwrap(), Some(TEXT));
    assert_eq!(
        reloaded.bytes("meta.xml").unwrap().unwrap(),
        b"<office:document-meta/>"
    );
    assert!(!reloaded.contains("Pictures/photo.jpg").unwrap());
    assert_eq!(reloaded.media_type_of("meta.xml").unwrap(), Some("text/xml"));

    let report = report.lock().unwrap();
    assert!(
        report.findings().is_empty(),
        "saved package should be clean: {:?}",
        report.findings()
    );
}

fn entry_media_types(pkg: &OdfPackage) -> Vec<(String, Option<String>)> {
    pkg.file_entries()
        .unwrap()
        .into_iter()
        .map(|p| {
            let media_type = pkg.media_type_of(&p).unwrap().map(str::to_string);
            (p, media_type)
        })
        .collect()
}

#[test]
fn test_unmodified_save_keeps_paths_and_media_types() {
    let mut listings = Vec::new();
    for with_sink in [false, true] {
        let report = ValidationReport::shared();
        let mut builder = OdfPackageBuilder::new();
        if with_sink {
            builder = builder.error_handler(report.clone());
        }
        let mut pkg = builder.load_bytes(sample_text_document()).unwrap();
        let before = entry_media_types(&pkg);
        let media_type = pkg.media_type().unwrap().map(str::to_string);
        assert!(before.iter().any(|(p, _)| p == "Object 1/"));

        let saved = pkg.save_to_bytes().unwrap();
        let reloaded = OdfPackage::load_bytes(saved).unwrap();
        assert_eq!(entry_media_types(&reloaded), before, "with_sink={}", with_sink);
        assert_eq!(
            reloaded.media_type().unwrap().map(str::to_string),
            media_type
        );
        listings.push(before);
    }
    assert_eq!(listings[0], listings[1]);
}

#[test]
fn test_save_file_over_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.odt");
    std::fs::write(&path, sample_text_document()).unwrap();

    let mut pkg = OdfPackage::load_file(&path).unwrap();
    pkg.insert_bytes(b"v2".to_vec(), "version.txt", Some("text/plain"))
        .unwrap();
    pkg.save_file(&path).unwrap();

    let mut reloaded = OdfPackage::load_file(&path).unwrap();
    assert_eq!(reloaded.bytes("version.txt").unwrap().unwrap(), b"v2");
    assert_eq!(reloaded.bytes("content.xml").unwrap().unwrap(), CONTENT.as_bytes());
}

#[test]
fn test_reader_streams_complete_archive() {
    let mut pkg = OdfPackage::load_bytes(sample_text_document()).unwrap();
    let mut streamed = Vec::new();
    let mut reader = pkg.reader().unwrap();
    let mut buf = [0u8; 7];
    loop {
        let n = reader.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        streamed.extend_from_slice(&buf[..n]);
    }

    assert_eq!(read_archive_entry(&streamed, "styles.xml"), b"<office:document-styles/>");
    assert_eq!(archive_names(&streamed)[0], "mimetype");
}

#[test]
fn test_new_package_round_trip() {
    let mut pkg = OdfPackage::new();
    pkg.set_media_type(Some(TEXT)).unwrap();
    let tree = XmlDocument::new(
        XmlElement::new("office:document-content")
            .with_attribute(
                "xmlns:office",
                "urn:oasis:names:tc:opendocument:xmlns:office:1.0",
            )
            .with_child(XmlElement::new("office:body")),
    );
    pkg.insert_tree(tree, "content.xml", None).unwrap();
    let saved = pkg.save_to_bytes().unwrap();

    let mut reloaded = OdfPackage::load_bytes(saved).unwrap();
    assert_eq!(reloaded.media_type().unwrap(), Some(TEXT));
    assert_eq!(reloaded.media_type_of("content.xml").unwrap(), Some("text/xml"));
    let tree = reloaded.document_tree("content.xml").unwrap().unwrap();
    assert_eq!(tree.root.name, "office:document-content");
    assert!(tree.root.find("office:body").is_some());
}

// -- Document trees -----------------------------------------------------------

#[test]
fn test_tree_edits_reach_saved_archive() {
    let mut pkg = OdfPackage::load_bytes(sample_text_document()).unwrap();
    {
        let tree = pkg.document_tree("content.xml").unwrap().unwrap();
        let paragraph = tree.root.find_mut("text:p").unwrap();
        paragraph.children = vec![XmlNode::Text("Edited & saved".to_string())];
    }
    let saved = pkg.save_to_bytes().unwrap();

    let content = String::from_utf8(read_archive_entry(&saved, "content.xml")).unwrap();
    assert!(content.contains("Edited &amp; saved"));
    assert!(!content.contains("Original paragraph"));

    let mut reloaded = OdfPackage::load_bytes(saved).unwrap();
    let tree = reloaded.document_tree("content.xml").unwrap().unwrap();
    assert_eq!(tree.root.find("text:p").unwrap().text(), "Edited & saved");
}

#[test]
fn test_bytes_reflect_open_tree() {
    let mut pkg = OdfPackage::load_bytes(sample_text_document()).unwrap();
    pkg.document_tree("content.xml")
        .unwrap()
        .unwrap()
        .root
        .set_attribute("office:version", "1.3");
    let bytes = String::from_utf8(pkg.bytes("content.xml").unwrap().unwrap()).unwrap();
    assert!(bytes.contains(r#"office:version="1.3""#));
}

// -- Embedded documents -------------------------------------------------------

#[test]
fn test_embed_document_then_save() {
    let mut host = OdfPackage::load_bytes(sample_text_document()).unwrap();
    let mut chart = OdfPackage::load_bytes(sample_chart_document()).unwrap();

    host.insert_document(&mut chart, "/", "Object 2").unwrap();
    let mut docs = host.document_paths(Some(CHART), None).unwrap();
    docs.sort();
    assert_eq!(docs, vec!["Object 1/".to_string(), "Object 2/".to_string()]);
    assert_eq!(
        host.bytes("Object 2/content.xml").unwrap().unwrap(),
        b"<chart:chart kind=\"bar\"/>"
    );
    assert!(!host.contains("Object 2/META-INF/manifest.xml").unwrap());
    assert!(!host.contains("Object 2/mimetype").unwrap());

    let saved = host.save_to_bytes().unwrap();
    let reloaded = OdfPackage::load_bytes(saved).unwrap();
    assert_eq!(reloaded.media_type_of("Object 2/").unwrap(), Some(CHART));
    assert_eq!(reloaded.media_type().unwrap(), Some(TEXT));
}

#[test]
fn test_copy_embedded_document_between_packages() {
    let mut source = OdfPackage::load_bytes(sample_text_document()).unwrap();
    let mut target = OdfPackage::new();
    target.set_media_type(Some(TEXT)).unwrap();

    target
        .insert_document(&mut source, "Object 1/", "Charts/First")
        .unwrap();
    assert_eq!(target.media_type_of("Charts/First/").unwrap(), Some(CHART));
    assert_eq!(
        target.bytes("Charts/First/content.xml").unwrap().unwrap(),
        b"<chart:chart/>"
    );
    assert_eq!(
        target.document_paths(None, Some("Charts")).unwrap(),
        vec!["Charts/First/".to_string()]
    );
}

#[test]
fn test_remove_root_keeps_embedded_documents() {
    let mut pkg = OdfPackage::load_bytes(sample_text_document()).unwrap();
    pkg.remove("/").unwrap();

    assert!(!pkg.contains("content.xml").unwrap());
    assert!(!pkg.contains("styles.xml").unwrap());
    assert!(pkg.contains("Object 1/content.xml").unwrap());
    assert_eq!(pkg.document_paths(None, None).unwrap(), vec!["Object 1/".to_string()]);
}

// -- Validation ---------------------------------------------------------------

#[test]
fn test_findings_for_malformed_mimetype_and_manifest() {
    let archive = write_archive(&[
        ("content.xml", CONTENT.as_bytes(), deflated()),
        ("mimetype", TEXT.as_bytes(), deflated()),
        ("META-INF/manifest.xml", MANIFEST.as_bytes(), deflated()),
        ("unlisted.txt", b"not in the manifest", deflated()),
    ]);
    let report = ValidationReport::shared();
    let mut pkg = OdfPackageBuilder::new()
        .base_uri("file:///tmp/broken.odt")
        .error_handler(report.clone())
        .load_bytes(archive)
        .unwrap();

    {
        let report = report.lock().unwrap();
        assert!(report.contains_code("MIMETYPE_IS_COMPRESSED"));
        assert!(report.contains_code("MIMETYPE_NOT_FIRST_IN_PACKAGE"));
        assert!(report.contains_code("MANIFEST_DOES_NOT_LIST_FILE"));
        assert!(report.contains_code("MANIFEST_LISTS_NONEXISTENT_FILE"));
        assert!(report
            .findings()
            .iter()
            .all(|f| f.base_uri.as_deref() == Some("file:///tmp/broken.odt")));
        assert!(report
            .findings()
            .iter()
            .any(|f| f.severity == ValidationSeverity::Error));
    }

    // The package stays usable.
    assert_eq!(pkg.media_type().unwrap(), Some(TEXT));
    assert_eq!(pkg.bytes("unlisted.txt").unwrap().unwrap(), b"not in the manifest");
    assert!(!pkg.contains("Pictures/photo.jpg").unwrap());
}

#[test]
fn test_closed_package_rejects_operations() {
    let mut pkg = OdfPackage::load_bytes(sample_text_document()).unwrap();
    pkg.close();
    assert!(pkg.is_closed());
    assert_eq!(pkg.bytes("content.xml").unwrap_err(), OdfError::Closed);
    assert_eq!(pkg.save_to_bytes().unwrap_err(), OdfError::Closed);
    assert_eq!(
        pkg.insert_bytes(b"x".to_vec(), "x.txt", None).unwrap_err(),
        OdfError::Closed
    );
}
