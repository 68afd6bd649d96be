//! Document container parsing: pull embedded raster images out of a `.docx`.
//!
//! A `.docx` file is a zip archive of XML parts. Pictures live under
//! `word/media/` and are attached to the main document through
//! `word/_rels/document.xml.rels`. Walking the relationships (rather than
//! listing `word/media/`) yields exactly the images the document body uses,
//! in the order the relationships were written.

use crate::error::ExtractError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{debug, warn};

const DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";
const DOCUMENT_DIR: &str = "word";

/// Reads raw image blobs out of a document on disk.
///
/// Implementations must return an empty list, not an error, for documents
/// that simply contain no images.
pub trait ImageExtractor: Send + Sync {
    fn extract_images(&self, path: &Path) -> Result<Vec<Vec<u8>>, ExtractError>;
}

/// [`ImageExtractor`] for Office Open XML word-processing documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocxImageExtractor;

impl DocxImageExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ImageExtractor for DocxImageExtractor {
    fn extract_images(&self, path: &Path) -> Result<Vec<Vec<u8>>, ExtractError> {
        let file = std::fs::File::open(path).map_err(|e| ExtractError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| ExtractError::NotAContainer {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        let images = extract_from_archive(&mut archive)?;
        debug!("Extracted {} images from {}", images.len(), path.display());
        Ok(images)
    }
}

/// An image relationship found in the document's relationship part.
#[derive(Debug, Clone, PartialEq)]
struct ImageRel {
    id: String,
    target: String,
}

fn extract_from_archive<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<Vec<u8>>, ExtractError> {
    let rels_xml = match read_part(archive, DOCUMENT_RELS) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => {
            // A body with no relationships cannot reference any picture.
            debug!("No {} part; treating document as image-free", DOCUMENT_RELS);
            return Ok(Vec::new());
        }
    };

    let rels = parse_image_relationships(&rels_xml)?;
    let mut images = Vec::with_capacity(rels.len());

    for rel in rels {
        let part = resolve_target(DOCUMENT_DIR, &rel.target);
        match read_part(archive, &part) {
            Ok(bytes) => images.push(bytes),
            Err(e) => warn!("Skipping image relationship {}: {}", rel.id, e),
        }
    }

    Ok(images)
}

fn read_part<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, ExtractError> {
    let mut entry = archive.by_name(name).map_err(|e| ExtractError::Part {
        part: name.to_string(),
        detail: e.to_string(),
    })?;

    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf).map_err(|e| ExtractError::Part {
        part: name.to_string(),
        detail: e.to_string(),
    })?;
    Ok(buf)
}

/// List internal image relationships in document order.
///
/// A relationship counts as an image when its type ends in `/image` or its
/// target path mentions "image" (some producers use custom types for
/// pictures). External links are never followed.
fn parse_image_relationships(xml: &str) -> Result<Vec<ImageRel>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut rels = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = String::new();
                let mut rel_type = String::new();
                let mut target = String::new();
                let mut external = false;

                for attr in e.attributes().flatten() {
                    let value = attr_value(&attr.value);
                    match attr.key.local_name().as_ref() {
                        b"Id" => id = value,
                        b"Type" => rel_type = value,
                        b"Target" => target = value,
                        b"TargetMode" => external = value.eq_ignore_ascii_case("External"),
                        _ => {}
                    }
                }

                let is_image = rel_type.ends_with("/image") || target.contains("image");
                if is_image && !external && !target.is_empty() {
                    rels.push(ImageRel { id, target });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Xml(e.to_string())),
            _ => {}
        }
    }

    Ok(rels)
}

fn attr_value(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    match quick_xml::escape::unescape(&text) {
        Ok(unescaped) => unescaped.into_owned(),
        Err(_) => text.into_owned(),
    }
}

/// Resolve a relationship target against the directory of its source part.
///
/// `media/image1.png` → `word/media/image1.png`,
/// `/word/media/image1.png` → `word/media/image1.png`,
/// `../media/image1.png` → `media/image1.png`.
fn resolve_target(base_dir: &str, target: &str) -> String {
    let (base, path) = match target.strip_prefix('/') {
        Some(absolute) => ("", absolute),
        None => (base_dir, target),
    };

    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
  <Relationship Id="rId5" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image2.png"/>
  <Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.jpeg"/>
  <Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="https://example.com/logo.png" TargetMode="External"/>
</Relationships>"#;

    fn build_zip(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in parts {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn relationships_keep_document_order_and_skip_external() {
        let rels = parse_image_relationships(RELS).unwrap();
        let targets: Vec<&str> = rels.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["media/image2.png", "media/image1.jpeg"]);
        assert_eq!(rels[0].id, "rId5");
    }

    #[test]
    fn resolve_relative_and_absolute_targets() {
        assert_eq!(resolve_target("word", "media/image1.png"), "word/media/image1.png");
        assert_eq!(resolve_target("word", "/word/media/a.png"), "word/media/a.png");
        assert_eq!(resolve_target("word", "../media/a.png"), "media/a.png");
        assert_eq!(resolve_target("word", "./media/./a.png"), "word/media/a.png");
    }

    #[test]
    fn archive_images_follow_relationship_order() {
        let bytes = build_zip(&[
            ("word/_rels/document.xml.rels", RELS),
            ("word/media/image1.jpeg", "first-in-media"),
            ("word/media/image2.png", "second-in-media"),
        ]);
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let images = extract_from_archive(&mut archive).unwrap();
        assert_eq!(images, vec![b"second-in-media".to_vec(), b"first-in-media".to_vec()]);
    }

    #[test]
    fn missing_media_part_is_skipped() {
        let bytes = build_zip(&[
            ("word/_rels/document.xml.rels", RELS),
            ("word/media/image2.png", "only-one"),
        ]);
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let images = extract_from_archive(&mut archive).unwrap();
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn document_without_relationships_has_no_images() {
        let bytes = build_zip(&[("word/document.xml", "<w:document/>")]);
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(extract_from_archive(&mut archive).unwrap().is_empty());
    }

    #[test]
    fn non_zip_file_is_not_a_container() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"plain text, not a zip").unwrap();
        let err = DocxImageExtractor::new().extract_images(tmp.path()).unwrap_err();
        assert!(matches!(err, ExtractError::NotAContainer { .. }));
    }
}
