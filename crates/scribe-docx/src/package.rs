use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;

use thiserror::Error;

use crate::zip_util;

/// Main document part of a DOCX package.
pub const DOCUMENT_PART: &str = "word/document.xml";
/// Numbering definitions part.
pub const NUMBERING_PART: &str = "word/numbering.xml";
/// Relationships part of the main document.
pub const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
/// Package content-types manifest.
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
/// Folder holding embedded media payloads.
pub const MEDIA_DIR: &str = "word/media";

/// Maximum allowed *inflated* bytes for a single ZIP entry in a DOCX package.
///
/// This is a safety limit to prevent loading ZIP bombs into memory when a
/// caller materializes an entire package for patching/repacking.
pub const MAX_DOCX_PACKAGE_PART_BYTES: u64 = 256 * 1024 * 1024; // 256 MiB

/// Maximum allowed *inflated* bytes across all ZIP entries in a DOCX package.
pub const MAX_DOCX_PACKAGE_TOTAL_BYTES: u64 = 512 * 1024 * 1024; // 512 MiB

/// Size limits enforced by [`DocxPackage::from_bytes_limited`].
#[derive(Debug, Clone, Copy)]
pub struct DocxPackageLimits {
    /// Maximum allowed uncompressed bytes for any single part.
    pub max_part_bytes: u64,
    /// Maximum allowed uncompressed bytes across the whole package.
    pub max_total_bytes: u64,
}

impl Default for DocxPackageLimits {
    fn default() -> Self {
        Self {
            max_part_bytes: MAX_DOCX_PACKAGE_PART_BYTES,
            max_total_bytes: MAX_DOCX_PACKAGE_TOTAL_BYTES,
        }
    }
}

#[derive(Debug, Error)]
pub enum DocxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml error: {0}")]
    RoXml(#[from] roxmltree::Error),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("missing docx part: {0}")]
    MissingPart(String),
    #[error("invalid docx: {0}")]
    Invalid(String),
    #[error(
        "docx package part is too large to load safely: {part} is {size} bytes (max {max} bytes)"
    )]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("docx package is too large to load safely: {total} bytes uncompressed (max {max})")]
    PackageTooLarge { total: u64, max: u64 },
    #[error("failed to fetch image asset {url}: {reason}")]
    AssetFetch { url: String, reason: String },
}

/// In-memory representation of a DOCX package as a map of part name -> bytes.
///
/// The API is kept minimal on purpose: patches rewrite targeted parts and
/// every unrelated part round-trips byte-for-byte through [`write_to`].
///
/// [`write_to`]: DocxPackage::write_to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocxPackage {
    parts: BTreeMap<String, Vec<u8>>,
}

impl DocxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocxError> {
        Self::from_bytes_limited(bytes, DocxPackageLimits::default())
    }

    pub fn from_bytes_limited(bytes: &[u8], limits: DocxPackageLimits) -> Result<Self, DocxError> {
        let reader = Cursor::new(bytes);
        let mut zip = zip::ZipArchive::new(reader)?;

        let mut parts = BTreeMap::new();
        let mut budget = zip_util::ZipInflateBudget::new(limits.max_total_bytes);
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if !file.is_file() {
                continue;
            }

            let name = file.name().to_string();
            let buf =
                zip_util::read_zip_file_bytes(&mut file, &name, limits.max_part_bytes, &mut budget)?;
            parts.insert(name, buf);
        }

        Ok(Self { parts })
    }

    pub(crate) fn from_parts_map(parts: BTreeMap<String, Vec<u8>>) -> Self {
        Self { parts }
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.find_part_key(name)
            .and_then(|key| self.parts.get(&key))
            .map(Vec::as_slice)
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.find_part_key(name).is_some()
    }

    /// Resolve the stored key for a part name, tolerating a leading `/`,
    /// `\` separators, and ASCII case differences from non-canonical
    /// producers. Stored part names are intentionally never canonicalized so
    /// unknown parts round-trip untouched.
    pub(crate) fn find_part_key(&self, name: &str) -> Option<String> {
        if self.parts.contains_key(name) {
            return Some(name.to_string());
        }

        if let Some(stripped) = name.strip_prefix('/') {
            if self.parts.contains_key(stripped) {
                return Some(stripped.to_string());
            }
        } else {
            let with_slash = format!("/{name}");
            if self.parts.contains_key(with_slash.as_str()) {
                return Some(with_slash);
            }
        }

        self.parts
            .keys()
            .find(|key| zip_util::part_names_equivalent(key, name))
            .cloned()
    }

    pub fn parts(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.parts
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    pub fn parts_map(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.parts
    }

    pub fn parts_map_mut(&mut self) -> &mut BTreeMap<String, Vec<u8>> {
        &mut self.parts
    }

    /// Insert or replace a part. When an equivalent key already exists under
    /// a non-canonical spelling, that entry is updated in place instead of
    /// growing a duplicate.
    pub fn set_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        let key = self.find_part_key(&name).unwrap_or(name);
        self.parts.insert(key, bytes);
    }

    pub fn write_to_bytes(&self) -> Result<Vec<u8>, DocxError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), DocxError> {
        let cursor = Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(cursor);
        let options = zip::write::FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (name, bytes) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        let cursor = zip.finish()?;
        w.write_all(&cursor.into_inner())?;
        Ok(())
    }

    /// Write the package to `path` atomically: bytes are staged in a sibling
    /// temp file that is persisted over the target on success and removed on
    /// any failure.
    pub fn save_to_file(&self, path: &Path) -> Result<(), DocxError> {
        write_atomic(path, &self.write_to_bytes()?)
    }
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DocxError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|err| DocxError::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Cursor, Write};

    use pretty_assertions::assert_eq;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let cursor = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(cursor);
        let options =
            FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn roundtrip_preserves_part_payloads() {
        let bytes = build_zip(&[
            ("word/document.xml", b"<w:document/>".as_slice()),
            ("word/styles.xml", b"<w:styles/>".as_slice()),
        ]);
        let pkg = DocxPackage::from_bytes(&bytes).unwrap();
        let out = pkg.write_to_bytes().unwrap();
        let pkg2 = DocxPackage::from_bytes(&out).unwrap();
        assert_eq!(pkg.parts_map(), pkg2.parts_map());
    }

    #[test]
    fn part_lookup_tolerates_non_canonical_names() {
        let bytes = build_zip(&[("/Word\\Document.xml", b"payload".as_slice())]);
        let pkg = DocxPackage::from_bytes(&bytes).unwrap();
        assert_eq!(pkg.part("word/document.xml"), Some(b"payload".as_slice()));
    }

    #[test]
    fn set_part_updates_equivalent_key_in_place() {
        let bytes = build_zip(&[("/word/document.xml", b"old".as_slice())]);
        let mut pkg = DocxPackage::from_bytes(&bytes).unwrap();
        pkg.set_part(DOCUMENT_PART, b"new".to_vec());
        assert_eq!(pkg.parts_map().len(), 1);
        assert_eq!(pkg.part(DOCUMENT_PART), Some(b"new".as_slice()));
    }

    #[test]
    fn from_bytes_limited_rejects_oversized_part() {
        let bytes = build_zip(&[("word/document.xml", [0u8; 64].as_slice())]);
        let limits = DocxPackageLimits {
            max_part_bytes: 16,
            max_total_bytes: 1024,
        };
        let err = DocxPackage::from_bytes_limited(&bytes, limits).unwrap_err();
        assert!(matches!(err, DocxError::PartTooLarge { .. }));
    }

    #[test]
    fn save_to_file_writes_readable_package() {
        let bytes = build_zip(&[("word/document.xml", b"<w:document/>".as_slice())]);
        let pkg = DocxPackage::from_bytes(&bytes).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.docx");
        pkg.save_to_file(&path).unwrap();

        let reloaded = DocxPackage::from_bytes(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(pkg.parts_map(), reloaded.parts_map());
    }
}
