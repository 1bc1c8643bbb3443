//! Template-driven document assembly.
//!
//! A [`DocxDocument`] starts from a template package and accumulates the
//! pieces produced by external pipelines: a body fragment for
//! `word/document.xml`, wholesale replacements for the numbering and
//! relationship parts, plus optional margin and watermark requests. The
//! template bytes are never mutated; every call to [`generate`] works on a
//! fresh in-memory copy.
//!
//! [`generate`]: DocxDocument::generate

use std::collections::BTreeSet;
use std::path::Path;

use crate::assets::{collect_image_assets, unique_media_filename, ImageAsset};
use crate::content_types;
use crate::margins::PageMargins;
use crate::package::{
    DocxError, DocxPackage, DOCUMENT_PART, DOCUMENT_RELS_PART, MEDIA_DIR, NUMBERING_PART,
};

#[derive(Debug, Clone, Default)]
pub struct DocxDocument {
    template: Vec<u8>,
    body_fragment: Option<String>,
    numbering_xml: Option<String>,
    document_rels_xml: Option<String>,
    assets: Vec<ImageAsset>,
    margins: Option<PageMargins>,
    watermark: Option<String>,
}

impl DocxDocument {
    /// Start from the raw bytes of a template `.docx` archive.
    pub fn from_template_bytes(template: Vec<u8>) -> Self {
        Self {
            template,
            ..Self::default()
        }
    }

    /// Set the body fragment to splice into the template's document part and
    /// collect the image assets it references.
    pub fn set_body_fragment(&mut self, fragment: impl Into<String>) {
        let fragment = fragment.into();
        self.assets = collect_image_assets(&fragment);
        self.body_fragment = Some(fragment);
    }

    /// Replace `word/numbering.xml` wholesale.
    pub fn set_numbering_xml(&mut self, xml: impl Into<String>) {
        self.numbering_xml = Some(xml.into());
    }

    /// Replace `word/_rels/document.xml.rels` wholesale.
    pub fn set_document_relationships_xml(&mut self, xml: impl Into<String>) {
        self.document_rels_xml = Some(xml.into());
    }

    pub fn set_margins(&mut self, margins: PageMargins) {
        self.margins = Some(margins);
    }

    /// Request a watermark from a `data:image/...;base64,...` URI.
    pub fn set_watermark(&mut self, data_uri: impl Into<String>) {
        self.watermark = Some(data_uri.into());
    }

    pub fn image_assets(&self) -> &[ImageAsset] {
        &self.assets
    }

    /// Produce the final archive bytes.
    ///
    /// Replacements and media are applied first, then the margin patch, then
    /// watermark composition, all over one in-memory working copy.
    pub fn generate(&self) -> Result<Vec<u8>, DocxError> {
        let mut pkg = DocxPackage::from_bytes(&self.template)?;

        if let Some(fragment) = &self.body_fragment {
            let document = pkg
                .part(DOCUMENT_PART)
                .ok_or_else(|| DocxError::MissingPart(DOCUMENT_PART.to_string()))?;
            let spliced = splice_body(document, fragment)?;
            pkg.set_part(DOCUMENT_PART, spliced);
        }
        if let Some(numbering) = &self.numbering_xml {
            pkg.set_part(NUMBERING_PART, numbering.clone().into_bytes());
        }
        if let Some(rels) = &self.document_rels_xml {
            pkg.set_part(DOCUMENT_RELS_PART, rels.clone().into_bytes());
        }

        self.inject_assets(&mut pkg)?;

        if let Some(margins) = &self.margins {
            pkg.apply_page_margins(margins)?;
        }
        if let Some(watermark) = &self.watermark {
            pkg.apply_watermark(watermark)?;
        }

        pkg.write_to_bytes()
    }

    /// Generate and write the archive to `path` atomically.
    pub fn save_to_file(&self, path: &Path) -> Result<(), DocxError> {
        crate::package::write_atomic(path, &self.generate()?)
    }

    /// Stream collected assets into `word/media/` under collision-free names
    /// and register their content types.
    fn inject_assets(&self, pkg: &mut DocxPackage) -> Result<(), DocxError> {
        if self.assets.is_empty() {
            return Ok(());
        }

        let media_prefix = format!("{MEDIA_DIR}/");
        let mut taken: BTreeSet<String> = pkg
            .part_names()
            .filter_map(|name| name.strip_prefix(media_prefix.as_str()))
            .map(str::to_string)
            .collect();

        for asset in &self.assets {
            let bytes = asset.resolve_bytes()?;
            let filename = unique_media_filename(&taken, &asset.filename);
            taken.insert(filename.clone());
            pkg.set_part(format!("{media_prefix}{filename}"), bytes);
            content_types::ensure_default(pkg, &asset.extension, &asset.content_type())?;
        }
        Ok(())
    }
}

/// Insert `fragment` between the `<w:body>` open anchor and the first
/// `<w:sectPr` anchor, replacing whatever body content the template carried.
fn splice_body(document_xml: &[u8], fragment: &str) -> Result<Vec<u8>, DocxError> {
    let xml = std::str::from_utf8(document_xml)
        .map_err(|e| DocxError::Invalid(format!("document part is not UTF-8: {e}")))?;

    let body_open = xml
        .find("<w:body>")
        .ok_or_else(|| DocxError::Invalid("document part has no <w:body> anchor".to_string()))?;
    let splice_start = body_open + "<w:body>".len();
    let splice_end = xml[splice_start..]
        .find("<w:sectPr")
        .map(|offset| splice_start + offset)
        .ok_or_else(|| DocxError::Invalid("document part has no <w:sectPr anchor".to_string()))?;

    let mut out = String::with_capacity(xml.len() + fragment.len());
    out.push_str(&xml[..splice_start]);
    out.push_str(fragment);
    out.push_str(&xml[splice_end..]);
    Ok(out.into_bytes())
}
