//! Watermark composition: header part synthesis and package wiring.
//!
//! A watermark arrives as a `data:image/...;base64,...` URI and becomes a
//! behind-text drawing in a dedicated header part. Composition touches five
//! parts (document, document rels, header, header rels, media payload) plus
//! the content-types manifest; everything else is preserved byte-for-byte.
//! Malformed input degrades to a no-op so document generation never fails on
//! a bad watermark.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::content_types;
use crate::geometry::{watermark_extent_for_document, Extent};
use crate::image_probe::{probe_dimensions, ImageFormat};
use crate::openxml::{
    self, local_name, prefixed_tag, DOC_RELS_NS, DRAWINGML_NS, PACKAGE_RELS_NS, PICTURE_NS,
    REL_TYPE_HEADER, WORDML_NS, WP_DRAWING_NS,
};
use crate::package::{
    DocxError, DocxPackage, CONTENT_TYPES_PART, DOCUMENT_PART, DOCUMENT_RELS_PART,
};

/// Header part generated for the watermark drawing.
pub const HEADER_PART: &str = "word/header_watermark.xml";
/// Relationships part owned by the generated header.
pub const HEADER_RELS_PART: &str = "word/_rels/header_watermark.xml.rels";

/// Relationship ID of the watermark image inside the header part's own
/// relationship namespace. Header-local IDs never collide with
/// document-level ones, so a fixed value is safe.
const HEADER_IMAGE_REL_ID: &str = "rId1";

const HEADER_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml";

/// Image fill opacity: 80% via `a:alphaModFix`.
const WATERMARK_ALPHA_AMT: &str = "80000";

/// A decoded watermark image; lives for the duration of one composition.
#[derive(Debug, Clone)]
pub struct WatermarkImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    /// Media filename, e.g. `watermark.png`.
    pub filename: String,
    /// Pixel dimensions probed from the payload, when recognizable.
    pub dimensions: Option<(u32, u32)>,
}

/// Decode a watermark data URI (`data:image/<type>;base64,<payload>`, or the
/// generic `metadata,payload` form).
///
/// Returns `None` for anything unusable: empty input, missing metadata,
/// unsupported MIME type, or an undecodable payload.
pub fn decode_watermark_data_uri(data_uri: &str) -> Option<WatermarkImage> {
    let trimmed = data_uri.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Some((metadata, payload)) = trimmed.split_once(',') else {
        log::debug!("watermark data URI has no metadata prefix; skipping watermark");
        return None;
    };

    let mime_start = metadata.find("image/");
    let format = mime_start
        .map(|start| metadata[start..].split(';').next().unwrap_or(""))
        .and_then(ImageFormat::from_mime);
    let Some(format) = format else {
        log::debug!("unsupported watermark MIME type in {metadata:?}; skipping watermark");
        return None;
    };

    // Data URIs are frequently wrapped; strip whitespace before decoding.
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let data = match BASE64.decode(compact.as_bytes()) {
        Ok(data) => data,
        Err(err) => {
            log::debug!("undecodable watermark payload ({err}); skipping watermark");
            return None;
        }
    };

    let dimensions = probe_dimensions(&data, format);
    if dimensions.is_none() {
        log::debug!("could not probe watermark dimensions; sizing to content area");
    }

    Some(WatermarkImage {
        filename: format!("watermark.{}", format.media_extension()),
        data,
        format,
        dimensions,
    })
}

impl DocxPackage {
    /// Compose a watermark into the package.
    ///
    /// Returns `Ok(true)` when parts were rewritten. A malformed data URI or
    /// a missing required part (document, document rels, content types)
    /// leaves every part untouched and returns `Ok(false)`; a required part
    /// that exists but is not well-formed XML is a hard error.
    pub fn apply_watermark(&mut self, watermark_data_uri: &str) -> Result<bool, DocxError> {
        let Some(image) = decode_watermark_data_uri(watermark_data_uri) else {
            return Ok(false);
        };

        let Some(document_xml) = self.part(DOCUMENT_PART).map(<[u8]>::to_vec) else {
            log::warn!("cannot compose watermark: {DOCUMENT_PART} is missing");
            return Ok(false);
        };
        let Some(rels_xml) = self.part(DOCUMENT_RELS_PART).map(<[u8]>::to_vec) else {
            log::warn!("cannot compose watermark: {DOCUMENT_RELS_PART} is missing");
            return Ok(false);
        };
        if !self.has_part(CONTENT_TYPES_PART) {
            log::warn!("cannot compose watermark: {CONTENT_TYPES_PART} is missing");
            return Ok(false);
        }

        // Targets are relative to the parts that reference them: the header
        // is referenced from `word/document.xml`, the image from the header.
        let header_target = HEADER_PART.strip_prefix("word/").unwrap_or(HEADER_PART);
        let image_target = format!("media/{}", image.filename);
        let media_part = openxml::resolve_target(HEADER_PART, &image_target);

        let relationships = openxml::parse_relationships(&rels_xml)?;
        let existing_ids: Vec<String> =
            relationships.iter().map(|rel| rel.id.clone()).collect();
        let header_rel_id = openxml::allocate_relationship_id(&existing_ids);
        // Relationships already pointing at our header are stale leftovers
        // from an earlier composition; their references must go too.
        let stale_ids: Vec<String> = relationships
            .iter()
            .filter(|rel| rel.target == header_target)
            .map(|rel| rel.id.clone())
            .collect();

        let extent = watermark_extent_for_document(&document_xml, image.dimensions);

        // All rewrites are computed before any part is stored, so a
        // malformed part aborts with the package unmodified.
        let updated_rels =
            rewrite_document_relationships(&rels_xml, header_target, &header_rel_id)?;
        let updated_document =
            add_header_reference(&document_xml, &header_rel_id, &stale_ids)?;
        let header_xml = build_header_xml(HEADER_IMAGE_REL_ID, extent);
        let header_rels_xml = build_header_relationships_xml(HEADER_IMAGE_REL_ID, &image_target);

        self.set_part(DOCUMENT_PART, updated_document);
        self.set_part(DOCUMENT_RELS_PART, updated_rels);
        self.set_part(HEADER_PART, header_xml.into_bytes());
        self.set_part(HEADER_RELS_PART, header_rels_xml.into_bytes());
        self.set_part(media_part, image.data);

        content_types::ensure_override(self, HEADER_PART, HEADER_CONTENT_TYPE)?;
        content_types::ensure_default(
            self,
            image.format.media_extension(),
            image.format.content_type(),
        )?;

        Ok(true)
    }
}

/// Drop any relationship already targeting the watermark header, then append
/// a fresh header relationship under `header_rel_id`.
fn rewrite_document_relationships(
    rels_xml: &[u8],
    header_target: &str,
    header_rel_id: &str,
) -> Result<Vec<u8>, DocxError> {
    let mut reader = Reader::from_reader(rels_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(rels_xml.len() + 128));
    let mut buf = Vec::new();

    let mut skip_depth = 0usize;

    let targets_header = |e: &BytesStart<'_>| -> Result<bool, DocxError> {
        for attr in e.attributes().with_checks(false) {
            let attr = attr?;
            if local_name(attr.key.as_ref()).eq_ignore_ascii_case(b"Target") {
                return Ok(attr.unescape_value()?.as_ref() == header_target);
            }
        }
        Ok(false)
    };

    let header_relationship = |sibling: &[u8]| {
        let mut el = BytesStart::new(prefixed_tag(sibling, "Relationship"));
        el.push_attribute(("Id", header_rel_id));
        el.push_attribute(("Type", REL_TYPE_HEADER));
        el.push_attribute(("Target", header_target));
        el
    };

    loop {
        let ev = reader.read_event_into(&mut buf)?;
        if skip_depth > 0 {
            match ev {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => {
                    return Err(DocxError::Invalid(
                        "unexpected EOF inside relationship entry".to_string(),
                    ))
                }
                _ => {}
            }
            buf.clear();
            continue;
        }

        match ev {
            Event::Empty(e) if local_name(e.name().as_ref()) == b"Relationship" => {
                if !targets_header(&e)? {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                }
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"Relationship" => {
                if targets_header(&e)? {
                    skip_depth = 1;
                } else {
                    writer.write_event(Event::Start(e.into_owned()))?;
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"Relationships" => {
                writer.write_event(Event::Empty(header_relationship(e.name().as_ref())))?;
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"Relationships" => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(e.into_owned()))?;
                writer.write_event(Event::Empty(header_relationship(tag.as_bytes())))?;
                writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
            }
            Event::Eof => break,
            other => writer.write_event(other.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// Append a `default` header reference bound to `header_rel_id` to every
/// `w:sectPr`, dropping references left behind by earlier compositions. The
/// relationships namespace is declared on the document root when missing.
fn add_header_reference(
    document_xml: &[u8],
    header_rel_id: &str,
    stale_ids: &[String],
) -> Result<Vec<u8>, DocxError> {
    let mut reader = Reader::from_reader(document_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(document_xml.len() + 256));
    let mut buf = Vec::new();

    let mut rels_prefix: Option<String> = None;
    let mut saw_root = false;
    let mut in_sect_pr = false;
    let mut skip_depth = 0usize;

    let is_removed_reference = |e: &BytesStart<'_>| -> Result<bool, DocxError> {
        for attr in e.attributes().with_checks(false) {
            let attr = attr?;
            if local_name(attr.key.as_ref()) == b"id" {
                let id = attr.unescape_value()?;
                return Ok(id.as_ref() == header_rel_id
                    || stale_ids.iter().any(|stale| stale == id.as_ref()));
            }
        }
        Ok(false)
    };

    loop {
        let ev = reader.read_event_into(&mut buf)?;
        if skip_depth > 0 {
            match ev {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => {
                    return Err(DocxError::Invalid(
                        "unexpected EOF inside header reference".to_string(),
                    ))
                }
                _ => {}
            }
            buf.clear();
            continue;
        }

        match ev {
            Event::Start(e) if !saw_root => {
                saw_root = true;
                let mut existing_prefix = None;
                for attr in e.attributes().with_checks(false) {
                    let attr = attr?;
                    if attr.unescape_value()?.as_ref() == DOC_RELS_NS {
                        if let Some(prefix) = attr.key.as_ref().strip_prefix(b"xmlns:") {
                            existing_prefix =
                                Some(String::from_utf8_lossy(prefix).into_owned());
                        }
                    }
                }
                match existing_prefix {
                    Some(prefix) => {
                        rels_prefix = Some(prefix);
                        writer.write_event(Event::Start(e.into_owned()))?;
                    }
                    None => {
                        let mut root = e.into_owned();
                        root.push_attribute(("xmlns:r", DOC_RELS_NS));
                        rels_prefix = Some("r".to_string());
                        writer.write_event(Event::Start(root))?;
                    }
                }
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"sectPr" => {
                in_sect_pr = true;
                writer.write_event(Event::Start(e.into_owned()))?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"sectPr" => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(e.into_owned()))?;
                writer.write_event(Event::Empty(header_reference_element(
                    tag.as_bytes(),
                    rels_prefix.as_deref().unwrap_or("r"),
                    header_rel_id,
                )))?;
                writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"sectPr" => {
                if in_sect_pr {
                    writer.write_event(Event::Empty(header_reference_element(
                        e.name().as_ref(),
                        rels_prefix.as_deref().unwrap_or("r"),
                        header_rel_id,
                    )))?;
                }
                in_sect_pr = false;
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Empty(e)
                if in_sect_pr && local_name(e.name().as_ref()) == b"headerReference" =>
            {
                if !is_removed_reference(&e)? {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                }
            }
            Event::Start(e)
                if in_sect_pr && local_name(e.name().as_ref()) == b"headerReference" =>
            {
                if is_removed_reference(&e)? {
                    skip_depth = 1;
                } else {
                    writer.write_event(Event::Start(e.into_owned()))?;
                }
            }
            Event::Eof => break,
            other => writer.write_event(other.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn header_reference_element(
    sect_pr_tag: &[u8],
    rels_prefix: &str,
    header_rel_id: &str,
) -> BytesStart<'static> {
    let prefix = sect_pr_tag
        .iter()
        .rposition(|b| *b == b':')
        .map(|idx| String::from_utf8_lossy(&sect_pr_tag[..idx]).into_owned());
    let attr_name = |local: &str| match prefix.as_deref() {
        Some(p) => format!("{p}:{local}"),
        None => local.to_string(),
    };

    let mut el = BytesStart::new(prefixed_tag(sect_pr_tag, "headerReference"));
    el.push_attribute((attr_name("type").as_str(), "default"));
    el.push_attribute((format!("{rels_prefix}:id").as_str(), header_rel_id));
    el
}

/// Render the header part: one paragraph holding an anchored drawing pinned
/// behind document content, centered on the page, non-wrapping, with the
/// image fill at 80% opacity.
fn build_header_xml(image_rel_id: &str, extent: Extent) -> String {
    let Extent { cx, cy } = extent;
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:hdr xmlns:w="{WORDML_NS}" xmlns:r="{DOC_RELS_NS}" xmlns:wp="{WP_DRAWING_NS}" xmlns:a="{DRAWINGML_NS}" xmlns:pic="{PICTURE_NS}"><w:p><w:r><w:drawing><wp:anchor distT="0" distB="0" distL="0" distR="0" simplePos="0" relativeHeight="251658240" behindDoc="1" locked="0" layoutInCell="1" allowOverlap="1"><wp:simplePos x="0" y="0"/><wp:positionH relativeFrom="page"><wp:align>center</wp:align></wp:positionH><wp:positionV relativeFrom="page"><wp:align>center</wp:align></wp:positionV><wp:extent cx="{cx}" cy="{cy}"/><wp:effectExtent l="0" t="0" r="0" b="0"/><wp:wrapNone/><wp:docPr id="1" name="Watermark"/><wp:cNvGraphicFramePr><a:graphicFrameLocks noChangeAspect="1"/></wp:cNvGraphicFramePr><a:graphic><a:graphicData uri="{PICTURE_NS}"><pic:pic><pic:nvPicPr><pic:cNvPr id="0" name="Watermark"/><pic:cNvPicPr/></pic:nvPicPr><pic:blipFill><a:blip r:embed="{image_rel_id}"><a:alphaModFix amt="{WATERMARK_ALPHA_AMT}"/></a:blip><a:stretch><a:fillRect/></a:stretch></pic:blipFill><pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic></a:graphicData></a:graphic></wp:anchor></w:drawing></w:r></w:p></w:hdr>"#
    )
}

/// Render the header's own relationships part: a single image relationship
/// resolved relative to the header (the image lives in `word/media/`).
fn build_header_relationships_xml(image_rel_id: &str, image_target: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{PACKAGE_RELS_NS}"><Relationship Id="{image_rel_id}" Type="{image_type}" Target="{image_target}"/></Relationships>"#,
        image_type = openxml::REL_TYPE_IMAGE,
    )
}
