//! Page-margin patching for `word/document.xml`.
//!
//! Every `w:sectPr` in the document is patched independently: the four side
//! margins are set unconditionally, while `header`/`footer`/`gutter` keep
//! any value already present and only fall back to the Word defaults when
//! absent. Everything outside the touched `w:pgMar` nodes round-trips
//! byte-for-byte.

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::openxml::{local_name, prefixed_tag};
use crate::package::{DocxError, DocxPackage, DOCUMENT_PART};
use crate::units::cm_to_twips;

pub const DEFAULT_HEADER_FOOTER_TWIPS: i64 = 708;
pub const DEFAULT_GUTTER_TWIPS: i64 = 0;

/// Requested page margins in centimeters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMargins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl PageMargins {
    pub fn new(top: f64, right: f64, bottom: f64, left: f64) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub fn uniform(cm: f64) -> Self {
        Self::new(cm, cm, cm, cm)
    }

    fn to_twips(self) -> MarginTwips {
        MarginTwips {
            top: cm_to_twips(self.top),
            right: cm_to_twips(self.right),
            bottom: cm_to_twips(self.bottom),
            left: cm_to_twips(self.left),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MarginTwips {
    top: i64,
    right: i64,
    bottom: i64,
    left: i64,
}

impl DocxPackage {
    /// Patch every section's page margins in `word/document.xml`.
    pub fn apply_page_margins(&mut self, margins: &PageMargins) -> Result<(), DocxError> {
        let document = self
            .part(DOCUMENT_PART)
            .ok_or_else(|| DocxError::MissingPart(DOCUMENT_PART.to_string()))?
            .to_vec();
        let patched = patch_page_margins(&document, margins)?;
        self.set_part(DOCUMENT_PART, patched);
        Ok(())
    }
}

/// Rewrite `document_xml` so every `w:sectPr` carries a `w:pgMar` with the
/// requested side margins, creating the node (with the section's namespace
/// prefix) when absent.
pub fn patch_page_margins(
    document_xml: &[u8],
    margins: &PageMargins,
) -> Result<Vec<u8>, DocxError> {
    let twips = margins.to_twips();

    let mut reader = Reader::from_reader(document_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(document_xml.len() + 128));
    let mut buf = Vec::new();

    // sectPr elements never nest, so one slot of state suffices.
    let mut saw_pg_mar = false;
    let mut in_sect_pr = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"sectPr" => {
                in_sect_pr = true;
                saw_pg_mar = false;
                writer.write_event(Event::Start(e.into_owned()))?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"sectPr" => {
                // `<w:sectPr/>` with no children: expand it around a fresh pgMar.
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let pg_mar_tag = prefixed_tag(e.name().as_ref(), "pgMar");
                writer.write_event(Event::Start(e.into_owned()))?;
                writer.write_event(Event::Empty(patched_pg_mar(&pg_mar_tag, None, twips)?))?;
                writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"sectPr" => {
                if in_sect_pr && !saw_pg_mar {
                    let pg_mar_tag = prefixed_tag(e.name().as_ref(), "pgMar");
                    writer.write_event(Event::Empty(patched_pg_mar(&pg_mar_tag, None, twips)?))?;
                }
                in_sect_pr = false;
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Empty(e) if in_sect_pr && local_name(e.name().as_ref()) == b"pgMar" => {
                saw_pg_mar = true;
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Empty(patched_pg_mar(&tag, Some(&e), twips)?))?;
            }
            Event::Start(e) if in_sect_pr && local_name(e.name().as_ref()) == b"pgMar" => {
                // Unusual but legal: a pgMar with children. Patch the start
                // tag and let the children and end tag stream through.
                saw_pg_mar = true;
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(patched_pg_mar(&tag, Some(&e), twips)?))?;
            }
            Event::Eof => break,
            other => writer.write_event(other.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// Render a pgMar element: side margins from `twips`, header/footer/gutter
/// preserved from `existing` or defaulted, any other attributes carried over
/// unchanged.
fn patched_pg_mar(
    tag: &str,
    existing: Option<&BytesStart<'_>>,
    twips: MarginTwips,
) -> Result<BytesStart<'static>, DocxError> {
    let prefix = tag.rsplit_once(':').map(|(p, _)| p);
    let attr_name = |local: &str| match prefix {
        Some(p) => format!("{p}:{local}"),
        None => local.to_string(),
    };

    let mut header: Option<(String, String)> = None;
    let mut footer: Option<(String, String)> = None;
    let mut gutter: Option<(String, String)> = None;
    let mut extras: Vec<(String, String)> = Vec::new();

    if let Some(e) = existing {
        for attr in e.attributes().with_checks(false) {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            match local_name(attr.key.as_ref()) {
                // Side margins are overwritten below.
                b"top" | b"right" | b"bottom" | b"left" => {}
                b"header" => header = Some((key, value)),
                b"footer" => footer = Some((key, value)),
                b"gutter" => gutter = Some((key, value)),
                _ => extras.push((key, value)),
            }
        }
    }

    let mut el = BytesStart::new(tag.to_string());
    el.push_attribute((attr_name("top").as_str(), twips.top.to_string().as_str()));
    el.push_attribute((attr_name("right").as_str(), twips.right.to_string().as_str()));
    el.push_attribute((attr_name("bottom").as_str(), twips.bottom.to_string().as_str()));
    el.push_attribute((attr_name("left").as_str(), twips.left.to_string().as_str()));

    match header {
        Some((key, value)) => el.push_attribute((key.as_str(), value.as_str())),
        None => el.push_attribute((
            attr_name("header").as_str(),
            DEFAULT_HEADER_FOOTER_TWIPS.to_string().as_str(),
        )),
    }
    match footer {
        Some((key, value)) => el.push_attribute((key.as_str(), value.as_str())),
        None => el.push_attribute((
            attr_name("footer").as_str(),
            DEFAULT_HEADER_FOOTER_TWIPS.to_string().as_str(),
        )),
    }
    match gutter {
        Some((key, value)) => el.push_attribute((key.as_str(), value.as_str())),
        None => el.push_attribute((
            attr_name("gutter").as_str(),
            DEFAULT_GUTTER_TWIPS.to_string().as_str(),
        )),
    }
    for (key, value) in extras {
        el.push_attribute((key.as_str(), value.as_str()));
    }

    Ok(el)
}
