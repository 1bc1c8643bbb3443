//! Watermark placement geometry.
//!
//! The watermark drawing is sized against the page *content area* (page size
//! minus margins) of the document being patched, preserving the image's
//! pixel aspect ratio when it is known.

use roxmltree::{Document, Node};

use crate::units::{px_to_emu, twips_to_emu};

/// Uniform shrink applied on top of fit-to-content scaling so the watermark
/// never touches the content edges.
pub const WATERMARK_MARGIN_SCALE: f64 = 0.85;

/// Extent used when the document's content area cannot be read at all
/// (roughly a 25 cm square).
pub const FALLBACK_EXTENT_EMU: i64 = 9_000_000;

/// Page size and margins in twips. Defaults to US Letter with one-inch
/// margins, the values Word assumes when a section omits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMetrics {
    pub width_twips: i64,
    pub height_twips: i64,
    pub left_margin_twips: i64,
    pub right_margin_twips: i64,
    pub top_margin_twips: i64,
    pub bottom_margin_twips: i64,
}

impl Default for PageMetrics {
    fn default() -> Self {
        Self {
            width_twips: 12_240,  // 8.5 in
            height_twips: 15_840, // 11 in
            left_margin_twips: 1_440,
            right_margin_twips: 1_440,
            top_margin_twips: 1_440,
            bottom_margin_twips: 1_440,
        }
    }
}

impl PageMetrics {
    /// Read `w:pgSz` / `w:pgMar` from a parsed document part, keeping the
    /// defaults for anything absent. The first occurrence wins; multi-section
    /// documents share one watermark size.
    pub fn from_document(doc: &Document) -> Self {
        let mut metrics = Self::default();

        if let Some(pg_sz) = first_element(doc, "pgSz") {
            if let Some(v) = attr_value(&pg_sz, "w") {
                metrics.width_twips = v;
            }
            if let Some(v) = attr_value(&pg_sz, "h") {
                metrics.height_twips = v;
            }
        }

        if let Some(pg_mar) = first_element(doc, "pgMar") {
            if let Some(v) = attr_value(&pg_mar, "left") {
                metrics.left_margin_twips = v;
            }
            if let Some(v) = attr_value(&pg_mar, "right") {
                metrics.right_margin_twips = v;
            }
            if let Some(v) = attr_value(&pg_mar, "top") {
                metrics.top_margin_twips = v;
            }
            if let Some(v) = attr_value(&pg_mar, "bottom") {
                metrics.bottom_margin_twips = v;
            }
        }

        metrics
    }

    /// The printable area between the margins, floored at one twip per axis
    /// so degenerate margin setups never produce a non-positive extent.
    pub fn content_area(&self) -> ContentArea {
        let width = (self.width_twips - self.left_margin_twips - self.right_margin_twips).max(1);
        let height = (self.height_twips - self.top_margin_twips - self.bottom_margin_twips).max(1);
        ContentArea {
            width_emu: twips_to_emu(width),
            height_emu: twips_to_emu(height),
        }
    }
}

fn first_element<'a, 'input>(
    doc: &'a Document<'input>,
    name: &str,
) -> Option<Node<'a, 'input>> {
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn attr_value(node: &Node, name: &str) -> Option<i64> {
    node.attributes()
        .find(|a| a.name() == name)
        .and_then(|a| a.value().trim().parse().ok())
}

/// Content-area dimensions in EMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentArea {
    pub width_emu: i64,
    pub height_emu: i64,
}

/// Final drawing size in EMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub cx: i64,
    pub cy: i64,
}

impl Extent {
    pub fn fallback() -> Self {
        Self {
            cx: FALLBACK_EXTENT_EMU,
            cy: FALLBACK_EXTENT_EMU,
        }
    }
}

/// Compute the watermark extent for a content area.
///
/// Known image dimensions scale uniformly to fit inside the area (never
/// enlarging), shrunk further by [`WATERMARK_MARGIN_SCALE`] and clamped per
/// axis. Unknown dimensions fill the whole content area.
pub fn plan_extent(area: ContentArea, image_px: Option<(u32, u32)>) -> Extent {
    let Some((width_px, height_px)) = image_px.filter(|(w, h)| *w > 0 && *h > 0) else {
        return Extent {
            cx: area.width_emu,
            cy: area.height_emu,
        };
    };

    let image_width = px_to_emu(width_px) as f64;
    let image_height = px_to_emu(height_px) as f64;
    let max_width = area.width_emu as f64;
    let max_height = area.height_emu as f64;

    let scale = (max_width / image_width)
        .min(max_height / image_height)
        .min(1.0)
        * WATERMARK_MARGIN_SCALE;

    Extent {
        cx: ((image_width * scale) as i64).max(1).min(area.width_emu),
        cy: ((image_height * scale) as i64).max(1).min(area.height_emu),
    }
}

/// Extent for a watermark placed into `document_xml`, falling back to a
/// fixed square when the part cannot be interrogated at all.
pub fn watermark_extent_for_document(
    document_xml: &[u8],
    image_px: Option<(u32, u32)>,
) -> Extent {
    let Ok(xml) = std::str::from_utf8(document_xml) else {
        return Extent::fallback();
    };
    let Ok(doc) = Document::parse(xml) else {
        return Extent::fallback();
    };
    plan_extent(PageMetrics::from_document(&doc).content_area(), image_px)
}
