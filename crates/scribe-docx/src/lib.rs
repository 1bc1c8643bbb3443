//! DOCX template patching and assembly.
//!
//! This crate rewrites targeted parts of an existing Word (OOXML) package
//! without building a full WordprocessingML object model. The API surface:
//!
//! - [`DocxPackage`]: low-level Open Packaging Convention (OPC) ZIP handling
//!   that inflates the package into memory (part name -> bytes). Untouched
//!   parts round-trip byte-for-byte; writing re-packs the ZIP container.
//! - [`PageMargins`] / [`DocxPackage::apply_page_margins`]: rewrite the
//!   `w:pgMar` node of every section to the requested centimeter margins.
//! - [`DocxPackage::apply_watermark`]: decode a data-URI image, size it
//!   against the page content area, and wire a behind-text header drawing
//!   into the package (header part, relationships, content types, media).
//! - [`DocxDocument`]: template-driven assembly that splices an
//!   externally-produced body fragment into `word/document.xml`, injects
//!   referenced image assets into `word/media/`, and then applies margin and
//!   watermark patches over the generated package.
//!
//! The module surface also contains focused helpers for OPC bookkeeping
//! (relationship parsing/allocation, `[Content_Types].xml` patching) and
//! binary image-header probing for PNG/JPEG payloads.

pub mod assets;
mod content_types;
mod document;
pub mod geometry;
pub mod image_probe;
pub mod margins;
pub mod openxml;
mod package;
pub mod units;
pub mod watermark;
mod zip_util;

pub use assets::{collect_image_assets, AssetSource, ImageAsset};
pub use document::DocxDocument;
pub use geometry::{plan_extent, ContentArea, Extent, PageMetrics};
pub use image_probe::{probe_dimensions, ImageFormat};
pub use margins::{patch_page_margins, PageMargins};
pub use package::{
    DocxError, DocxPackage, DocxPackageLimits, CONTENT_TYPES_PART, DOCUMENT_PART,
    DOCUMENT_RELS_PART, MAX_DOCX_PACKAGE_PART_BYTES, MAX_DOCX_PACKAGE_TOTAL_BYTES, MEDIA_DIR,
    NUMBERING_PART,
};
pub use watermark::{decode_watermark_data_uri, WatermarkImage, HEADER_PART, HEADER_RELS_PART};
