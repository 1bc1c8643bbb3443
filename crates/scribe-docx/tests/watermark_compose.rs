use std::io::{Cursor, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pretty_assertions::assert_eq;
use zip::write::FileOptions;
use zip::ZipWriter;

use scribe_docx::{
    DocxPackage, CONTENT_TYPES_PART, DOCUMENT_PART, DOCUMENT_RELS_PART, HEADER_PART,
    HEADER_RELS_PART,
};

const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>body</w:t></w:r></w:p><w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/></w:sectPr></w:body></w:document>"#;

const DOCUMENT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

fn build_package(entries: &[(&str, &[u8])]) -> DocxPackage {
    let cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(cursor);
    let options = FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, bytes) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    let bytes = zip.finish().unwrap().into_inner();
    DocxPackage::from_bytes(&bytes).expect("read test package")
}

fn template_package() -> DocxPackage {
    build_package(&[
        (DOCUMENT_PART, DOCUMENT_XML.as_bytes()),
        (DOCUMENT_RELS_PART, DOCUMENT_RELS_XML.as_bytes()),
        (CONTENT_TYPES_PART, CONTENT_TYPES_XML.as_bytes()),
        ("word/styles.xml", b"<w:styles/>"),
    ])
}

fn one_by_one_png() -> Vec<u8> {
    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    png.extend_from_slice(&13u32.to_be_bytes());
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&1u32.to_be_bytes());
    png.extend_from_slice(&1u32.to_be_bytes());
    png.extend_from_slice(&[8, 6, 0, 0, 0]);
    png
}

fn png_data_uri() -> String {
    format!("data:image/png;base64,{}", BASE64.encode(one_by_one_png()))
}

fn part_string(pkg: &DocxPackage, name: &str) -> String {
    String::from_utf8(pkg.part(name).unwrap().to_vec()).unwrap()
}

#[test]
fn composing_adds_header_parts_and_wiring() {
    let mut pkg = template_package();
    assert!(pkg.apply_watermark(&png_data_uri()).unwrap());

    assert!(pkg.part(HEADER_PART).is_some());
    assert!(pkg.part(HEADER_RELS_PART).is_some());
    assert_eq!(pkg.part("word/media/watermark.png").unwrap(), one_by_one_png());

    let document = part_string(&pkg, DOCUMENT_PART);
    assert_eq!(document.matches("<w:headerReference").count(), 1);
    assert!(document.contains(r#"r:id="rId2""#));

    let rels = part_string(&pkg, DOCUMENT_RELS_PART);
    assert!(rels.contains(r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header_watermark.xml"/>"#));

    let content_types = part_string(&pkg, CONTENT_TYPES_PART);
    assert!(content_types.contains(r#"PartName="/word/header_watermark.xml""#));
    assert!(content_types.contains(r#"<Default Extension="png" ContentType="image/png"/>"#));

    let header_rels = part_string(&pkg, HEADER_RELS_PART);
    assert!(header_rels.contains(r#"Target="media/watermark.png""#));
}

#[test]
fn header_extent_scales_one_pixel_image_to_content_area() {
    let mut pkg = template_package();
    pkg.apply_watermark(&png_data_uri()).unwrap();

    // Content area: (12240 - 2880) x (15840 - 2880) twips = 9360 x 12960,
    // in EMU 5,943,600 x 8,229,600. A 1x1 px image (9525 EMU square) never
    // scales up, so the extent is 9525 * 0.85 = 8096 on both axes.
    let header = part_string(&pkg, HEADER_PART);
    assert!(header.contains(r#"<wp:extent cx="8096" cy="8096"/>"#));
}

#[test]
fn composing_twice_does_not_duplicate_wiring() {
    let mut pkg = template_package();
    pkg.apply_watermark(&png_data_uri()).unwrap();
    pkg.apply_watermark(&png_data_uri()).unwrap();

    let document = part_string(&pkg, DOCUMENT_PART);
    assert_eq!(document.matches("<w:headerReference").count(), 1);

    let rels = part_string(&pkg, DOCUMENT_RELS_PART);
    assert_eq!(rels.matches(r#"Target="header_watermark.xml""#).count(), 1);

    let content_types = part_string(&pkg, CONTENT_TYPES_PART);
    assert_eq!(
        content_types.matches(r#"PartName="/word/header_watermark.xml""#).count(),
        1
    );
    assert_eq!(content_types.matches(r#"Extension="png""#).count(), 1);
}

#[test]
fn malformed_watermark_input_leaves_package_untouched() {
    let baseline = template_package();

    for input in ["", "   ", "aGVsbG8=", "data:image/gif;base64,AAAA", "data:image/png;base64,@@"] {
        let mut pkg = baseline.clone();
        assert!(!pkg.apply_watermark(input).unwrap());
        assert_eq!(pkg, baseline);
    }
}

#[test]
fn missing_required_part_aborts_composition() {
    for missing in [DOCUMENT_PART, DOCUMENT_RELS_PART, CONTENT_TYPES_PART] {
        let entries: Vec<(&str, &[u8])> = [
            (DOCUMENT_PART, DOCUMENT_XML.as_bytes()),
            (DOCUMENT_RELS_PART, DOCUMENT_RELS_XML.as_bytes()),
            (CONTENT_TYPES_PART, CONTENT_TYPES_XML.as_bytes()),
        ]
        .into_iter()
        .filter(|(name, _)| *name != missing)
        .collect();

        let baseline = build_package(&entries);
        let mut pkg = baseline.clone();
        assert!(!pkg.apply_watermark(&png_data_uri()).unwrap());
        assert_eq!(pkg, baseline);
    }
}

#[test]
fn jpeg_watermark_registers_jpg_default_and_media_name() {
    // Baseline JPEG with an SOF0 frame header: height 100, width 200.
    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x11, 0x08];
    jpeg.extend_from_slice(&100u16.to_be_bytes());
    jpeg.extend_from_slice(&200u16.to_be_bytes());
    jpeg.extend_from_slice(&[0x03, 0x01, 0x22, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01]);
    let uri = format!("data:image/jpeg;base64,{}", BASE64.encode(&jpeg));

    let mut pkg = template_package();
    assert!(pkg.apply_watermark(&uri).unwrap());

    assert!(pkg.part("word/media/watermark.jpg").is_some());
    let content_types = part_string(&pkg, CONTENT_TYPES_PART);
    assert!(content_types.contains(r#"<Default Extension="jpg" ContentType="image/jpeg"/>"#));
}
