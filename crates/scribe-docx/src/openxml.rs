//! Shared OPC/WordprocessingML plumbing: namespace URIs, relationship
//! parsing and ID allocation, and part-name resolution.

use roxmltree::Document;

use crate::DocxError;

pub const WORDML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const DOC_RELS_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const PACKAGE_RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const WP_DRAWING_NS: &str =
    "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
pub const DRAWINGML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub const PICTURE_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

pub const REL_TYPE_HEADER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
pub const REL_TYPE_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
    pub target_mode: Option<String>,
}

/// Parse the `Relationship` entries of a `.rels` part.
///
/// Entries missing an `Id` or `Target` are skipped rather than rejected;
/// the registry is only consulted for ID allocation and target lookups.
pub fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, DocxError> {
    let xml = std::str::from_utf8(xml)
        .map_err(|e| DocxError::Invalid(format!("relationships part is not UTF-8: {e}")))?;
    let doc = Document::parse(xml)?;

    let mut rels = Vec::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        if node.tag_name().name() != "Relationship" {
            continue;
        }
        let Some(id) = node.attribute("Id") else {
            continue;
        };
        let Some(target) = node.attribute("Target") else {
            continue;
        };
        rels.push(Relationship {
            id: id.to_string(),
            type_uri: node.attribute("Type").unwrap_or_default().to_string(),
            target: target.to_string(),
            target_mode: node.attribute("TargetMode").map(str::to_string),
        });
    }

    Ok(rels)
}

/// Produce a relationship ID disjoint from `existing`.
///
/// The numeric suffixes of `rId<N>`-shaped entries drive the choice: the
/// result is one past the largest parsed suffix (non-numeric suffixes are
/// ignored), with a linear probe as a backstop for sparse or odd ID sets.
/// Deterministic for a given input.
pub fn allocate_relationship_id(existing: &[String]) -> String {
    let mut next = existing
        .iter()
        .filter_map(|id| id.strip_prefix("rId"))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
        .saturating_add(1);

    loop {
        let candidate = format!("rId{next}");
        if !existing.iter().any(|id| *id == candidate) {
            return candidate;
        }
        next += 1;
    }
}

/// Name of the `.rels` part describing `part_name`.
pub fn rels_part_name(part_name: &str) -> String {
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

/// Resolve a relationship target against its source part.
///
/// Targets are URIs: they may be relative to the source part's folder,
/// absolute (rooted at the package), and may carry a fragment, which OPC
/// part names never do.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or(target);
    if target.is_empty() {
        // A target of just `#fragment` refers to the source part itself.
        return normalize(source_part);
    }
    if let Some(absolute) = target.strip_prefix('/') {
        return normalize(absolute);
    }

    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize(&format!("{base_dir}/{target}"))
}

fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}

pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

pub(crate) fn tag_prefix(name: &[u8]) -> Option<String> {
    name.iter()
        .rposition(|b| *b == b':')
        .map(|idx| String::from_utf8_lossy(&name[..idx]).into_owned())
}

/// Build a tag name carrying the same namespace prefix as `sibling`.
pub(crate) fn prefixed_tag(sibling: &[u8], local: &str) -> String {
    match tag_prefix(sibling) {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn parse_relationships_reads_entries() {
        let rels = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
</Relationships>"#;

        let parsed = parse_relationships(rels).expect("parse relationships");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].id, "rId1");
        assert_eq!(parsed[0].target, "styles.xml");
        assert_eq!(parsed[1].target_mode.as_deref(), Some("External"));
    }

    #[test]
    fn allocate_skips_past_largest_numeric_suffix() {
        let existing = vec!["rId1".to_string(), "rId3".to_string()];
        assert_eq!(allocate_relationship_id(&existing), "rId4");
    }

    #[test]
    fn allocate_ignores_non_numeric_suffixes() {
        let existing = vec!["rId1".to_string(), "rId2".to_string(), "rIdX".to_string()];
        assert_eq!(allocate_relationship_id(&existing), "rId3");
    }

    #[test]
    fn allocate_starts_at_one_for_empty_registry() {
        assert_eq!(allocate_relationship_id(&[]), "rId1");
    }

    #[test]
    fn rels_part_name_handles_root_and_nested_parts() {
        assert_eq!(rels_part_name("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(
            rels_part_name("word/header_watermark.xml"),
            "word/_rels/header_watermark.xml.rels"
        );
        assert_eq!(rels_part_name("document.xml"), "_rels/document.xml.rels");
    }

    #[test]
    fn resolve_target_relative_to_source_dir() {
        assert_eq!(
            resolve_target("word/header_watermark.xml", "media/watermark.png"),
            "word/media/watermark.png"
        );
        assert_eq!(
            resolve_target("word/document.xml", "../docProps/core.xml"),
            "docProps/core.xml"
        );
    }

    #[test]
    fn resolve_target_handles_absolute_and_fragment_forms() {
        assert_eq!(
            resolve_target("word/document.xml", "/word/media/image1.png#frag"),
            "word/media/image1.png"
        );
        assert_eq!(resolve_target("word/document.xml", "#rId1"), "word/document.xml");
    }

    proptest! {
        #[test]
        fn allocated_id_is_fresh_and_well_formed(
            ids in proptest::collection::vec("rId[0-9]{1,4}|rId[a-zA-Z]{1,3}|[a-zA-Z]{1,8}", 0..16)
        ) {
            let allocated = allocate_relationship_id(&ids);
            prop_assert!(!ids.contains(&allocated));
            prop_assert!(allocated.strip_prefix("rId").unwrap().parse::<u64>().is_ok());
        }
    }
}
