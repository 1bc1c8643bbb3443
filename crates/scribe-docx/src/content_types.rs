//! `[Content_Types].xml` patching.
//!
//! Both helpers are insert-if-absent: existing declarations are never
//! rewritten, and a package without a content-types part is left alone (the
//! caller decides whether that is fatal).

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::openxml::{local_name, prefixed_tag};
use crate::package::{DocxError, DocxPackage, CONTENT_TYPES_PART};

/// Ensure a `<Default>` entry maps `ext` to `content_type`. Extension
/// matching is case-insensitive, mirroring how consumers resolve part types.
pub(crate) fn ensure_default(
    pkg: &mut DocxPackage,
    ext: &str,
    content_type: &str,
) -> Result<(), DocxError> {
    let ext = ext.trim().trim_start_matches('.');
    if ext.is_empty() {
        return Ok(());
    }
    let is_match = |e: &BytesStart<'_>| -> Result<bool, DocxError> {
        for attr in e.attributes().with_checks(false) {
            let attr = attr?;
            if local_name(attr.key.as_ref()).eq_ignore_ascii_case(b"Extension") {
                let existing = attr.unescape_value()?;
                if existing.trim().eq_ignore_ascii_case(ext) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    };
    let attrs = [("Extension", ext), ("ContentType", content_type)];
    insert_if_absent(pkg, "Default", &is_match, &attrs)
}

/// Ensure an `<Override>` entry declares `content_type` for `part_name`.
pub(crate) fn ensure_override(
    pkg: &mut DocxPackage,
    part_name: &str,
    content_type: &str,
) -> Result<(), DocxError> {
    let slashed = format!("/{}", part_name.trim_start_matches('/'));
    let is_match = |e: &BytesStart<'_>| -> Result<bool, DocxError> {
        for attr in e.attributes().with_checks(false) {
            let attr = attr?;
            if local_name(attr.key.as_ref()).eq_ignore_ascii_case(b"PartName") {
                let existing = attr.unescape_value()?;
                if existing.trim_start_matches('/') == slashed.trim_start_matches('/') {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    };
    let attrs = [("PartName", slashed.as_str()), ("ContentType", content_type)];
    insert_if_absent(pkg, "Override", &is_match, &attrs)
}

fn insert_if_absent(
    pkg: &mut DocxPackage,
    element: &str,
    is_match: &dyn Fn(&BytesStart<'_>) -> Result<bool, DocxError>,
    attrs: &[(&str, &str)],
) -> Result<(), DocxError> {
    let Some(ct_key) = pkg.find_part_key(CONTENT_TYPES_PART) else {
        return Ok(());
    };
    let Some(existing) = pkg.part(&ct_key).map(<[u8]>::to_vec) else {
        return Ok(());
    };

    let mut reader = Reader::from_reader(existing.as_slice());
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(existing.len() + 128));
    let mut buf = Vec::new();

    let mut found = false;
    let mut changed = false;

    let new_element = |sibling: &[u8], attrs: &[(&str, &str)]| {
        let mut el = BytesStart::new(prefixed_tag(sibling, element));
        for (key, value) in attrs {
            el.push_attribute((*key, *value));
        }
        el
    };

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e)
                if local_name(e.name().as_ref()).eq_ignore_ascii_case(element.as_bytes()) =>
            {
                found |= is_match(&e)?;
                writer.write_event(Event::Start(e.into_owned()))?;
            }
            Event::Empty(e)
                if local_name(e.name().as_ref()).eq_ignore_ascii_case(element.as_bytes()) =>
            {
                found |= is_match(&e)?;
                writer.write_event(Event::Empty(e.into_owned()))?;
            }
            Event::End(e) if local_name(e.name().as_ref()).eq_ignore_ascii_case(b"Types") => {
                if !found {
                    changed = true;
                    writer.write_event(Event::Empty(new_element(e.name().as_ref(), attrs)))?;
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()).eq_ignore_ascii_case(b"Types") => {
                // Degenerate self-closing `<Types/>` root: expand it so the
                // entry has somewhere to live.
                if !found {
                    changed = true;
                    let types_tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    writer.write_event(Event::Start(e.into_owned()))?;
                    writer.write_event(Event::Empty(new_element(types_tag.as_bytes(), attrs)))?;
                    writer.write_event(Event::End(BytesEnd::new(types_tag.as_str())))?;
                } else {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                }
            }
            Event::Eof => break,
            other => writer.write_event(other.into_owned())?,
        }
        buf.clear();
    }

    if changed {
        pkg.set_part(ct_key, writer.into_inner());
    }
    Ok(())
}
