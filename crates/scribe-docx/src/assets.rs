//! Image assets referenced by the converted body fragment.
//!
//! The body XML arrives from an external HTML transform and may reference
//! images either as `data:` URIs (decoded immediately) or as remote URLs
//! (fetched when the package is generated). Each reference becomes an
//! [`ImageAsset`] destined for `word/media/`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::openxml::local_name;
use crate::DocxError;

/// Where an asset's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    Inline(Vec<u8>),
    Remote(String),
}

/// One image destined for the package media folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub filename: String,
    pub source: AssetSource,
    pub extension: String,
}

impl ImageAsset {
    /// Materialize the asset bytes. Remote fetches are blocking and a
    /// failure is fatal for the whole generation; there are no retries.
    pub fn resolve_bytes(&self) -> Result<Vec<u8>, DocxError> {
        match &self.source {
            AssetSource::Inline(data) => Ok(data.clone()),
            AssetSource::Remote(url) => {
                let fetch = |url: &str| -> Result<Vec<u8>, reqwest::Error> {
                    let response = reqwest::blocking::get(url)?.error_for_status()?;
                    Ok(response.bytes()?.to_vec())
                };
                fetch(url).map_err(|err| DocxError::AssetFetch {
                    url: url.clone(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// MIME type registered for this asset's extension (`jpg` normalizes to
    /// `image/jpeg`).
    pub fn content_type(&self) -> String {
        if self.extension == "jpg" {
            "image/jpeg".to_string()
        } else {
            format!("image/{}", self.extension)
        }
    }
}

/// Scan a body fragment for `img` elements and build the asset list.
///
/// Elements without a usable `src` are skipped. A `data-filename` attribute
/// overrides the generated name for inline images; remote images are always
/// numbered to keep archive entries predictable.
pub fn collect_image_assets(body_xml: &str) -> Vec<ImageAsset> {
    let mut reader = Reader::from_reader(body_xml.as_bytes());
    reader.config_mut().trim_text(false);
    // The fragment is not necessarily a well-formed document; keep scanning
    // through tag-nesting mismatches.
    reader.config_mut().check_end_names = false;

    let mut assets = Vec::new();
    let mut buf = Vec::new();
    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(err) => {
                log::debug!("stopping asset scan on malformed body fragment: {err}");
                break;
            }
        };
        match event {
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"img" => {
                if let Some(asset) = asset_from_img(&e, assets.len() + 1) {
                    assets.push(asset);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    assets
}

fn asset_from_img(e: &BytesStart<'_>, index: usize) -> Option<ImageAsset> {
    let mut src = None;
    let mut provided_filename = None;
    for attr in e.attributes().with_checks(false) {
        let Ok(attr) = attr else { continue };
        match local_name(attr.key.as_ref()) {
            b"src" => src = attr.unescape_value().ok().map(|v| v.into_owned()),
            b"data-filename" => {
                provided_filename = attr.unescape_value().ok().map(|v| v.into_owned())
            }
            _ => {}
        }
    }

    let src = src.filter(|s| !s.trim().is_empty())?;
    let provided_filename = provided_filename.filter(|name| !name.trim().is_empty());

    if let Some((data, extension)) = parse_data_image(&src) {
        let filename = provided_filename
            .map(|name| sanitize_filename(&name))
            .unwrap_or_else(|| format!("image{index}.{extension}"));
        return Some(ImageAsset {
            filename,
            source: AssetSource::Inline(data),
            extension,
        });
    }

    // Remote (or relative) URL: derive the extension from the referenced
    // filename and fall back to png when nothing can be inferred.
    let inferred = provided_filename
        .unwrap_or_else(|| src.rsplit('/').next().unwrap_or_default().to_string());
    let extension = inferred
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "png".to_string());
    Some(ImageAsset {
        filename: sanitize_filename(&format!("image{index}.{extension}")),
        source: AssetSource::Remote(src),
        extension,
    })
}

/// Decode a `data:image/<type>;base64,<payload>` URI into payload bytes and
/// a media extension. Only PNG and JPEG payloads are accepted.
fn parse_data_image(src: &str) -> Option<(Vec<u8>, String)> {
    let rest = src.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    let extension = match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        _ => return None,
    };
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let data = BASE64.decode(compact.as_bytes()).ok()?;
    Some((data, extension.to_string()))
}

/// Replace characters that are invalid in ZIP entry names.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

/// Pick a media filename that does not collide with `existing`, suffixing
/// the stem with `_1`, `_2`, ... as needed.
pub(crate) fn unique_media_filename(
    existing: &std::collections::BTreeSet<String>,
    desired: &str,
) -> String {
    if !existing.contains(desired) {
        return desired.to_string();
    }
    let (stem, ext) = match desired.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (desired, None),
    };
    for n in 1u32.. {
        let candidate = match ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        if !existing.contains(&candidate) {
            return candidate;
        }
    }
    unreachable!("suffix space exhausted")
}
