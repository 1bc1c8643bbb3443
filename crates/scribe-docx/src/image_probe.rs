//! Pixel-dimension probing for PNG/JPEG payloads.
//!
//! A decoding library is overkill here: watermark sizing only needs
//! `(width, height)`, which both formats expose near the front of the
//! compressed byte stream. Absence is an expected outcome (the caller falls
//! back to content-area sizing), so nothing in this module returns an error.

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Image formats supported for watermark payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Map a data-URI MIME type to a format. `image/jpg` is a common
    /// non-standard alias for `image/jpeg`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// File extension used for media entries. JPEG payloads are stored with
    /// the `.jpg` extension Word producers conventionally use.
    pub fn media_extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// Extract `(width, height)` in pixels from a raw image payload.
///
/// Returns `None` on any structural mismatch, including truncation.
pub fn probe_dimensions(bytes: &[u8], format: ImageFormat) -> Option<(u32, u32)> {
    match format {
        ImageFormat::Png => png_dimensions(bytes),
        ImageFormat::Jpeg => jpeg_dimensions(bytes),
    }
}

/// The 8-byte signature must be followed directly by an `IHDR` chunk of
/// length 13, whose first two fields are big-endian width and height.
fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let rest = bytes.strip_prefix(&PNG_SIGNATURE[..])?;
    let chunk_len = u32::from_be_bytes(rest.get(..4)?.try_into().ok()?);
    if rest.get(4..8)? != b"IHDR" || chunk_len != 13 {
        return None;
    }
    let width = u32::from_be_bytes(rest.get(8..12)?.try_into().ok()?);
    let height = u32::from_be_bytes(rest.get(12..16)?.try_into().ok()?);
    Some((width, height))
}

/// Walk JPEG marker segments until a Start-Of-Frame marker (`FFC0`-`FFC3`)
/// yields the frame dimensions. SOF stores height before width.
///
/// Every length field is checked against the remaining buffer; a truncated
/// or malformed stream yields `None`, never a panic.
fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let mut rest = bytes.strip_prefix(&[0xFF, 0xD8][..])?;
    loop {
        // Resynchronize on the next 0xFF, then skip fill bytes.
        while *rest.first()? != 0xFF {
            rest = &rest[1..];
        }
        while rest.get(1)? == &0xFF {
            rest = &rest[1..];
        }
        let code = *rest.get(1)?;
        rest = &rest[2..];
        match code {
            0xC0..=0xC3 => {
                // Segment length, precision byte, then height and width.
                let seg = rest.get(..7)?;
                if u16::from_be_bytes([seg[0], seg[1]]) < 7 {
                    return None;
                }
                let height = u16::from_be_bytes([seg[3], seg[4]]);
                let width = u16::from_be_bytes([seg[5], seg[6]]);
                return Some((u32::from(width), u32::from(height)));
            }
            // End-of-image / start-of-scan: no frame header was seen.
            0xD9 | 0xDA => return None,
            _ => {
                let len = usize::from(u16::from_be_bytes([*rest.first()?, *rest.get(1)?]));
                if len < 2 {
                    return None;
                }
                rest = rest.get(len..)?;
            }
        }
    }
}
