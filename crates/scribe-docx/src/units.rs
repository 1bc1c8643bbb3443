//! Conversions between the measurement systems Word mixes on a single page.
//!
//! Page layout (page size, margins) is expressed in twips (twentieths of a
//! point; 1440 per inch), DrawingML extents in EMU (English Metric Units;
//! 914,400 per inch), and bitmap dimensions in pixels at the 96 DPI Word
//! assumes for screen content.

/// Twips per centimeter (Word's page-layout unit).
pub const TWIPS_PER_CM: f64 = 567.0;

/// EMU per twip (914,400 EMU/inch over 1,440 twips/inch).
pub const EMU_PER_TWIP: i64 = 635;

/// EMU per inch.
pub const EMU_PER_INCH: i64 = 914_400;

/// EMU per pixel at 96 DPI.
pub const EMU_PER_PIXEL: i64 = 9_525;

pub fn cm_to_twips(cm: f64) -> i64 {
    (cm * TWIPS_PER_CM).round() as i64
}

pub fn twips_to_emu(twips: i64) -> i64 {
    twips * EMU_PER_TWIP
}

pub fn px_to_emu(px: u32) -> i64 {
    i64::from(px) * EMU_PER_PIXEL
}
