//! Frame annotation overlays.
//!
//! Every frame surfaced to readers is stamped in place with a
//! second-granularity timestamp; connected frames additionally carry a
//! recording marker. Annotation never changes dimensions or channel layout.
//!
//! Text rendering needs a TrueType font. None is bundled: the overlay font
//! is resolved once from `CAMWALL_FONT` or a handful of common system
//! locations. Without one, text overlays are skipped (shape overlays such
//! as the recording disc still draw) and a single warning is logged.

use ab_glyph::{FontArc, PxScale};
use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_text_mut};
use std::sync::OnceLock;

use crate::Status;

const TIMESTAMP_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const REC_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TIMESTAMP_SCALE: f32 = 13.0;
const REC_SCALE: f32 = 11.0;
const REC_RADIUS: i32 = 5;

static OVERLAY_FONT: OnceLock<Option<FontArc>> = OnceLock::new();

const FONT_SEARCH_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Overlay font shared by the annotator and the placeholder generator.
pub(crate) fn overlay_font() -> Option<&'static FontArc> {
    OVERLAY_FONT
        .get_or_init(|| {
            let mut candidates: Vec<String> = Vec::new();
            if let Ok(path) = std::env::var("CAMWALL_FONT") {
                if !path.trim().is_empty() {
                    candidates.push(path);
                }
            }
            candidates.extend(FONT_SEARCH_PATHS.iter().map(|p| p.to_string()));
            for path in &candidates {
                if let Ok(bytes) = std::fs::read(path) {
                    match FontArc::try_from_vec(bytes) {
                        Ok(font) => {
                            log::debug!("overlay font loaded from {}", path);
                            return Some(font);
                        }
                        Err(err) => {
                            log::warn!("overlay font {} is not a valid font: {}", path, err)
                        }
                    }
                }
            }
            log::warn!(
                "no overlay font found (set CAMWALL_FONT); text overlays will be skipped"
            );
            None
        })
        .as_ref()
}

/// Stamp a frame in place with a timestamp and, when connected, a
/// recording marker.
///
/// The caller guarantees exclusive access to the image; in the engine this
/// holds because only the owning acquisition loop annotates its own frame
/// before publishing it.
pub fn annotate_frame(image: &mut RgbImage, status: Status, now: DateTime<Local>) {
    let (width, height) = image.dimensions();

    if let Some(font) = overlay_font() {
        let timestamp = now.format("%Y-%m-%d %H:%M:%S").to_string();
        let y = height.saturating_sub(14) as i32;
        draw_text_mut(
            image,
            TIMESTAMP_COLOR,
            5,
            y,
            PxScale::from(TIMESTAMP_SCALE),
            font,
            &timestamp,
        );
    }

    if status.is_connected() {
        let cx = width.saturating_sub(20) as i32;
        draw_filled_circle_mut(image, (cx, 20), REC_RADIUS, REC_COLOR);
        if let Some(font) = overlay_font() {
            let x = width.saturating_sub(55) as i32;
            draw_text_mut(image, REC_COLOR, x, 14, PxScale::from(REC_SCALE), font, "REC");
        }
    }
}
