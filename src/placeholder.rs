//! Placeholder frame generation.
//!
//! A source with no live signal is represented by a deterministic synthetic
//! frame: a vertical gradient, the source label centered, and a "NO SIGNAL"
//! caption below it. Pure function of the label; safe to call concurrently
//! from any number of acquisition loops.

use ab_glyph::PxScale;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};

use crate::annotate::overlay_font;

pub const PLACEHOLDER_WIDTH: u32 = 320;
pub const PLACEHOLDER_HEIGHT: u32 = 240;

const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const CAPTION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL_SCALE: f32 = 20.0;
const CAPTION_SCALE: f32 = 14.0;
const CAPTION: &str = "NO SIGNAL";

/// Generate the placeholder frame for a source label.
pub fn placeholder_frame(label: &str) -> RgbImage {
    let mut image = RgbImage::new(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT);

    // Blue-tinted vertical gradient, darkest at the top.
    for y in 0..PLACEHOLDER_HEIGHT {
        let intensity = (30 + (y * 50) / PLACEHOLDER_HEIGHT) as u8;
        let row_color = Rgb([intensity / 3, intensity / 2, intensity]);
        for x in 0..PLACEHOLDER_WIDTH {
            image.put_pixel(x, y, row_color);
        }
    }

    if let Some(font) = overlay_font() {
        let label_scale = PxScale::from(LABEL_SCALE);
        let (label_w, label_h) = text_size(label_scale, font, label);
        let label_x = (PLACEHOLDER_WIDTH.saturating_sub(label_w) / 2) as i32;
        let label_y = (PLACEHOLDER_HEIGHT.saturating_sub(label_h) / 2) as i32;
        draw_text_mut(&mut image, LABEL_COLOR, label_x, label_y, label_scale, font, label);

        let caption_scale = PxScale::from(CAPTION_SCALE);
        let (caption_w, _) = text_size(caption_scale, font, CAPTION);
        let caption_x = (PLACEHOLDER_WIDTH.saturating_sub(caption_w) / 2) as i32;
        let caption_y = label_y + label_h as i32 + 10;
        draw_text_mut(
            &mut image,
            CAPTION_COLOR,
            caption_x,
            caption_y,
            caption_scale,
            font,
            CAPTION,
        );
    }

    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_has_fixed_dimensions() {
        let image = placeholder_frame("Camera 1");
        assert_eq!(image.dimensions(), (PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT));
    }

    #[test]
    fn placeholder_is_deterministic_per_label() {
        let a = placeholder_frame("Camera 7");
        let b = placeholder_frame("Camera 7");
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn gradient_darkens_toward_the_top() {
        let image = placeholder_frame("Camera 1");
        // Corner columns are outside any text; compare blue channel.
        let top = image.get_pixel(0, 0)[2];
        let bottom = image.get_pixel(0, PLACEHOLDER_HEIGHT - 1)[2];
        assert!(top < bottom, "expected gradient: top {} bottom {}", top, bottom);
        assert_eq!(top, 30);
    }

    #[test]
    fn gradient_rows_are_uniform() {
        let image = placeholder_frame("Camera 1");
        // Top rows carry no text at 320x240; every pixel in a row matches.
        let first = image.get_pixel(0, 5);
        for x in 0..PLACEHOLDER_WIDTH {
            assert_eq!(image.get_pixel(x, 5), first);
        }
    }
}
