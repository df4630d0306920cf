//! Token images.
//!
//! Renders the token as white text centered on a black 1024x768 canvas and
//! encodes it as PNG and JPEG, so image fetches through an SSRF still leak
//! the token visibly.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageError, Rgb, RgbImage};

const WIDTH: u32 = 1024;
const HEIGHT: u32 = 768;

/// Glyphs are 8x8 bitmaps drawn at this multiple.
const SCALE: u32 = 2;
const GLYPH_SIZE: u32 = 8;
const JPEG_QUALITY: u8 = 80;

const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const FOREGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Encoded images of a token.
#[derive(Debug, Clone)]
pub struct TokenImages {
    pub png: Vec<u8>,
    pub jpeg: Vec<u8>,
}

pub fn render(token: &str) -> Result<TokenImages, ImageError> {
    let canvas = draw_centered(token);

    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(canvas.as_raw(), WIDTH, HEIGHT, ExtendedColorType::Rgb8)?;

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).write_image(
        canvas.as_raw(),
        WIDTH,
        HEIGHT,
        ExtendedColorType::Rgb8,
    )?;

    Ok(TokenImages { png, jpeg })
}

/// Characters outside the basic font are drawn as `?`. Text wider than the
/// canvas is clipped on both sides.
fn draw_centered(text: &str) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);

    let advance = i64::from(GLYPH_SIZE * SCALE);
    let text_width = text.chars().count() as i64 * advance;
    let left = (i64::from(WIDTH) - text_width) / 2;
    let top = (HEIGHT - GLYPH_SIZE * SCALE) / 2;

    for (i, c) in text.chars().enumerate() {
        let glyph = BASIC_FONTS
            .get(c)
            .or_else(|| BASIC_FONTS.get('?'))
            .unwrap_or_default();
        let origin = left + i as i64 * advance;

        for (row, bits) in (0u32..).zip(glyph) {
            for col in 0..GLYPH_SIZE {
                if bits & (1 << col) == 0 {
                    continue;
                }
                for dy in 0..SCALE {
                    for dx in 0..SCALE {
                        let x = origin + i64::from(col * SCALE + dx);
                        if !(0..i64::from(WIDTH)).contains(&x) {
                            continue;
                        }
                        canvas.put_pixel(x as u32, top + row * SCALE + dy, FOREGROUND);
                    }
                }
            }
        }
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;

    fn lit_pixels(canvas: &RgbImage) -> usize {
        canvas.pixels().filter(|p| **p == FOREGROUND).count()
    }

    #[test]
    fn encodes_png_and_jpeg() {
        let images = render("s3cr3t").unwrap();

        let png = image::load_from_memory_with_format(&images.png, ImageFormat::Png).unwrap();
        assert_eq!((png.width(), png.height()), (WIDTH, HEIGHT));

        let jpeg = image::load_from_memory_with_format(&images.jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!((jpeg.width(), jpeg.height()), (WIDTH, HEIGHT));
    }

    #[test]
    fn png_carries_the_drawn_text() {
        let images = render("s3cr3t").unwrap();
        let decoded = image::load_from_memory_with_format(&images.png, ImageFormat::Png)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded, draw_centered("s3cr3t"));
        assert!(lit_pixels(&decoded) > 0);
    }

    #[test]
    fn text_is_centered() {
        let canvas = draw_centered("I");
        let (min_x, max_x) = canvas
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == FOREGROUND)
            .fold((u32::MAX, 0), |(lo, hi), (x, _, _)| (lo.min(x), hi.max(x)));

        let glyph_left = (WIDTH - GLYPH_SIZE * SCALE) / 2;
        assert!(min_x >= glyph_left);
        assert!(max_x < glyph_left + GLYPH_SIZE * SCALE);
    }

    #[test]
    fn different_tokens_draw_differently() {
        assert_ne!(draw_centered("alpha"), draw_centered("bravo"));
        assert_eq!(lit_pixels(&draw_centered("")), 0);
    }

    #[test]
    fn long_tokens_are_clipped() {
        let token = "W".repeat(200);
        let canvas = draw_centered(&token);
        assert!(lit_pixels(&canvas) > 0);
        assert_eq!(canvas.dimensions(), (WIDTH, HEIGHT));
    }

    #[test]
    fn unknown_characters_fall_back() {
        assert_eq!(draw_centered("\u{1F600}"), draw_centered("?"));
    }
}
