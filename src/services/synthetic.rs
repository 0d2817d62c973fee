//! Placeholder test images for exercising the pipeline without a camera.
//!
//! Each image is a solid background derived from its index with a white
//! label (`Test Image N` plus the current time) drawn in a small bitmap font,
//! encoded as JPEG.

use bytes::Bytes;
use chrono::{DateTime, Local};
use image::{ImageResult, Rgb, RgbImage, codecs::jpeg::JpegEncoder};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;
/// Number of images produced by one synthetic batch.
pub const BATCH_SIZE: usize = 3;

const TEXT_ORIGIN: (u32, u32) = (50, 200);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const SCALE: u32 = 2;
const ADVANCE: u32 = (GLYPH_WIDTH + 1) * SCALE;
const LINE_HEIGHT: u32 = (GLYPH_HEIGHT + 3) * SCALE;

/// Background for the image at zero-based `index`.
pub fn background(index: usize) -> Rgb<u8> {
    let channel = |factor: usize| ((index * factor) % 255) as u8;
    Rgb([channel(80), channel(120), channel(160)])
}

/// Two-line label drawn onto the image at zero-based `index`.
pub fn label(index: usize, now: DateTime<Local>) -> String {
    format!(
        "Test Image {}\n{}",
        index + 1,
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Render the raw pixels for one synthetic image.
pub fn render(index: usize, text: &str) -> RgbImage {
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, background(index));
    draw_text(&mut img, TEXT_ORIGIN, text);
    img
}

/// Render and JPEG-encode one synthetic image.
pub fn generate(index: usize, now: DateTime<Local>, quality: u8) -> ImageResult<Bytes> {
    let img = render(index, &label(index, now));
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&img)?;
    Ok(Bytes::from(buf))
}

fn draw_text(img: &mut RgbImage, origin: (u32, u32), text: &str) {
    for (line_no, line) in text.lines().enumerate() {
        let y = origin.1 + line_no as u32 * LINE_HEIGHT;
        for (col, ch) in line.chars().enumerate() {
            let x = origin.0 + col as u32 * ADVANCE;
            if let Some(rows) = glyph(ch) {
                draw_glyph(img, x, y, rows);
            }
        }
    }
}

fn draw_glyph(img: &mut RgbImage, x: u32, y: u32, rows: [u8; 7]) {
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                continue;
            }
            for dy in 0..SCALE {
                for dx in 0..SCALE {
                    let px = x + col * SCALE + dx;
                    let py = y + row as u32 * SCALE + dy;
                    if px < img.width() && py < img.height() {
                        img.put_pixel(px, py, TEXT_COLOR);
                    }
                }
            }
        }
    }
}

/// 5x7 glyphs, one byte per row, bit 4 is the leftmost pixel.
/// Covers the characters labels use; anything else renders as a gap.
fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'a' => [0x00, 0x00, 0x0E, 0x01, 0x0F, 0x11, 0x0F],
        'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
        'g' => [0x00, 0x00, 0x0F, 0x11, 0x0F, 0x01, 0x0E],
        'm' => [0x00, 0x00, 0x1A, 0x15, 0x15, 0x11, 0x11],
        's' => [0x00, 0x00, 0x0F, 0x10, 0x0E, 0x01, 0x1E],
        't' => [0x08, 0x08, 0x1C, 0x08, 0x08, 0x09, 0x06],
        _ => return None,
    };
    Some(rows)
}
