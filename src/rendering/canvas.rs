use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use resvg::tiny_skia::{ColorU8, FillRule, Paint, PathBuilder, Pixmap, Rect, Transform};

/// Copy an RGBA image into a premultiplied pixmap for vector drawing.
pub fn pixmap_from_image(image: &RgbaImage) -> Result<Pixmap> {
    let (width, height) = image.dimensions();
    let mut pixmap = Pixmap::new(width, height)
        .with_context(|| format!("allocate {width}x{height} pixmap"))?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let Rgba([r, g, b, a]) = *src;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

pub fn image_from_pixmap(pixmap: &Pixmap) -> RgbaImage {
    let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
        let color = src.demultiply();
        *dst = Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
    }
    image
}

fn solid_paint(color: [u8; 3]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], 255);
    // Hard edges keep markers pixel-exact and frames reproducible.
    paint.anti_alias = false;
    paint
}

/// Filled dot centred on pixel `(x, y)`.
pub fn fill_dot(pixmap: &mut Pixmap, x: i64, y: i64, radius: f32, color: [u8; 3]) {
    let cx = x as f32 + 0.5;
    let cy = y as f32 + 0.5;
    if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
        pixmap.fill_path(
            &path,
            &solid_paint(color),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
    }
}

/// Filled axis-aligned rectangle covering whole pixels.
pub fn fill_rect(pixmap: &mut Pixmap, x: u32, y: u32, width: u32, height: u32, color: [u8; 3]) {
    if let Some(rect) = Rect::from_xywh(x as f32, y as f32, width as f32, height as f32) {
        pixmap.fill_rect(rect, &solid_paint(color), Transform::identity(), None);
    }
}
