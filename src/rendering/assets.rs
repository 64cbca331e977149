// Static images - basemap, marker icon and legend
use crate::domain::activity::AgeBucket;
use crate::rendering::canvas::image_from_pixmap;
use crate::rendering::svg::SvgRasterizer;
use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{Rgba, RgbaImage};
use std::fmt::Write;
use std::path::Path;

pub const BACKGROUND_FILE: &str = "background.png";
pub const MARKER_FILE: &str = "pointer-50.png";
pub const LEGEND_FILE: &str = "legend.png";

pub const MARKER_SIZE: u32 = 40;
const FALLBACK_WIDTH: u32 = 1050;
const FALLBACK_HEIGHT: u32 = 1148;
const FALLBACK_SEA: Rgba<u8> = Rgba([12, 42, 84, 255]);
const LEGEND_PANEL: [u8; 3] = [12, 66, 156];

pub struct MapAssets {
    pub background: RgbaImage,
    pub marker: RgbaImage,
    pub legend: RgbaImage,
}

impl MapAssets {
    /// Load the images from `dir`. A missing marker or legend is drawn
    /// instead; a missing basemap degrades to a plain sea-colored one.
    pub fn load(dir: &Path, svg: &SvgRasterizer) -> Result<Self> {
        let background = match open_optional(&dir.join(BACKGROUND_FILE))? {
            Some(image) => image,
            None => {
                tracing::warn!(
                    "No basemap at {}, using a plain {}x{} background",
                    dir.join(BACKGROUND_FILE).display(),
                    FALLBACK_WIDTH,
                    FALLBACK_HEIGHT
                );
                RgbaImage::from_pixel(FALLBACK_WIDTH, FALLBACK_HEIGHT, FALLBACK_SEA)
            }
        };

        let marker = match open_optional(&dir.join(MARKER_FILE))? {
            Some(image) => {
                image::imageops::resize(&image, MARKER_SIZE, MARKER_SIZE, FilterType::Triangle)
            }
            None => draw_marker(svg)?,
        };

        let legend = match open_optional(&dir.join(LEGEND_FILE))? {
            Some(image) => image,
            None => draw_legend(svg)?,
        };

        Ok(Self {
            background,
            marker,
            legend,
        })
    }

    /// Plain basemap of the given size with drawn marker and legend.
    #[cfg(test)]
    pub fn generated(width: u32, height: u32, svg: &SvgRasterizer) -> Result<Self> {
        Ok(Self {
            background: RgbaImage::from_pixel(width, height, FALLBACK_SEA),
            marker: draw_marker(svg)?,
            legend: draw_legend(svg)?,
        })
    }
}

fn open_optional(path: &Path) -> Result<Option<RgbaImage>> {
    if !path.is_file() {
        return Ok(None);
    }
    let image = image::open(path)
        .with_context(|| format!("decode asset {}", path.display()))?
        .to_rgba8();
    Ok(Some(image))
}

fn draw_marker(svg: &SvgRasterizer) -> Result<RgbaImage> {
    let half = MARKER_SIZE / 2;
    let markup = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{s}" height="{s}">
<circle cx="{h}" cy="{h}" r="9" fill="none" stroke="rgb(0,0,0)" stroke-width="5"/>
<circle cx="{h}" cy="{h}" r="9" fill="none" stroke="rgb(0,200,255)" stroke-width="3"/>
<circle cx="{h}" cy="{h}" r="3" fill="rgb(0,200,255)"/>
</svg>"#,
        s = MARKER_SIZE,
        h = half,
    );
    let pixmap = svg.rasterize(&markup, MARKER_SIZE, MARKER_SIZE)?;
    Ok(image_from_pixmap(&pixmap))
}

/// Rounded panel with one colored dot and age label per bucket.
fn draw_legend(svg: &SvgRasterizer) -> Result<RgbaImage> {
    let width = 90;
    let height = AgeBucket::ALL.len() as u32 * 20 + 5;

    let mut markup = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}"><rect x="0" y="0" width="{width}" height="{height}" rx="10" fill="rgb({},{},{})"/>"#,
        LEGEND_PANEL[0], LEGEND_PANEL[1], LEGEND_PANEL[2]
    );
    for (row, bucket) in AgeBucket::ALL.into_iter().enumerate() {
        let y = 12 + row as u32 * 20;
        let [r, g, b] = bucket.color();
        let text = match bucket {
            AgeBucket::Min80 => "80+".to_string(),
            other => (other.lower_bound_minutes() + 20).to_string(),
        };
        let _ = write!(
            markup,
            r#"<circle cx="10" cy="{y}" r="2.5" fill="rgb({r},{g},{b})"/><text x="47" y="{}" font-family="sans-serif" font-size="16" text-anchor="end" fill="rgb(255,255,255)">{text}</text>"#,
            y + 6
        );
    }
    markup.push_str(
        r#"<text x="53" y="18" font-family="sans-serif" font-size="16" fill="rgb(255,255,255)">min.</text></svg>"#,
    );

    let pixmap = svg.rasterize(&markup, width, height)?;
    Ok(image_from_pixmap(&pixmap))
}
