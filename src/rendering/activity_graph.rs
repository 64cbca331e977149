// Activity overlays - per-bucket bar chart and strike count label
use crate::domain::activity::{ActivityHistogram, AgeBucket};
use crate::rendering::canvas::{fill_rect, image_from_pixmap};
use crate::rendering::svg::SvgRasterizer;
use crate::rendering::text::{self, Anchor, Label};
use anyhow::{Context, Result};
use image::RgbaImage;
use resvg::tiny_skia::Pixmap;

pub const COLUMN_WIDTH: u32 = 10;
pub const GRAPH_WIDTH: u32 = AgeBucket::ALL.len() as u32 * COLUMN_WIDTH + 3;
pub const GRAPH_HEIGHT: u32 = 75;
pub const COUNT_WIDTH: u32 = 150;
pub const COUNT_HEIGHT: u32 = 24;

const AXIS_COLOR: [u8; 3] = [0, 0, 0];
const PEAK_LABEL_COLOR: [u8; 3] = [0, 0, 0];
const PLACEHOLDER_COLOR: [u8; 3] = [255, 255, 255];

/// Left edge of a bucket's column. The oldest bucket sits at the left so
/// time runs towards the right edge.
pub fn column_x(bucket: AgeBucket) -> u32 {
    let from_right = (AgeBucket::ALL.len() - 1 - bucket.index()) as u32;
    1 + from_right * COLUMN_WIDTH
}

/// Height in pixels of a column relative to the tallest one.
pub fn bar_height(count: u64, max: u64) -> u32 {
    if max == 0 || count == 0 {
        return 0;
    }
    let usable = f64::from(GRAPH_HEIGHT - 2);
    ((count as f64 / max as f64) * usable).round().max(1.0) as u32
}

/// Bar chart of the histogram; an empty histogram renders an "N/A"
/// placeholder instead of bars.
pub fn render_graph(histogram: &ActivityHistogram, svg: &SvgRasterizer) -> Result<RgbaImage> {
    let mut pixmap = Pixmap::new(GRAPH_WIDTH, GRAPH_HEIGHT).context("allocate graph pixmap")?;

    fill_rect(&mut pixmap, 0, 0, 1, GRAPH_HEIGHT, AXIS_COLOR);
    fill_rect(&mut pixmap, 0, GRAPH_HEIGHT - 1, GRAPH_WIDTH, 1, AXIS_COLOR);

    let Some((peak_bucket, peak)) = histogram.peak() else {
        let placeholder = Label {
            text: "N/A",
            x: GRAPH_WIDTH as f32 / 2.0,
            baseline: GRAPH_HEIGHT as f32 / 2.0 + 5.0,
            size: 14.0,
            fill: PLACEHOLDER_COLOR,
            anchor: Anchor::Middle,
        };
        svg.draw(&text::outlined(GRAPH_WIDTH, GRAPH_HEIGHT, &placeholder), &mut pixmap)?;
        return Ok(image_from_pixmap(&pixmap));
    };

    for (bucket, count) in histogram.iter() {
        let height = bar_height(count, peak);
        if height == 0 {
            continue;
        }
        let top = GRAPH_HEIGHT - 1 - height;
        fill_rect(&mut pixmap, column_x(bucket), top, COLUMN_WIDTH, height, bucket.color());
    }

    let count_text = peak.to_string();
    let peak_label = Label {
        text: &count_text,
        x: column_x(peak_bucket) as f32 + COLUMN_WIDTH as f32 - 1.0,
        baseline: GRAPH_HEIGHT as f32 - 4.0,
        size: 10.0,
        fill: PEAK_LABEL_COLOR,
        anchor: Anchor::Start,
    };
    svg.draw(&text::rotated(GRAPH_WIDTH, GRAPH_HEIGHT, &peak_label), &mut pixmap)?;

    Ok(image_from_pixmap(&pixmap))
}

/// `Strikes: N` in the same outlined style as the frame's clock.
pub fn render_strike_count(histogram: &ActivityHistogram, svg: &SvgRasterizer) -> Result<RgbaImage> {
    let caption = format!("Strikes: {}", histogram.total());
    let label = Label {
        text: &caption,
        x: COUNT_WIDTH as f32 - 3.0,
        baseline: COUNT_HEIGHT as f32 - 6.0,
        size: 16.0,
        fill: [254, 255, 255],
        anchor: Anchor::End,
    };
    let markup = text::outlined(COUNT_WIDTH, COUNT_HEIGHT, &label);
    let pixmap = svg.rasterize(&markup, COUNT_WIDTH, COUNT_HEIGHT)?;
    Ok(image_from_pixmap(&pixmap))
}
