// Frame rendering - basemap, strike dots and clock for one tick
use crate::domain::activity::{ActivityHistogram, AgeBucket};
use crate::domain::geo::MapBoundingBox;
use crate::domain::strike::parse_strikes;
use crate::domain::tick::TickKey;
use crate::infrastructure::artifact_store::ArtifactStore;
use crate::rendering::assets::MapAssets;
use crate::rendering::canvas::{fill_dot, image_from_pixmap, pixmap_from_image};
use crate::rendering::svg::SvgRasterizer;
use crate::rendering::text::{self, Anchor, Label};
use anyhow::Result;
use chrono::{DateTime, Utc};
use image::RgbaImage;
use std::sync::Arc;

const STRIKE_RADIUS: f32 = 2.5;
const CLOCK_SIZE: f32 = 30.0;
const CLOCK_MARGIN: f32 = 10.0;
const CLOCK_COLOR: [u8; 3] = [254, 255, 255];

#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub image: RgbaImage,
    pub activity: ActivityHistogram,
    pub plotted: usize,
}

pub struct FrameRenderer {
    assets: Arc<MapAssets>,
    bbox: MapBoundingBox,
    svg: SvgRasterizer,
}

impl FrameRenderer {
    pub fn new(assets: Arc<MapAssets>, bbox: MapBoundingBox, svg: SvgRasterizer) -> Self {
        Self { assets, bbox, svg }
    }

    /// Draw the strikes of one tick's raw body onto a fresh copy of the
    /// basemap. The same pass that places a dot counts it into the
    /// histogram, so the two always agree.
    pub fn render(&self, key: TickKey, raw: &str, now: DateTime<Utc>) -> Result<RenderedFrame> {
        let background = &self.assets.background;
        let (width, height) = background.dimensions();
        let mut pixmap = pixmap_from_image(background)?;
        let mut activity = ActivityHistogram::new();
        let mut plotted = 0;

        for strike in parse_strikes(raw) {
            let (x, y) = self.bbox.project(strike.lat, strike.lon, width);
            if x < 0 || y < 0 || x >= i64::from(width) || y >= i64::from(height) {
                continue;
            }
            let bucket = AgeBucket::classify(strike.age_seconds(now));
            fill_dot(&mut pixmap, x, y, STRIKE_RADIUS, bucket.color());
            activity.increment(bucket);
            plotted += 1;
        }

        let clock = key.clock_label();
        let label = Label {
            text: &clock,
            x: CLOCK_MARGIN,
            baseline: height as f32 - CLOCK_MARGIN - 6.0,
            size: CLOCK_SIZE,
            fill: CLOCK_COLOR,
            anchor: Anchor::Start,
        };
        self.svg.draw(&text::outlined(width, height, &label), &mut pixmap)?;

        Ok(RenderedFrame {
            image: image_from_pixmap(&pixmap),
            activity,
            plotted,
        })
    }

    /// Render a tick from its stored raw body and persist the frame and
    /// histogram under the same key. A missing body renders an empty frame.
    pub fn render_tick(
        &self,
        store: &ArtifactStore,
        key: TickKey,
        now: DateTime<Utc>,
    ) -> Result<RenderedFrame> {
        let raw = store.read_raw(key)?.unwrap_or_default();
        let rendered = self.render(key, &raw, now)?;
        store.write_frame(key, &rendered.image)?;
        store.write_activity(key, &rendered.activity)?;
        tracing::debug!(
            "Rendered tick {} with {} strikes in view",
            key,
            rendered.plotted
        );
        Ok(rendered)
    }
}
