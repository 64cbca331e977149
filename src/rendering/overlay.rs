// Overlay composition - marker, legend and activity on a copy of a stored frame
use crate::domain::activity::ActivityHistogram;
use crate::domain::geo::MapBoundingBox;
use crate::domain::settings::MarkerSettings;
use crate::domain::tick::TickKey;
use crate::infrastructure::artifact_store::ArtifactStore;
use crate::rendering::activity_graph::{render_graph, render_strike_count};
use crate::rendering::assets::MapAssets;
use crate::rendering::svg::SvgRasterizer;
use anyhow::Result;
use image::RgbaImage;
use image::imageops::overlay;
use std::sync::Arc;

const LEGEND_OFFSET: (i64, i64) = (5, 5);
const EDGE_MARGIN: i64 = 10;
const GRAPH_COUNT_GAP: i64 = 2;

pub struct OverlayComposer {
    assets: Arc<MapAssets>,
    bbox: MapBoundingBox,
    svg: SvgRasterizer,
}

impl OverlayComposer {
    pub fn new(assets: Arc<MapAssets>, bbox: MapBoundingBox, svg: SvgRasterizer) -> Self {
        Self { assets, bbox, svg }
    }

    /// Load a tick's base frame and return an overlaid copy. The stored
    /// frame is never written back. `None` when the frame no longer exists.
    pub fn compose_tick(
        &self,
        store: &ArtifactStore,
        key: TickKey,
        settings: &MarkerSettings,
    ) -> Result<Option<RgbaImage>> {
        let Some(frame) = store.load_frame(key)? else {
            tracing::debug!("Frame for tick {} is gone, skipping", key);
            return Ok(None);
        };
        let activity = if settings.show_activity_graph {
            store.load_activity(key)?
        } else {
            None
        };
        self.compose(frame, settings, activity.as_ref()).map(Some)
    }

    pub fn compose(
        &self,
        mut frame: RgbaImage,
        settings: &MarkerSettings,
        activity: Option<&ActivityHistogram>,
    ) -> Result<RgbaImage> {
        if let Some((lat, lon)) = settings.marker_position() {
            let marker = &self.assets.marker;
            let (x, y) = self.bbox.project(lat, lon, frame.width());
            overlay(
                &mut frame,
                marker,
                x.saturating_sub(i64::from(marker.width() / 2)),
                y.saturating_sub(i64::from(marker.height() / 2)),
            );
        }

        if settings.show_legend {
            overlay(&mut frame, &self.assets.legend, LEGEND_OFFSET.0, LEGEND_OFFSET.1);
        }

        if settings.show_activity_graph {
            if let Some(histogram) = activity {
                let graph = render_graph(histogram, &self.svg)?;
                let count = render_strike_count(histogram, &self.svg)?;

                let width = i64::from(frame.width());
                let height = i64::from(frame.height());
                let count_y = height - EDGE_MARGIN - i64::from(count.height());
                let graph_y = count_y - GRAPH_COUNT_GAP - i64::from(graph.height());

                overlay(
                    &mut frame,
                    &graph,
                    width - EDGE_MARGIN - i64::from(graph.width()),
                    graph_y,
                );
                overlay(
                    &mut frame,
                    &count,
                    width - EDGE_MARGIN - i64::from(count.width()),
                    count_y,
                );
            }
        }

        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::activity::AgeBucket;
    use crate::rendering::activity_graph::{COUNT_HEIGHT, GRAPH_HEIGHT, GRAPH_WIDTH, column_x};
    use crate::rendering::assets::MARKER_SIZE;
    use chrono::NaiveDate;
    use image::Rgba;
    use tempfile::TempDir;

    const SEA: Rgba<u8> = Rgba([10, 20, 30, 255]);

    fn bbox() -> MapBoundingBox {
        MapBoundingBox::new(0.0, 20.0, 55.0, 45.0)
    }

    fn composer() -> OverlayComposer {
        let svg = SvgRasterizer::without_fonts();
        let mut assets = MapAssets::generated(300, 250, &svg).unwrap();
        assets.marker = RgbaImage::from_pixel(MARKER_SIZE, MARKER_SIZE, Rgba([0, 255, 0, 255]));
        assets.legend = RgbaImage::from_pixel(20, 10, Rgba([255, 0, 255, 255]));
        OverlayComposer::new(Arc::new(assets), bbox(), svg)
    }

    fn base() -> RgbaImage {
        RgbaImage::from_pixel(300, 250, SEA)
    }

    fn hidden() -> MarkerSettings {
        MarkerSettings {
            show_marker: false,
            show_legend: false,
            show_activity_graph: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_nothing_enabled_leaves_frame_untouched() {
        let out = composer().compose(base(), &hidden(), None).unwrap();
        assert_eq!(out, base());
    }

    #[test]
    fn test_marker_is_centred_on_projection() {
        let settings = MarkerSettings {
            marker_lat: Some(50.0),
            marker_lon: Some(10.0),
            show_marker: true,
            ..hidden()
        };
        let out = composer().compose(base(), &settings, None).unwrap();
        let (x, y) = bbox().project(50.0, 10.0, 300);
        assert_eq!(out.get_pixel(x as u32, y as u32), &Rgba([0, 255, 0, 255]));
        let half = i64::from(MARKER_SIZE / 2);
        assert_eq!(out.get_pixel((x - half - 1) as u32, y as u32), &SEA);
    }

    #[test]
    fn test_marker_needs_both_coordinates() {
        let settings = MarkerSettings {
            marker_lat: Some(50.0),
            show_marker: true,
            ..hidden()
        };
        let out = composer().compose(base(), &settings, None).unwrap();
        assert_eq!(out, base());
    }

    #[test]
    fn test_marker_at_the_poles_is_off_frame() {
        for lat in [90.0, -90.0] {
            let settings = MarkerSettings {
                marker_lat: Some(lat),
                marker_lon: Some(10.0),
                show_marker: true,
                ..hidden()
            };
            let out = composer().compose(base(), &settings, None).unwrap();
            assert_eq!(out, base());
        }
    }

    #[test]
    fn test_legend_is_independent_of_marker() {
        let settings = MarkerSettings {
            show_legend: true,
            ..hidden()
        };
        let out = composer().compose(base(), &settings, None).unwrap();
        assert_eq!(out.get_pixel(5, 5), &Rgba([255, 0, 255, 255]));
        assert_eq!(out.get_pixel(4, 4), &SEA);
    }

    #[test]
    fn test_activity_graph_bottom_right() {
        let settings = MarkerSettings {
            show_activity_graph: true,
            ..hidden()
        };
        let mut histogram = ActivityHistogram::new();
        histogram.increment(AgeBucket::Min0);

        let out = composer().compose(base(), &settings, Some(&histogram)).unwrap();
        let graph_x = 300 - 10 - GRAPH_WIDTH;
        let graph_y = 250 - 10 - COUNT_HEIGHT - 2 - GRAPH_HEIGHT;
        let bar_pixel = out.get_pixel(
            graph_x + column_x(AgeBucket::Min0) + 2,
            graph_y + GRAPH_HEIGHT - 2,
        );
        assert_eq!(bar_pixel, &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_activity_graph_skipped_without_histogram() {
        let settings = MarkerSettings {
            show_activity_graph: true,
            ..hidden()
        };
        let out = composer().compose(base(), &settings, None).unwrap();
        assert_eq!(out, base());
    }

    #[test]
    fn test_compose_tick_leaves_stored_frame_alone() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let key = TickKey::from_naive(
            NaiveDate::from_ymd_opt(2025, 5, 5)
                .unwrap()
                .and_hms_opt(5, 5, 0)
                .unwrap(),
        );
        store.write_frame(key, &base()).unwrap();
        let before = std::fs::read(store.tick(key).frame.unwrap()).unwrap();

        let settings = MarkerSettings {
            show_legend: true,
            ..hidden()
        };
        let composed = composer().compose_tick(&store, key, &settings).unwrap().unwrap();
        assert_ne!(composed, base());

        let after = std::fs::read(store.tick(key).frame.unwrap()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_compose_missing_tick_is_none() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let key = TickKey::from_naive(
            NaiveDate::from_ymd_opt(2025, 5, 5)
                .unwrap()
                .and_hms_opt(5, 10, 0)
                .unwrap(),
        );
        assert!(composer().compose_tick(&store, key, &hidden()).unwrap().is_none());
    }
}
